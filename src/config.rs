use crate::domain::checkout::CheckoutPolicy;
use std::path::PathBuf;

/// Upper bound on the code lifetime; longer settings are clamped.
const MAX_OTP_TTL_SECS: u64 = 24 * 60 * 60;

/// Runtime settings, read from `SHOPNGO_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub otp_ttl_secs: u64,
    pub otp_digits: usize,
    /// Carts provisioned on an empty registry.
    pub carts: u32,
    pub log_level: String,
    pub log_json: bool,
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unparseable values fall back to
    /// the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            otp_ttl_secs: lookup("SHOPNGO_OTP_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.otp_ttl_secs),
            otp_digits: lookup("SHOPNGO_OTP_DIGITS")
                .and_then(|v| v.parse().ok())
                .filter(|digits| *digits > 0)
                .unwrap_or(defaults.otp_digits),
            carts: lookup("SHOPNGO_CARTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.carts),
            log_level: lookup("SHOPNGO_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: lookup("SHOPNGO_LOG_JSON")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_json),
            db_path: lookup("SHOPNGO_DB_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn checkout_policy(&self) -> CheckoutPolicy {
        CheckoutPolicy {
            otp_ttl: chrono::Duration::seconds(self.otp_ttl_secs.min(MAX_OTP_TTL_SECS) as i64),
            code_digits: self.otp_digits,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            otp_ttl_secs: 300,
            otp_digits: 6,
            carts: 10,
            log_level: "info".into(),
            log_json: false,
            db_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.checkout_policy(), CheckoutPolicy::default());
    }

    #[test]
    fn test_reads_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SHOPNGO_OTP_TTL_SECS", "60"),
            ("SHOPNGO_OTP_DIGITS", "8"),
            ("SHOPNGO_CARTS", "3"),
            ("SHOPNGO_LOG_JSON", "true"),
            ("SHOPNGO_DB_PATH", "/tmp/shopngo"),
        ]);
        let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.carts, 3);
        assert!(config.log_json);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/shopngo")));
        let policy = config.checkout_policy();
        assert_eq!(policy.otp_ttl, chrono::Duration::seconds(60));
        assert_eq!(policy.code_digits, 8);
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = Config::from_lookup(|key| match key {
            "SHOPNGO_OTP_TTL_SECS" => Some("soon".into()),
            "SHOPNGO_OTP_DIGITS" => Some("0".into()),
            _ => None,
        });
        assert_eq!(config.otp_ttl_secs, 300);
        assert_eq!(config.otp_digits, 6);
    }
}
