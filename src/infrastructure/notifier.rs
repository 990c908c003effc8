use crate::domain::checkout::OneTimeCode;
use crate::domain::ids::ShopperId;
use crate::domain::ports::OtpNotifier;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps every dispatched code in memory instead of sending it.
///
/// Stands in for the e-mail/SMS channel in the replay tool and in tests:
/// the last code sent to a destination can be read back with
/// [`OutboxNotifier::last_code`].
#[derive(Default, Clone)]
pub struct OutboxNotifier {
    sent: Arc<RwLock<HashMap<ShopperId, Vec<OneTimeCode>>>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last_code(&self, destination: &ShopperId) -> Option<OneTimeCode> {
        let sent = self.sent.read().await;
        sent.get(destination).and_then(|codes| codes.last().cloned())
    }

    pub async fn sent_count(&self, destination: &ShopperId) -> usize {
        let sent = self.sent.read().await;
        sent.get(destination).map_or(0, Vec::len)
    }
}

#[async_trait]
impl OtpNotifier for OutboxNotifier {
    async fn send(&self, destination: &ShopperId, code: &OneTimeCode) -> Result<()> {
        let mut sent = self.sent.write().await;
        sent.entry(destination.clone()).or_default().push(code.clone());
        tracing::info!(destination = %destination, "One-time code queued in outbox");
        Ok(())
    }
}
