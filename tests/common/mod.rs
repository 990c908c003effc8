#![allow(dead_code)]

use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use shopngo::application::provisioning::{provision_carts, seed_catalog};
use shopngo::application::service::ShopService;
use shopngo::domain::cart::PhysicalCart;
use shopngo::domain::checkout::CheckoutPolicy;
use shopngo::domain::identity::Identity;
use shopngo::domain::ids::{ProductId, ShopperId};
use shopngo::domain::money::Money;
use shopngo::domain::ports::{OtpNotifierRef, Stores};
use shopngo::domain::product::Product;
use shopngo::infrastructure::clock::ManualClock;
use shopngo::infrastructure::identity::StaticIdentityProvider;
use shopngo::infrastructure::notifier::OutboxNotifier;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const APPLE: &str = "53EEC752110001";
pub const BANANA: &str = "04A3B2C1D0E9F8";
pub const MILK: &str = "1234567890ABCD";
pub const BREAD: &str = "ABCDEF123456";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const CARTS: u32 = 10;

pub fn product(id: &str, name: &str, price: Decimal, stock: u32, tag: &str) -> Product {
    Product::new(
        ProductId::new(id),
        name,
        Money::new(price).unwrap(),
        stock,
        Some(tag.to_string()),
    )
    .unwrap()
}

pub fn test_products() -> Vec<Product> {
    vec![
        product("apple", "Apple", Decimal::new(250, 2), 100, APPLE),
        product("banana", "Banana", Decimal::new(175, 2), 50, BANANA),
        product("milk", "Milk", Decimal::new(399, 2), 25, MILK),
        product("bread", "Bread", Decimal::new(225, 2), 30, BREAD),
    ]
}

/// A service over seeded stores, a manual clock, and an outbox notifier.
///
/// Credentials are taken as shopper ids, except [`ADMIN_TOKEN`].
pub struct Harness {
    pub stores: Stores,
    pub clock: ManualClock,
    pub outbox: OutboxNotifier,
    pub service: ShopService,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_stores(Stores::in_memory()).await
    }

    pub async fn with_stores(stores: Stores) -> Self {
        let outbox = OutboxNotifier::new();
        let notifier: OtpNotifierRef = Arc::new(outbox.clone());
        Self::build(stores, outbox, notifier).await
    }

    pub async fn with_notifier(notifier: OtpNotifierRef) -> Self {
        Self::build(Stores::in_memory(), OutboxNotifier::new(), notifier).await
    }

    async fn build(stores: Stores, outbox: OutboxNotifier, notifier: OtpNotifierRef) -> Self {
        provision_carts(stores.carts.as_ref(), CARTS).await.unwrap();
        seed_catalog(stores.catalog.as_ref(), test_products())
            .await
            .unwrap();

        let identity = StaticIdentityProvider::trusting();
        identity
            .register(ADMIN_TOKEN, Identity::admin("ops@shopngo.test"))
            .await;
        let clock = ManualClock::starting_at(Utc::now());
        let service = ShopService::new(
            stores.clone(),
            Arc::new(identity),
            notifier,
            Arc::new(clock.clone()),
            CheckoutPolicy::default(),
        );

        Self {
            stores,
            clock,
            outbox,
            service,
        }
    }

    pub async fn add_product(&self, product: Product) {
        self.stores.catalog.insert(product).await.unwrap();
    }

    /// Registers carts `CART011..` up to `total`.
    pub async fn add_carts(&self, total: u32) {
        for number in CARTS + 1..=total {
            self.stores
                .carts
                .insert(PhysicalCart::new(
                    number,
                    PhysicalCart::provisioned_barcode(number),
                ))
                .await
                .unwrap();
        }
    }

    pub async fn code_for(&self, shopper: &str) -> String {
        self.outbox
            .last_code(&ShopperId::new(shopper))
            .await
            .expect("no code sent")
            .as_str()
            .to_string()
    }

    pub async fn stock_of(&self, product_id: &str) -> u32 {
        self.stores
            .catalog
            .get(&ProductId::new(product_id))
            .await
            .unwrap()
            .expect("unknown product")
            .stock_quantity
    }

    pub async fn cart(&self, barcode: &str) -> PhysicalCart {
        self.stores
            .carts
            .find_by_barcode(barcode)
            .await
            .unwrap()
            .expect("unknown cart")
    }
}

/// Writes a replay script where each shopper takes cart `CARTnnn`, scans
/// `scans` random products, then checks out with a wallet.
pub fn generate_script(path: &Path, shoppers: u32, scans: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    let mut rng = rand::thread_rng();
    let tags = [APPLE, BANANA, MILK, BREAD];

    wtr.write_record(["op", "credential", "arg", "extra"])?;
    for shopper in 1..=shoppers {
        let credential = format!("shopper{shopper}@shopngo.test");
        let barcode = PhysicalCart::provisioned_barcode(shopper);
        wtr.write_record(["start", &credential, &barcode, ""])?;

        for _ in 0..scans {
            let tag = tags.choose(&mut rng).copied().unwrap_or(APPLE);
            let op = if rng.gen_bool(0.9) { "scan" } else { "toggle" };
            wtr.write_record([op, &credential, tag, ""])?;
        }

        wtr.write_record(["checkout", &credential, "mobile_wallet", ""])?;
        wtr.write_record(["verify", &credential, "", ""])?;
    }

    wtr.flush()?;
    Ok(())
}
