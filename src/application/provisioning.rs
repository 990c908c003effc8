use crate::domain::cart::PhysicalCart;
use crate::domain::ports::{CartRegistry, CatalogStore};
use crate::domain::product::Product;
use crate::error::{CartError, Result};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProvisionReport {
    pub created: u32,
    pub already_registered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Registers `CART001`..`CARTnnn` on an empty registry. A registry that
/// already holds carts is left untouched, so running this at every start is
/// safe.
pub async fn provision_carts(carts: &dyn CartRegistry, count: u32) -> Result<ProvisionReport> {
    let existing = carts.all().await?;
    if !existing.is_empty() {
        debug!(existing = existing.len(), "Carts already provisioned");
        return Ok(ProvisionReport {
            created: 0,
            already_registered: existing.len(),
        });
    }

    for number in 1..=count {
        carts
            .insert(PhysicalCart::new(
                number,
                PhysicalCart::provisioned_barcode(number),
            ))
            .await?;
    }
    info!(count, "Provisioned carts");
    Ok(ProvisionReport {
        created: count,
        already_registered: 0,
    })
}

/// Loads products into the catalog, skipping any whose tag or id is
/// already present.
pub async fn seed_catalog(catalog: &dyn CatalogStore, products: Vec<Product>) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    for product in products {
        if catalog.get(&product.id).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        match catalog.insert(product).await {
            Ok(()) => report.inserted += 1,
            Err(CartError::DuplicateRfidTag(tag)) => {
                debug!(rfid_tag = %tag, "Product with this tag already seeded");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    info!(inserted = report.inserted, skipped = report.skipped, "Catalog seeded");
    Ok(report)
}
