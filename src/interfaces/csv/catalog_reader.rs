use crate::domain::ids::ProductId;
use crate::domain::money::Money;
use crate::domain::product::Product;
use crate::error::{CartError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct ProductRecord {
    id: String,
    name: String,
    price: Decimal,
    stock_quantity: u32,
    #[serde(default)]
    rfid_tag: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl TryFrom<ProductRecord> for Product {
    type Error = CartError;

    fn try_from(record: ProductRecord) -> Result<Self> {
        if record.id.is_empty() {
            return Err(CartError::MissingField("id"));
        }
        let mut product = Product::new(
            ProductId::new(record.id),
            record.name,
            Money::new(record.price)?,
            record.stock_quantity,
            record.rfid_tag,
        )?;
        if let Some(category) = record.category.filter(|c| !c.is_empty()) {
            product = product.with_category(category);
        }
        if let Some(description) = record.description.filter(|d| !d.is_empty()) {
            product = product.with_description(description);
        }
        Ok(product)
    }
}

/// Reads catalog rows:
/// `id, name, price, stock_quantity, rfid_tag, category, description`.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn products(self) -> impl Iterator<Item = Result<Product>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map_err(CartError::from)
                .and_then(|record: ProductRecord| Product::try_from(record))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_products() {
        let data = "id, name, price, stock_quantity, rfid_tag, category, description\n\
                    apple, Apple, 2.50, 100, 53EEC752110001, Fruit, Fresh red apple\n\
                    bag, Paper bag, 0.10, 500";
        let products: Vec<Result<Product>> = CatalogReader::new(data.as_bytes()).products().collect();
        assert_eq!(products.len(), 2);

        let apple = products[0].as_ref().unwrap();
        assert_eq!(apple.price.value(), dec!(2.50));
        assert_eq!(apple.rfid_tag.as_deref(), Some("53EEC752110001"));
        assert_eq!(apple.category.as_deref(), Some("Fruit"));

        let bag = products[1].as_ref().unwrap();
        assert_eq!(bag.rfid_tag, None);
        assert_eq!(bag.description, None);
    }

    #[test]
    fn test_reader_rejects_negative_price() {
        let data = "id, name, price, stock_quantity\nx, Broken, -1.00, 1";
        let products: Vec<Result<Product>> = CatalogReader::new(data.as_bytes()).products().collect();
        assert!(products[0].is_err());
    }
}
