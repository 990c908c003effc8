use crate::domain::cart::PhysicalCart;
use crate::domain::order::{Order, OrderStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OrderRow<'a> {
    order_number: &'a str,
    shopper: &'a str,
    items: u32,
    total_amount: String,
    payment_method: String,
    card: &'a str,
    status: OrderStatus,
    created_at: String,
}

impl<'a> From<&'a Order> for OrderRow<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            order_number: &order.order_number,
            shopper: order.shopper.as_str(),
            items: order.items.iter().map(|item| item.quantity).sum(),
            total_amount: order.total_amount.to_string(),
            payment_method: order.payment_method.to_string(),
            card: order.card.as_ref().map_or("", |card| card.as_str()),
            status: order.status,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct CartRow<'a> {
    cart_number: u32,
    barcode: &'a str,
    is_available: bool,
}

/// Writes end-of-run reports as CSV tables, separated by a blank line.
pub struct ReportWriter<W: Write> {
    out: W,
    tables: usize,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, tables: 0 }
    }

    pub fn write_orders(&mut self, orders: &[Order]) -> Result<()> {
        self.write_table(orders.iter().map(OrderRow::from))
    }

    pub fn write_carts(&mut self, carts: &[PhysicalCart]) -> Result<()> {
        self.write_table(carts.iter().map(|cart| CartRow {
            cart_number: cart.cart_number,
            barcode: &cart.barcode,
            is_available: cart.is_available,
        }))
    }

    fn write_table<T: Serialize>(&mut self, rows: impl Iterator<Item = T>) -> Result<()> {
        if self.tables > 0 {
            writeln!(self.out)?;
        }
        self.tables += 1;

        let mut writer = csv::Writer::from_writer(&mut self.out);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkout::{MaskedCard, PaymentMethod};
    use crate::domain::ids::{ProductId, ShopperId};
    use crate::domain::money::Money;
    use crate::domain::session::LineItem;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_orders_and_carts() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let price = Money::new(dec!(2.50)).unwrap();
        let mut order = Order::completed(
            ShopperId::new("alice"),
            vec![LineItem {
                product_id: ProductId::new("apple"),
                name: "Apple".into(),
                price,
                quantity: 2,
                total_price: price * 2,
                rfid_tag: "53EEC752110001".into(),
                scanned_at: at,
            }],
            price * 2,
            PaymentMethod::Visa,
            Some(MaskedCard::from_card_number("4111111111111111").unwrap()),
            at,
        );
        order.order_number = "ORD-20260314090000-1234".into();
        let mut cart = PhysicalCart::new(1, "CART001");
        cart.is_available = false;

        let mut out = Vec::new();
        let mut writer = ReportWriter::new(&mut out);
        writer.write_orders(&[order]).unwrap();
        writer.write_carts(&[cart]).unwrap();

        let text = String::from_utf8(out).unwrap();
        let expected = "order_number,shopper,items,total_amount,payment_method,card,status,created_at\n\
                        ORD-20260314090000-1234,alice,2,5.00,visa,****1111,completed,2026-03-14T09:00:00+00:00\n\
                        \n\
                        cart_number,barcode,is_available\n\
                        1,CART001,false\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_empty_table_writes_nothing() {
        let mut out = Vec::new();
        ReportWriter::new(&mut out).write_orders(&[]).unwrap();
        assert!(out.is_empty());
    }
}
