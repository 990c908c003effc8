//! Typed records and the invariants they maintain on their own.

pub mod cart;
pub mod checkout;
pub mod identity;
pub mod ids;
pub mod money;
pub mod order;
pub mod ports;
pub mod product;
pub mod session;
