//! Use cases orchestrating the domain over the store ports.
//!
//! [`service::ShopService`] is the entry point for requests; the managers
//! below it are usable directly by hosts that do their own authentication.

pub mod checkout;
pub mod provisioning;
pub mod rfid;
pub mod service;
pub mod sessions;
