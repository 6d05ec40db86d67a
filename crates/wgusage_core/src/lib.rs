//! Lifetime traffic accounting for WireGuard interfaces.
//!
//! [`source`] reads raw counters from the host, [`ledger`] folds them into the
//! stored lifetime totals and [`report`] renders the stored state.

pub mod error;
pub mod ledger;
pub mod report;
pub mod source;

pub use error::UsageError;
