//! Application use cases driven by the HTTP layer.

pub mod transactions;

pub use transactions::{ServiceError, TransactionService};
