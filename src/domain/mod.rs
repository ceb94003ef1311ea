pub mod event;
pub mod merchant;
pub mod transaction;

pub use event::{EventType, LifecycleEvent, LogRecord, Notification};
pub use merchant::Merchant;
pub use transaction::{NewTransaction, Transaction, TransactionStatus, Transition};
