use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Merchant receiving payments on one or more destination accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: Uuid,
    pub responsible: String,
    pub name: String,
    pub phone: String,
    pub accounts: Vec<String>,
}

impl Merchant {
    pub fn owns_account(&self, account: &str) -> bool {
        self.accounts.iter().any(|candidate| candidate == account)
    }
}
