//! Transaction domain entity and its lifecycle graph.
//! Framework-agnostic representation of a payment awaiting operator review.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::event::EventType;

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Review,
    Approved,
    Rejected,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Review,
        TransactionStatus::Approved,
        TransactionStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Review => "review",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transaction status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Operator action moving a transaction along the lifecycle graph.
///
/// `pending --review--> review --approve--> approved`
/// `review --reject--> rejected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Review,
    Approve,
    Reject,
}

impl Transition {
    /// Status the register must currently hold for the transition to apply.
    pub fn required(&self) -> TransactionStatus {
        match self {
            Transition::Review => TransactionStatus::Pending,
            Transition::Approve | Transition::Reject => TransactionStatus::Review,
        }
    }

    pub fn target(&self) -> TransactionStatus {
        match self {
            Transition::Review => TransactionStatus::Review,
            Transition::Approve => TransactionStatus::Approved,
            Transition::Reject => TransactionStatus::Rejected,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Transition::Review => EventType::Review,
            Transition::Approve => EventType::Approved,
            Transition::Reject => EventType::Rejected,
        }
    }

    /// Approve and reject are final decisions that the merchant hears about.
    pub fn is_decision(&self) -> bool {
        matches!(self, Transition::Approve | Transition::Reject)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Review => "review",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
        };
        f.write_str(name)
    }
}

/// Validated input for a new transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub amount: BigDecimal,
    pub payment_method: String,
    pub source_account: String,
    pub destination_account: String,
    pub reference: String,
    pub beneficiary: String,
    pub requester_phone: String,
    pub evidence_token: Option<String>,
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub amount: BigDecimal,
    pub payment_method: String,
    pub source_account: String,
    pub destination_account: String,
    pub reference: String,
    pub beneficiary: String,
    pub requester_phone: String,
    pub evidence_token: Option<String>,
    pub evidence_url: Option<String>,
    pub status: TransactionStatus,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(user_id: String, input: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            amount: input.amount,
            payment_method: input.payment_method,
            source_account: input.source_account,
            destination_account: input.destination_account,
            reference: input.reference,
            beneficiary: input.beneficiary,
            requester_phone: input.requester_phone,
            evidence_token: input.evidence_token,
            evidence_url: None,
            status: TransactionStatus::Pending,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}
