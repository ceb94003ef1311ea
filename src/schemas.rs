use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Amount as submitted by clients: either a decimal string or a JSON number.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(Number),
}

impl AmountInput {
    pub fn as_text(&self) -> String {
        match self {
            AmountInput::Text(text) => text.clone(),
            AmountInput::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateTransactionRequest {
    pub amount: AmountInput,
    pub payment_method: String,
    pub source_account: String,
    pub destination_account: String,
    pub reference: String,
    pub beneficiary: String,
    pub requester_phone: String,
    #[serde(default)]
    pub evidence_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_accepts_string_or_number() {
        let from_text: AmountInput = serde_json::from_str("\"50000.50\"").unwrap();
        let from_number: AmountInput = serde_json::from_str("50000").unwrap();

        assert_eq!(from_text.as_text(), "50000.50");
        assert_eq!(from_number.as_text(), "50000");
    }

    #[test]
    fn test_evidence_token_is_optional() {
        let request: CreateTransactionRequest = serde_json::from_value(serde_json::json!({
            "amount": 10,
            "payment_method": "transfer",
            "source_account": "SRC1",
            "destination_account": "ACC1",
            "reference": "REF-1",
            "beneficiary": "Jane",
            "requester_phone": "+570000000"
        }))
        .unwrap();

        assert!(request.evidence_token.is_none());
    }
}
