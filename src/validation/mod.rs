use bigdecimal::BigDecimal;
use std::fmt;
use std::str::FromStr;

use crate::domain::NewTransaction;
use crate::schemas::CreateTransactionRequest;

pub const TEXT_FIELD_MAX_LEN: usize = 255;
pub const PHONE_MAX_LEN: usize = 32;
pub const AMOUNT_INPUT_MAX_LEN: usize = 64;
pub const AMOUNT_MAX_INTEGER_DIGITS: usize = 15;
pub const AMOUNT_MAX_SCALE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Plain decimal notation only, with bounded integer and fractional digits.
/// Exponents are refused so parsing cost stays proportional to input length.
fn validate_amount_digits(raw: &str) -> ValidationResult {
    let unsigned = raw.strip_prefix('-').unwrap_or(raw);
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let plain = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !plain(integer) || !plain(fraction) || integer.len() + fraction.len() == 0 {
        return Err(ValidationError::new("amount", "must be a decimal number"));
    }

    if integer.trim_start_matches('0').len() > AMOUNT_MAX_INTEGER_DIGITS {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} integer digits", AMOUNT_MAX_INTEGER_DIGITS),
        ));
    }
    if fraction.len() > AMOUNT_MAX_SCALE {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    Ok(())
}

pub fn parse_amount(raw: &str) -> Result<BigDecimal, ValidationError> {
    let raw = raw.trim();
    validate_required("amount", raw)?;
    validate_max_len("amount", raw, AMOUNT_INPUT_MAX_LEN)?;

    validate_amount_digits(raw)?;

    let amount = BigDecimal::from_str(raw)
        .map_err(|_| ValidationError::new("amount", "must be a decimal number"))?;
    validate_positive_amount(&amount)?;

    Ok(amount)
}

fn text_field(field: &'static str, value: &str, max_len: usize) -> Result<String, ValidationError> {
    let value = sanitize_string(value);
    validate_required(field, &value)?;
    validate_max_len(field, &value, max_len)?;
    Ok(value)
}

/// Check a create request and turn it into domain input. Blank evidence
/// tokens count as absent.
pub fn validate_create_request(
    request: &CreateTransactionRequest,
) -> Result<NewTransaction, ValidationError> {
    let evidence_token = match request.evidence_token.as_deref().map(sanitize_string) {
        Some(token) if !token.is_empty() => {
            validate_max_len("evidence_token", &token, TEXT_FIELD_MAX_LEN)?;
            Some(token)
        }
        _ => None,
    };

    Ok(NewTransaction {
        amount: parse_amount(&request.amount.as_text())?,
        payment_method: text_field("payment_method", &request.payment_method, TEXT_FIELD_MAX_LEN)?,
        source_account: text_field("source_account", &request.source_account, TEXT_FIELD_MAX_LEN)?,
        destination_account: text_field(
            "destination_account",
            &request.destination_account,
            TEXT_FIELD_MAX_LEN,
        )?,
        reference: text_field("reference", &request.reference, TEXT_FIELD_MAX_LEN)?,
        beneficiary: text_field("beneficiary", &request.beneficiary, TEXT_FIELD_MAX_LEN)?,
        requester_phone: text_field("requester_phone", &request.requester_phone, PHONE_MAX_LEN)?,
        evidence_token,
    })
}
