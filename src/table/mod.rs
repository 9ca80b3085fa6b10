// ddbsync/src/table/mod.rs
pub(crate) mod dynamodb;
pub(crate) mod render;

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use crate::errors::ProviderError;

pub use dynamodb::DynamoDbTable;

/// One table item: attribute name to typed value.
pub type Record = HashMap<String, AttributeValue>;

/// Hashable projection of a record's identity attribute.
///
/// Only scalar key types can identify a record. Numbers compare by their
/// canonical text form so that `1`, `1.0` and `+01` are the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    String(String),
    Number(String),
    Binary(Vec<u8>),
}

impl IdentityKey {
    pub fn of(record: &Record, attribute: &str) -> Option<Self> {
        match record.get(attribute)? {
            AttributeValue::S(s) => Some(IdentityKey::String(s.clone())),
            AttributeValue::N(n) => Some(IdentityKey::Number(canonical_number(n))),
            AttributeValue::B(b) => Some(IdentityKey::Binary(b.as_ref().to_vec())),
            _ => None,
        }
    }
}

/// DynamoDB bounds number exponents well inside this; anything larger is
/// kept as written rather than expanded.
const MAX_EXPONENT: i64 = 400;

/// Normalises a number string to plain decimal form: sign, exponent, leading
/// zeros and trailing fraction zeros are folded away, so `1E3`, `1000.0` and
/// `+01e3` are all `1000`. Text that does not parse is kept as written.
fn canonical_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => match exponent.parse::<i64>() {
            Ok(exponent) if exponent.abs() <= MAX_EXPONENT => (mantissa, exponent),
            _ => return trimmed.to_string(),
        },
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit())
    {
        return trimmed.to_string();
    }

    // All significant digits, with the decimal point `point` digits from the left.
    let digits = format!("{int_part}{frac_part}");
    let leading = digits.len() - digits.trim_start_matches('0').len();
    let digits = digits.trim_start_matches('0').trim_end_matches('0');
    if digits.is_empty() {
        return "0".to_string();
    }
    let point = int_part.len() as i64 + exponent - leading as i64;
    let len = digits.len() as i64;

    let mut canonical = String::with_capacity(digits.len() + 2);
    if negative {
        canonical.push('-');
    }
    if point <= 0 {
        canonical.push_str("0.");
        canonical.push_str(&"0".repeat((-point) as usize));
        canonical.push_str(digits);
    } else if point >= len {
        canonical.push_str(digits);
        canonical.push_str(&"0".repeat((point - len) as usize));
    } else {
        canonical.push_str(&digits[..point as usize]);
        canonical.push('.');
        canonical.push_str(&digits[point as usize..]);
    }
    canonical
}

/// Opaque continuation token of a paginated scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCursor(HashMap<String, AttributeValue>);

impl ScanCursor {
    /// An empty last-evaluated key means the scan is finished.
    pub fn from_key(key: HashMap<String, AttributeValue>) -> Option<Self> {
        if key.is_empty() { None } else { Some(ScanCursor(key)) }
    }

    #[cfg(test)]
    pub fn as_key(&self) -> &HashMap<String, AttributeValue> {
        &self.0
    }

    pub fn into_key(self) -> HashMap<String, AttributeValue> {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub records: Vec<Record>,
    pub next_cursor: Option<ScanCursor>,
}

/// A single table on a single endpoint, as seen by the sync engine.
#[async_trait]
pub trait TableEndpoint: Send + Sync {
    fn table_name(&self) -> &str;

    /// Reads one page, continuing after `cursor` when one is given.
    async fn scan_page(&self, cursor: Option<ScanCursor>) -> Result<ScanPage, ProviderError>;

    /// Unconditionally puts every record. `records` never exceeds the
    /// provider's per-call item limit.
    async fn batch_put(&self, records: &[Record]) -> Result<(), ProviderError>;
}
