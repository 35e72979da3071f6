use {
    super::error::PipelineError,
    rust_decimal::{Decimal, RoundingStrategy},
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

/// Amounts must fit the ledger's NUMERIC(12,2) column.
// 10_000_000_000 = 2 * 2^32 + 1_410_065_408 (const-constructible form of Decimal::new(10_000_000_000, 0)).
pub const MAX_AMOUNT_EXCLUSIVE: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

/// Non-negative fixed-point amount in major units, two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyAmount(Decimal);

impl MoneyAmount {
    pub fn new(value: Decimal) -> Result<Self, PipelineError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(PipelineError::Validation(format!(
                "MoneyAmount cannot be negative, got: {value}"
            )));
        }
        let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if rounded >= MAX_AMOUNT_EXCLUSIVE {
            return Err(PipelineError::Validation(format!(
                "MoneyAmount out of range, got: {value}"
            )));
        }
        Ok(Self(rounded))
    }

    /// Card amounts arrive in minor units (cents).
    pub fn from_minor_units(minor: i64) -> Result<Self, PipelineError> {
        Self::new(Decimal::new(minor, 2))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Lenient parse of a provider-supplied amount: JSON strings and numbers are
    /// accepted; anything unparsable, negative or too large is treated as absent.
    pub fn parse_lenient(value: &serde_json::Value) -> Option<Self> {
        let text = match value {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let parsed = Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .ok()?;
        Self::new(parsed)
            .inspect_err(|e| tracing::warn!(error = %e, "provider amount ignored"))
            .ok()
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 alphabetic code, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, PipelineError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PipelineError::Validation(format!(
                "unknown currency: {code}"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
