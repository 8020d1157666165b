use bigdecimal::BigDecimal;
use bigdecimal::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Normalize a monetary value to 2 decimal places (GHS scale).
pub fn normalize_scale(value: &BigDecimal) -> BigDecimal {
    value.with_scale(2)
}

/// Convert a gateway amount in minor units (pesewas) to major units (GHS).
pub fn minor_to_major(minor: i64) -> BigDecimal {
    normalize_scale(&(BigDecimal::from(minor) / BigDecimal::from(100)))
}

/// Compare two monetary values allowing a tolerance (in pesewas) after normalization.
pub fn nearly_equal(a: &BigDecimal, b: &BigDecimal, pesewas_tolerance: i64) -> bool {
    let na = normalize_scale(a);
    let nb = normalize_scale(b);
    // Convert difference to integer pesewas to avoid floating comparison drift.
    let diff = (na - nb).with_scale(2);
    let pesewas = diff.to_f64().unwrap_or(0.0) * 100.0;
    pesewas.abs() <= pesewas_tolerance as f64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedMoney(BigDecimal);

impl NormalizedMoney {
    pub fn new(raw: BigDecimal) -> Self {
        Self(normalize_scale(&raw))
    }
    pub fn inner(&self) -> &BigDecimal {
        &self.0
    }
}

impl From<BigDecimal> for NormalizedMoney {
    fn from(value: BigDecimal) -> Self {
        Self::new(value)
    }
}
