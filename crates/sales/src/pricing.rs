//! Sale pricing formula.
//!
//! All arithmetic is `f64` and follows the evaluation order below exactly, so
//! totals are reproducible bit for bit.

use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult};

/// A percentage in the closed range 0–100.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Percent(f64);

impl Percent {
    pub const ZERO: Percent = Percent(0.0);

    pub fn new(value: f64) -> DomainResult<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(DomainError::validation(format!(
                "percentage must be between 0 and 100, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Percent {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Percent::new(value)
    }
}

impl From<Percent> for f64 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

/// `unit_price * quantity * (1 - discount/100)`, then `* (1 + tax/100)` when a tax rate is set.
pub fn line_total(unit_price: f64, quantity: i64, discount: Percent, tax_rate: Option<Percent>) -> f64 {
    let mut total = unit_price * quantity as f64 * (1.0 - discount.value() / 100.0);
    if let Some(tax) = tax_rate {
        total *= 1.0 + tax.value() / 100.0;
    }
    total
}

/// `subtotal * (1 - discount/100) * (1 + tax/100)`.
pub fn order_total(subtotal: f64, discount: Percent, tax: Percent) -> f64 {
    subtotal * (1.0 - discount.value() / 100.0) * (1.0 + tax.value() / 100.0)
}
