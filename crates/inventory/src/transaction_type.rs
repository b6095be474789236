//! Business transaction types and the sign each one applies to stock.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockbook_core::DomainError;

use crate::movement::MovementType;

/// Direction of a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    /// Apply the direction to a non-negative magnitude.
    pub fn signed(self, magnitude: i64) -> i64 {
        match self {
            Direction::Increase => magnitude,
            Direction::Decrease => -magnitude,
        }
    }

    pub fn movement_type(self) -> MovementType {
        match self {
            Direction::Increase => MovementType::Inbound,
            Direction::Decrease => MovementType::Outbound,
        }
    }
}

/// A business event that moves stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Return,
    Sale,
    Waste,
}

impl TransactionType {
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Purchase,
        TransactionType::Return,
        TransactionType::Sale,
        TransactionType::Waste,
    ];

    /// The sign table. Adding a variant without a row here fails to compile.
    pub fn direction(self) -> Direction {
        match self {
            TransactionType::Purchase | TransactionType::Return => Direction::Increase,
            TransactionType::Sale | TransactionType::Waste => Direction::Decrease,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Return => "return",
            TransactionType::Sale => "sale",
            TransactionType::Waste => "waste",
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unknown transaction type '{}' (expected one of: purchase, return, sale, waste)",
                    s.trim()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchases_and_returns_increase_stock() {
        assert_eq!(TransactionType::Purchase.direction(), Direction::Increase);
        assert_eq!(TransactionType::Return.direction(), Direction::Increase);
        assert_eq!(TransactionType::Purchase.direction().signed(5), 5);
    }

    #[test]
    fn sales_and_waste_decrease_stock() {
        assert_eq!(TransactionType::Sale.direction(), Direction::Decrease);
        assert_eq!(TransactionType::Waste.direction(), Direction::Decrease);
        assert_eq!(TransactionType::Waste.direction().signed(5), -5);
    }

    #[test]
    fn every_type_parses_from_its_name() {
        for t in TransactionType::ALL {
            assert_eq!(t.to_string().parse::<TransactionType>().unwrap(), t);
        }
        assert_eq!(" Sale ".parse::<TransactionType>().unwrap(), TransactionType::Sale);
    }

    #[test]
    fn unrecognized_type_is_rejected() {
        let err = "donation".parse::<TransactionType>().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("donation")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn direction_maps_to_movement_type() {
        assert_eq!(Direction::Increase.movement_type(), MovementType::Inbound);
        assert_eq!(Direction::Decrease.movement_type(), MovementType::Outbound);
    }
}
