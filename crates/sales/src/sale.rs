//! Sale aggregate: header, priced lines and the status lifecycle.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{
    CustomerId, DomainError, DomainResult, ItemId, LocationId, SaleId, SaleLineId, UserId,
    Versioned,
};

use crate::pricing::{Percent, line_total, order_total};

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    MobileMoney,
    StoreCredit,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::StoreCredit => "store_credit",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "store_credit" => Ok(PaymentMethod::StoreCredit),
            other => Err(DomainError::validation(format!("unknown payment method '{other}'"))),
        }
    }
}

/// Sale status lifecycle.
///
/// ```text
/// pending ──► completed ──► refunded
///    │
///    └──────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Pending,
    Completed,
    Cancelled,
    Refunded,
}

impl SaleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(self, next: SaleStatus) -> bool {
        matches!(
            (self, next),
            (SaleStatus::Pending, SaleStatus::Completed)
                | (SaleStatus::Pending, SaleStatus::Cancelled)
                | (SaleStatus::Completed, SaleStatus::Refunded)
        )
    }
}

impl core::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SaleStatus::Pending),
            "completed" => Ok(SaleStatus::Completed),
            "cancelled" => Ok(SaleStatus::Cancelled),
            "refunded" => Ok(SaleStatus::Refunded),
            other => Err(DomainError::validation(format!("unknown sale status '{other}'"))),
        }
    }
}

/// Input line for a new sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSaleLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount_pct: Percent,
    pub tax_rate: Option<Percent>,
}

/// Command: create a sale with all of its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSale {
    pub customer_id: Option<CustomerId>,
    pub cashier_id: UserId,
    pub location_id: LocationId,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub discount_pct: Percent,
    pub tax_pct: Percent,
    pub notes: Option<String>,
    pub lines: Vec<NewSaleLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Persisted line of a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLineItem {
    pub id: SaleLineId,
    pub sale_id: SaleId,
    /// 1-based position within the sale.
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount_pct: Percent,
    pub tax_rate: Option<Percent>,
    pub line_total: f64,
}

/// Persisted header of a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleHeader {
    pub id: SaleId,
    pub customer_id: Option<CustomerId>,
    pub cashier_id: UserId,
    pub location_id: LocationId,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub discount_pct: Percent,
    pub tax_pct: Percent,
    pub total_amount: f64,
    pub notes: Option<String>,
    /// Optimistic-concurrency token, 1 on insert and bumped by every header update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Versioned for SaleHeader {
    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: edit the descriptive fields of a sale.
///
/// Pricing inputs are deliberately absent: the total is fixed when the sale is
/// composed and an update never recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleUpdate {
    /// `Some(None)` clears the customer.
    pub customer_id: Option<Option<CustomerId>>,
    pub payment_method: Option<PaymentMethod>,
    /// `Some(None)` clears the notes.
    pub notes: Option<Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

impl SaleHeader {
    pub fn apply_update(&self, update: &SaleUpdate) -> SaleHeader {
        let mut next = self.clone();
        if let Some(customer_id) = update.customer_id {
            next.customer_id = customer_id;
        }
        if let Some(method) = update.payment_method {
            next.payment_method = method;
        }
        if let Some(notes) = &update.notes {
            next.notes = notes.clone();
        }
        next.version = self.version + 1;
        next.updated_at = update.occurred_at;
        next
    }

    pub fn transition(&self, to: SaleStatus, at: DateTime<Utc>) -> DomainResult<SaleHeader> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::invariant(format!(
                "sale cannot move from {} to {}",
                self.status, to
            )));
        }
        Ok(SaleHeader {
            status: to,
            version: self.version + 1,
            updated_at: at,
            ..self.clone()
        })
    }
}

/// Aggregate: a sale header and the lines it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleTransaction {
    header: SaleHeader,
    lines: Vec<SaleLineItem>,
}

impl SaleTransaction {
    /// Validate a new sale and price every line.
    pub fn compose(id: SaleId, new: NewSale) -> DomainResult<Self> {
        if new.lines.is_empty() {
            return Err(DomainError::validation("a sale needs at least one line item"));
        }

        let mut lines = Vec::with_capacity(new.lines.len());
        let mut subtotal = 0.0;
        for (idx, line) in new.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {}: quantity must be positive",
                    idx + 1
                )));
            }
            if !line.unit_price.is_finite() || line.unit_price < 0.0 {
                return Err(DomainError::validation(format!(
                    "line {}: unit price must be a non-negative amount",
                    idx + 1
                )));
            }

            let total = line_total(line.unit_price, line.quantity, line.discount_pct, line.tax_rate);
            subtotal += total;
            lines.push(SaleLineItem {
                id: SaleLineId::new(),
                sale_id: id,
                line_no: (idx as u32) + 1,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount_pct: line.discount_pct,
                tax_rate: line.tax_rate,
                line_total: total,
            });
        }

        let header = SaleHeader {
            id,
            customer_id: new.customer_id,
            cashier_id: new.cashier_id,
            location_id: new.location_id,
            payment_method: new.payment_method,
            status: new.status,
            discount_pct: new.discount_pct,
            tax_pct: new.tax_pct,
            total_amount: order_total(subtotal, new.discount_pct, new.tax_pct),
            notes: new.notes,
            version: 1,
            created_at: new.occurred_at,
            updated_at: new.occurred_at,
        };

        Ok(Self { header, lines })
    }

    /// Reassemble a sale read back from storage (lines sorted by position).
    pub fn from_parts(header: SaleHeader, mut lines: Vec<SaleLineItem>) -> Self {
        lines.sort_by_key(|l| l.line_no);
        Self { header, lines }
    }

    pub fn id(&self) -> SaleId {
        self.header.id
    }

    pub fn header(&self) -> &SaleHeader {
        &self.header
    }

    pub fn lines(&self) -> &[SaleLineItem] {
        &self.lines
    }

    pub fn status(&self) -> SaleStatus {
        self.header.status
    }

    pub fn total_amount(&self) -> f64 {
        self.header.total_amount
    }

    /// Sum of the stored line totals before order-level discount and tax.
    pub fn subtotal(&self) -> f64 {
        self.lines.iter().map(|l| l.line_total).sum()
    }

    /// Total recomputed from the current lines; equals `total_amount` for a freshly
    /// composed sale.
    pub fn recomputed_total(&self) -> f64 {
        order_total(self.subtotal(), self.header.discount_pct, self.header.tax_pct)
    }

    pub fn into_parts(self) -> (SaleHeader, Vec<SaleLineItem>) {
        (self.header, self.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn pct(v: f64) -> Percent {
        Percent::new(v).unwrap()
    }

    fn line(unit_price: f64, quantity: i64, discount: f64, tax: f64) -> NewSaleLine {
        NewSaleLine {
            item_id: ItemId::new(),
            quantity,
            unit_price,
            discount_pct: pct(discount),
            tax_rate: Some(pct(tax)),
        }
    }

    fn new_sale(lines: Vec<NewSaleLine>, discount: f64, tax: f64) -> NewSale {
        NewSale {
            customer_id: None,
            cashier_id: UserId::new(),
            location_id: LocationId::new(),
            payment_method: PaymentMethod::Cash,
            status: SaleStatus::Completed,
            discount_pct: pct(discount),
            tax_pct: pct(tax),
            notes: None,
            lines,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn order_level_tax_is_applied() {
        let sale = SaleTransaction::compose(
            SaleId::new(),
            new_sale(vec![line(10.0, 2, 0.0, 0.0)], 0.0, 10.0),
        )
        .unwrap();
        assert_eq!(sale.total_amount(), 22.0);
        assert_eq!(sale.lines()[0].line_total, 20.0);
    }

    #[test]
    fn line_discount_is_applied() {
        let sale = SaleTransaction::compose(
            SaleId::new(),
            new_sale(vec![line(100.0, 1, 10.0, 0.0)], 0.0, 0.0),
        )
        .unwrap();
        assert_eq!(sale.total_amount(), 90.0);
    }

    #[test]
    fn lines_are_numbered_and_owned_by_the_sale() {
        let id = SaleId::new();
        let sale = SaleTransaction::compose(
            id,
            new_sale(vec![line(1.0, 1, 0.0, 0.0), line(2.0, 3, 0.0, 0.0)], 0.0, 0.0),
        )
        .unwrap();
        assert_eq!(sale.lines().len(), 2);
        assert_eq!(sale.lines()[1].line_no, 2);
        assert!(sale.lines().iter().all(|l| l.sale_id == id));
        assert_eq!(sale.total_amount(), 7.0);
        assert_eq!(sale.recomputed_total(), sale.total_amount());
    }

    #[test]
    fn empty_sale_is_rejected() {
        let err = SaleTransaction::compose(SaleId::new(), new_sale(vec![], 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let err = SaleTransaction::compose(
            SaleId::new(),
            new_sale(vec![line(5.0, 0, 0.0, 0.0)], 0.0, 0.0),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("line 1")));
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = SaleTransaction::compose(
            SaleId::new(),
            new_sale(vec![line(-5.0, 1, 0.0, 0.0)], 0.0, 0.0),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_never_touches_totals() {
        let sale = SaleTransaction::compose(
            SaleId::new(),
            new_sale(vec![line(10.0, 2, 0.0, 0.0)], 0.0, 10.0),
        )
        .unwrap();
        let customer = CustomerId::new();
        let updated = sale.header().apply_update(&SaleUpdate {
            customer_id: Some(Some(customer)),
            payment_method: Some(PaymentMethod::Card),
            notes: Some(Some("gift wrap".to_string())),
            occurred_at: test_time(),
        });

        assert_eq!(updated.customer_id, Some(customer));
        assert_eq!(updated.payment_method, PaymentMethod::Card);
        assert_eq!(updated.notes.as_deref(), Some("gift wrap"));
        assert_eq!(updated.total_amount, sale.total_amount());
        assert_eq!(updated.created_at, sale.header().created_at);
        assert_eq!(sale.header().version(), 1);
        assert_eq!(updated.version(), 2);
    }

    #[test]
    fn status_transitions_follow_lifecycle() {
        let mut new = new_sale(vec![line(1.0, 1, 0.0, 0.0)], 0.0, 0.0);
        new.status = SaleStatus::Pending;
        let sale = SaleTransaction::compose(SaleId::new(), new).unwrap();

        let completed = sale.header().transition(SaleStatus::Completed, test_time()).unwrap();
        let refunded = completed.transition(SaleStatus::Refunded, test_time()).unwrap();
        assert_eq!(refunded.status, SaleStatus::Refunded);
        assert_eq!(refunded.version, 3);

        let err = refunded.transition(SaleStatus::Pending, test_time()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(sale.header().transition(SaleStatus::Refunded, test_time()).is_err());
    }

    #[test]
    fn enums_parse_from_wire_names() {
        assert_eq!("bank_transfer".parse::<PaymentMethod>().unwrap(), PaymentMethod::BankTransfer);
        assert_eq!("Refunded".parse::<SaleStatus>().unwrap(), SaleStatus::Refunded);
        assert!("barter".parse::<PaymentMethod>().is_err());
        let json = serde_json::to_value(PaymentMethod::MobileMoney).unwrap();
        assert_eq!(json, serde_json::Value::String("mobile_money".to_string()));
    }
}
