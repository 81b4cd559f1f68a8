//! Shop records shared by the services and the HTTP layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// World Locks per Diamond Lock.
pub const DL_RATE: i64 = 100;

/// World Locks per Blue Gem Lock.
pub const BGL_RATE: i64 = 10_000;

// == Balance ==
/// Balance split into the three lock denominations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub wl: i64,
    #[serde(default)]
    pub dl: i64,
    #[serde(default)]
    pub bgl: i64,
}

impl Balance {
    pub fn new(wl: i64, dl: i64, bgl: i64) -> Self {
        Self { wl, dl, bgl }
    }

    /// Value of the whole balance in World Locks, `None` on overflow.
    pub fn total_wl(&self) -> Option<i64> {
        self.dl
            .checked_mul(DL_RATE)?
            .checked_add(self.bgl.checked_mul(BGL_RATE)?)?
            .checked_add(self.wl)
    }

    /// Splits `total` World Locks into the largest denominations first.
    pub fn from_wl(total: i64) -> Self {
        let bgl = total / BGL_RATE;
        let remaining = total % BGL_RATE;
        Self {
            wl: remaining % DL_RATE,
            dl: remaining / DL_RATE,
            bgl,
        }
    }

    /// True if any component is negative.
    pub fn has_negative(&self) -> bool {
        self.wl < 0 || self.dl < 0 || self.bgl < 0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [(self.bgl, "BGL"), (self.dl, "DL"), (self.wl, "WL")]
            .iter()
            .filter(|(amount, _)| *amount > 0)
            .map(|(amount, unit)| format!("{} {}", amount, unit))
            .collect();

        if parts.is_empty() {
            write!(f, "0 WL")
        } else {
            write!(f, "{}", parts.join(" + "))
        }
    }
}

// == Product ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    /// Unit price in World Locks
    pub price: i64,
    pub description: Option<String>,
}

// == Stock ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Available,
    Sold,
    Deleted,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Available => "available",
            StockStatus::Sold => "sold",
            StockStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for StockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(StockStatus::Available),
            "sold" => Ok(StockStatus::Sold),
            "deleted" => Ok(StockStatus::Deleted),
            other => Err(format!("unknown stock status '{}'", other)),
        }
    }
}

/// One sellable unit of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: i64,
    pub content: String,
    pub added_at: String,
}

// == Transactions ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Purchase,
    Refund,
    Deposit,
    Withdraw,
    Admin,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "PURCHASE",
            TransactionKind::Refund => "REFUND",
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdraw => "WITHDRAW",
            TransactionKind::Admin => "ADMIN",
        }
    }
}

/// A row of a user's transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub growid: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
    pub old_balance: Option<String>,
    pub new_balance: Option<String>,
    pub items_count: i64,
    pub total_price: i64,
    pub created_at: String,
}

/// Where buyers pick up their items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldInfo {
    pub world: String,
    pub owner: String,
    pub bot: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

// == Receipts ==
/// Balance of an account after a deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub growid: String,
    pub balance: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub growid: String,
    pub product_code: String,
    pub quantity: usize,
    pub total_paid: i64,
    pub contents: Vec<String>,
    pub new_balance: Balance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_wl() {
        assert_eq!(Balance::new(3, 2, 1).total_wl(), Some(10_203));
    }

    #[test]
    fn test_total_wl_overflow() {
        assert_eq!(Balance::new(0, 0, i64::MAX / 1000).total_wl(), None);
        assert_eq!(Balance::new(i64::MAX, 1, 0).total_wl(), None);
        assert_eq!(Balance::from_wl(i64::MAX).total_wl(), Some(i64::MAX));
    }

    #[test]
    fn test_from_wl_normalizes() {
        assert_eq!(Balance::from_wl(10_203), Balance::new(3, 2, 1));
        assert_eq!(Balance::from_wl(99), Balance::new(99, 0, 0));
        assert_eq!(Balance::from_wl(0), Balance::default());
    }

    #[test]
    fn test_display() {
        assert_eq!(Balance::new(3, 2, 1).to_string(), "1 BGL + 2 DL + 3 WL");
        assert_eq!(Balance::new(0, 5, 0).to_string(), "5 DL");
        assert_eq!(Balance::default().to_string(), "0 WL");
    }

    #[test]
    fn test_balance_deserialize_partial() {
        let balance: Balance = serde_json::from_str(r#"{"wl": 100}"#).unwrap();
        assert_eq!(balance, Balance::new(100, 0, 0));
    }

    #[test]
    fn test_stock_status_roundtrip() {
        for status in [StockStatus::Available, StockStatus::Sold, StockStatus::Deleted] {
            assert_eq!(status.as_str().parse::<StockStatus>(), Ok(status));
        }
        assert!("pending".parse::<StockStatus>().is_err());
    }

    #[test]
    fn test_transaction_kind_serializes_uppercase() {
        let json = serde_json::to_string(&TransactionKind::Withdraw).unwrap();
        assert_eq!(json, r#""WITHDRAW""#);
    }
}
