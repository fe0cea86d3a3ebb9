use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::money::Money;

/// Category assigned when no rule matches.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of money movement. Amounts are always stored as magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Money out.
    Debit,
    /// Money in.
    Credit,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Debit => "Debit",
            TransactionType::Credit => "Credit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debit" => Ok(TransactionType::Debit),
            "credit" => Ok(TransactionType::Credit),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

/// The fields that decide whether two transactions are the same import.
/// `id` and `category` are deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub transaction_type: TransactionType,
    pub account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<TransactionId>,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub transaction_type: TransactionType,
    pub account: String,
    pub category: Option<String>,
    pub raw_data: Option<serde_json::Value>,
}

impl Transaction {
    /// Builds an uncategorized, unsaved transaction. The description is trimmed
    /// and the amount is stored as its magnitude; direction lives in `transaction_type`.
    pub fn new(
        date: NaiveDate,
        description: &str,
        amount: Money,
        transaction_type: TransactionType,
        account: &str,
    ) -> Self {
        Transaction {
            id: None,
            date,
            description: description.trim().to_string(),
            amount: amount.abs(),
            transaction_type,
            account: account.to_string(),
            category: None,
            raw_data: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_raw_data(mut self, raw_data: serde_json::Value) -> Self {
        self.raw_data = Some(raw_data);
        self
    }

    pub fn with_id(mut self, id: TransactionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Positive for credits, negative for debits.
    pub fn signed_amount(&self) -> Money {
        match self.transaction_type {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.transaction_type == TransactionType::Debit
    }

    pub fn is_credit(&self) -> bool {
        self.transaction_type == TransactionType::Credit
    }

    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or(UNCATEGORIZED)
    }

    /// True when a category other than the fallback has been assigned.
    pub fn is_categorized(&self) -> bool {
        matches!(self.category.as_deref(), Some(c) if !c.is_empty() && c != UNCATEGORIZED)
    }

    pub fn key(&self) -> TransactionKey {
        TransactionKey {
            date: self.date,
            description: self.description.clone(),
            amount: self.amount,
            transaction_type: self.transaction_type,
            account: self.account.clone(),
        }
    }

    pub fn is_duplicate_of(&self, other: &Transaction) -> bool {
        self.date == other.date
            && self.description == other.description
            && self.amount == other.amount
            && self.transaction_type == other.transaction_type
            && self.account == other.account
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.description.chars().take(30).collect();
        write!(f, "{} {} {}", self.date, short, self.signed_amount())
    }
}
