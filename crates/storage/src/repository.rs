use chrono::NaiveDate;
use outlay_core::{Money, Transaction, TransactionId, TransactionKey, TransactionType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Transaction already exists: {} {} {} {} ({})", .0.date, .0.description, .0.amount, .0.transaction_type, .0.account)]
    Duplicate(TransactionKey),
    #[error("Transaction {0} not found")]
    NotFound(TransactionId),
    #[error("Transaction has no id; save it before updating")]
    MissingId,
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

/// Optional constraints for [`TransactionRepository::get_all`]. Dates are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub transaction_type: Option<TransactionType>,
    pub category: Option<String>,
    pub account: Option<String>,
}

impl TransactionFilter {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        TransactionFilter {
            start_date: Some(start),
            end_date: Some(end),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn matches(&self, txn: &Transaction) -> bool {
        self.start_date.map_or(true, |d| txn.date >= d)
            && self.end_date.map_or(true, |d| txn.date <= d)
            && self.transaction_type.map_or(true, |t| txn.transaction_type == t)
            && self.category.as_deref().map_or(true, |c| txn.category_or_default() == c)
            && self.account.as_deref().map_or(true, |a| txn.account == a)
    }
}

/// Persistence contract for transactions.
///
/// Identity for duplicate detection is [`TransactionKey`]; `id` and `category`
/// never participate. Results of `get_all` are ordered by date, then id.
pub trait TransactionRepository {
    /// Stores a new transaction and returns it with its assigned id.
    fn save(&mut self, txn: &Transaction) -> Result<Transaction, StorageError>;

    /// Stores every non-duplicate and returns only what was newly saved.
    /// Duplicates, including repeats within `txns`, are skipped without error.
    fn save_many(&mut self, txns: &[Transaction]) -> Result<Vec<Transaction>, StorageError> {
        let mut saved = Vec::new();
        for txn in txns {
            match self.save(txn) {
                Ok(stored) => saved.push(stored),
                Err(StorageError::Duplicate(key)) => {
                    tracing::debug!(description = %key.description, date = %key.date, "duplicate skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(saved)
    }

    fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError>;

    fn get_all(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StorageError>;

    /// Replaces the stored row with the same id.
    fn update(&mut self, txn: &Transaction) -> Result<Transaction, StorageError>;

    fn update_many(&mut self, txns: &[Transaction]) -> Result<Vec<Transaction>, StorageError> {
        txns.iter().map(|txn| self.update(txn)).collect()
    }

    /// Returns whether a row was removed.
    fn delete(&mut self, id: TransactionId) -> Result<bool, StorageError>;

    /// Loose existence check that ignores transaction type.
    fn exists(
        &self,
        date: NaiveDate,
        description: &str,
        amount: Money,
        account: &str,
    ) -> Result<bool, StorageError>;

    /// Exact identity check on the full duplicate key.
    fn contains(&self, key: &TransactionKey) -> Result<bool, StorageError>;
}
