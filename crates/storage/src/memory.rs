use std::collections::BTreeMap;

use chrono::NaiveDate;
use outlay_core::{Money, Transaction, TransactionId, TransactionKey};

use crate::repository::{StorageError, TransactionFilter, TransactionRepository};

/// Process-local repository. Used by tests and `--dry-run` style callers that
/// should never touch the database file.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    rows: BTreeMap<i64, Transaction>,
    next_id: i64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TransactionRepository for MemoryRepository {
    fn save(&mut self, txn: &Transaction) -> Result<Transaction, StorageError> {
        let key = txn.key();
        if self.rows.values().any(|row| row.key() == key) {
            return Err(StorageError::Duplicate(key));
        }
        self.next_id += 1;
        let stored = txn.clone().with_id(TransactionId(self.next_id));
        self.rows.insert(self.next_id, stored.clone());
        Ok(stored)
    }

    fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError> {
        Ok(self.rows.get(&id.0).cloned())
    }

    fn get_all(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StorageError> {
        let mut out: Vec<Transaction> = self.rows.values().filter(|t| filter.matches(t)).cloned().collect();
        // BTreeMap already yields id order; a stable sort keeps it within a date.
        out.sort_by_key(|t| t.date);
        Ok(out)
    }

    fn update(&mut self, txn: &Transaction) -> Result<Transaction, StorageError> {
        let id = txn.id.ok_or(StorageError::MissingId)?;
        let slot = self.rows.get_mut(&id.0).ok_or(StorageError::NotFound(id))?;
        *slot = txn.clone();
        Ok(txn.clone())
    }

    fn delete(&mut self, id: TransactionId) -> Result<bool, StorageError> {
        Ok(self.rows.remove(&id.0).is_some())
    }

    fn exists(
        &self,
        date: NaiveDate,
        description: &str,
        amount: Money,
        account: &str,
    ) -> Result<bool, StorageError> {
        Ok(self.rows.values().any(|t| {
            t.date == date && t.description == description && t.amount == amount && t.account == account
        }))
    }

    fn contains(&self, key: &TransactionKey) -> Result<bool, StorageError> {
        Ok(self.rows.values().any(|t| &t.key() == key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outlay_core::TransactionType;

    fn txn(day: u32, desc: &str, cents: i64) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            desc,
            Money::from_cents(cents),
            TransactionType::Debit,
            "amex",
        )
    }

    #[test]
    fn save_assigns_sequential_ids() {
        let mut repo = MemoryRepository::new();
        let a = repo.save(&txn(1, "A", 100)).unwrap();
        let b = repo.save(&txn(2, "B", 200)).unwrap();
        assert_eq!(a.id, Some(TransactionId(1)));
        assert_eq!(b.id, Some(TransactionId(2)));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn save_rejects_duplicate_even_with_new_category() {
        let mut repo = MemoryRepository::new();
        repo.save(&txn(1, "A", 100)).unwrap();
        let err = repo.save(&txn(1, "A", 100).with_category("Gas")).unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));
    }

    #[test]
    fn save_many_skips_duplicates_within_batch() {
        let mut repo = MemoryRepository::new();
        repo.save(&txn(1, "A", 100)).unwrap();
        let saved = repo
            .save_many(&[txn(1, "A", 100), txn(2, "B", 200), txn(2, "B", 200)])
            .unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].description, "B");
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn get_all_orders_by_date() {
        let mut repo = MemoryRepository::new();
        repo.save(&txn(9, "LATE", 100)).unwrap();
        repo.save(&txn(3, "EARLY", 100)).unwrap();
        let all = repo.get_all(&TransactionFilter::default()).unwrap();
        assert_eq!(all[0].description, "EARLY");
        assert_eq!(all[1].description, "LATE");
    }

    #[test]
    fn update_requires_known_id() {
        let mut repo = MemoryRepository::new();
        assert!(matches!(repo.update(&txn(1, "A", 100)), Err(StorageError::MissingId)));
        let ghost = txn(1, "A", 100).with_id(TransactionId(42));
        assert!(matches!(repo.update(&ghost), Err(StorageError::NotFound(TransactionId(42)))));

        let saved = repo.save(&txn(1, "A", 100)).unwrap();
        repo.update(&saved.clone().with_category("Gas")).unwrap();
        let fetched = repo.get_by_id(saved.id.unwrap()).unwrap().unwrap();
        assert_eq!(fetched.category.as_deref(), Some("Gas"));
    }

    #[test]
    fn delete_reports_removal() {
        let mut repo = MemoryRepository::new();
        let saved = repo.save(&txn(1, "A", 100)).unwrap();
        assert!(repo.delete(saved.id.unwrap()).unwrap());
        assert!(!repo.delete(saved.id.unwrap()).unwrap());
        assert!(repo.is_empty());
    }

    #[test]
    fn exists_ignores_type_but_contains_does_not() {
        let mut repo = MemoryRepository::new();
        let saved = repo.save(&txn(1, "A", 100)).unwrap();
        let date = saved.date;
        assert!(repo.exists(date, "A", Money::from_cents(100), "amex").unwrap());
        assert!(!repo.exists(date, "A", Money::from_cents(101), "amex").unwrap());

        let mut credit = saved.clone();
        credit.transaction_type = TransactionType::Credit;
        assert!(repo.contains(&saved.key()).unwrap());
        assert!(!repo.contains(&credit.key()).unwrap());
    }
}
