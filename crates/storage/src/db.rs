use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use outlay_core::{Money, Transaction, TransactionId, TransactionKey, TransactionType};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::repository::{StorageError, TransactionFilter, TransactionRepository};

const SELECT_COLUMNS: &str =
    "SELECT id, date, description, amount, transaction_type, account, category, raw_data FROM transactions";

/// SQLite-backed repository. The identity tuple carries a unique index, so
/// duplicate detection holds even across processes sharing the file.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        run_migrations(&conn)?;
        Ok(SqliteRepository { conn })
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount TEXT NOT NULL,
            transaction_type TEXT NOT NULL,
            account TEXT NOT NULL,
            category TEXT,
            raw_data TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_identity
            ON transactions (date, description, amount, transaction_type, account);

        CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions (date);
        CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions (category);
        "#,
    )?;
    Ok(())
}

/// `45.670` and `45.67` must hit the same unique index entry.
fn amount_text(amount: Money) -> String {
    amount.as_decimal().normalize().to_string()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

struct RawRow {
    id: i64,
    date: String,
    description: String,
    amount: String,
    transaction_type: String,
    account: String,
    category: Option<String>,
    raw_data: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawRow {
            id: row.get(0)?,
            date: row.get(1)?,
            description: row.get(2)?,
            amount: row.get(3)?,
            transaction_type: row.get(4)?,
            account: row.get(5)?,
            category: row.get(6)?,
            raw_data: row.get(7)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction, StorageError> {
        let id = self.id;
        let corrupt = |reason: String| StorageError::CorruptRow { id, reason };

        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| corrupt(format!("date '{}': {e}", self.date)))?;
        let amount = Decimal::from_str(&self.amount)
            .map_err(|e| corrupt(format!("amount '{}': {e}", self.amount)))?;
        let transaction_type = TransactionType::from_str(&self.transaction_type).map_err(corrupt)?;
        let raw_data = self
            .raw_data
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .map_err(|e| corrupt(format!("raw_data: {e}")))?;

        Ok(Transaction {
            id: Some(TransactionId(id)),
            date,
            description: self.description,
            amount: Money::new(amount),
            transaction_type,
            account: self.account,
            category: self.category,
            raw_data,
        })
    }
}

impl TransactionRepository for SqliteRepository {
    fn save(&mut self, txn: &Transaction) -> Result<Transaction, StorageError> {
        let raw = txn.raw_data.as_ref().map(|v| v.to_string());
        let result = self.conn.execute(
            "INSERT INTO transactions (date, description, amount, transaction_type, account, category, raw_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                txn.date.to_string(),
                txn.description,
                amount_text(txn.amount),
                txn.transaction_type.as_str(),
                txn.account,
                txn.category,
                raw,
            ],
        );

        match result {
            Ok(_) => Ok(txn.clone().with_id(TransactionId(self.conn.last_insert_rowid()))),
            Err(e) if is_constraint_violation(&e) => Err(StorageError::Duplicate(txn.key())),
            Err(e) => Err(e.into()),
        }
    }

    fn save_many(&mut self, txns: &[Transaction]) -> Result<Vec<Transaction>, StorageError> {
        let tx = self.conn.transaction()?;
        let mut saved = Vec::new();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO transactions (date, description, amount, transaction_type, account, category, raw_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for txn in txns {
                let raw = txn.raw_data.as_ref().map(|v| v.to_string());
                let inserted = stmt.execute(params![
                    txn.date.to_string(),
                    txn.description,
                    amount_text(txn.amount),
                    txn.transaction_type.as_str(),
                    txn.account,
                    txn.category,
                    raw,
                ])?;
                if inserted == 1 {
                    saved.push(txn.clone().with_id(TransactionId(tx.last_insert_rowid())));
                } else {
                    tracing::debug!(description = %txn.description, date = %txn.date, "duplicate skipped");
                }
            }
        }
        tx.commit()?;
        Ok(saved)
    }

    fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, StorageError> {
        let raw = self
            .conn
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id.0], RawRow::from_row)
            .optional()?;
        raw.map(RawRow::into_transaction).transpose()
    }

    fn get_all(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StorageError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(start) = filter.start_date {
            clauses.push("date >= ?");
            values.push(start.to_string());
        }
        if let Some(end) = filter.end_date {
            clauses.push("date <= ?");
            values.push(end.to_string());
        }
        if let Some(kind) = filter.transaction_type {
            clauses.push("transaction_type = ?");
            values.push(kind.as_str().to_string());
        }
        if let Some(category) = &filter.category {
            clauses.push("COALESCE(category, 'Uncategorized') = ?");
            values.push(category.clone());
        }
        if let Some(account) = &filter.account {
            clauses.push("account = ?");
            values.push(account.clone());
        }

        let mut sql = SELECT_COLUMNS.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY date, id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), RawRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_transaction).collect()
    }

    fn update(&mut self, txn: &Transaction) -> Result<Transaction, StorageError> {
        let id = txn.id.ok_or(StorageError::MissingId)?;
        let raw = txn.raw_data.as_ref().map(|v| v.to_string());
        let result = self.conn.execute(
            "UPDATE transactions
             SET date = ?1, description = ?2, amount = ?3, transaction_type = ?4,
                 account = ?5, category = ?6, raw_data = ?7
             WHERE id = ?8",
            params![
                txn.date.to_string(),
                txn.description,
                amount_text(txn.amount),
                txn.transaction_type.as_str(),
                txn.account,
                txn.category,
                raw,
                id.0,
            ],
        );

        match result {
            Ok(0) => Err(StorageError::NotFound(id)),
            Ok(_) => Ok(txn.clone()),
            Err(e) if is_constraint_violation(&e) => Err(StorageError::Duplicate(txn.key())),
            Err(e) => Err(e.into()),
        }
    }

    fn update_many(&mut self, txns: &[Transaction]) -> Result<Vec<Transaction>, StorageError> {
        // Take the connection's transaction so a failure leaves every row untouched.
        self.conn.execute_batch("BEGIN")?;
        let mut updated = Vec::with_capacity(txns.len());
        for txn in txns {
            match self.update(txn) {
                Ok(t) => updated.push(t),
                Err(e) => {
                    self.conn.execute_batch("ROLLBACK")?;
                    return Err(e);
                }
            }
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(updated)
    }

    fn delete(&mut self, id: TransactionId) -> Result<bool, StorageError> {
        let n = self.conn.execute("DELETE FROM transactions WHERE id = ?1", params![id.0])?;
        Ok(n > 0)
    }

    fn exists(
        &self,
        date: NaiveDate,
        description: &str,
        amount: Money,
        account: &str,
    ) -> Result<bool, StorageError> {
        let found: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM transactions
             WHERE date = ?1 AND description = ?2 AND amount = ?3 AND account = ?4)",
            params![date.to_string(), description, amount_text(amount), account],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn contains(&self, key: &TransactionKey) -> Result<bool, StorageError> {
        let found: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM transactions
             WHERE date = ?1 AND description = ?2 AND amount = ?3 AND transaction_type = ?4 AND account = ?5)",
            params![
                key.date.to_string(),
                key.description,
                amount_text(key.amount),
                key.transaction_type.as_str(),
                key.account,
            ],
            |row| row.get(0),
        )?;
        Ok(found)
    }
}
