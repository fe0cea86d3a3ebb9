use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use outlay_core::{Transaction, TransactionKey};
use outlay_import::{
    CategorizationEngine, ParseError, ParserRegistry, RegistryBuilder, RegistryError, RuleError,
};
use outlay_storage::{SqliteRepository, StorageError, TransactionFilter, TransactionRepository};
use thiserror::Error;

use crate::config::{ConfigError, ConfigLoader};
use crate::models::{ImportResult, MonthlySummary};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid month {month} for year {year}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("Cannot tell which institution {} belongs to (candidates: {candidates}); pass --fi", path.display())]
    UnknownInstitution { path: PathBuf, candidates: String },
}

/// Import and reporting workflows over a parser registry, a categorization
/// engine and a repository.
pub struct TransactionService<R> {
    registry: ParserRegistry,
    engine: CategorizationEngine,
    repository: R,
}

impl TransactionService<SqliteRepository> {
    /// Wires everything from the loader's files and opens the configured database.
    pub fn from_config(loader: &ConfigLoader) -> Result<Self, ServiceError> {
        let settings = loader.load_settings()?;
        let registry = RegistryBuilder::from_config(&loader.load_parsers()?)?.freeze();

        let user_rules = loader.load_user_rules()?;
        let builtin_rules = if settings.use_builtin_rules {
            loader.load_builtin_rules()?.rules
        } else {
            Vec::new()
        };
        let engine = CategorizationEngine::new(&user_rules.rules, &builtin_rules, settings.use_builtin_rules)?;

        let db_path = loader.database_path(&settings);
        tracing::debug!(path = %db_path.display(), "opening database");
        let repository = SqliteRepository::open(&db_path)?;

        Ok(TransactionService::new(registry, engine, repository))
    }
}

impl<R: TransactionRepository> TransactionService<R> {
    pub fn new(registry: ParserRegistry, engine: CategorizationEngine, repository: R) -> Self {
        TransactionService {
            registry,
            engine,
            repository,
        }
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &CategorizationEngine {
        &self.engine
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// The single institution whose parser accepts this file's extension.
    pub fn detect_institution(&self, path: &Path) -> Result<String, ServiceError> {
        match self.registry.institutions_for(path).as_slice() {
            [only] => Ok(only.to_string()),
            candidates => Err(ServiceError::UnknownInstitution {
                path: path.to_path_buf(),
                candidates: if candidates.is_empty() {
                    "none".to_string()
                } else {
                    candidates.join(", ")
                },
            }),
        }
    }

    /// Parses `filepath` with the institution's parser, optionally categorizes,
    /// then saves new transactions. A dry run reports what would be saved and
    /// writes nothing.
    pub fn import_statement(
        &mut self,
        filepath: &Path,
        financial_institution: &str,
        dry_run: bool,
        categorize: bool,
    ) -> Result<ImportResult, ServiceError> {
        let parser = self.registry.create(financial_institution)?;
        let mut transactions = parser.parse(filepath)?;

        if categorize {
            transactions = self.engine.categorize_many(transactions, true);
        }

        let (imported, skipped) = if dry_run {
            self.preview(transactions)?
        } else {
            let saved = self.repository.save_many(&transactions)?;
            (saved.clone(), unsaved(transactions, &saved))
        };

        let result = ImportResult::new(filepath, financial_institution, dry_run, imported, skipped);
        tracing::info!(
            file = %filepath.display(),
            institution = financial_institution,
            parsed = result.total_parsed(),
            new = result.new_transactions(),
            duplicates = result.duplicates_skipped(),
            dry_run,
            "statement imported"
        );
        Ok(result)
    }

    fn preview(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<(Vec<Transaction>, Vec<Transaction>), ServiceError> {
        let mut seen: HashSet<TransactionKey> = HashSet::new();
        let mut fresh = Vec::new();
        let mut skipped = Vec::new();
        for txn in transactions {
            let key = txn.key();
            if self.repository.contains(&key)? || !seen.insert(key) {
                skipped.push(txn);
            } else {
                fresh.push(txn);
            }
        }
        Ok((fresh, skipped))
    }

    pub fn get_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, ServiceError> {
        Ok(self.repository.get_all(filter)?)
    }

    pub fn get_monthly_summary(&self, year: i32, month: u32) -> Result<MonthlySummary, ServiceError> {
        let invalid = || ServiceError::InvalidMonth { year, month };
        let period = outlay_core::DateRange::month(year, month).ok_or_else(invalid)?;
        let transactions = self
            .repository
            .get_all(&TransactionFilter::between(period.start, period.end))?;
        MonthlySummary::new(year, month, transactions).ok_or_else(invalid)
    }

    /// Recategorizes stored transactions in the date window and persists the
    /// changes. Without `overwrite`, only rows that were uncategorized and now
    /// match a rule are written. Returns the number of rows updated.
    pub fn categorize_transactions(
        &mut self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        overwrite: bool,
    ) -> Result<usize, ServiceError> {
        let filter = TransactionFilter {
            start_date,
            end_date,
            ..Default::default()
        };
        let stored = self.repository.get_all(&filter)?;
        if stored.is_empty() {
            return Ok(0);
        }

        let previously: HashSet<_> = stored
            .iter()
            .filter(|t| t.is_categorized())
            .filter_map(|t| t.id)
            .collect();
        let to_update: Vec<Transaction> = self
            .engine
            .categorize_many(stored, overwrite)
            .into_iter()
            .filter(|t| overwrite || (t.is_categorized() && t.id.map_or(false, |id| !previously.contains(&id))))
            .collect();

        let updated = self.repository.update_many(&to_update)?;
        tracing::info!(updated = updated.len(), overwrite, "transactions categorized");
        Ok(updated.len())
    }
}

/// Parsed transactions that did not come back from `save_many`. Each saved row
/// accounts for exactly one parsed row with the same key, so in-file repeats
/// land in the skipped list.
fn unsaved(parsed: Vec<Transaction>, saved: &[Transaction]) -> Vec<Transaction> {
    let mut pending: HashMap<TransactionKey, usize> = HashMap::new();
    for txn in saved {
        *pending.entry(txn.key()).or_default() += 1;
    }
    parsed
        .into_iter()
        .filter(|txn| match pending.get_mut(&txn.key()) {
            Some(n) if *n > 0 => {
                *n -= 1;
                false
            }
            _ => true,
        })
        .collect()
}
