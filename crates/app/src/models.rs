use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use outlay_core::{DateRange, Money, Transaction, TransactionType};

/// Outcome of one `import_statement` call. Counts are derived from the lists.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub filepath: PathBuf,
    pub financial_institution: String,
    pub dry_run: bool,
    pub imported: Vec<Transaction>,
    pub skipped: Vec<Transaction>,
}

impl ImportResult {
    pub fn new(
        filepath: &Path,
        financial_institution: &str,
        dry_run: bool,
        imported: Vec<Transaction>,
        skipped: Vec<Transaction>,
    ) -> Self {
        ImportResult {
            filepath: filepath.to_path_buf(),
            financial_institution: financial_institution.to_string(),
            dry_run,
            imported,
            skipped,
        }
    }

    pub fn total_parsed(&self) -> usize {
        self.imported.len() + self.skipped.len()
    }

    pub fn new_transactions(&self) -> usize {
        self.imported.len()
    }

    pub fn duplicates_skipped(&self) -> usize {
        self.skipped.len()
    }

    /// At least one transaction was (or, for a dry run, would be) imported.
    pub fn success(&self) -> bool {
        !self.imported.is_empty()
    }
}

impl fmt::Display for ImportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heading = if self.dry_run { "Dry run" } else { "Import summary" };
        writeln!(f, "{heading} for {}:", self.financial_institution)?;
        writeln!(f, "  File: {}", self.filepath.display())?;
        writeln!(f, "  Parsed: {}", self.total_parsed())?;
        writeln!(f, "  New transactions: {}", self.new_transactions())?;
        write!(f, "  Duplicates skipped: {}", self.duplicates_skipped())
    }
}

/// Debits and credits dated inside one calendar month.
#[derive(Debug, Clone)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub period: DateRange,
    pub debits: Vec<Transaction>,
    pub credits: Vec<Transaction>,
}

impl MonthlySummary {
    /// Splits `transactions` by direction. `None` when `month` is not 1..=12.
    /// Transactions outside the month are dropped.
    pub fn new(year: i32, month: u32, transactions: Vec<Transaction>) -> Option<Self> {
        let period = DateRange::month(year, month)?;
        let (debits, credits): (Vec<_>, Vec<_>) = transactions
            .into_iter()
            .filter(|t| period.contains(t.date))
            .partition(|t| t.transaction_type == TransactionType::Debit);
        Some(MonthlySummary {
            year,
            month,
            period,
            debits,
            credits,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.period.start
    }

    pub fn end_date(&self) -> NaiveDate {
        self.period.end
    }

    pub fn total_debits(&self) -> Money {
        self.debits.iter().map(|t| t.amount).sum()
    }

    pub fn total_credits(&self) -> Money {
        self.credits.iter().map(|t| t.amount).sum()
    }

    /// Credits minus debits.
    pub fn net_flow(&self) -> Money {
        self.total_credits() - self.total_debits()
    }

    pub fn total_transactions(&self) -> usize {
        self.debits.len() + self.credits.len()
    }

    pub fn debits_by_category(&self) -> BTreeMap<String, Money> {
        totals_by_category(&self.debits)
    }

    pub fn credits_by_category(&self) -> BTreeMap<String, Money> {
        totals_by_category(&self.credits)
    }

    /// Debit totals per category, largest first; ties sort by name.
    pub fn top_spending_categories(&self) -> Vec<(String, Money)> {
        let mut ranked: Vec<_> = self.debits_by_category().into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

fn totals_by_category(transactions: &[Transaction]) -> BTreeMap<String, Money> {
    let mut totals: BTreeMap<String, Money> = BTreeMap::new();
    for txn in transactions {
        let entry = totals.entry(txn.category_or_default().to_string()).or_default();
        *entry = *entry + txn.amount;
    }
    totals
}

impl fmt::Display for MonthlySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Monthly Summary - {}", self.start_date().format("%B %Y"))?;
        writeln!(f)?;
        writeln!(f, "Transactions: {}", self.total_transactions())?;
        writeln!(
            f,
            "  Debits:  {} ({} transactions)",
            self.total_debits(),
            self.debits.len()
        )?;
        writeln!(
            f,
            "  Credits: {} ({} transactions)",
            self.total_credits(),
            self.credits.len()
        )?;
        write!(f, "  Net:     {}", self.net_flow())?;

        let top = self.top_spending_categories();
        if !top.is_empty() {
            writeln!(f)?;
            writeln!(f)?;
            write!(f, "Top Spending Categories:")?;
            for (category, amount) in top.iter().take(5) {
                write!(f, "\n  - {category}: {amount}")?;
            }
        }
        Ok(())
    }
}
