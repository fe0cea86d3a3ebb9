use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use outlay::{ConfigLoader, ServiceError, TransactionService};
use outlay_core::{Money, Transaction, TransactionType, UNCATEGORIZED};
use outlay_import::{
    CategorizationEngine, ParseError, ParserRegistry, RegistryBuilder, RuleConfig, RuleKind, StatementParser,
};
use outlay_storage::{MemoryRepository, TransactionFilter, TransactionRepository};

/// Reads `date|description|amount|type` lines.
struct PipeParser;

impl StatementParser for PipeParser {
    fn account(&self) -> &str {
        "pipe-card"
    }

    fn validate(&self, path: &Path) -> Result<(), ParseError> {
        if !path.exists() {
            return Err(ParseError::NotFound(path.to_path_buf()));
        }
        Ok(())
    }

    fn parse(&self, path: &Path) -> Result<Vec<Transaction>, ParseError> {
        self.validate(path)?;
        let text = fs::read_to_string(path)?;
        Ok(text
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split('|').collect();
                let [date, desc, amount, kind] = parts.as_slice() else {
                    return None;
                };
                Some(Transaction::new(
                    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?,
                    desc,
                    Money::parse(amount).ok()?,
                    kind.parse().ok()?,
                    "pipe-card",
                ))
            })
            .collect())
    }
}

fn pipe_parser() -> Box<dyn StatementParser> {
    Box::new(PipeParser)
}

fn registry() -> ParserRegistry {
    let mut builder = RegistryBuilder::new();
    builder
        .register_with_extensions("pipe", pipe_parser, vec![".txt".to_string()])
        .unwrap();
    builder.freeze()
}

fn rule(category: &str, patterns: &[&str], filter: Option<TransactionType>) -> RuleConfig {
    RuleConfig {
        category: category.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        kind: RuleKind::Keyword,
        transaction_type: filter,
    }
}

fn engine() -> CategorizationEngine {
    CategorizationEngine::new(
        &[
            rule("Groceries", &["loblaws"], None),
            rule("Shopping", &["amazon"], Some(TransactionType::Debit)),
            rule("Refunds", &["amazon"], Some(TransactionType::Credit)),
        ],
        &[],
        false,
    )
    .unwrap()
}

fn service() -> TransactionService<MemoryRepository> {
    TransactionService::new(registry(), engine(), MemoryRepository::new())
}

const STATEMENT: &str = "\
2025-01-15|LOBLAWS OTTAWA|45.67|Debit
2025-01-16|AMAZON.CA|24.55|Debit
2025-01-20|AMAZON.CA|24.55|Credit
2025-01-22|CORNER STORE|3.10|Debit
2025-02-01|LOBLAWS OTTAWA|12.00|Debit
";

fn statement_file(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("statement.txt");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn import_then_reimport_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = statement_file(dir.path(), STATEMENT);
    let mut svc = service();

    let first = svc.import_statement(&path, "pipe", false, false).unwrap();
    assert_eq!(first.total_parsed(), 5);
    assert_eq!(first.new_transactions(), 5);
    assert_eq!(first.duplicates_skipped(), 0);
    assert!(first.imported.iter().all(|t| t.id.is_some()));
    assert!(first.success());

    let second = svc.import_statement(&path, "pipe", false, false).unwrap();
    assert_eq!(second.total_parsed(), 5);
    assert_eq!(second.new_transactions(), 0);
    assert_eq!(second.duplicates_skipped(), 5);
    assert!(!second.success());
    assert_eq!(svc.repository().len(), 5);
}

#[test]
fn repeated_line_in_one_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let body = "2025-01-15|LOBLAWS|45.67|Debit\n2025-01-15|LOBLAWS|45.67|Debit\n";
    let path = statement_file(dir.path(), body);
    let mut svc = service();

    let result = svc.import_statement(&path, "pipe", false, false).unwrap();
    assert_eq!(result.new_transactions(), 1);
    assert_eq!(result.duplicates_skipped(), 1);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = statement_file(dir.path(), STATEMENT);
    let mut svc = service();

    let preview = svc.import_statement(&path, "pipe", true, true).unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.new_transactions(), 5);
    assert!(preview.imported.iter().all(|t| t.id.is_none()));
    assert!(svc.repository().is_empty());

    svc.import_statement(&path, "pipe", false, false).unwrap();
    let again = svc.import_statement(&path, "pipe", true, false).unwrap();
    assert_eq!(again.new_transactions(), 0);
    assert_eq!(again.duplicates_skipped(), 5);
}

#[test]
fn import_with_categorize_assigns_categories() {
    let dir = tempfile::tempdir().unwrap();
    let path = statement_file(dir.path(), STATEMENT);
    let mut svc = service();

    let result = svc.import_statement(&path, "pipe", false, true).unwrap();
    let categories: Vec<_> = result
        .imported
        .iter()
        .map(|t| t.category.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(
        categories,
        vec!["Groceries", "Shopping", "Refunds", UNCATEGORIZED, "Groceries"]
    );
}

#[test]
fn monthly_summary_covers_only_that_month() {
    let dir = tempfile::tempdir().unwrap();
    let path = statement_file(dir.path(), STATEMENT);
    let mut svc = service();
    svc.import_statement(&path, "pipe", false, true).unwrap();

    let summary = svc.get_monthly_summary(2025, 1).unwrap();
    assert_eq!(summary.total_transactions(), 4);
    assert_eq!(summary.debits.len(), 3);
    assert_eq!(summary.credits.len(), 1);
    assert_eq!(summary.total_debits(), Money::from_cents(7332));
    assert_eq!(summary.total_credits(), Money::from_cents(2455));
    assert_eq!(summary.net_flow(), Money::from_cents(-4877));
    assert_eq!(summary.top_spending_categories()[0].0, "Groceries");

    let feb = svc.get_monthly_summary(2025, 2).unwrap();
    assert_eq!(feb.total_transactions(), 1);

    assert!(matches!(
        svc.get_monthly_summary(2025, 13),
        Err(ServiceError::InvalidMonth { month: 13, .. })
    ));
}

#[test]
fn categorize_stored_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let path = statement_file(dir.path(), STATEMENT);
    let mut svc = service();
    svc.import_statement(&path, "pipe", false, false).unwrap();

    let jan_start = NaiveDate::from_ymd_opt(2025, 1, 1);
    let jan_end = NaiveDate::from_ymd_opt(2025, 1, 31);
    let count = svc.categorize_transactions(jan_start, jan_end, false).unwrap();
    // CORNER STORE matches nothing and February is outside the window.
    assert_eq!(count, 3);

    let groceries = svc
        .get_transactions(&TransactionFilter::default().with_category("Groceries"))
        .unwrap();
    assert_eq!(groceries.len(), 1);

    // Already categorized rows are not rewritten.
    assert_eq!(svc.categorize_transactions(None, None, false).unwrap(), 1);
    assert_eq!(svc.categorize_transactions(None, None, true).unwrap(), 5);
}

#[test]
fn manual_category_survives_recategorization() {
    let mut repo = MemoryRepository::new();
    let stored = repo
        .save(&Transaction::new(
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            "LOBLAWS",
            Money::from_cents(4567),
            TransactionType::Debit,
            "pipe-card",
        ))
        .unwrap();
    repo.update(&stored.with_category("Treats")).unwrap();

    let mut svc = TransactionService::new(registry(), engine(), repo);
    assert_eq!(svc.categorize_transactions(None, None, false).unwrap(), 0);
    let all = svc.get_transactions(&TransactionFilter::default()).unwrap();
    assert_eq!(all[0].category.as_deref(), Some("Treats"));
}

#[test]
fn unknown_institution_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    let path = statement_file(dir.path(), STATEMENT);
    let mut svc = service();

    let err = svc.import_statement(&path, "td", false, false).unwrap_err();
    assert_eq!(err.to_string(), "No parser registered for 'td'. Available parsers: pipe");
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut svc = service();
    let err = svc
        .import_statement(&dir.path().join("gone.txt"), "pipe", false, false)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Parse(ParseError::NotFound(_))));
}

#[test]
fn institution_inferred_from_extension() {
    let svc = service();
    assert_eq!(svc.detect_institution(Path::new("dec.txt")).unwrap(), "pipe");
    assert!(matches!(
        svc.detect_institution(Path::new("dec.ofx")),
        Err(ServiceError::UnknownInstitution { .. })
    ));
}

#[test]
fn service_from_config_dir_uses_packaged_parsers() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("categorization_rules.toml"),
        "[[rules]]\ncategory = \"Coffee\"\npatterns = [\"starbucks\"]\ntype = \"keyword\"\n",
    )
    .unwrap();

    let loader = ConfigLoader::with_dir(dir.path());
    let mut svc = TransactionService::from_config(&loader).unwrap();
    assert_eq!(svc.registry().available(), vec!["amex", "cibc-costco-credit"]);
    assert_eq!(svc.engine().describe()[0], "1. UserDefinedRule(1 rules)");
    assert!(dir.path().join("outlay.db").exists());

    let err = svc
        .import_statement(&dir.path().join("missing.xlsx"), "amex", false, false)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Parse(ParseError::NotFound(_))));
    assert!(svc.get_monthly_summary(2025, 1).unwrap().debits.is_empty());
}
