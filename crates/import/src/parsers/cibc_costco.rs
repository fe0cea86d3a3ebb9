//! CIBC Costco World Mastercard PDF statements.
//!
//! Text is pulled out of the PDF one page at a time. Page one is the account summary and
//! is only read for the statement date. On later pages a small state machine
//! tracks whether we are inside "Your payments" or "Your new charges and credits"
//! and parses one transaction per line.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{Datelike, Month, NaiveDate};
use outlay_core::{Money, Transaction, TransactionType};
use regex::Regex;
use serde_json::json;

use super::{check_file, ParseError, StatementParser};

pub const ACCOUNT: &str = "cibc-costco-credit";

const EXTENSIONS: &[&str] = &[".pdf"];

const REQUIRED_IDENTIFIERS: &[&str] = &["CIBC Costco World Mastercard", "Your account at a glance"];

const PAYMENTS_MARKER: &str = "your payments";
const CHARGES_MARKER: &str = "your new charges and credits";

/// Spend categories CIBC prints between the merchant and the amount.
const SPEND_CATEGORIES: &[&str] = &[
    "Retail and Grocery",
    "Home and Office Improvement",
    "Restaurants",
    "Transportation",
    "Health and Education",
    "Personal and Household Expenses",
    "Foreign Currency Transactions",
    "Hotel, Entertainment and Recreation",
    "Professional and Financial Services",
];

const CREDIT_KEYWORDS: &[&str] = &["REFUND", "RETURN", "CREDIT", "REVERSAL"];

const BONUS_MARKER: char = 'Ý';

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_statement_date, r"(?i)Statement Date[^\d]*?([A-Za-z]+)\s+(\d{1,2}),?\s+(\d{4})");
re!(re_statement_range, r"([A-Za-z]+)\s+\d{1,2}\s+to\s+([A-Za-z]+)\s+\d{1,2},?\s+(\d{4})");
re!(re_card_number, r"Card number\s+(\d{4}\s+X+\s+X+\s+\d{4})");
re!(re_section_end, r"(?i)^Total (payments|for)");
re!(re_skip,
    r"(?i)^(Card number|Trans\s+Post|date\s+date|Ý\s*$|Page \d+|Identifies transactions|Total payments|Total for|Information about)");
re!(re_payment_line, r"^([A-Za-z]{3}\s+\d{1,2})\s+[A-Za-z]{3}\s+\d{1,2}\s+(.+?)\s+([\d,]+\.\d{2})$");
re!(re_charge_line, r"^([A-Za-z]{3}\s+\d{1,2})\s+[A-Za-z]{3}\s+\d{1,2}\s+(.+?)\s+(-?[\d,]+\.\d{2})$");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Payments,
    Charges,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Payments => f.write_str("payments"),
            Section::Charges => f.write_str("charges"),
        }
    }
}

/// Year and month the statement closes on; transaction lines carry neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementPeriod {
    pub year: i32,
    pub month: Option<u32>,
}

impl StatementPeriod {
    /// Reads "Statement Date December 20, 2025", falling back to the
    /// "November 21 to December 20, 2025" range, then to the current year.
    pub fn detect(first_page: &str) -> Self {
        if let Some(caps) = re_statement_date().captures(first_page) {
            if let Ok(year) = caps[3].parse() {
                return StatementPeriod {
                    year,
                    month: month_number(&caps[1]),
                };
            }
        }
        if let Some(caps) = re_statement_range().captures(first_page) {
            if let Ok(year) = caps[3].parse() {
                return StatementPeriod {
                    year,
                    month: month_number(&caps[2]),
                };
            }
        }
        StatementPeriod {
            year: chrono::Local::now().year(),
            month: None,
        }
    }

    /// Resolves "Dec 10" against the statement. A transaction month later than
    /// the closing month belongs to the previous year (a January statement
    /// listing December charges).
    fn resolve(&self, month_day: &str) -> Option<NaiveDate> {
        let date = NaiveDate::parse_from_str(&format!("{month_day} {}", self.year), "%b %d %Y").ok()?;
        match self.month {
            Some(closing) if date.month() > closing => {
                NaiveDate::from_ymd_opt(self.year - 1, date.month(), date.day())
            }
            _ => Some(date),
        }
    }
}

fn month_number(name: &str) -> Option<u32> {
    name.parse::<Month>().ok().map(|m| m.number_from_month())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CibcCostcoParser;

impl CibcCostcoParser {
    pub fn new() -> Self {
        CibcCostcoParser
    }

    /// Parses the text of each page. The first page carries the identifiers and
    /// the statement date; transactions are read from the pages after it.
    pub fn parse_pages<S: AsRef<str>>(&self, pages: &[S]) -> Result<Vec<Transaction>, ParseError> {
        let summary = first_page(pages);
        check_identifiers(summary)?;

        let period = StatementPeriod::detect(summary);
        tracing::debug!(year = period.year, month = ?period.month, pages = pages.len(), "statement period");

        let mut state = PageState::default();
        let mut transactions = Vec::new();
        for (idx, page) in pages.iter().enumerate().skip(1) {
            state.section = None;
            for (line_no, line) in page.as_ref().lines().enumerate() {
                if let Some(txn) = state.feed(line, &period) {
                    transactions.push(txn);
                } else if state.rejected {
                    tracing::debug!(page = idx + 1, line = line_no + 1, content = line, "unparsed line");
                }
            }
        }

        Ok(transactions)
    }
}

impl StatementParser for CibcCostcoParser {
    fn account(&self) -> &str {
        ACCOUNT
    }

    fn validate(&self, path: &Path) -> Result<(), ParseError> {
        check_file(path, EXTENSIONS)?;
        check_identifiers(first_page(&extract_pages(path)?))
    }

    fn parse(&self, path: &Path) -> Result<Vec<Transaction>, ParseError> {
        check_file(path, EXTENSIONS)?;
        let pages = extract_pages(path)?;
        let transactions = self.parse_pages(&pages)?;
        if transactions.is_empty() {
            tracing::warn!(file = %path.display(), "no transactions found in statement");
        } else {
            tracing::info!(
                file = %path.display(),
                count = transactions.len(),
                "parsed cibc costco statement"
            );
        }
        Ok(transactions)
    }
}

#[derive(Debug, Default)]
struct PageState {
    section: Option<Section>,
    card: Option<String>,
    /// Set when the last line was inside a section but matched no layout.
    rejected: bool,
}

impl PageState {
    fn feed(&mut self, line: &str, period: &StatementPeriod) -> Option<Transaction> {
        self.rejected = false;
        let line = line.trim();
        let lower = line.to_lowercase();

        if lower.contains(PAYMENTS_MARKER) {
            self.enter(Some(Section::Payments));
            return None;
        }
        if lower.contains(CHARGES_MARKER) {
            self.enter(Some(Section::Charges));
            return None;
        }
        if let Some(caps) = re_card_number().captures(line) {
            self.card = Some(caps[1].to_string());
            return None;
        }
        if re_section_end().is_match(line) {
            self.enter(None);
            return None;
        }

        let section = self.section?;
        if line.is_empty() || re_skip().is_match(line) {
            return None;
        }

        let parsed = match section {
            Section::Payments => parse_payment_line(line, period),
            Section::Charges => parse_charge_line(line, period),
        };
        let Some((date, description, amount, kind)) = parsed else {
            self.rejected = true;
            return None;
        };

        let raw = json!({
            "line": line,
            "section": section.to_string(),
            "card": self.card,
        });
        Some(Transaction::new(date, &description, amount, kind, ACCOUNT).with_raw_data(raw))
    }

    fn enter(&mut self, section: Option<Section>) {
        if self.section != section {
            tracing::debug!(from = ?self.section, to = ?section, "section change");
        }
        self.section = section;
    }
}

type ParsedLine = (NaiveDate, String, Money, TransactionType);

/// "Nov 27 Nov 28 PAYMENT THANK YOU/PAIEMENT MERCI 2,933.53"
fn parse_payment_line(line: &str, period: &StatementPeriod) -> Option<ParsedLine> {
    let caps = re_payment_line().captures(line)?;
    let date = period.resolve(&caps[1])?;
    let amount = Money::parse(&caps[3]).ok()?;
    Some((date, caps[2].trim().to_string(), amount, TransactionType::Credit))
}

/// "Ý Dec 07 Dec 08 DALDONGNAE 9 MISSISSAUGA ON Restaurants 102.15"
fn parse_charge_line(line: &str, period: &StatementPeriod) -> Option<ParsedLine> {
    let line = line.trim_start_matches(BONUS_MARKER).trim();
    let caps = re_charge_line().captures(line)?;

    let date = period.resolve(&caps[1])?;
    let description = strip_spend_category(caps[2].trim());
    let amount_text = &caps[3];
    let amount = Money::parse(amount_text).ok()?;

    let upper = description.to_uppercase();
    let kind = if amount_text.starts_with('-') || CREDIT_KEYWORDS.iter().any(|k| upper.contains(k)) {
        TransactionType::Credit
    } else {
        TransactionType::Debit
    };

    Some((date, description.to_string(), amount.abs(), kind))
}

fn strip_spend_category(text: &str) -> &str {
    SPEND_CATEGORIES
        .iter()
        .find_map(|cat| text.strip_suffix(cat))
        .map(str::trim_end)
        .unwrap_or(text)
}

fn check_identifiers(text: &str) -> Result<(), ParseError> {
    let missing: Vec<&str> = REQUIRED_IDENTIFIERS
        .iter()
        .copied()
        .filter(|id| !text.contains(id))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ParseError::FormatInvalid(format!(
            "Not a CIBC Costco statement - missing: {}",
            missing.join(", ")
        )))
    }
}

fn first_page<S: AsRef<str>>(pages: &[S]) -> &str {
    pages.first().map(AsRef::as_ref).unwrap_or_default()
}

fn extract_pages(path: &Path) -> Result<Vec<String>, ParseError> {
    pdf_extract::extract_text_by_pages(path).map_err(|e| ParseError::Pdf(e.to_string()))
}
