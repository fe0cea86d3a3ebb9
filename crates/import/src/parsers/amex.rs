//! American Express spreadsheet exports (`.xlsx` / `.xls`).
//!
//! The sheet opens with account and summary rows; the transaction table starts at
//! the first row naming Date, Description and Amount. Credits and refunds use a
//! shifted layout: Description is blank, the amount sits under Cardmember and the
//! merchant text sits under Merchant Address.

use std::collections::HashMap;
use std::path::Path;

use calamine::{Data, Reader};
use chrono::NaiveDate;
use outlay_core::{Money, Transaction, TransactionType};
use serde_json::{Map, Value};

use super::{check_file, ParseError, StatementParser};

pub const ACCOUNT: &str = "amex";

const EXTENSIONS: &[&str] = &[".xlsx", ".xls"];
const HEADER_SCAN_ROWS: usize = 20;

const DATE_COL: &str = "Date";
const DESCRIPTION_COL: &str = "Description";
const AMOUNT_COL: &str = "Amount";
const CARDMEMBER_COL: &str = "Cardmember";
const MERCHANT_ADDRESS_COL: &str = "Merchant Address";
const ADDITIONAL_INFO_COL: &str = "Additional Information";

const PAYMENT_NOTICE: &str = "PAYMENT RECEIVED - THANK YOU";

/// A worksheet row as trimmed text; blank cells are `None`.
pub type SheetRow = Vec<Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowShape {
    /// Description, Cardmember and Amount in their named columns. Debit.
    Standard,
    /// Description under Merchant Address, amount under Cardmember. Credit.
    Shifted,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AmexExcelParser;

impl AmexExcelParser {
    pub fn new() -> Self {
        AmexExcelParser
    }

    /// Locate the header, then turn every qualifying row into a transaction.
    pub fn parse_rows(&self, rows: &[SheetRow]) -> Result<Vec<Transaction>, ParseError> {
        let header_idx = find_header_row(rows).ok_or_else(|| {
            ParseError::FormatInvalid("Could not find a header row in the file".to_string())
        })?;
        let header = Header::from_row(&rows[header_idx])?;

        let mut transactions = Vec::new();
        for (offset, cells) in rows[header_idx + 1..].iter().enumerate() {
            let row = Row { header: &header, cells };
            match parse_row(&row) {
                Ok(Some(txn)) => transactions.push(txn),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        row = header_idx + offset + 2,
                        error = %e,
                        "skipping unreadable amex row"
                    );
                }
            }
        }

        Ok(transactions)
    }
}

impl StatementParser for AmexExcelParser {
    fn account(&self) -> &str {
        ACCOUNT
    }

    fn validate(&self, path: &Path) -> Result<(), ParseError> {
        check_file(path, EXTENSIONS)?;
        let rows = read_rows(path)?;
        let header_idx = find_header_row(&rows).ok_or_else(|| {
            ParseError::FormatInvalid("Could not find a header row in the file".to_string())
        })?;
        Header::from_row(&rows[header_idx]).map(|_| ())
    }

    fn parse(&self, path: &Path) -> Result<Vec<Transaction>, ParseError> {
        check_file(path, EXTENSIONS)?;
        let rows = read_rows(path)?;
        let transactions = self.parse_rows(&rows)?;
        tracing::info!(
            file = %path.display(),
            count = transactions.len(),
            "parsed amex statement"
        );
        Ok(transactions)
    }
}

/// Column name to index for the transaction table.
struct Header {
    names: Vec<Option<String>>,
    columns: HashMap<String, usize>,
}

impl Header {
    fn from_row(row: &SheetRow) -> Result<Self, ParseError> {
        let columns: HashMap<String, usize> = row
            .iter()
            .enumerate()
            .filter_map(|(idx, cell)| cell.as_ref().map(|name| (name.trim().to_string(), idx)))
            .collect();

        let missing: Vec<&str> = [DATE_COL, DESCRIPTION_COL, AMOUNT_COL]
            .into_iter()
            .filter(|col| !columns.contains_key(*col))
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::FormatInvalid(format!(
                "Header is missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Header {
            names: row.clone(),
            columns,
        })
    }
}

struct Row<'a> {
    header: &'a Header,
    cells: &'a [Option<String>],
}

impl Row<'_> {
    fn get(&self, column: &str) -> Option<&str> {
        let idx = *self.header.columns.get(column)?;
        self.cells
            .get(idx)
            .and_then(|c| c.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn raw_data(&self) -> Value {
        let mut map = Map::new();
        for (idx, cell) in self.cells.iter().enumerate() {
            let Some(value) = cell else { continue };
            let key = self
                .header
                .names
                .get(idx)
                .and_then(|n| n.clone())
                .unwrap_or_else(|| format!("column_{idx}"));
            map.insert(key, Value::String(value.clone()));
        }
        Value::Object(map)
    }
}

fn parse_row(row: &Row<'_>) -> Result<Option<Transaction>, ParseError> {
    let Some(date_text) = row.get(DATE_COL) else {
        return Ok(None);
    };

    // Card payments would double count against the spending they settle.
    if row.get(MERCHANT_ADDRESS_COL) == Some(PAYMENT_NOTICE) {
        return Ok(None);
    }

    let (description, amount_text, transaction_type) = match classify(row) {
        RowShape::Shifted => {
            let Some(amount) = row.get(CARDMEMBER_COL).or_else(|| row.get(AMOUNT_COL)) else {
                return Ok(None);
            };
            let description = row
                .get(MERCHANT_ADDRESS_COL)
                .or_else(|| row.get(ADDITIONAL_INFO_COL))
                .unwrap_or("CREDIT");
            (description, amount, TransactionType::Credit)
        }
        RowShape::Standard => {
            let Some(amount) = row.get(AMOUNT_COL) else {
                return Ok(None);
            };
            let Some(description) = row.get(DESCRIPTION_COL) else {
                return Ok(None);
            };
            (description, amount, TransactionType::Debit)
        }
    };

    let date = parse_statement_date(date_text)
        .ok_or_else(|| ParseError::FormatInvalid(format!("Unrecognised date '{date_text}'")))?;
    let amount = Money::parse(amount_text)
        .map_err(|e| ParseError::FormatInvalid(e.to_string()))?
        .abs();

    Ok(Some(
        Transaction::new(date, description, amount, transaction_type, ACCOUNT)
            .with_raw_data(row.raw_data()),
    ))
}

/// Signal priority: an empty Description with an amount under Cardmember wins,
/// then any text under Merchant Address.
fn classify(row: &Row<'_>) -> RowShape {
    if row.get(DESCRIPTION_COL).is_none()
        && row.get(CARDMEMBER_COL).is_some_and(|v| Money::parse(v).is_ok())
    {
        return RowShape::Shifted;
    }
    if row.get(MERCHANT_ADDRESS_COL).is_some() {
        return RowShape::Shifted;
    }
    RowShape::Standard
}

fn find_header_row(rows: &[SheetRow]) -> Option<usize> {
    rows.iter().take(HEADER_SCAN_ROWS).position(|row| {
        let joined = row
            .iter()
            .flatten()
            .map(|c| c.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        joined.contains("date") && joined.contains("description") && joined.contains("amount")
    })
}

fn parse_statement_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // Workbook date cells arrive as ISO text; `2025-12-12T00:00:00` also lands here.
    if let Some(iso) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
            return Some(d);
        }
    }

    let cleaned = s.replace('.', "").replace("Sept", "Sep");
    ["%d %b %Y", "%d %B %Y", "%b %d %Y", "%b %d, %Y", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

fn read_rows(path: &Path) -> Result<Vec<SheetRow>, ParseError> {
    let mut workbook =
        calamine::open_workbook_auto(path).map_err(|e| ParseError::Workbook(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ParseError::FormatInvalid("Workbook has no worksheets".to_string()))?
        .map_err(|e| ParseError::Workbook(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())?.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // Excel's day zero is 1899-12-30 once the 1900 leap-year bug is accounted for.
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial.trunc() as i64))
}
