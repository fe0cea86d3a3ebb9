pub mod amex;
pub mod cibc_costco;

use std::path::{Path, PathBuf};

use outlay_core::Transaction;
use thiserror::Error;

pub use amex::AmexExcelParser;
pub use cibc_costco::CibcCostcoParser;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Invalid statement format: {0}")]
    FormatInvalid(String),
    #[error("Could not read workbook: {0}")]
    Workbook(String),
    #[error("Could not extract PDF text: {0}")]
    Pdf(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// One institution's statement layout.
///
/// `parse` validates first and fails fast on the same conditions as `validate`.
/// Rows that cannot be extracted are logged and dropped; they never abort the file.
pub trait StatementParser {
    /// Account identifier stamped on every transaction this parser produces.
    fn account(&self) -> &str;

    fn validate(&self, path: &Path) -> Result<(), ParseError>;

    fn parse(&self, path: &Path) -> Result<Vec<Transaction>, ParseError>;
}

/// Existence and extension checks shared by every parser.
pub(crate) fn check_file(path: &Path, extensions: &[&str]) -> Result<(), ParseError> {
    if !path.exists() {
        return Err(ParseError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    if !extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)) {
        let got = if ext.is_empty() { "no extension".to_string() } else { ext };
        return Err(ParseError::FormatInvalid(format!(
            "File must be {}, got {got}",
            extensions.join(" or ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_found() {
        let err = check_file(Path::new("does-not-exist.xlsx"), &[".xlsx"]).unwrap_err();
        assert!(matches!(err, ParseError::NotFound(_)));
    }

    #[test]
    fn wrong_extension_is_format_invalid() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "not a statement").unwrap();
        let err = check_file(file.path(), &[".xlsx", ".xls"]).unwrap_err();
        match err {
            ParseError::FormatInvalid(msg) => {
                assert_eq!(msg, "File must be .xlsx or .xls, got .txt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let file = tempfile::Builder::new().suffix(".PDF").tempfile().unwrap();
        assert!(check_file(file.path(), &[".pdf"]).is_ok());
    }
}
