use std::fmt;

use outlay_core::{Transaction, TransactionType, UNCATEGORIZED};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_RULES_TOML: &str = include_str!("../defaults/rules.toml");

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid pattern '{pattern}' for category '{category}': {reason}")]
    InvalidPattern {
        category: String,
        pattern: String,
        reason: String,
    },
    #[error("Failed to parse rules: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    #[default]
    Keyword,
    Regex,
}

/// One `[[rules]]` entry from a rules file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub category: String,
    pub patterns: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl RulesFile {
    pub fn from_toml(toml_content: &str) -> Result<Self, RuleError> {
        Ok(toml::from_str(toml_content)?)
    }

    pub fn packaged() -> Result<Self, RuleError> {
        Self::from_toml(DEFAULT_RULES_TOML)
    }
}

fn type_allows(filter: Option<TransactionType>, txn: &Transaction) -> bool {
    filter.map_or(true, |t| t == txn.transaction_type)
}

/// Case-insensitive substring match on the description.
/// Categories are tried in insertion order.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    keywords: Vec<(String, Vec<String>)>,
    transaction_type: Option<TransactionType>,
}

impl KeywordRule {
    pub fn new(
        keywords: impl IntoIterator<Item = (String, Vec<String>)>,
        transaction_type: Option<TransactionType>,
    ) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|(category, words)| (category, words.iter().map(|w| w.to_lowercase()).collect()))
            .collect();
        KeywordRule {
            keywords,
            transaction_type,
        }
    }

    pub fn matches(&self, txn: &Transaction) -> bool {
        self.category_for(txn).is_some()
    }

    pub fn category_for(&self, txn: &Transaction) -> Option<&str> {
        if !type_allows(self.transaction_type, txn) {
            return None;
        }
        let description = txn.description.to_lowercase();
        self.keywords
            .iter()
            .find(|(_, words)| words.iter().any(|w| description.contains(w.as_str())))
            .map(|(category, _)| category.as_str())
    }
}

impl fmt::Display for KeywordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeywordRule({} categories", self.keywords.len())?;
        if let Some(t) = self.transaction_type {
            write!(f, ", type={t}")?;
        }
        f.write_str(")")
    }
}

/// Case-insensitive regex search (not a full match) on the raw description.
#[derive(Debug, Clone)]
pub struct PatternRule {
    patterns: Vec<(String, Vec<Regex>)>,
    transaction_type: Option<TransactionType>,
}

impl PatternRule {
    /// Fails on the first pattern that does not compile.
    pub fn new(
        patterns: impl IntoIterator<Item = (String, Vec<String>)>,
        transaction_type: Option<TransactionType>,
    ) -> Result<Self, RuleError> {
        let mut compiled = Vec::new();
        for (category, sources) in patterns {
            let regexes = sources
                .iter()
                .map(|src| {
                    RegexBuilder::new(src)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| RuleError::InvalidPattern {
                            category: category.clone(),
                            pattern: src.clone(),
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            compiled.push((category, regexes));
        }
        Ok(PatternRule {
            patterns: compiled,
            transaction_type,
        })
    }

    pub fn matches(&self, txn: &Transaction) -> bool {
        self.category_for(txn).is_some()
    }

    pub fn category_for(&self, txn: &Transaction) -> Option<&str> {
        if !type_allows(self.transaction_type, txn) {
            return None;
        }
        self.patterns
            .iter()
            .find(|(_, regexes)| regexes.iter().any(|re| re.is_match(&txn.description)))
            .map(|(category, _)| category.as_str())
    }
}

impl fmt::Display for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegexRule({} categories", self.patterns.len())?;
        if let Some(t) = self.transaction_type {
            write!(f, ", type={t}")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone)]
enum SingleRule {
    Keyword(KeywordRule),
    Pattern(PatternRule),
}

impl SingleRule {
    fn category_for(&self, txn: &Transaction) -> Option<&str> {
        match self {
            SingleRule::Keyword(rule) => rule.category_for(txn),
            SingleRule::Pattern(rule) => rule.category_for(txn),
        }
    }
}

/// A rules file compiled into one single-category rule per entry, tried in
/// declaration order regardless of entry type.
#[derive(Debug, Clone, Default)]
pub struct UserDefinedRule {
    entries: Vec<SingleRule>,
}

impl UserDefinedRule {
    pub fn new(configs: &[RuleConfig]) -> Result<Self, RuleError> {
        let entries = configs
            .iter()
            .map(|cfg| {
                let mapping = [(cfg.category.clone(), cfg.patterns.clone())];
                Ok(match cfg.kind {
                    RuleKind::Keyword => SingleRule::Keyword(KeywordRule::new(mapping, cfg.transaction_type)),
                    RuleKind::Regex => SingleRule::Pattern(PatternRule::new(mapping, cfg.transaction_type)?),
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(UserDefinedRule { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matches(&self, txn: &Transaction) -> bool {
        self.category_for(txn).is_some()
    }

    pub fn category_for(&self, txn: &Transaction) -> Option<&str> {
        self.entries.iter().find_map(|rule| rule.category_for(txn))
    }
}

impl fmt::Display for UserDefinedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserDefinedRule({} rules)", self.entries.len())
    }
}

/// Terminal link; always answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRule {
    category: String,
}

impl DefaultRule {
    pub fn new(category: impl Into<String>) -> Self {
        DefaultRule {
            category: category.into(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

impl Default for DefaultRule {
    fn default() -> Self {
        DefaultRule::new(UNCATEGORIZED)
    }
}

impl fmt::Display for DefaultRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultRule('{}')", self.category)
    }
}

/// A non-terminal link in the chain.
#[derive(Debug, Clone)]
pub enum Rule {
    Keyword(KeywordRule),
    Pattern(PatternRule),
    UserDefined(UserDefinedRule),
}

impl Rule {
    pub fn matches(&self, txn: &Transaction) -> bool {
        self.category_for(txn).is_some()
    }

    pub fn category_for(&self, txn: &Transaction) -> Option<&str> {
        match self {
            Rule::Keyword(rule) => rule.category_for(txn),
            Rule::Pattern(rule) => rule.category_for(txn),
            Rule::UserDefined(rule) => rule.category_for(txn),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Keyword(rule) => rule.fmt(f),
            Rule::Pattern(rule) => rule.fmt(f),
            Rule::UserDefined(rule) => rule.fmt(f),
        }
    }
}

/// Ordered rules ending in a [`DefaultRule`], so evaluation always yields a category.
#[derive(Debug, Clone, Default)]
pub struct RuleChain {
    links: Vec<Rule>,
    terminal: DefaultRule,
}

impl RuleChain {
    pub fn new(links: Vec<Rule>, terminal: DefaultRule) -> Self {
        RuleChain { links, terminal }
    }

    pub fn categorize(&self, txn: &Transaction) -> &str {
        self.links
            .iter()
            .find_map(|rule| rule.category_for(txn))
            .unwrap_or(self.terminal.category())
    }

    pub fn links(&self) -> &[Rule] {
        &self.links
    }

    pub fn terminal(&self) -> &DefaultRule {
        &self.terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use outlay_core::Money;

    fn txn(desc: &str, kind: TransactionType) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            desc,
            Money::from_cents(4567),
            kind,
            "amex",
        )
    }

    fn debit(desc: &str) -> Transaction {
        txn(desc, TransactionType::Debit)
    }

    fn mapping(category: &str, words: &[&str]) -> (String, Vec<String>) {
        (category.to_string(), words.iter().map(|w| w.to_string()).collect())
    }

    #[test]
    fn keyword_match_case_insensitive() {
        let rule = KeywordRule::new([mapping("Groceries", &["Loblaws", "metro"])], None);
        assert_eq!(rule.category_for(&debit("LOBLAWS OTTAWA")), Some("Groceries"));
        assert!(rule.matches(&debit("metro #12")));
        assert!(!rule.matches(&debit("STARBUCKS")));
    }

    #[test]
    fn keyword_first_category_wins() {
        let rule = KeywordRule::new(
            [mapping("Coffee", &["starbucks"]), mapping("Food", &["starbucks", "subway"])],
            None,
        );
        assert_eq!(rule.category_for(&debit("STARBUCKS 123")), Some("Coffee"));
        assert_eq!(rule.category_for(&debit("SUBWAY")), Some("Food"));
    }

    #[test]
    fn type_filter_gates_match() {
        let shopping = KeywordRule::new([mapping("Shopping", &["amazon"])], Some(TransactionType::Debit));
        let refunds = KeywordRule::new([mapping("Refunds", &["amazon"])], Some(TransactionType::Credit));
        let purchase = debit("AMAZON.CA");
        let refund = txn("AMAZON.CA", TransactionType::Credit);

        assert_eq!(shopping.category_for(&purchase), Some("Shopping"));
        assert!(!shopping.matches(&refund));
        assert_eq!(refunds.category_for(&refund), Some("Refunds"));
        assert!(!refunds.matches(&purchase));
    }

    #[test]
    fn pattern_is_search_not_full_match() {
        let rule = PatternRule::new([mapping("Shopping", &["AMZN", r"amazon\.ca"])], None).unwrap();
        assert!(rule.matches(&debit("PURCHASE AMZN MKTP")));
        assert!(rule.matches(&debit("Amazon.ca order")));
        assert!(!rule.matches(&debit("AMAZONXCA")));
    }

    #[test]
    fn pattern_anchor_respected() {
        let rule = PatternRule::new([mapping("Shopping", &["^AMZN"])], None).unwrap();
        assert!(rule.matches(&debit("amzn mktp ca")));
        assert!(!rule.matches(&debit("REFUND AMZN")));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = PatternRule::new([mapping("Broken", &["(unclosed"])], None).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { ref category, .. } if category == "Broken"));
    }

    #[test]
    fn user_rules_keep_declaration_order_across_types() {
        let configs = vec![
            RuleConfig {
                category: "Online".to_string(),
                patterns: vec!["^AMZN".to_string()],
                kind: RuleKind::Regex,
                transaction_type: None,
            },
            RuleConfig {
                category: "Shopping".to_string(),
                patterns: vec!["amzn".to_string()],
                kind: RuleKind::Keyword,
                transaction_type: None,
            },
        ];
        let rule = UserDefinedRule::new(&configs).unwrap();
        assert_eq!(rule.len(), 2);
        assert_eq!(rule.category_for(&debit("AMZN MKTP")), Some("Online"));
        assert_eq!(rule.category_for(&debit("PAID AMZN")), Some("Shopping"));
        assert_eq!(rule.to_string(), "UserDefinedRule(2 rules)");
    }

    #[test]
    fn rules_file_parses_toml() {
        let file = RulesFile::from_toml(
            r#"
            [[rules]]
            category = "Groceries"
            patterns = ["loblaws"]
            type = "keyword"

            [[rules]]
            category = "Refunds"
            patterns = ["^AMZN.*REFUND"]
            type = "regex"
            transaction_type = "Credit"

            [[rules]]
            category = "Gas"
            patterns = ["esso"]
            "#,
        )
        .unwrap();
        assert_eq!(file.rules.len(), 3);
        assert_eq!(file.rules[1].kind, RuleKind::Regex);
        assert_eq!(file.rules[1].transaction_type, Some(TransactionType::Credit));
        assert_eq!(file.rules[2].kind, RuleKind::Keyword);
    }

    #[test]
    fn empty_rules_file_is_valid() {
        assert!(RulesFile::from_toml("").unwrap().rules.is_empty());
    }

    #[test]
    fn packaged_rules_compile() {
        let file = RulesFile::packaged().unwrap();
        let rule = UserDefinedRule::new(&file.rules).unwrap();
        assert!(!rule.is_empty());
        assert_eq!(rule.category_for(&debit("LOBLAWS OTTAWA")), Some("Groceries"));
    }

    #[test]
    fn chain_falls_through_to_default() {
        let chain = RuleChain::new(
            vec![Rule::Keyword(KeywordRule::new([mapping("Gas", &["esso"])], None))],
            DefaultRule::default(),
        );
        assert_eq!(chain.categorize(&debit("ESSO 123")), "Gas");
        assert_eq!(chain.categorize(&debit("MYSTERY SHOP")), UNCATEGORIZED);
        assert_eq!(RuleChain::default().categorize(&debit("ANYTHING")), UNCATEGORIZED);
    }

    #[test]
    fn display_forms() {
        let keyword = KeywordRule::new([mapping("A", &["a"]), mapping("B", &["b"])], Some(TransactionType::Debit));
        assert_eq!(keyword.to_string(), "KeywordRule(2 categories, type=Debit)");
        let pattern = PatternRule::new([mapping("A", &["a"])], None).unwrap();
        assert_eq!(pattern.to_string(), "RegexRule(1 categories)");
        assert_eq!(DefaultRule::default().to_string(), "DefaultRule('Uncategorized')");
    }
}
