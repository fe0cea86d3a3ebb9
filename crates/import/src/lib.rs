pub mod categorizer;
pub mod parsers;
pub mod registry;
pub mod rules;

pub use categorizer::CategorizationEngine;
pub use parsers::{AmexExcelParser, CibcCostcoParser, ParseError, StatementParser};
pub use registry::{ParserConfig, ParserFactory, ParserRegistry, ParsersFile, RegistryBuilder, RegistryError};
pub use rules::{
    DefaultRule, KeywordRule, PatternRule, Rule, RuleChain, RuleConfig, RuleError, RuleKind, RulesFile,
    UserDefinedRule,
};
