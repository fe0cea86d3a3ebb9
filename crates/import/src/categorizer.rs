use outlay_core::Transaction;

use crate::rules::{DefaultRule, Rule, RuleChain, RuleConfig, RuleError, RulesFile, UserDefinedRule};

/// Assigns categories by walking a [`RuleChain`] built as
/// user rules, then built-in rules, then the `Uncategorized` fallback.
#[derive(Debug, Clone, Default)]
pub struct CategorizationEngine {
    chain: RuleChain,
}

impl CategorizationEngine {
    /// `builtin` is ignored when `use_builtin` is false. Empty rule sets add no link.
    pub fn new(
        user_rules: &[RuleConfig],
        builtin_rules: &[RuleConfig],
        use_builtin: bool,
    ) -> Result<Self, RuleError> {
        let mut links = Vec::new();
        if !user_rules.is_empty() {
            links.push(Rule::UserDefined(UserDefinedRule::new(user_rules)?));
        }
        if use_builtin && !builtin_rules.is_empty() {
            links.push(Rule::UserDefined(UserDefinedRule::new(builtin_rules)?));
        }
        tracing::debug!(
            user = user_rules.len(),
            builtin = if use_builtin { builtin_rules.len() } else { 0 },
            "categorization chain built"
        );
        Ok(CategorizationEngine {
            chain: RuleChain::new(links, DefaultRule::default()),
        })
    }

    /// User rules layered over the packaged `defaults/rules.toml`.
    pub fn with_packaged_rules(user_rules: &[RuleConfig], use_builtin: bool) -> Result<Self, RuleError> {
        let builtin = if use_builtin {
            RulesFile::packaged()?.rules
        } else {
            Vec::new()
        };
        Self::new(user_rules, &builtin, use_builtin)
    }

    pub fn from_chain(chain: RuleChain) -> Self {
        CategorizationEngine { chain }
    }

    pub fn categorize(&self, txn: &Transaction) -> String {
        self.chain.categorize(txn).to_string()
    }

    /// Output order matches input. Without `overwrite`, transactions that already
    /// carry a real category are passed through untouched.
    pub fn categorize_many(&self, transactions: Vec<Transaction>, overwrite: bool) -> Vec<Transaction> {
        transactions
            .into_iter()
            .map(|txn| {
                if !overwrite && txn.is_categorized() {
                    txn
                } else {
                    let category = self.categorize(&txn);
                    txn.with_category(category)
                }
            })
            .collect()
    }

    /// The chain in priority order, one numbered line per link.
    pub fn describe(&self) -> Vec<String> {
        self.chain
            .links()
            .iter()
            .map(ToString::to_string)
            .chain(std::iter::once(self.chain.terminal().to_string()))
            .enumerate()
            .map(|(i, rule)| format!("{}. {rule}", i + 1))
            .collect()
    }
}
