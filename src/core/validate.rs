//! Declared-rule validation
//!
//! The gate in front of every remote mutation: a desired rule list with any
//! invalid rule aborts the whole run before a single write happens. A rule is
//! valid iff it carries both `action` and `type`; nothing else is checked
//! here, so provider-specific field combinations stay the remote side's
//! business.

use crate::core::error::{Error, Result};
use crate::core::rule::{Pos, Rule};

/// Returns `true` if the rule possesses the two required fields.
pub fn rule_is_valid(rule: &Rule) -> bool {
    rule.action.is_some() && rule.kind.is_some()
}

/// Validates a whole declared rule list.
///
/// # Errors
///
/// Returns [`Error::InvalidRuleSpec`] for the first invalid rule, naming its
/// position and the missing field. One bad rule fails the run, not just that
/// rule.
pub fn validate_rules(rules: &[Rule]) -> Result<()> {
    for (index, rule) in rules.iter().enumerate() {
        if rule_is_valid(rule) {
            continue;
        }
        let missing = if rule.action.is_none() { "action" } else { "type" };
        return Err(Error::InvalidRuleSpec {
            pos: Pos::from_index(index),
            missing,
        });
    }
    Ok(())
}
