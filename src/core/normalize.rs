//! Rule normalization for both sides of the comparison
//!
//! Desired rules get canonical positions and field defaults; fetched rules
//! get their server-only bookkeeping stripped. Comparison (see
//! [`crate::core::diff`]) is only meaningful after both lists went through
//! here.

use crate::core::error::{Error, Result};
use crate::core::rule::{Pos, Rule};

/// Assigns canonical positions to a declared rule list.
///
/// For each rule in input order, `pos` becomes the list index; an absent
/// `enable` defaults to `0` (disabled). Total and idempotent: reapplying to
/// its own output changes nothing.
pub fn assign_positions(mut rules: Vec<Rule>) -> Vec<Rule> {
    for (index, rule) in rules.iter_mut().enumerate() {
        rule.pos = Some(Pos::from_index(index));
        if rule.enable.is_none() {
            rule.enable = Some(0);
        }
    }
    rules
}

/// Strips the server-assigned digest token from a fetched rule list so it
/// cannot pollute equality comparison.
///
/// # Errors
///
/// Returns [`Error::MalformedRemoteData`] if any fetched rule carries no
/// digest. The remote API always attaches one; its absence means the API
/// contract changed and the run must not proceed.
pub fn strip_server_metadata(mut rules: Vec<Rule>) -> Result<Vec<Rule>> {
    for (index, rule) in rules.iter_mut().enumerate() {
        if rule.digest.take().is_none() {
            return Err(Error::MalformedRemoteData {
                pos: rule.pos.unwrap_or_else(|| Pos::from_index(index)),
            });
        }
    }
    Ok(rules)
}
