use thiserror::Error;

use crate::api::ApiError;
use crate::core::plan::Op;
use crate::core::rule::Pos;

/// Core error types for pvesg
///
/// Every failure names the offending position or operation so a run can be
/// diagnosed without re-running in verbose mode. No error is retried or
/// silently swallowed.
#[derive(Debug, Error)]
pub enum Error {
    /// A declared rule is missing one of its required fields. Fatal to the
    /// whole run; surfaced before any remote write.
    #[error("invalid rule at position {pos}: missing required field `{missing}`")]
    InvalidRuleSpec { pos: Pos, missing: &'static str },

    /// A fetched rule lacks the integrity token the remote API always
    /// attaches. Signals the remote API contract changed underneath us.
    #[error("malformed remote data: rule at position {pos} carries no digest token")]
    MalformedRemoteData { pos: Pos },

    /// The requested group name cannot be used on the remote side.
    #[error("invalid security group name `{name}`: {reason}")]
    InvalidGroupName { name: String, reason: String },

    /// A mutating remote call failed mid-plan. Already-applied operations are
    /// not rolled back; `remaining` lists the failed operation and everything
    /// after it, in plan order.
    #[error("remote operation {op} on {target} failed after {applied} applied operations: {source}")]
    RemoteOperationFailed {
        target: String,
        op: Op,
        applied: usize,
        remaining: Vec<Op>,
        #[source]
        source: ApiError,
    },

    /// Transport-surfaced failure on a read call (group or rule listing).
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Internal logic error
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_rule_spec_names_position_and_field() {
        let err = Error::InvalidRuleSpec {
            pos: Pos(3),
            missing: "action",
        };
        let msg = err.to_string();
        assert!(msg.contains("position 3"));
        assert!(msg.contains("`action`"));
    }

    #[test]
    fn remote_failure_reports_progress() {
        let err = Error::RemoteOperationFailed {
            target: "group `websg`".to_string(),
            op: Op::DeleteRule(Pos(4)),
            applied: 2,
            remaining: vec![Op::DeleteRule(Pos(4)), Op::DeleteRule(Pos(3))],
            source: ApiError::Remote {
                status: Some(500),
                message: "internal server error".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("delete rule at position 4"));
        assert!(msg.contains("group `websg`"));
        assert!(msg.contains("2 applied"));
    }
}
