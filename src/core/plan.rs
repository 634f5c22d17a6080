//! Reconciliation planning and application
//!
//! Drives one full reconciliation run against the remote side:
//!
//! ```text
//! START -> GROUP_RESOLVED -> VALIDATED -> DIFFED -> (DRY_RUN | APPLIED) -> DONE
//! ```
//!
//! The run is strictly ordered and synchronous: group listing, declared-rule
//! validation, rule fetch, diff, then either a dry-run report or the plan
//! application. The first failing remote call aborts the remainder of the
//! plan; nothing applied so far is rolled back.
//!
//! # Operation ordering
//!
//! Replacements and creations are applied in ascending position order
//! (creations append, so ascending order makes the server-assigned positions
//! line up with the declared list). Deletions run last and in descending
//! position order: deleting a rule shifts every later rule down by one, so
//! ascending deletes would act on the wrong rules for the rest of the pass.

use tracing::{debug, info, warn};

use crate::api::SecurityGroupApi;
use crate::config::GroupSpec;
use crate::core::diff::{DiffResult, diff};
use crate::core::error::{Error, Result};
use crate::core::normalize::{assign_positions, strip_server_metadata};
use crate::core::rule::{Pos, Rule};
use crate::core::validate::validate_rules;
use crate::report::render_ruleset_diff;

/// One remote operation in a reconciliation plan.
///
/// Rule operations are keyed by position into the declared list (creates,
/// replaces) or the fetched list (deletes); group creation always precedes
/// every rule operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create the security group itself.
    CreateGroup,
    /// Append the declared rule at this position.
    CreateRule(Pos),
    /// Replace the remote rule at this position with the declared one.
    ReplaceRule(Pos),
    /// Delete the remote rule at this position.
    DeleteRule(Pos),
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::CreateGroup => write!(f, "create group"),
            Op::CreateRule(pos) => write!(f, "create rule at position {pos}"),
            Op::ReplaceRule(pos) => write!(f, "replace rule at position {pos}"),
            Op::DeleteRule(pos) => write!(f, "delete rule at position {pos}"),
        }
    }
}

/// What a reconciliation run did (or, in dry-run mode, would do).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Whether remote state differed from declared state. In dry-run mode
    /// this reports what a real run would have changed.
    pub changed: bool,
    /// The ordered operation sequence derived from the diff. Empty when
    /// nothing differed.
    pub plan: Vec<Op>,
    /// How many operations were actually executed (always 0 in dry-run).
    pub applied: usize,
}

/// Derives the ordered operation sequence from a diff and the two list
/// lengths.
///
/// A missing group short-circuits: the group is created and every declared
/// rule is appended in ascending order. Otherwise each differing position is
/// interpreted against the lengths: beyond the declared list it is a delete,
/// beyond the fetched list a create, in the shared range a replace.
pub fn build_plan(
    group_exists: bool,
    existing_len: usize,
    desired_len: usize,
    changes: &DiffResult,
) -> Vec<Op> {
    if !group_exists {
        let mut ops = Vec::with_capacity(desired_len + 1);
        ops.push(Op::CreateGroup);
        ops.extend((0..desired_len).map(|index| Op::CreateRule(Pos::from_index(index))));
        return ops;
    }

    let mut replaces = Vec::new();
    let mut creates = Vec::new();
    let mut deletes = Vec::new();
    for pos in changes {
        if pos.as_index() >= desired_len {
            deletes.push(Op::DeleteRule(pos));
        } else if pos.as_index() >= existing_len {
            creates.push(Op::CreateRule(pos));
        } else {
            replaces.push(Op::ReplaceRule(pos));
        }
    }
    // descending, so a delete never shifts a rule a later delete still targets
    deletes.reverse();

    let mut ops = replaces;
    ops.append(&mut creates);
    ops.append(&mut deletes);
    ops
}

/// Runs one reconciliation of `spec` against the remote side.
///
/// In dry-run mode the returned [`Outcome`] reports `changed` and the
/// would-be plan without issuing a single mutating call.
///
/// # Errors
///
/// Returns `Err` if:
/// - the group name is unusable ([`Error::InvalidGroupName`])
/// - a declared rule lacks `action` or `type` ([`Error::InvalidRuleSpec`])
/// - a fetched rule has no digest token ([`Error::MalformedRemoteData`])
/// - a read call fails ([`Error::Api`])
/// - a mutating call fails ([`Error::RemoteOperationFailed`]); operations
///   already applied stay applied
pub fn reconcile<A: SecurityGroupApi>(api: &A, spec: &GroupSpec, dry_run: bool) -> Result<Outcome> {
    spec.validate_name()?;

    // START: resolve group existence from the cluster-wide listing
    let groups = api.list_groups()?;
    let group_exists = groups.iter().any(|g| g.group == spec.name);
    info!(
        "group `{}` {} on the remote side",
        spec.name,
        if group_exists { "exists" } else { "does not exist" }
    );

    // VALIDATED: gate every declared rule before any further remote traffic
    validate_rules(&spec.rules)?;

    let desired = assign_positions(spec.rules.clone());
    let existing = if group_exists {
        strip_server_metadata(api.list_group_rules(&spec.name)?)?
    } else {
        // nothing to diff against; creating the group is itself a change
        Vec::new()
    };

    // DIFFED
    let changes = diff(&existing, &desired);
    let changed = !group_exists || !changes.is_empty();
    if changed {
        debug!(
            "ruleset drift at {} position(s):\n{}",
            changes.len(),
            render_ruleset_diff(&existing, &desired)
        );
    }
    if group_exists && desired.is_empty() && !existing.is_empty() {
        warn!(
            "declared ruleset for group `{}` is empty; all {} remote rules will be deleted",
            spec.name,
            existing.len()
        );
    }

    let plan = if changed {
        build_plan(group_exists, existing.len(), desired.len(), &changes)
    } else {
        Vec::new()
    };

    if dry_run {
        info!(
            "dry-run: group `{}` would apply {} operation(s)",
            spec.name,
            plan.len()
        );
        return Ok(Outcome {
            changed,
            plan,
            applied: 0,
        });
    }

    if !changed {
        info!("group `{}` already matches declared state", spec.name);
        return Ok(Outcome {
            changed: false,
            plan,
            applied: 0,
        });
    }

    // APPLIED
    let applied = execute_plan(api, spec, &desired, &plan)?;
    info!(
        "group `{}` reconciled: {} operation(s) applied",
        spec.name, applied
    );
    Ok(Outcome {
        changed: true,
        plan,
        applied,
    })
}

/// Executes a plan in order, stopping at the first remote failure.
fn execute_plan<A: SecurityGroupApi>(
    api: &A,
    spec: &GroupSpec,
    desired: &[Rule],
    plan: &[Op],
) -> Result<usize> {
    for (step, op) in plan.iter().enumerate() {
        debug!("applying {op} on group `{}`", spec.name);
        let call = match op {
            Op::CreateGroup => api.create_group(&spec.name, spec.comment.as_deref()),
            Op::CreateRule(pos) => api.create_rule(&spec.name, declared_at(desired, *pos)?),
            Op::ReplaceRule(pos) => api.replace_rule(&spec.name, *pos, declared_at(desired, *pos)?),
            Op::DeleteRule(pos) => api.delete_rule(&spec.name, *pos),
        };
        if let Err(source) = call {
            return Err(Error::RemoteOperationFailed {
                target: format!("group `{}`", spec.name),
                op: op.clone(),
                applied: step,
                remaining: plan[step..].to_vec(),
                source,
            });
        }
    }
    Ok(plan.len())
}

fn declared_at(desired: &[Rule], pos: Pos) -> Result<&Rule> {
    desired.get(pos.as_index()).ok_or_else(|| {
        Error::Internal(format!(
            "plan references position {pos} beyond the declared list"
        ))
    })
}
