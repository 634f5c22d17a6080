//! Security group assignment for instances
//!
//! Brings the set of security groups referenced by one instance's firewall
//! into agreement with a declared list: groups in the list are attached,
//! group references the list does not mention are removed. Rules that are not
//! group references (an instance's own `in`/`out` rules) are left untouched.
//!
//! Group references live in the instance's ordered rule list like any other
//! rule, so removals are positional and run in descending order for the same
//! shift reason as in [`crate::core::plan`]. Additions append.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::api::InstanceFirewallApi;
use crate::core::error::{Error, Result};
use crate::core::normalize::strip_server_metadata;
use crate::core::plan::{Op, Outcome};
use crate::core::rule::{Pos, Rule};

/// Reconciles the group references on one instance's firewall.
///
/// `desired_groups` is the complete intended set: every listed group ends up
/// attached (enabled), every unlisted group reference is removed. Duplicate
/// names in the list are collapsed, first occurrence wins.
///
/// # Errors
///
/// Returns `Err` if:
/// - a fetched rule has no digest token ([`Error::MalformedRemoteData`])
/// - the rule listing fails ([`Error::Api`])
/// - a mutating call fails ([`Error::RemoteOperationFailed`])
pub fn assign_groups<A: InstanceFirewallApi>(
    api: &A,
    node: &str,
    vmid: u32,
    desired_groups: &[String],
    dry_run: bool,
) -> Result<Outcome> {
    let rules = strip_server_metadata(api.list_instance_rules(node, vmid)?)?;

    let mut wanted: Vec<&str> = Vec::new();
    let mut seen = BTreeSet::new();
    for name in desired_groups {
        if seen.insert(name.as_str()) {
            wanted.push(name.as_str());
        }
    }

    let attached: Vec<(Pos, &str)> = rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.is_group_ref())
        .filter_map(|(index, rule)| {
            let pos = rule.pos.unwrap_or_else(|| Pos::from_index(index));
            rule.action.as_deref().map(|name| (pos, name))
        })
        .collect();

    let mut stale: Vec<Pos> = attached
        .iter()
        .filter(|(_, name)| !wanted.contains(name))
        .map(|(pos, _)| *pos)
        .collect();
    // positional deletes shift later rules, run them highest-first
    stale.sort_unstable_by(|a, b| b.cmp(a));

    let missing: Vec<&str> = wanted
        .iter()
        .filter(|name| !attached.iter().any(|(_, attached_name)| attached_name == *name))
        .copied()
        .collect();

    info!(
        "instance {vmid} on node `{node}`: {} group reference(s) attached, {} to remove, {} to add",
        attached.len(),
        stale.len(),
        missing.len()
    );

    // appends land after the survivors of the delete pass
    let append_base = rules.len() - stale.len();
    let mut plan: Vec<Op> = stale.into_iter().map(Op::DeleteRule).collect();
    plan.extend(
        (0..missing.len()).map(|offset| Op::CreateRule(Pos::from_index(append_base + offset))),
    );
    let changed = !plan.is_empty();

    if dry_run || !changed {
        return Ok(Outcome {
            changed,
            plan,
            applied: 0,
        });
    }

    let creates: Vec<Rule> = missing
        .iter()
        .map(|name| Rule::group_ref(name).enabled())
        .collect();
    let applied = execute(api, node, vmid, &plan, &creates)?;
    Ok(Outcome {
        changed: true,
        plan,
        applied,
    })
}

fn execute<A: InstanceFirewallApi>(
    api: &A,
    node: &str,
    vmid: u32,
    plan: &[Op],
    creates: &[Rule],
) -> Result<usize> {
    let mut next_create = 0;
    for (step, op) in plan.iter().enumerate() {
        debug!("applying {op} on instance {vmid}");
        let call = match op {
            Op::DeleteRule(pos) => api.delete_instance_rule(node, vmid, *pos),
            Op::CreateRule(_) => {
                let rule = creates.get(next_create).ok_or_else(|| {
                    Error::Internal("assignment plan has more creates than group refs".to_string())
                })?;
                next_create += 1;
                api.create_instance_rule(node, vmid, rule)
            }
            Op::CreateGroup | Op::ReplaceRule(_) => {
                return Err(Error::Internal(format!(
                    "unexpected operation {op} in an assignment plan"
                )));
            }
        };
        if let Err(source) = call {
            return Err(Error::RemoteOperationFailed {
                target: format!("instance {vmid} on node `{node}`"),
                op: op.clone(),
                applied: step,
                remaining: plan[step..].to_vec(),
                source,
            });
        }
    }
    Ok(plan.len())
}

