//! Shared test utilities for core module tests
//!
//! Provides a scripted in-memory stand-in for the remote API so tests never
//! touch a real cluster, plus rule builders used across test suites. This
//! module is only compiled in test mode.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::api::{ApiError, ApiResult, GroupInfo, InstanceFirewallApi, SecurityGroupApi};
use crate::core::rule::{Direction, Pos, Rule, Verdict};

/// Digest value the mock stamps onto every stored rule, standing in for the
/// token the real server derives from its config.
pub const TEST_DIGEST: &str = "da39a3ee5e6b4b0d";

/// One recorded API call, used to assert exactly what a run did remotely.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    ListGroups,
    ListGroupRules(String),
    CreateGroup(String, Option<String>),
    CreateRule(String, Rule),
    ReplaceRule(String, Pos, Rule),
    DeleteRule(String, Pos),
    ListInstanceRules(u32),
    CreateInstanceRule(u32, Rule),
    DeleteInstanceRule(u32, Pos),
}

impl ApiCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            ApiCall::ListGroups | ApiCall::ListGroupRules(_) | ApiCall::ListInstanceRules(_)
        )
    }
}

/// In-memory remote side. Mutations really mutate the stored state (with the
/// server's renumber-and-stamp behavior), so a second run against the same
/// mock observes what the first run left behind.
#[derive(Default)]
pub struct MockApi {
    groups: RefCell<Vec<GroupInfo>>,
    group_rules: RefCell<BTreeMap<String, Vec<Rule>>>,
    instance_rules: RefCell<BTreeMap<u32, Vec<Rule>>>,
    calls: RefCell<Vec<ApiCall>>,
    fail_mutation_at: Cell<Option<usize>>,
    mutations_seen: Cell<usize>,
    fail_listings: Cell<bool>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty group.
    #[must_use]
    pub fn with_group(self, name: &str) -> Self {
        self.groups.borrow_mut().push(GroupInfo::new(name));
        self.group_rules
            .borrow_mut()
            .entry(name.to_string())
            .or_default();
        self
    }

    /// Registers a group with rules, stored the way the server would return
    /// them: dense positions and a digest on every rule.
    #[must_use]
    pub fn with_group_rules(self, name: &str, rules: Vec<Rule>) -> Self {
        let this = self.with_group(name);
        {
            let mut stored = this.group_rules.borrow_mut();
            let slot = stored.entry(name.to_string()).or_default();
            *slot = rules;
            renumber_and_stamp(slot);
        }
        this
    }

    /// Registers a group whose rules are stored verbatim, digests included or
    /// not. For tests that simulate a misbehaving server.
    #[must_use]
    pub fn with_raw_group_rules(self, name: &str, rules: Vec<Rule>) -> Self {
        let this = self.with_group(name);
        this.group_rules.borrow_mut().insert(name.to_string(), rules);
        this
    }

    /// Registers an instance rule list, normalized like the server would.
    #[must_use]
    pub fn with_instance_rules(self, vmid: u32, mut rules: Vec<Rule>) -> Self {
        renumber_and_stamp(&mut rules);
        self.instance_rules.borrow_mut().insert(vmid, rules);
        self
    }

    /// Makes the `index`-th mutating call (0-based) fail with a remote error.
    pub fn fail_mutation_at(&self, index: usize) {
        self.fail_mutation_at.set(Some(index));
    }

    /// Makes every read call fail with a connection error.
    pub fn fail_listings(&self) {
        self.fail_listings.set(true);
    }

    /// Snapshot of every recorded call, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.borrow().clone()
    }

    /// How many mutating calls were attempted.
    pub fn mutation_count(&self) -> usize {
        self.calls.borrow().iter().filter(|c| c.is_mutation()).count()
    }

    /// Current stored rules of a group, for post-state assertions.
    pub fn rules_of(&self, name: &str) -> Vec<Rule> {
        self.group_rules
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Current stored rules of an instance.
    pub fn instance_rules_of(&self, vmid: u32) -> Vec<Rule> {
        self.instance_rules
            .borrow()
            .get(&vmid)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: ApiCall) -> ApiResult<()> {
        let mutation = call.is_mutation();
        self.calls.borrow_mut().push(call);
        if mutation {
            let seen = self.mutations_seen.get();
            self.mutations_seen.set(seen + 1);
            if self.fail_mutation_at.get() == Some(seen) {
                return Err(ApiError::Remote {
                    status: Some(500),
                    message: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_listing(&self) -> ApiResult<()> {
        if self.fail_listings.get() {
            return Err(ApiError::Connection("connection refused".to_string()));
        }
        Ok(())
    }
}

/// What the server does after every rule mutation: dense positions, an
/// explicit enable flag and a fresh digest on each rule.
fn renumber_and_stamp(rules: &mut [Rule]) {
    for (index, rule) in rules.iter_mut().enumerate() {
        rule.pos = Some(Pos::from_index(index));
        if rule.enable.is_none() {
            rule.enable = Some(0);
        }
        rule.digest = Some(TEST_DIGEST.to_string());
    }
}

impl SecurityGroupApi for MockApi {
    fn list_groups(&self) -> ApiResult<Vec<GroupInfo>> {
        self.record(ApiCall::ListGroups)?;
        self.check_listing()?;
        Ok(self.groups.borrow().clone())
    }

    fn list_group_rules(&self, group: &str) -> ApiResult<Vec<Rule>> {
        self.record(ApiCall::ListGroupRules(group.to_string()))?;
        self.check_listing()?;
        Ok(self.rules_of(group))
    }

    fn create_group(&self, group: &str, comment: Option<&str>) -> ApiResult<()> {
        self.record(ApiCall::CreateGroup(
            group.to_string(),
            comment.map(String::from),
        ))?;
        self.groups.borrow_mut().push(GroupInfo {
            group: group.to_string(),
            comment: comment.map(String::from),
            digest: Some(TEST_DIGEST.to_string()),
        });
        self.group_rules
            .borrow_mut()
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    fn create_rule(&self, group: &str, rule: &Rule) -> ApiResult<()> {
        self.record(ApiCall::CreateRule(group.to_string(), rule.clone()))?;
        let mut stored = self.group_rules.borrow_mut();
        let slot = stored.entry(group.to_string()).or_default();
        let mut rule = rule.clone();
        rule.digest = None;
        slot.push(rule);
        renumber_and_stamp(slot);
        Ok(())
    }

    fn replace_rule(&self, group: &str, pos: Pos, rule: &Rule) -> ApiResult<()> {
        self.record(ApiCall::ReplaceRule(
            group.to_string(),
            pos,
            rule.clone(),
        ))?;
        let mut stored = self.group_rules.borrow_mut();
        let slot = stored.entry(group.to_string()).or_default();
        if pos.as_index() >= slot.len() {
            return Err(ApiError::Remote {
                status: Some(400),
                message: format!("no rule at position {pos}"),
            });
        }
        slot[pos.as_index()] = rule.clone();
        renumber_and_stamp(slot);
        Ok(())
    }

    fn delete_rule(&self, group: &str, pos: Pos) -> ApiResult<()> {
        self.record(ApiCall::DeleteRule(group.to_string(), pos))?;
        let mut stored = self.group_rules.borrow_mut();
        let slot = stored.entry(group.to_string()).or_default();
        if pos.as_index() >= slot.len() {
            return Err(ApiError::Remote {
                status: Some(400),
                message: format!("no rule at position {pos}"),
            });
        }
        slot.remove(pos.as_index());
        renumber_and_stamp(slot);
        Ok(())
    }
}

impl InstanceFirewallApi for MockApi {
    fn list_instance_rules(&self, _node: &str, vmid: u32) -> ApiResult<Vec<Rule>> {
        self.record(ApiCall::ListInstanceRules(vmid))?;
        self.check_listing()?;
        Ok(self.instance_rules_of(vmid))
    }

    fn create_instance_rule(&self, _node: &str, vmid: u32, rule: &Rule) -> ApiResult<()> {
        self.record(ApiCall::CreateInstanceRule(vmid, rule.clone()))?;
        let mut stored = self.instance_rules.borrow_mut();
        let slot = stored.entry(vmid).or_default();
        let mut rule = rule.clone();
        rule.digest = None;
        slot.push(rule);
        renumber_and_stamp(slot);
        Ok(())
    }

    fn delete_instance_rule(&self, _node: &str, vmid: u32, pos: Pos) -> ApiResult<()> {
        self.record(ApiCall::DeleteInstanceRule(vmid, pos))?;
        let mut stored = self.instance_rules.borrow_mut();
        let slot = stored.entry(vmid).or_default();
        if pos.as_index() >= slot.len() {
            return Err(ApiError::Remote {
                status: Some(400),
                message: format!("no rule at position {pos}"),
            });
        }
        slot.remove(pos.as_index());
        renumber_and_stamp(slot);
        Ok(())
    }
}

/// Canonical accept-inbound test rule.
pub fn accept_in(dport: &str) -> Rule {
    Rule::new(Verdict::Accept, Direction::In)
        .with_proto("tcp")
        .with_dport(dport)
}

/// A declared rule list covering the common web tier case.
pub fn web_rules() -> Vec<Rule> {
    vec![
        accept_in("22").with_comment("ssh"),
        accept_in("80"),
        accept_in("443"),
    ]
}
