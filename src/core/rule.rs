//! Firewall rule data structures for security group reconciliation
//!
//! This module defines the wire-level representation of a Proxmox VE firewall
//! rule and the positional identity type used throughout the reconciliation
//! pipeline.
//!
//! # Rule Structure
//!
//! A [`Rule`] is a loosely-typed field bag, mirroring what the remote API
//! accepts and returns:
//! - `action` and `type` are the only fields a declared rule must carry
//! - well-known match/annotation fields (`dport`, `source`, `comment`, ...)
//!   are typed but optional
//! - anything else the remote side grows in the future lands in the open
//!   extension map and still participates in comparison
//!
//! # Positional Identity
//!
//! The remote API exposes no durable rule identifier besides list order, so a
//! rule's identity within a group is its zero-based [`Pos`]. Positions are
//! assigned by the normalizer (see [`crate::core::normalize`]), never by the
//! caller.
//!
//! # Example
//!
//! ```
//! use pvesg::{Direction, Rule, Verdict};
//!
//! let rule = Rule::new(Verdict::Accept, Direction::In)
//!     .with_dport("22")
//!     .with_comment("ssh from anywhere");
//! assert_eq!(rule.action.as_deref(), Some("ACCEPT"));
//! assert_eq!(rule.kind.as_deref(), Some("in"));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Zero-based ordinal position of a rule within its group's rule list.
///
/// The only identity signal available across fetch/reconcile cycles, so it is
/// carried as a first-class type instead of bare index arithmetic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Pos(pub u32);

impl Pos {
    /// Converts a list index into a position.
    pub fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// Returns the position as a list index.
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Pos {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Verdict vocabulary for rule actions
///
/// The remote side stores the action as an uppercase string; this enum is the
/// builder/test vocabulary for the three verdicts every rule-bearing group
/// uses. Group references use the referenced group name as their action
/// instead (see [`Rule::group_ref`]).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Verdict {
    /// Accept the packet (allow it through)
    #[default]
    #[strum(serialize = "ACCEPT")]
    Accept,
    /// Drop the packet silently (no response sent)
    #[strum(serialize = "DROP")]
    Drop,
    /// Reject the packet and send an unreachable response
    #[strum(serialize = "REJECT")]
    Reject,
}

impl Verdict {
    /// Returns the wire-format action string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Verdict::Accept => "ACCEPT",
            Verdict::Drop => "DROP",
            Verdict::Reject => "REJECT",
        }
    }
}

/// Traffic direction (the remote `type` field)
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Direction {
    /// Incoming traffic
    #[default]
    #[strum(serialize = "in")]
    In,
    /// Outgoing traffic
    #[strum(serialize = "out")]
    Out,
    /// Reference to another security group
    #[strum(serialize = "group")]
    Group,
}

impl Direction {
    /// Returns the wire-format type string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Group => "group",
        }
    }
}

/// An ordered rule list, either fetched from the remote side or declared by
/// the caller. Order is semantically meaningful: it is the basis of
/// positional identity.
pub type Ruleset = Vec<Rule>;

/// A single firewall rule as a dynamic field bag.
///
/// `action` and `type` are required for a rule to be valid (checked by
/// [`crate::core::validate`], not by construction, so malformed caller input
/// can be diagnosed with a position instead of a deserialization error).
/// Structural equality over every field, including `pos` and `enable` and the
/// extension map, is what the differ compares; `digest` is server bookkeeping
/// and is stripped before any comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Position within the group's rule list, assigned by the normalizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Pos>,

    /// Verdict (`ACCEPT`/`DROP`/`REJECT`), or a group name for group refs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Rule direction: `in`, `out` or `group`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// 0 = disabled, 1 = enabled. The remote side stores an integer flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<u8>,

    /// Destination port or port range, e.g. `22` or `8000:8080`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dport: Option<String>,

    /// Source port or port range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,

    /// Protocol, e.g. `tcp`, `udp`, `icmp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,

    /// Source address, network or alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Destination address, network or alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,

    /// Restrict the rule to a network interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,

    /// Log level for matched packets (`nolog`, `info`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,

    /// Free-form annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Server-assigned integrity token. Never part of desired state; the
    /// normalizer strips it from fetched rules before comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Provider-specific fields this crate has no schema for. Compared
    /// structurally like everything else.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Rule {
    /// Creates a rule with the two required fields set.
    pub fn new(action: Verdict, direction: Direction) -> Self {
        Self {
            action: Some(action.as_str().to_string()),
            kind: Some(direction.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Creates a reference to another security group.
    ///
    /// Group references carry the referenced group name in `action` and
    /// `group` in `type`; that is how the remote side models them.
    pub fn group_ref(group: &str) -> Self {
        Self {
            action: Some(group.to_string()),
            kind: Some(Direction::Group.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Sets the destination port or port range.
    #[must_use]
    pub fn with_dport(mut self, dport: impl Into<String>) -> Self {
        self.dport = Some(dport.into());
        self
    }

    /// Sets the source port or port range.
    #[must_use]
    pub fn with_sport(mut self, sport: impl Into<String>) -> Self {
        self.sport = Some(sport.into());
        self
    }

    /// Sets the protocol.
    #[must_use]
    pub fn with_proto(mut self, proto: impl Into<String>) -> Self {
        self.proto = Some(proto.into());
        self
    }

    /// Sets the source network.
    #[must_use]
    pub fn with_source(mut self, source: IpNetwork) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Sets the destination network.
    #[must_use]
    pub fn with_dest(mut self, dest: IpNetwork) -> Self {
        self.dest = Some(dest.to_string());
        self
    }

    /// Restricts the rule to an interface.
    #[must_use]
    pub fn with_iface(mut self, iface: impl Into<String>) -> Self {
        self.iface = Some(iface.into());
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Marks the rule enabled.
    #[must_use]
    pub fn enabled(mut self) -> Self {
        self.enable = Some(1);
        self
    }

    /// Whether the rule is enabled. Absent `enable` counts as disabled,
    /// matching the normalizer's default.
    pub fn is_enabled(&self) -> bool {
        self.enable.unwrap_or(0) == 1
    }

    /// Whether this rule is a reference to another security group.
    pub fn is_group_ref(&self) -> bool {
        self.kind.as_deref() == Some(Direction::Group.as_str())
    }
}

/// Renders a rule in the `/etc/pve/firewall` single-line style, used by the
/// diff preview. Disabled rules get the `|` prefix the remote config format
/// uses.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_enabled() {
            write!(f, "|")?;
        }
        write!(
            f,
            "{} {}",
            self.kind.as_deref().map_or("-".to_string(), str::to_uppercase),
            self.action.as_deref().unwrap_or("-")
        )?;
        if let Some(proto) = &self.proto {
            write!(f, " -p {proto}")?;
        }
        if let Some(source) = &self.source {
            write!(f, " -source {source}")?;
        }
        if let Some(dest) = &self.dest {
            write!(f, " -dest {dest}")?;
        }
        if let Some(sport) = &self.sport {
            write!(f, " -sport {sport}")?;
        }
        if let Some(dport) = &self.dport {
            write!(f, " -dport {dport}")?;
        }
        if let Some(iface) = &self.iface {
            write!(f, " -i {iface}")?;
        }
        if let Some(log) = &self.log {
            write!(f, " -log {log}")?;
        }
        for (key, value) in &self.extra {
            write!(f, " -{key} {value}")?;
        }
        if let Some(comment) = &self.comment {
            write!(f, " # {comment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_required_fields() {
        let rule = Rule::new(Verdict::Drop, Direction::Out);
        assert_eq!(rule.action.as_deref(), Some("DROP"));
        assert_eq!(rule.kind.as_deref(), Some("out"));
        assert!(rule.pos.is_none());
        assert!(!rule.is_enabled());
    }

    #[test]
    fn group_ref_uses_group_name_as_action() {
        let rule = Rule::group_ref("websg");
        assert_eq!(rule.action.as_deref(), Some("websg"));
        assert!(rule.is_group_ref());
    }

    #[test]
    fn unknown_fields_survive_serde_round_trip() {
        let json = r#"{"action":"ACCEPT","type":"in","icmp-type":"echo-request","ipversion":4}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.extra.get("icmp-type").unwrap(), "echo-request");
        assert_eq!(rule.extra.get("ipversion").unwrap(), 4);

        let back = serde_json::to_value(&rule).unwrap();
        assert_eq!(back["icmp-type"], "echo-request");
        assert_eq!(back["ipversion"], 4);
    }

    #[test]
    fn digest_is_a_typed_field_not_an_extra() {
        let json = r#"{"action":"ACCEPT","type":"in","digest":"abc123"}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.digest.as_deref(), Some("abc123"));
        assert!(rule.extra.is_empty());
    }

    #[test]
    fn source_builder_accepts_cidr_networks() {
        let net: IpNetwork = "192.168.1.0/24".parse().unwrap();
        let rule = Rule::new(Verdict::Accept, Direction::In).with_source(net);
        assert_eq!(rule.source.as_deref(), Some("192.168.1.0/24"));
    }

    #[test]
    fn display_marks_disabled_rules() {
        let rule = Rule::new(Verdict::Accept, Direction::In).with_dport("22");
        assert_eq!(rule.to_string(), "|IN ACCEPT -dport 22");
        assert_eq!(rule.enabled().to_string(), "IN ACCEPT -dport 22");
    }

    #[test]
    fn equality_covers_the_extension_map() {
        let base = Rule::new(Verdict::Accept, Direction::In);
        let mut tagged = base.clone();
        tagged
            .extra
            .insert("ipversion".to_string(), Value::from(6));
        assert_ne!(base, tagged);
    }
}
