//! Remote collaborator contract for the virtualization platform's firewall API
//!
//! The reconciliation engine never speaks a wire protocol itself; it drives an
//! implementation of the traits below. The transport client (HTTP, TLS,
//! authentication) is supplied by the caller and configured through
//! [`crate::config::ConnectOptions`].
//!
//! # Contract
//!
//! These are fixed remote semantics, not something an implementation may
//! reinterpret:
//!
//! - [`SecurityGroupApi::create_rule`] appends; the server assigns the
//!   position by append order.
//! - [`SecurityGroupApi::replace_rule`] updates the rule at a position
//!   in place.
//! - [`SecurityGroupApi::delete_rule`] shifts every subsequent rule down by
//!   one position.
//! - Fetched rules carry a server-assigned `digest` integrity token.
//!
//! All calls are synchronous and block until the remote side answers or
//! errors; the engine performs no retries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::rule::{Pos, Rule};

/// Transport-level failures, as surfaced by the client implementation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The remote host could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The remote side rejected the supplied identity or credential.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The remote API answered with an error.
    #[error("remote API error: {message}")]
    Remote {
        status: Option<u16>,
        message: String,
    },
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A security group as returned by the group listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Unique group name.
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl GroupInfo {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            comment: None,
            digest: None,
        }
    }
}

/// Cluster-wide security group operations.
pub trait SecurityGroupApi {
    /// Lists every security group defined on the cluster.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the listing cannot be fetched.
    fn list_groups(&self) -> ApiResult<Vec<GroupInfo>>;

    /// Lists the ordered rule list of one group.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the rule list cannot be fetched.
    fn list_group_rules(&self, group: &str) -> ApiResult<Vec<Rule>>;

    /// Creates an empty security group.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the remote side rejects the creation.
    fn create_group(&self, group: &str, comment: Option<&str>) -> ApiResult<()>;

    /// Appends a rule to a group. The server assigns the position.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the remote side rejects the rule.
    fn create_rule(&self, group: &str, rule: &Rule) -> ApiResult<()>;

    /// Replaces the rule at `pos` in place.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the remote side rejects the update.
    fn replace_rule(&self, group: &str, pos: Pos, rule: &Rule) -> ApiResult<()>;

    /// Deletes the rule at `pos`. Subsequent rules shift down by one.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the remote side rejects the deletion.
    fn delete_rule(&self, group: &str, pos: Pos) -> ApiResult<()>;
}

/// Per-instance firewall operations, used to attach security groups to a
/// guest's own rule list.
pub trait InstanceFirewallApi {
    /// Lists the ordered firewall rule list of one instance.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the rule list cannot be fetched.
    fn list_instance_rules(&self, node: &str, vmid: u32) -> ApiResult<Vec<Rule>>;

    /// Appends a rule to the instance's firewall.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the remote side rejects the rule.
    fn create_instance_rule(&self, node: &str, vmid: u32, rule: &Rule) -> ApiResult<()>;

    /// Deletes the instance rule at `pos`. Subsequent rules shift down.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the remote side rejects the deletion.
    fn delete_instance_rule(&self, node: &str, vmid: u32, pos: Pos) -> ApiResult<()>;
}
