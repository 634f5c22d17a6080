//! Caller-supplied run configuration
//!
//! The outer layer driving this crate (a playbook module shim, a CLI, a test
//! harness) parses its own arguments and hands the engine these structs. They
//! are plain serde types so any front end can deserialize them straight from
//! its input format.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::rule::Rule;

/// Transport settings the caller passes to whatever implements the API
/// traits. The engine itself never opens a connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Host exposing the remote API.
    pub host: String,
    /// API identity, e.g. `root@pam` (the suffix selects the auth backend).
    pub user: String,
    /// Credential for the API identity.
    pub password: String,
    /// Verify the remote TLS certificate. On unless explicitly disabled.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// The declared state for one security group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Unique group name.
    pub name: String,
    /// Annotation stored on the group when it has to be created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// The intended rule list, in order. Positions are assigned from this
    /// order by the normalizer; the caller never sets them.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl GroupSpec {
    /// Creates a spec with no rules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            rules: Vec::new(),
        }
    }

    /// Sets the group comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Sets the declared rule list.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Checks the group name against the remote side's naming rules before
    /// any network traffic happens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGroupName`] if the name is empty, longer than
    /// 64 characters, does not start with a letter, or contains characters
    /// outside `A-Z a-z 0-9 - _`.
    pub fn validate_name(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidGroupName {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if self.name.len() > 64 {
            return Err(invalid("name too long (max 64 chars)"));
        }
        if !self.name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            return Err(invalid("name must start with a letter"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid(
                "name contains invalid characters (use only a-z, 0-9, _, -)",
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
