//! pvesg - Proxmox VE security group reconciliation
//!
//! Brings the ordered firewall rule list of a named security group on a
//! remote Proxmox VE cluster into agreement with a declared rule list, and
//! reports whether anything had to change.
//!
//! # Architecture
//!
//! - [`core`] - Normalization, validation, positional diffing and plan
//!   application
//! - [`api`] - The remote collaborator contract (implemented by a
//!   caller-supplied transport client)
//! - [`config`] - Caller-supplied connection and group configuration
//! - [`report`] - Human-readable ruleset diff rendering
//!
//! # Positional identity
//!
//! The remote API exposes no durable rule identifier besides list order, so
//! every rule is identified by its zero-based position. Reordering, insertion
//! and deletion all surface as positional differences; the planner turns them
//! into create/replace/delete operations and applies deletions highest
//! position first so earlier deletes never shift a later target.
//!
//! # Example
//!
//! ```
//! use pvesg::{Direction, GroupSpec, Pos, Rule, Verdict, reconcile};
//! # use pvesg::api::{ApiResult, GroupInfo, SecurityGroupApi};
//! # struct Client;
//! # impl SecurityGroupApi for Client {
//! #     fn list_groups(&self) -> ApiResult<Vec<GroupInfo>> { Ok(Vec::new()) }
//! #     fn list_group_rules(&self, _: &str) -> ApiResult<Vec<Rule>> { Ok(Vec::new()) }
//! #     fn create_group(&self, _: &str, _: Option<&str>) -> ApiResult<()> { Ok(()) }
//! #     fn create_rule(&self, _: &str, _: &Rule) -> ApiResult<()> { Ok(()) }
//! #     fn replace_rule(&self, _: &str, _: Pos, _: &Rule) -> ApiResult<()> { Ok(()) }
//! #     fn delete_rule(&self, _: &str, _: Pos) -> ApiResult<()> { Ok(()) }
//! # }
//! # fn connect() -> Client { Client }
//!
//! # fn main() -> pvesg::Result<()> {
//! let api = connect();
//! let spec = GroupSpec::new("websg")
//!     .with_comment("edge web tier")
//!     .with_rules(vec![
//!         Rule::new(Verdict::Accept, Direction::In)
//!             .with_proto("tcp")
//!             .with_dport("443")
//!             .enabled(),
//!     ]);
//!
//! let outcome = reconcile(&api, &spec, false)?;
//! println!("changed: {}", outcome.changed);
//! # Ok(())
//! # }
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod config;
pub mod core;
pub mod report;

// Re-export commonly used types
pub use crate::config::{ConnectOptions, GroupSpec};
pub use crate::core::assign::assign_groups;
pub use crate::core::diff::{DiffResult, diff};
pub use crate::core::error::{Error, Result};
pub use crate::core::plan::{Op, Outcome, reconcile};
pub use crate::core::rule::{Direction, Pos, Rule, Ruleset, Verdict};
