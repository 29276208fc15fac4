//! Backlog collaborators for sluice.
//!
//! The scheduler never talks to a code host directly. Ready items come in
//! through [`backlog::Backlog::fetch_candidate_tasks`], and committed state
//! changes go back out as label edits and comments planned by
//! [`projection`].

pub mod backlog;
pub mod descriptor;
pub mod github;
pub mod memory;
pub mod projection;
pub mod types;
