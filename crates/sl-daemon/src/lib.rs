//! The sluice coordinator daemon.
//!
//! Runs the HTTP API next to three background loops:
//! - [`patrol`]: liveness sweep reclaiming tasks from silent workers
//! - [`intake`]: polling the backlog for newly ready items
//! - [`projection`]: mirroring committed events onto backlog labels
//!
//! All of them stop on the shared [`shutdown::ShutdownSignal`].

pub mod daemon;
pub mod intake;
pub mod patrol;
pub mod projection;
pub mod shutdown;
