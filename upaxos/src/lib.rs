//! # Summary
//!
//! This crate implements a Multi-Paxos participant: one process that
//! simultaneously plays the leader, acceptor, and learner roles in a
//! fixed-size replica group, deciding a totally ordered sequence of
//! client-supplied values over unreliable UDP.
//!
//! # Usage
//!
//! Create a [`Config`] with this participant's ID and the group size, then
//! call `run`. The participant binds its well-known endpoint, replays its
//! recovery log, and serves until a `quit`/`exit`/`bye` datagram arrives.
//!
//! ```no_run
//! # async fn start() -> std::io::Result<()> {
//! upaxos::Config::new(0, 3)
//!     .with_log_dir("/var/tmp")
//!     .run()
//!     .await
//! # }
//! ```
//!
//! Clients speak the same datagram grammar as the group: `Request I V`
//! writes an opaque value V at instance I's leader, `Request I` with no
//! value reads instance I, and the participant answers `S OK I V` once
//! the instance is decided.
//!
//! # Implementation Details
//!
//! - Every inbound datagram is fanned out to all role workers; each worker
//!   ignores what it does not recognize, so no routing table exists.
//! - Proposal numbers are drawn from disjoint residue classes: everything
//!   participant k proposes satisfies `p mod N == k`, which makes ties
//!   impossible by construction.
//! - Promise and accept facts hit the recovery log (fsynced) before the
//!   corresponding reply is handed to the sender.
//! - Broadcasts include the local endpoint, so a participant hears its own
//!   proposals through the same path as everyone else's.

mod config;
mod internal;
pub mod message;
mod storage;
mod thread;

pub use crate::config::Config;
pub use crate::config::MAX_PAYLOAD;
