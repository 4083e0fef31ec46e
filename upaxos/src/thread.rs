//! # Summary
//!
//! This module contains the worker tasks of a participant: one per Paxos
//! role, plus the sender that owns the outbound socket half and the
//! control worker that watches for shutdown keywords. The receiver loop
//! lives in `config`, which wires all of them together.
//!
//! Every worker owns its own state and a bounded inbound queue; the only
//! shared resource is the recovery log handle.

pub(crate) mod acceptor;
pub(crate) mod control;
pub(crate) mod leader;
pub(crate) mod learner;
pub(crate) mod sender;
