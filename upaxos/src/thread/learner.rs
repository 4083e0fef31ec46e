//! # Summary
//!
//! This module defines the `Learner` worker, which aggregates Accepts
//! until a quorum agrees on a value, records the decision durably, and
//! serves client reads from the committed history.

use std::collections::HashMap as Map;

use log::debug;
use log::info;
use log::trace;

use crate::internal::Rx;
use crate::internal::Tx;
use crate::message::Inbound;
use crate::message::Message;
use crate::storage;
use crate::thread::sender;

pub struct Learner {
    /// Unique ID of this participant
    id: usize,

    /// Total number of participants
    count: usize,

    /// Intra-participant receiving channel
    rx: Rx<Inbound>,

    /// Sender transmitting channel
    sender_tx: Tx<sender::In>,

    /// Recovery log shared with the acceptor
    log: storage::Log,

    /// Latest (proposal, value) accepted by each sender, per instance
    votes: Map<u64, Map<usize, (u64, String)>>,

    /// Values a quorum has accepted; entries are immutable once set
    decided: Map<u64, String>,
}

impl Learner {
    pub fn new(
        id: usize,
        count: usize,
        rx: Rx<Inbound>,
        sender_tx: Tx<sender::In>,
        log: storage::Log,
        recovered: &storage::Recovered,
    ) -> Self {
        Learner {
            id,
            count,
            rx,
            sender_tx,
            log,
            votes: Map::default(),
            decided: recovered.decided.clone(),
        }
    }

    pub async fn run(mut self) {
        while let Some(inbound) = self.rx.recv().await {
            trace!("received {:?}", inbound.message);
            match inbound.message {
            | Message::Accept { sender, instance, proposal, value } => {
                self.respond_accept(sender, instance, proposal, value)
            }
            | Message::Request { instance, value } if value.is_empty() => {
                self.respond_read(inbound.from, instance)
            }
            | _ => (),
            }
        }
    }

    /// Record one acceptor's latest vote and check for a quorum. Votes are
    /// keyed by sender, so duplicated datagrams cannot inflate the count,
    /// and a reordered older vote never displaces a newer one.
    fn respond_accept(&mut self, sender: usize, instance: u64, proposal: u64, value: String) {
        if self.decided.contains_key(&instance) {
            return
        }

        let votes = self.votes.entry(instance).or_default();
        match votes.get(&sender) {
        | Some(&(latest, _)) if latest > proposal => {
            debug!("dropping vote {} from {}, already saw {}", proposal, sender, latest);
            return
        }
        | _ => {
            votes.insert(sender, (proposal, value.clone()));
        }
        }

        let supporters = votes
            .values()
            .filter(|(_, accepted)| *accepted == value)
            .count();
        if supporters > self.count / 2 {
            info!("decided instance {} on {:?}", instance, value);
            self.log.append(&storage::Record::Learn {
                instance,
                value: value.clone(),
            });
            self.decided.insert(instance, value);
        }
    }

    /// Serve a read. Undecided instances get no answer at all; the client
    /// drives retries.
    fn respond_read(&mut self, from: std::net::SocketAddr, instance: u64) {
        match self.decided.get(&instance) {
        | Some(value) => {
            debug!("read of instance {} answered with {:?}", instance, value);
            self.sender_tx.send(sender::In::To(from, Message::Ok {
                sender: self.id,
                instance,
                value: value.clone(),
            }));
        }
        | None => debug!("read of undecided instance {}, staying silent", instance),
        }
    }
}
