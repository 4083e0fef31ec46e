use std::collections::HashMap as Map;

use log::debug;
use log::trace;

use crate::internal::Rx;
use crate::internal::Tx;
use crate::message::Inbound;
use crate::message::Message;
use crate::storage;
use crate::thread::sender;

/// Serves Prepare and Write from any leader, upholding the two acceptor
/// safety rules: never promise below an earlier promise, and never reply
/// before the corresponding fact is durable.
pub struct Acceptor {
    /// Unique ID of this participant
    id: usize,

    /// Intra-participant receiving channel
    rx: Rx<Inbound>,

    /// Sender transmitting channel
    sender_tx: Tx<sender::In>,

    /// Recovery log shared with the learner
    log: storage::Log,

    /// Smallest proposal still permitted per instance; never decreases
    minp: Map<u64, u64>,

    /// Most recently accepted (proposal, value) per instance
    accepted: Map<u64, (u64, String)>,
}

impl Acceptor {
    pub fn new(
        id: usize,
        rx: Rx<Inbound>,
        sender_tx: Tx<sender::In>,
        log: storage::Log,
        recovered: &storage::Recovered,
    ) -> Self {
        Acceptor {
            id,
            rx,
            sender_tx,
            log,
            minp: recovered.minp.clone(),
            accepted: recovered.accepted.clone(),
        }
    }

    pub async fn run(mut self) {
        while let Some(inbound) = self.rx.recv().await {
            trace!("received {:?}", inbound.message);
            match inbound.message {
            | Message::Propose { sender, instance, proposal } => {
                self.respond_propose(sender, instance, proposal)
            }
            | Message::Write { sender, instance, proposal, value } => {
                self.respond_write(sender, instance, proposal, value)
            }
            | _ => (),
            }
        }
    }

    /// Phase 1: promise not to accept proposals below `proposal`, or NACK
    /// with the promise already standing. Re-promising an already promised
    /// number is idempotent.
    fn respond_propose(&mut self, sender: usize, instance: u64, proposal: u64) {
        if let Some(&minp) = self.minp.get(&instance) {
            if proposal < minp {
                debug!("NACK proposal {} from {} at instance {}, promised {}",
                    proposal, sender, instance, minp);
                self.send_nack(instance, minp);
                return
            }
        }
        self.minp.insert(instance, proposal);
        self.log.append(&storage::Record::Promise { instance, proposal });
        let accepted = self.accepted.get(&instance).cloned();
        debug!("promising {} at instance {} to {}", proposal, instance, sender);
        self.sender_tx.send(sender::In::Broadcast(Message::Promise {
            sender: self.id,
            instance,
            proposal,
            accepted,
        }));
    }

    /// Phase 2: accept the value unless a higher promise stands. Writing
    /// does not raise `minp`; Prepare is the only promise path.
    fn respond_write(&mut self, sender: usize, instance: u64, proposal: u64, value: String) {
        if let Some(&minp) = self.minp.get(&instance) {
            if minp > proposal {
                debug!("NACK write {} from {} at instance {}, promised {}",
                    proposal, sender, instance, minp);
                self.send_nack(instance, minp);
                return
            }
        }
        self.log.append(&storage::Record::Accept {
            instance,
            proposal,
            value: value.clone(),
        });
        self.accepted.insert(instance, (proposal, value.clone()));
        debug!("accepted {} at instance {} from {}", proposal, instance, sender);
        self.sender_tx.send(sender::In::Broadcast(Message::Accept {
            sender: self.id,
            instance,
            proposal,
            value,
        }));
    }

    fn send_nack(&self, instance: u64, proposal: u64) {
        self.sender_tx.send(sender::In::Broadcast(Message::Nack {
            sender: self.id,
            instance,
            proposal,
        }));
    }
}
