//! # Summary
//!
//! This module defines the `Leader` worker, which drives client writes
//! through Phase-1 (Prepare) and Phase-2 (Write) rounds, one instance at a
//! time. Competing leaders are resolved through NACKs and snooped
//! Promises: whenever a higher proposal number surfaces anywhere, the
//! leader deterministically bumps its own number past it within its
//! residue class and retries.

use std::collections::HashSet as Set;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time;

use log::debug;
use log::info;
use log::trace;

use crate::internal::Rx;
use crate::internal::Tx;
use crate::message::Inbound;
use crate::message::Message;
use crate::thread::sender;

/// Bound on queued client writes; an eleventh concurrent request is BUSY.
const BACKLOG: usize = 10;

/// One client write waiting to be committed.
#[derive(Clone, Debug)]
struct Request {
    /// Address to send the eventual OK to
    from: SocketAddr,

    /// Value the client wants written
    value: String,
}

pub struct Leader {
    /// Unique ID of this participant; also the proposal residue
    id: usize,

    /// Total number of participants
    count: usize,

    /// Intra-participant receiving channel
    rx: Rx<Inbound>,

    /// Sender transmitting channel
    sender_tx: Tx<sender::In>,

    /// Instance currently being driven
    instance: u64,

    /// Last proposal number sent; always `id` modulo `count`
    lastp: u64,

    /// Acceptors that promised this round
    promised: Set<usize>,

    /// Acceptors that accepted this round
    accepted: Set<usize>,

    /// Highest previously-accepted pair reported by a promise this round;
    /// once present, its value is mandatory for our Write
    adopted: Option<(u64, String)>,

    /// Value bound by our outstanding Write, if Phase 2 has started
    writing: Option<String>,

    /// Client request currently in flight
    inflight: Option<Request>,

    /// Pending client requests, oldest first
    backlog: VecDeque<Request>,

    /// Interval between progress log lines
    tick: time::Duration,
}

impl Leader {
    pub fn new(
        id: usize,
        count: usize,
        rx: Rx<Inbound>,
        sender_tx: Tx<sender::In>,
        tick: time::Duration,
    ) -> Self {
        Leader {
            id,
            count,
            rx,
            sender_tx,
            instance: 1,
            lastp: id as u64,
            promised: Set::default(),
            accepted: Set::default(),
            adopted: None,
            writing: None,
            inflight: None,
            backlog: VecDeque::new(),
            tick,
        }
    }

    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => self.log_progress(),
                inbound = self.rx.recv() => match inbound {
                    Some(inbound) => self.respond(inbound),
                    None => break,
                },
            }
        }
    }

    fn respond(&mut self, inbound: Inbound) {
        trace!("received {:?}", inbound.message);
        match inbound.message {
        | Message::Request { instance: _, value } if !value.is_empty() => {
            self.respond_request(inbound.from, value)
        }
        | Message::Promise { sender, instance, proposal, accepted } => {
            self.respond_promise(sender, instance, proposal, accepted)
        }
        | Message::Accept { sender, instance, proposal, value } => {
            self.respond_accept(sender, instance, proposal, value)
        }
        | Message::Nack { sender, instance, proposal } => {
            self.respond_nack(sender, instance, proposal)
        }
        | _ => (),
        }
    }

    /// Adopt a client write, queue it behind the one in flight, or turn it
    /// away. Reads never reach this path; the learner owns them.
    fn respond_request(&mut self, from: SocketAddr, value: String) {
        if self.inflight.is_none() {
            self.inflight = Some(Request { from, value });
            self.propose();
        } else if self.backlog.len() < BACKLOG {
            debug!("queueing request behind {} pending", self.backlog.len());
            self.backlog.push_back(Request { from, value });
        } else {
            debug!("backlog full, replying BUSY");
            self.sender_tx.send(sender::In::To(from, Message::Busy));
        }
    }

    /// Collect promises for the current round. A promise for a later
    /// instance or a higher proposal means another leader got ahead of us:
    /// catch up and retry rather than wait for an explicit NACK.
    fn respond_promise(
        &mut self,
        sender: usize,
        instance: u64,
        proposal: u64,
        accepted: Option<(u64, String)>,
    ) {
        if self.inflight.is_none() {
            return
        }
        if instance != self.instance {
            if instance > self.instance {
                debug!("snooped promise at instance {}, catching up from {}",
                    instance, self.instance);
                self.instance = instance;
                self.bump_past(proposal);
                self.propose();
            }
            return
        }
        if proposal < self.lastp {
            debug!("ignoring stale promise {} below {}", proposal, self.lastp);
            return
        }
        if proposal > self.lastp {
            debug!("snooped promise {} above our {}, backing off", proposal, self.lastp);
            self.bump_past(proposal);
            self.propose();
            return
        }

        // An acceptor that already accepted a value binds us to the
        // highest-proposal such value for this instance.
        if let Some((vp, value)) = accepted {
            match &self.adopted {
            | Some((seen, _)) if *seen >= vp => (),
            | _ => self.adopted = Some((vp, value)),
            }
        }

        self.promised.insert(sender);
        if self.promised.len() == self.quorum() {
            let value = match &self.adopted {
            | Some((_, value)) => value.clone(),
            | None => match &self.inflight {
                | Some(request) => request.value.clone(),
                | None => unreachable!(),
            },
            };
            info!("writing {:?} at instance {} with proposal {}",
                value, self.instance, self.lastp);
            self.writing = Some(value.clone());
            self.sender_tx.send(sender::In::Broadcast(Message::Write {
                sender: self.id,
                instance: self.instance,
                proposal: self.lastp,
                value,
            }));
        }
    }

    /// Collect accepts for our outstanding Write. A quorum decides the
    /// instance; whether the decided value was ours or one we inherited
    /// determines whether the client is done or we go around again.
    fn respond_accept(&mut self, sender: usize, instance: u64, proposal: u64, value: String) {
        if self.inflight.is_none()
        || self.writing.as_ref() != Some(&value)
        || instance != self.instance
        || proposal != self.lastp {
            return
        }

        self.accepted.insert(sender);
        if self.accepted.len() < self.quorum() {
            return
        }

        let request = match self.inflight.take() {
        | Some(request) => request,
        | None => unreachable!(),
        };
        if value == request.value {
            info!("committed {:?} at instance {}", value, self.instance);
            self.sender_tx.send(sender::In::To(request.from, Message::Ok {
                sender: self.id,
                instance: self.instance,
                value,
            }));
            self.inflight = self.backlog.pop_front();
        } else {
            // The slot went to an inherited value; the client's write is
            // still owed a slot of its own.
            debug!("instance {} decided {:?}, re-proposing client value",
                self.instance, value);
            self.inflight = Some(request);
        }

        self.instance += 1;
        if self.inflight.is_some() {
            self.propose();
        } else {
            self.clear_round();
        }
    }

    /// React to an acceptor that rejected us: adopt its instance and bump
    /// past its promise floor, then retry the in-flight request.
    fn respond_nack(&mut self, sender: usize, instance: u64, proposal: u64) {
        if instance <= self.instance && proposal <= self.lastp {
            return
        }
        debug!("NACK from {}: instance {}, minimum proposal {}", sender, instance, proposal);
        if instance > self.instance {
            self.instance = instance;
        }
        if proposal > self.lastp {
            self.bump_past(proposal);
        }
        if self.inflight.is_some() {
            self.propose();
        }
    }

    /// Open a fresh Phase-1 round for the current instance.
    fn propose(&mut self) {
        self.clear_round();
        info!("proposing {} at instance {}", self.lastp, self.instance);
        self.sender_tx.send(sender::In::Broadcast(Message::Propose {
            sender: self.id,
            instance: self.instance,
            proposal: self.lastp,
        }));
    }

    fn clear_round(&mut self) {
        self.promised.clear();
        self.accepted.clear();
        self.adopted = None;
        self.writing = None;
    }

    /// Jump to the next block of proposal numbers above `proposal`, staying
    /// in this participant's residue class. Never moves backwards.
    fn bump_past(&mut self, proposal: u64) {
        let count = self.count as u64;
        let next = (proposal / count + 1) * count + self.id as u64;
        self.lastp = std::cmp::max(self.lastp, next);
    }

    fn quorum(&self) -> usize {
        self.count / 2 + 1
    }

    fn log_progress(&self) {
        if self.inflight.is_some() {
            info!("instance {}, proposal {}, {} promised, {} accepted, {} queued",
                self.instance,
                self.lastp,
                self.promised.len(),
                self.accepted.len(),
                self.backlog.len());
        } else {
            trace!("idle at instance {}, proposal {}", self.instance, self.lastp);
        }
    }
}
