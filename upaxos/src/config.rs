use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time;

use log::debug;
use log::info;
use log::trace;
use log::warn;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;

use crate::internal;
use crate::message;
use crate::storage;
use crate::thread;

/// Maximum datagram payload in octets.
pub const MAX_PAYLOAD: usize = 9999;

/// Default port for participant 0; participant k listens at `PORT_BASE + k`.
const PORT_BASE: u16 = 9800;

/// Depth of each worker's inbound queue. Overflow means a worker is stuck
/// and is reported as an internal error.
const QUEUE_DEPTH: usize = 256;

#[derive(Clone, Debug)]
pub struct Config {
    /// Unique participant ID
    id: usize,

    /// Total number of participants
    count: usize,

    /// Well-known endpoints of all participants, indexed by ID
    group: Vec<SocketAddr>,

    /// Directory holding the recovery log
    log_dir: PathBuf,

    /// Optional cap on total outbound transmissions
    max_sends: Option<u64>,

    /// Interval between leader progress log lines
    tick: time::Duration,
}

impl Config {
    pub fn new(id: usize, count: usize) -> Self {
        let group = (0..count)
            .map(|k| SocketAddr::from(([127, 0, 0, 1], PORT_BASE + k as u16)))
            .collect();
        Config {
            id,
            count,
            group,
            log_dir: PathBuf::from("."),
            max_sends: None,
            tick: time::Duration::from_secs(1),
        }
    }

    /// Replace the default loopback topology. One endpoint per
    /// participant, in ID order.
    pub fn with_group(mut self, group: Vec<SocketAddr>) -> Self {
        self.group = group;
        self
    }

    pub fn with_log_dir<P: Into<PathBuf>>(mut self, log_dir: P) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_max_sends(mut self, max_sends: u64) -> Self {
        self.max_sends = Some(max_sends);
        self
    }

    pub fn with_tick(mut self, tick: time::Duration) -> Self {
        self.tick = tick;
        self
    }

    fn log_path(&self) -> PathBuf {
        storage::path_for(&self.log_dir, self.id)
    }

    /// Run the participant until a control message arrives. Replays the
    /// recovery log, binds the well-known endpoint, spawns the role
    /// workers, and fans every inbound datagram out to them.
    pub async fn run(self) -> io::Result<()> {
        if self.count == 0 || self.id >= self.count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("id {} outside group of {}", self.id, self.count),
            ))
        }
        if self.group.len() != self.count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} endpoints for {} participants", self.group.len(), self.count),
            ))
        }

        let recovered = storage::replay(self.log_path())?;
        if !recovered.minp.is_empty() || !recovered.decided.is_empty() {
            info!("recovered {} promised and {} decided instances",
                recovered.minp.len(), recovered.decided.len());
        }
        let log = storage::Log::open(self.log_path())?;

        let socket = Arc::new(UdpSocket::bind(self.group[self.id]).await?);
        info!("participant {} of {} listening at {}", self.id, self.count, self.group[self.id]);

        let (sender_tx, sender_rx) = internal::channel(QUEUE_DEPTH);
        let (leader_tx, leader_rx) = internal::channel(QUEUE_DEPTH);
        let (acceptor_tx, acceptor_rx) = internal::channel(QUEUE_DEPTH);
        let (learner_tx, learner_rx) = internal::channel(QUEUE_DEPTH);
        let (control_tx, control_rx) = internal::channel(QUEUE_DEPTH);

        let sender = thread::sender::Sender::new(
            socket.clone(),
            self.group.clone(),
            sender_rx,
            self.max_sends,
        );
        let leader = thread::leader::Leader::new(
            self.id,
            self.count,
            leader_rx,
            sender_tx.clone(),
            self.tick,
        );
        let acceptor = thread::acceptor::Acceptor::new(
            self.id,
            acceptor_rx,
            sender_tx.clone(),
            log.clone(),
            &recovered,
        );
        let learner = thread::learner::Learner::new(
            self.id,
            self.count,
            learner_rx,
            sender_tx.clone(),
            log,
            &recovered,
        );
        let control = thread::control::Control::new(control_rx);

        let mut workers = JoinSet::new();
        workers.spawn(sender.run());
        workers.spawn(leader.run());
        workers.spawn(acceptor.run());
        workers.spawn(learner.run());
        let mut control_handle = tokio::spawn(control.run());

        // The workers hold their own clones of the sender channel; ours
        // must go so the sender can drain and exit once they do.
        drop(sender_tx);

        let mut buffer = [0u8; MAX_PAYLOAD];
        loop {
            tokio::select! {
                _ = &mut control_handle => break,
                finished = workers.join_next() => {
                    // No worker finishes while its queue is still open; an
                    // early exit is a panic, and a panicked acceptor must
                    // take the whole participant down.
                    return match finished {
                    | Some(Err(error)) => Err(io::Error::new(io::ErrorKind::Other, error)),
                    | _ => Err(io::Error::new(io::ErrorKind::Other, "worker stopped unexpectedly")),
                    }
                }
                received = socket.recv_from(&mut buffer) => {
                    let (length, from) = match received {
                    | Ok(received) => received,
                    | Err(error) => {
                        warn!("failed to receive: {}", error);
                        continue
                    }
                    };
                    let payload = match std::str::from_utf8(&buffer[..length]) {
                    | Ok(payload) => payload,
                    | Err(_) => {
                        debug!("dropping non-ASCII datagram from {}", from);
                        continue
                    }
                    };
                    let parsed = match message::parse(payload) {
                    | Some(parsed) => parsed,
                    | None => {
                        if !payload.trim().is_empty() {
                            debug!("ignoring {:?} from {}", payload, from);
                        }
                        continue
                    }
                    };
                    trace!("received {:?} from {}", parsed, from);
                    let inbound = message::Inbound { from, message: parsed };
                    leader_tx.send(inbound.clone());
                    acceptor_tx.send(inbound.clone());
                    learner_tx.send(inbound.clone());
                    control_tx.send(inbound);
                }
            }
        }

        // Graceful shutdown: stop feeding the roles and let each drain its
        // queue to completion.
        drop(leader_tx);
        drop(acceptor_tx);
        drop(learner_tx);
        drop(control_tx);
        while let Some(finished) = workers.join_next().await {
            finished.map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
        }
        info!("participant {} stopped", self.id);
        Ok(())
    }
}
