//! # Summary
//!
//! This module defines the `Sender` worker, which owns the outbound half
//! of the participant's socket. One datagram per destination, no retry,
//! no fragmentation: the protocol tolerates loss, so the cheapest possible
//! transmit is the correct one.

use std::net::SocketAddr;
use std::sync::Arc;

use log::trace;
use log::warn;
use tokio::net::UdpSocket;

use crate::config;
use crate::internal::Rx;
use crate::message::Message;

/// Senders receive transmit orders from every other worker.
#[derive(Clone, Debug)]
pub enum In {
    /// Serialize once and transmit to every group endpoint. The local
    /// endpoint is part of the group, so our own roles hear it too.
    Broadcast(Message),

    /// Reply directly to a client address.
    To(SocketAddr, Message),
}

pub struct Sender {
    /// Shared socket; the receive half stays with the receiver loop
    socket: Arc<UdpSocket>,

    /// Well-known endpoints of all participants, indexed by ID
    group: Vec<SocketAddr>,

    /// Intra-participant receiving channel
    rx: Rx<In>,

    /// Datagrams transmitted so far
    sent: u64,

    /// Cap on total transmissions; a debug valve against feedback storms
    max_sends: Option<u64>,
}

impl Sender {
    pub fn new(
        socket: Arc<UdpSocket>,
        group: Vec<SocketAddr>,
        rx: Rx<In>,
        max_sends: Option<u64>,
    ) -> Self {
        Sender {
            socket,
            group,
            rx,
            sent: 0,
            max_sends,
        }
    }

    pub async fn run(mut self) {
        while let Some(order) = self.rx.recv().await {
            match order {
            | In::Broadcast(message) => {
                let payload = message.to_string();
                if self.oversized(&payload) {
                    continue
                }
                trace!("broadcasting {:?}", payload);
                for k in 0..self.group.len() {
                    let address = self.group[k];
                    self.transmit(&payload, address).await;
                }
            }
            | In::To(address, message) => {
                let payload = message.to_string();
                if self.oversized(&payload) {
                    continue
                }
                trace!("sending {:?} to {}", payload, address);
                self.transmit(&payload, address).await;
            }
            }
        }
    }

    async fn transmit(&mut self, payload: &str, address: SocketAddr) {
        if let Some(limit) = self.max_sends {
            if self.sent >= limit {
                warn!("send limit {} reached, dropping datagram to {}", limit, address);
                return
            }
        }
        self.sent += 1;
        // Datagram loss is protocol-benign; the peer NACKs or the client
        // retries.
        if let Err(error) = self.socket.send_to(payload.as_bytes(), address).await {
            warn!("failed to send to {}: {}", address, error);
        }
    }

    fn oversized(&self, payload: &str) -> bool {
        if payload.len() > config::MAX_PAYLOAD {
            warn!("dropping {}-octet payload over datagram limit", payload.len());
            return true
        }
        false
    }
}
