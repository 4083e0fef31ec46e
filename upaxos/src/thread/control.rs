use log::info;

use crate::internal::Rx;
use crate::message::Inbound;
use crate::message::Message;

/// Watches the inbound stream for a shutdown keyword. Resolving is the
/// signal the receiver loop uses to stop the participant.
pub struct Control {
    rx: Rx<Inbound>,
}

impl Control {
    pub fn new(rx: Rx<Inbound>) -> Self {
        Control { rx }
    }

    pub async fn run(mut self) {
        while let Some(inbound) = self.rx.recv().await {
            match inbound.message {
            | Message::Shutdown => {
                info!("shutdown requested by {}", inbound.from);
                return
            }
            | _ => (),
            }
        }
    }
}
