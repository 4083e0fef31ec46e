use std::fmt;
use std::net::SocketAddr;

/// One parsed datagram plus the address it arrived from. Replies to clients
/// go back to `from`; everything else is broadcast to the group.
#[derive(Clone, Debug)]
pub struct Inbound {
    pub from: SocketAddr,
    pub message: Message,
}

/// Every message the participant understands, in the order the protocol
/// uses them. Fields mirror the wire grammar: S = sender ID, I = instance,
/// P = proposal number, V = opaque value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// `Request I V` from a client. An empty value is a read.
    Request { instance: u64, value: String },

    /// `S Propose I P` from a leader opening Phase 1.
    Propose { sender: usize, instance: u64, proposal: u64 },

    /// `S Promise I P [Pv V]` from an acceptor, optionally reporting the
    /// most recently accepted pair for the instance.
    Promise { sender: usize, instance: u64, proposal: u64, accepted: Option<(u64, String)> },

    /// `S Write I P V` from a leader binding a value in Phase 2.
    Write { sender: usize, instance: u64, proposal: u64, value: String },

    /// `S Accept I P V` from an acceptor recording durable agreement.
    Accept { sender: usize, instance: u64, proposal: u64, value: String },

    /// `S NACK I P` from an acceptor, carrying its current minimum
    /// proposal so the leader can catch up.
    Nack { sender: usize, instance: u64, proposal: u64 },

    /// `S OK I V` reply to a client.
    Ok { sender: usize, instance: u64, value: String },

    /// `BUSY` reply to a client whose request found a full backlog.
    Busy,

    /// `quit`, `exit`, or `bye` on the control path.
    Shutdown,
}

/// Parse one datagram payload. Returns `None` for empty payloads and for
/// keywords no worker recognizes; the receiver drops both.
///
/// Values run to the end of the payload, so they may contain internal
/// whitespace (normalized to single spaces).
pub fn parse(payload: &str) -> Option<Message> {
    let fields = payload.split_whitespace().collect::<Vec<_>>();
    let (first, rest) = fields.split_first()?;

    match *first {
    | "Request" => {
        let instance = rest.first()?.parse().ok()?;
        Some(Message::Request { instance, value: rest[1..].join(" ") })
    }
    | "BUSY" => Some(Message::Busy),
    | "quit" | "exit" | "bye" => Some(Message::Shutdown),
    | _ => {
        let sender = first.parse().ok()?;
        let keyword = *rest.first()?;
        let instance = rest.get(1)?.parse().ok()?;
        match keyword {
        | "Propose" => {
            let proposal = rest.get(2)?.parse().ok()?;
            Some(Message::Propose { sender, instance, proposal })
        }
        | "Promise" => {
            let proposal = rest.get(2)?.parse().ok()?;
            let accepted = match rest.get(3) {
            | Some(vp) => Some((vp.parse().ok()?, rest[4..].join(" "))),
            | None => None,
            };
            Some(Message::Promise { sender, instance, proposal, accepted })
        }
        | "Write" => {
            let proposal = rest.get(2)?.parse().ok()?;
            Some(Message::Write { sender, instance, proposal, value: rest[3..].join(" ") })
        }
        | "Accept" => {
            let proposal = rest.get(2)?.parse().ok()?;
            Some(Message::Accept { sender, instance, proposal, value: rest[3..].join(" ") })
        }
        | "NACK" => {
            let proposal = rest.get(2)?.parse().ok()?;
            Some(Message::Nack { sender, instance, proposal })
        }
        | "OK" => Some(Message::Ok { sender, instance, value: rest[2..].join(" ") }),
        | _ => None,
        }
    }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
        | Message::Request { instance, value } if value.is_empty() => {
            write!(f, "Request {}", instance)
        }
        | Message::Request { instance, value } => {
            write!(f, "Request {} {}", instance, value)
        }
        | Message::Propose { sender, instance, proposal } => {
            write!(f, "{} Propose {} {}", sender, instance, proposal)
        }
        | Message::Promise { sender, instance, proposal, accepted: None } => {
            write!(f, "{} Promise {} {}", sender, instance, proposal)
        }
        | Message::Promise { sender, instance, proposal, accepted: Some((vp, value)) } => {
            write!(f, "{} Promise {} {} {} {}", sender, instance, proposal, vp, value)
        }
        | Message::Write { sender, instance, proposal, value } => {
            write!(f, "{} Write {} {} {}", sender, instance, proposal, value)
        }
        | Message::Accept { sender, instance, proposal, value } => {
            write!(f, "{} Accept {} {} {}", sender, instance, proposal, value)
        }
        | Message::Nack { sender, instance, proposal } => {
            write!(f, "{} NACK {} {}", sender, instance, proposal)
        }
        | Message::Ok { sender, instance, value } => {
            write!(f, "{} OK {} {}", sender, instance, value)
        }
        | Message::Busy => write!(f, "BUSY"),
        | Message::Shutdown => write!(f, "quit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_write_request() {
        assert_eq!(
            parse("Request 1 hello"),
            Some(Message::Request { instance: 1, value: "hello".to_string() }),
        );
    }

    #[test]
    fn parse_read_request() {
        assert_eq!(
            parse("Request 99"),
            Some(Message::Request { instance: 99, value: String::new() }),
        );
    }

    #[test]
    fn parse_value_with_spaces() {
        assert_eq!(
            parse("0 Write 1 0 hello distributed world"),
            Some(Message::Write {
                sender: 0,
                instance: 1,
                proposal: 0,
                value: "hello distributed world".to_string(),
            }),
        );
    }

    #[test]
    fn parse_promise_with_and_without_history() {
        assert_eq!(
            parse("2 Promise 5 7"),
            Some(Message::Promise { sender: 2, instance: 5, proposal: 7, accepted: None }),
        );
        assert_eq!(
            parse("2 Promise 5 7 4 old"),
            Some(Message::Promise {
                sender: 2,
                instance: 5,
                proposal: 7,
                accepted: Some((4, "old".to_string())),
            }),
        );
    }

    #[test]
    fn parse_control_keywords() {
        assert_eq!(parse("quit"), Some(Message::Shutdown));
        assert_eq!(parse("exit"), Some(Message::Shutdown));
        assert_eq!(parse("bye now"), Some(Message::Shutdown));
    }

    #[test]
    fn parse_rejects_junk() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   "), None);
        assert_eq!(parse("Frobnicate 1 2"), None);
        assert_eq!(parse("0 Frobnicate 1 2"), None);
        assert_eq!(parse("x Propose 1 2"), None);
        assert_eq!(parse("0 Propose one 2"), None);
    }

    #[test]
    fn display_matches_grammar() {
        let nack = Message::Nack { sender: 1, instance: 3, proposal: 8 };
        assert_eq!(nack.to_string(), "1 NACK 3 8");

        let read = Message::Request { instance: 9, value: String::new() };
        assert_eq!(read.to_string(), "Request 9");

        let promise = Message::Promise {
            sender: 0,
            instance: 2,
            proposal: 6,
            accepted: Some((3, "v".to_string())),
        };
        assert_eq!(parse(&promise.to_string()), Some(promise));
    }
}
