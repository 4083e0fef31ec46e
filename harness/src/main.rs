//! Scenario driver for a upaxos group. Reads a JSON execution script,
//! spawns participant processes, and pokes them with client datagrams,
//! printing whatever they answer. Example script:
//!
//! ```json
//! [
//!     { "type": "Start", "id": 0, "count": 1 },
//!     { "type": "Sleep", "ms": 200 },
//!     { "type": "Write", "id": 0, "instance": 1, "value": "hello" },
//!     { "type": "Read", "id": 0, "instance": 1 },
//!     { "type": "Quit" }
//! ]
//! ```

use std::collections::HashMap as Map;
use std::net::SocketAddr;
use std::net::UdpSocket;
use std::time::Duration;

use log::warn;
use structopt::StructOpt;

mod command;

use crate::command::Command;
use crate::command::Execution;

#[derive(StructOpt)]
#[structopt(name = "harness")]
struct Opt {
    /// Path to the upaxos binary
    #[structopt(short = "s", long = "server")]
    server: std::path::PathBuf,

    /// Path to the JSON execution script
    #[structopt(short = "f", long = "file")]
    file: std::path::PathBuf,
}

/// Default port of participant 0; participant k listens at `PORT_BASE + k`.
/// Matches the participant's own default topology.
const PORT_BASE: u16 = 9800;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let opt = Opt::from_args();

    let execution: Execution = std::fs::File::open(&opt.file)
        .map(serde_json::from_reader)??;

    let address = |id: usize| SocketAddr::from(([127, 0, 0, 1], PORT_BASE + id as u16));

    let socket = UdpSocket::bind("127.0.0.1:0")?;
    socket.set_read_timeout(Some(Duration::from_secs(2)))?;

    // Running participants
    let mut servers: Map<usize, std::process::Child> = Map::default();

    for command in execution.0 {
        match command {
        | Command::Start { id, count } => {
            let child = std::process::Command::new(&opt.server)
                .args(["-i", &id.to_string()])
                .args(["-n", &count.to_string()])
                .spawn()?;
            servers.insert(id, child);
        }
        | Command::Write { id, instance, value } => {
            let payload = format!("Request {} {}", instance, value);
            print_reply(&socket, address(id), &payload)?;
        }
        | Command::Read { id, instance } => {
            let payload = format!("Request {}", instance);
            print_reply(&socket, address(id), &payload)?;
        }
        | Command::Crash { id } => {
            if let Some(mut server) = servers.remove(&id) {
                server.kill().ok();
                server.wait().ok();
            }
        }
        | Command::Quit => {
            for id in servers.keys() {
                socket.send_to(b"quit", address(*id))?;
            }
            for (_, mut server) in servers.drain() {
                server.wait().ok();
            }
        }
        | Command::Sleep { ms } => {
            std::thread::sleep(Duration::from_millis(ms));
        }
        }
    }

    Ok(())
}

/// Send one request datagram and print the reply, if any arrives before
/// the read timeout. Replies are re-parsed with the participant's own
/// grammar so garbage shows up loudly.
fn print_reply(
    socket: &UdpSocket,
    address: SocketAddr,
    payload: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(payload.as_bytes(), address)?;
    let mut buffer = [0u8; upaxos::MAX_PAYLOAD];
    match socket.recv_from(&mut buffer) {
    | Ok((length, from)) => {
        let reply = String::from_utf8_lossy(&buffer[..length]);
        match upaxos::message::parse(&reply) {
        | Some(message) => println!("{} replied: {}", from, message),
        | None => warn!("unparsable reply {:?} from {}", reply, from),
        }
    }
    | Err(error)
        if error.kind() == std::io::ErrorKind::WouldBlock
        || error.kind() == std::io::ErrorKind::TimedOut =>
    {
        println!("no reply to {:?}", payload)
    }
    | Err(error) => return Err(Box::new(error)),
    }
    Ok(())
}
