use serde::Deserialize;
use serde::Serialize;

#[derive(Serialize, Deserialize)]
pub struct Execution(pub Vec<Command>);

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
#[derive(Clone, Debug)]
pub enum Command {
    /// Start a participant with the given parameters
    Start {
        id: usize,
        count: usize,
    },

    /// Send a write request to the specified participant and print the reply
    Write {
        id: usize,
        instance: u64,
        value: String,
    },

    /// Send a read request to the specified participant and print the reply
    Read {
        id: usize,
        instance: u64,
    },

    /// Kill the specified participant without warning
    Crash {
        id: usize,
    },

    /// Broadcast a shutdown keyword and reap every running participant
    Quit,

    /// Sleep the harness for `ms` milliseconds
    Sleep {
        ms: u64,
    },
}
