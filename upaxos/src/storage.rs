use std::collections::HashMap as Map;
use std::fmt;
use std::fs;
use std::io;
use std::io::BufRead;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

/// One durable fact. Each record is a single newline-terminated ASCII line
/// so the log stays inspectable with ordinary text tools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Promise { instance: u64, proposal: u64 },
    Accept { instance: u64, proposal: u64, value: String },
    Learn { instance: u64, value: String },
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
        | Record::Promise { instance, proposal } => {
            write!(f, "promise {} {}", instance, proposal)
        }
        | Record::Accept { instance, proposal, value } => {
            write!(f, "accept {} {} {}", instance, proposal, value)
        }
        | Record::Learn { instance, value } => {
            write!(f, "learn {} {}", instance, value)
        }
        }
    }
}

fn parse(line: &str) -> Option<Record> {
    let fields = line.split_whitespace().collect::<Vec<_>>();
    let (keyword, rest) = fields.split_first()?;
    let instance = rest.first()?.parse().ok()?;
    match *keyword {
    | "promise" => {
        let proposal = rest.get(1)?.parse().ok()?;
        Some(Record::Promise { instance, proposal })
    }
    | "accept" => {
        let proposal = rest.get(1)?.parse().ok()?;
        Some(Record::Accept { instance, proposal, value: rest[2..].join(" ") })
    }
    | "learn" => Some(Record::Learn { instance, value: rest[1..].join(" ") }),
    | _ => None,
    }
}

/// Recovery log file name for the given participant.
pub fn path_for(directory: &Path, id: usize) -> PathBuf {
    directory.join(format!("upaxos-{:>02}.log", id))
}

/// Append-only handle to the participant's recovery log. The acceptor and
/// learner each hold a clone; appends interleave lines but never truncate.
#[derive(Clone)]
pub struct Log(Arc<Mutex<fs::File>>);

impl Log {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut options = fs::OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        options.open(path).map(Mutex::new).map(Arc::new).map(Log)
    }

    /// Durably append one record. The write and fsync complete before this
    /// returns, so callers may hand the corresponding outbound message to
    /// the sender as soon as the call finishes.
    ///
    /// Panics on failure: continuing without durability would let a peer
    /// decide on a fact this participant no longer remembers.
    pub fn append(&self, record: &Record) {
        let mut file = self.0.lock();
        writeln!(file, "{}", record)
            .and_then(|()| file.sync_data())
            .expect("[STORAGE ERROR]: could not append to recovery log");
    }
}

/// In-memory projection of the recovery log, handed to the acceptor and
/// learner at start.
#[derive(Clone, Debug, Default)]
pub struct Recovered {
    /// Largest promised proposal per instance.
    pub minp: Map<u64, u64>,

    /// Largest-proposal accepted pair per instance.
    pub accepted: Map<u64, (u64, String)>,

    /// Learned decisions per instance.
    pub decided: Map<u64, String>,
}

/// Replay the log once from the beginning. A missing file is a fresh
/// participant; an unparsable line (a torn write from a crash) ends the
/// useful prefix and is skipped with a warning.
pub fn replay<P: AsRef<Path>>(path: P) -> io::Result<Recovered> {
    let file = match fs::File::open(&path) {
    | Ok(file) => file,
    | Err(error) if error.kind() == io::ErrorKind::NotFound => {
        return Ok(Recovered::default())
    }
    | Err(error) => return Err(error),
    };

    let mut recovered = Recovered::default();
    for line in io::BufReader::new(file).lines() {
        let line = line?;
        let record = match parse(&line) {
        | Some(record) => record,
        | None => {
            warn!("skipping unparsable log line {:?}", line);
            continue
        }
        };
        match record {
        | Record::Promise { instance, proposal } => {
            let minp = recovered.minp.entry(instance).or_insert(proposal);
            *minp = std::cmp::max(*minp, proposal);
        }
        | Record::Accept { instance, proposal, value } => {
            match recovered.accepted.get(&instance) {
            | Some((existing, _)) if *existing > proposal => (),
            | _ => {
                recovered.accepted.insert(instance, (proposal, value));
            }
            }
        }
        | Record::Learn { instance, value } => {
            recovered.decided.insert(instance, value);
        }
        }
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_of_missing_file_is_empty() {
        let directory = tempfile::tempdir().unwrap();
        let recovered = replay(path_for(directory.path(), 0)).unwrap();
        assert!(recovered.minp.is_empty());
        assert!(recovered.accepted.is_empty());
        assert!(recovered.decided.is_empty());
    }

    #[test]
    fn replay_projects_logged_facts() {
        let directory = tempfile::tempdir().unwrap();
        let path = path_for(directory.path(), 1);

        let log = Log::open(&path).unwrap();
        log.append(&Record::Promise { instance: 5, proposal: 2 });
        log.append(&Record::Accept { instance: 5, proposal: 2, value: "v".to_string() });
        log.append(&Record::Learn { instance: 5, value: "v".to_string() });
        drop(log);

        let recovered = replay(&path).unwrap();
        assert_eq!(recovered.minp.get(&5), Some(&2));
        assert_eq!(recovered.accepted.get(&5), Some(&(2, "v".to_string())));
        assert_eq!(recovered.decided.get(&5), Some(&"v".to_string()));
    }

    #[test]
    fn replay_keeps_the_largest_promise_and_accept() {
        let directory = tempfile::tempdir().unwrap();
        let path = path_for(directory.path(), 2);

        let log = Log::open(&path).unwrap();
        log.append(&Record::Promise { instance: 1, proposal: 4 });
        log.append(&Record::Promise { instance: 1, proposal: 7 });
        log.append(&Record::Accept { instance: 1, proposal: 7, value: "new".to_string() });
        log.append(&Record::Accept { instance: 1, proposal: 4, value: "old".to_string() });
        drop(log);

        // The later accept line carries a smaller proposal: a reordered
        // duplicate, not a newer fact.
        let recovered = replay(&path).unwrap();
        assert_eq!(recovered.minp.get(&1), Some(&7));
        assert_eq!(recovered.accepted.get(&1), Some(&(7, "new".to_string())));
    }

    #[test]
    fn replay_survives_a_torn_tail() {
        let directory = tempfile::tempdir().unwrap();
        let path = path_for(directory.path(), 3);

        let log = Log::open(&path).unwrap();
        log.append(&Record::Promise { instance: 9, proposal: 3 });
        drop(log);
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut file| std::io::Write::write_all(&mut file, b"promise 10"))
            .unwrap();

        let recovered = replay(&path).unwrap();
        assert_eq!(recovered.minp.get(&9), Some(&3));
        assert_eq!(recovered.minp.get(&10), None);
    }

    #[test]
    fn appended_values_may_contain_spaces() {
        let directory = tempfile::tempdir().unwrap();
        let path = path_for(directory.path(), 4);

        let log = Log::open(&path).unwrap();
        log.append(&Record::Learn { instance: 2, value: "two words".to_string() });
        drop(log);

        let recovered = replay(&path).unwrap();
        assert_eq!(recovered.decided.get(&2), Some(&"two words".to_string()));
    }
}
