use std::io::BufRead;

use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "upaxos")]
struct Opt {
    /// Unique participant ID (0 <= id < count)
    #[structopt(short = "i", long = "id")]
    id: usize,

    /// Total number of participants in the group
    #[structopt(short = "n", long = "count")]
    count: usize,

    /// File listing one participant endpoint per line, in ID order
    #[structopt(long = "peers")]
    peers: Option<std::path::PathBuf>,

    /// Directory for the recovery log
    #[structopt(long = "log-dir", default_value = ".")]
    log_dir: std::path::PathBuf,

    /// Cap on total outbound transmissions (debug valve)
    #[structopt(long = "max-sends")]
    max_sends: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut config = upaxos::Config::new(opt.id, opt.count).with_log_dir(opt.log_dir);
    if let Some(path) = opt.peers {
        config = config.with_group(group(&path)?);
    }
    if let Some(limit) = opt.max_sends {
        config = config.with_max_sends(limit);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(config.run())?;
    Ok(())
}

/// Read the group topology from a peers file: one `address:port` per
/// non-empty line, line k belonging to participant k.
fn group(path: &std::path::Path) -> Result<Vec<std::net::SocketAddr>, Box<dyn std::error::Error>> {
    let file = std::fs::File::open(path)?;
    let mut group = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue
        }
        group.push(line.parse()?);
    }
    Ok(group)
}
