use std::ffi::OsString;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use clap::{AppSettings, ErrorKind, Parser};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use amrdrive::arena::{Arena, ArenaKind};
use amrdrive::driver::{self, RunSummary};
use amrdrive::engine::advection::AdvectionEngine;
use amrdrive::error::Error;
use amrdrive::message::comm::Communicator;
use amrdrive::message::local::LocalCommunicator;
use amrdrive::message::tcp::TcpCommunicator;
use amrdrive::parallel::{abort, ProcessGroup};
use amrdrive::parm_parse::ParmParse;
use amrdrive::run_stats::RunStats;




#[derive(Parser)]
#[clap(version = "0.1.0", author = "J. Zrake <jzrake@clemson.edu>")]
#[clap(setting = AppSettings::TrailingVarArg)]
struct Opts {
    /// This process's rank in a multi-process run
    #[clap(long, env = "AMRDRIVE_RANK")]
    rank: Option<usize>,

    /// Comma-separated listening addresses of every rank, indexed by rank
    #[clap(long, env = "AMRDRIVE_PEERS", use_value_delimiter = true)]
    peers: Vec<SocketAddr>,

    /// Number of ranks to run as threads of this process
    #[clap(long, default_value = "1")]
    local_ranks: usize,

    #[clap(long, default_value = "info")]
    log_level: LevelFilter,

    /// The input file of run parameters
    infile: Option<String>,

    /// Parameter definitions overriding the input file
    #[clap(allow_hyphen_values = true)]
    overrides: Vec<String>,
}




/**
 * Parse the command line. The input file must come before any parameter
 * definitions, so a leading `-name` (which clap sees as an unknown option)
 * or a missing input file is a usage error. Help and version requests exit
 * here.
 */
fn parse_args<I, T>(args: I) -> Result<(Opts, String), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let opts = match Opts::try_parse_from(args) {
        Ok(opts) => opts,
        Err(e) if e.kind() == ErrorKind::UnknownArgument => {
            return Err(Error::Usage("input file must be first argument".to_string()))
        }
        Err(e) => e.exit(),
    };
    match opts.infile.clone() {
        Some(infile) if !infile.starts_with('-') => Ok((opts, infile)),
        Some(_) => Err(Error::Usage("input file must be first argument".to_string())),
        None => Err(Error::Usage("no input file given".to_string())),
    }
}

fn run<C: Communicator>(group: &ProcessGroup<C>, infile: &str, overrides: &[String]) -> Result<RunSummary, Error> {
    let pp = ParmParse::from_file_and_args(infile, overrides)?;
    let arena: Arc<dyn Arena> = Arc::from(pp.query_or("fab.arena", ArenaKind::default())?.build());
    let stats = RunStats::new();
    let (rank, size) = (group.rank(), group.size());

    let make_engine = || AdvectionEngine::new(&pp, arena.clone(), stats.clone(), rank, size);
    driver::execute(group, &pp, make_engine, &stats, arena.as_ref(), &mut io::stdout())
}

fn run_rank<C: Communicator>(comm: C, infile: &str, overrides: &[String]) {
    let group = ProcessGroup::start(comm);

    match run(&group, infile, overrides) {
        Ok(summary) => log::info!("rank {} done: {} steps, t = {}", group.rank(), summary.steps, summary.time),
        Err(e) => abort(&e.to_string()),
    }
    group.end();
}




fn main() {
    let program = std::env::args().next().unwrap_or_else(|| "amrdrive".to_string());

    let (opts, infile) = match parse_args(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprint!("{}", driver::usage(&program));
            abort(&e.to_string())
        }
    };

    if let Err(e) = SimpleLogger::new().with_level(opts.log_level).init() {
        eprintln!("could not install logger: {}", e);
    }
    let overrides = opts.overrides;

    if let Some(rank) = opts.rank {
        match TcpCommunicator::connect(rank, opts.peers) {
            Ok(comm) => run_rank(comm, &infile, &overrides),
            Err(e) => abort(&format!("could not start rank {}: {}", rank, e)),
        }
    } else if opts.local_ranks > 1 {
        let handles: Vec<_> = LocalCommunicator::group(opts.local_ranks)
            .into_iter()
            .map(|comm| {
                let infile = infile.clone();
                let overrides = overrides.clone();
                thread::spawn(move || run_rank(comm, &infile, &overrides))
            })
            .collect();

        for handle in handles {
            if handle.join().is_err() {
                abort("a rank thread panicked")
            }
        }
    } else {
        run_rank(LocalCommunicator::serial(), &infile, &overrides)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::parse_args;
    use amrdrive::error::Error;

    #[test]
    fn leading_definition_is_a_usage_error() {
        assert!(matches!(parse_args(&["amrdrive", "-max_step=3"]), Err(Error::Usage(_))));
        assert!(matches!(parse_args(&["amrdrive", "--local-ranks", "2", "-amr.print_tags"]), Err(Error::Usage(_))));
    }

    #[test]
    fn missing_input_file_is_a_usage_error() {
        assert!(matches!(parse_args(&["amrdrive"]), Err(Error::Usage(_))));
    }

    #[test]
    fn definitions_follow_the_input_file() {
        let (opts, infile) = parse_args(&["amrdrive", "--local-ranks", "2", "inputs", "max_step=3", "-amr.print_tags"]).unwrap();
        assert_eq!(infile, "inputs");
        assert_eq!(opts.local_ranks, 2);
        assert_eq!(opts.overrides, vec!["max_step=3", "-amr.print_tags"]);
    }
}
