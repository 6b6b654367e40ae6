use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use handoff_bench::{
    config, write_payload_csv, write_timing_csv, BenchConfig, BenchDriver, LatencySummary,
    Reporter, RunOutcome,
};

pub const DEFAULT_OUTPUT: &str = "timing_data.csv";
pub const SENT_PAYLOADS_FILE: &str = "send_random_numbers.csv";
pub const RECEIVED_PAYLOADS_FILE: &str = "rev_random_numbers.csv";

pub fn register(command: clap::Command) -> clap::Command {
    command
        .arg(
            clap::Arg::new("config")
                .long("config")
                .help("TOML file with the base configuration; flags override it")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::Arg::new("workers")
                .long("workers")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            clap::Arg::new("trials")
                .long("trials")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            clap::Arg::new("payload_size")
                .long("payload-size")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            clap::Arg::new("seed")
                .long("seed")
                .help("seed payload generation; worker i uses seed + i")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            clap::Arg::new("capacity")
                .long("capacity")
                .help("bound the pending set; pushes wait while it is full")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            clap::Arg::new("pop_timeout_ms")
                .long("pop-timeout-ms")
                .help("fail the run if a pop waits longer than this")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            clap::Arg::new("output")
                .long("output")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf))
                .default_value(DEFAULT_OUTPUT),
        )
        .arg(
            clap::Arg::new("summary_json")
                .long("summary-json")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::Arg::new("dump_payloads")
                .long("dump-payloads")
                .help("directory for the last sent and received payload of every worker")
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::Arg::new("track_occupancy")
                .long("track-occupancy")
                .help("report the pending high-water mark; adds work inside every timed round trip")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(clap::ArgAction::SetTrue),
        )
}

/// Builds the run configuration: the `--config` file (or defaults), then
/// every explicit flag on top.
pub fn load_config(args: &clap::ArgMatches) -> anyhow::Result<BenchConfig> {
    let mut bench = match args.get_one::<PathBuf>("config") {
        Some(path) => config::from_path(path.clone())
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => BenchConfig::new(),
    };

    if let Some(workers) = args.get_one::<usize>("workers") {
        bench = bench.workers(*workers);
    }
    if let Some(trials) = args.get_one::<usize>("trials") {
        bench = bench.trials(*trials);
    }
    if let Some(size) = args.get_one::<usize>("payload_size") {
        bench = bench.payload_size(*size);
    }
    if let Some(seed) = args.get_one::<u64>("seed") {
        bench = bench.seed(*seed);
    }
    if let Some(capacity) = args.get_one::<usize>("capacity") {
        bench = bench.capacity(*capacity);
    }
    if let Some(millis) = args.get_one::<u64>("pop_timeout_ms") {
        bench = bench.pop_timeout(Duration::from_millis(*millis));
    }
    if args.get_one::<PathBuf>("dump_payloads").is_some() {
        bench = bench.retain_payloads(true);
    }
    if args.get_flag("track_occupancy") {
        bench = bench.track_occupancy(true);
    }

    bench.validate().context("invalid benchmark configuration")?;
    Ok(bench)
}

pub fn run(args: &clap::ArgMatches) -> anyhow::Result<()> {
    let bench = load_config(args)?;
    let thresholds = bench.get_thresholds().to_vec();

    let outcome = BenchDriver::new(bench)
        .context("failed to prepare the benchmark")?
        .run()
        .context("benchmark run failed")?;

    let report = Reporter::generate("Rendezvous round trip", &outcome, &thresholds);
    let summary = report.summary();

    if let Some(output) = args.get_one::<PathBuf>("output") {
        write_timing(output, &outcome, summary)?;
        tracing::info!(path = %output.display(), "timing data written");
    }

    if let Some(path) = args.get_one::<PathBuf>("summary_json") {
        write_summary_json(path, summary)?;
        tracing::info!(path = %path.display(), "summary written");
    }

    if let Some(directory) = args.get_one::<PathBuf>("dump_payloads") {
        write_payload_dumps(directory, &outcome)?;
        tracing::info!(directory = %directory.display(), "payloads written");
    }

    println!("{report}");
    Ok(())
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn write_timing(path: &Path, outcome: &RunOutcome, summary: &LatencySummary) -> anyhow::Result<()> {
    write_timing_csv(create(path)?, outcome.table(), summary)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_summary_json(path: &Path, summary: &LatencySummary) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(create(path)?, summary)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_payload_dumps(directory: &Path, outcome: &RunOutcome) -> anyhow::Result<()> {
    fs::create_dir_all(directory)
        .with_context(|| format!("failed to create {}", directory.display()))?;

    let sent = directory.join(SENT_PAYLOADS_FILE);
    let sent_payloads = outcome.workers().iter().filter_map(|stats| stats.last_sent.as_ref());
    write_payload_csv(create(&sent)?, sent_payloads)
        .with_context(|| format!("failed to write {}", sent.display()))?;

    let received = directory.join(RECEIVED_PAYLOADS_FILE);
    let received_payloads = outcome
        .workers()
        .iter()
        .filter_map(|stats| stats.last_received.as_ref());
    write_payload_csv(create(&received)?, received_payloads)
        .with_context(|| format!("failed to write {}", received.display()))
}
