mod cli;

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> anyhow::Result<()> {
    let commander = cli::register(
        clap::Command::new("handoff")
            .about("Measures round-trip latency of workers contending on one rendezvous channel"),
    );
    let matches = commander.get_matches();

    let level = if matches.get_flag("verbose") {
        Level::TRACE
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    cli::run(&matches)
}
