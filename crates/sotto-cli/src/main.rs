use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sotto::app::{self, ConfigArgs, RunArgs};

#[derive(Parser)]
#[command(name = "sotto", version, about = "Voice dictation session controller")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dictation controller (default)
    Run(RunArgs),
    /// List audio input devices
    Devices,
    /// Update stored settings
    Config(ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Controller logic is cooperatively scheduled on a single thread;
    // device and listener I/O live on their own backend threads.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
            Command::Run(args) => app::run(args).await,
            Command::Devices => app::devices(),
            Command::Config(args) => app::configure(args).await,
        }
    })
}
