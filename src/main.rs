use barrage::{cli, commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let exit_code = match cli.command {
        cli::Command::Load(args) => commands::load::execute(args),
        cli::Command::Curl(args) => commands::curl::execute(args),
        cli::Command::Server(args) => commands::server::execute(args),
    };
    std::process::exit(exit_code);
}
