// vlrscout server binary

use std::{net::SocketAddr, path::PathBuf};

use anyhow::Result;
use clap::Parser;

use vlrscout_lib::config::Config;

#[derive(Parser)]
#[command(name = "vlrscout")]
#[command(about = "Round screenshot analysis service", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Directory for the registry database and session artifacts
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Analyzer program to launch for each job
    #[arg(short, long)]
    analyzer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(program) = cli.analyzer {
        config.analyzer.program = program;
    }
    config.validate()?;

    vlrscout_lib::init_logging(&config.log_level);
    vlrscout_lib::run(config).await
}
