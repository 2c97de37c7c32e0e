use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duster::config::{Args, RunConfig};
use duster::runner::bootstrap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("duster={0},duster_core={0}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = RunConfig::from_args(args);
    info!(
        save_root = %config.save_root.display(),
        history = %config.history_path.display(),
        "duster starting"
    );

    let mut runner = bootstrap(&config).await?;
    tokio::select! {
        summary = runner.run() => {
            print!("{}", summary?);
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; history holds the last completed page");
            std::process::exit(130);
        }
    }
}
