//! relimg CLI entry point.

use clap::Parser;
use relimg_core::{LogFormat, LogLevel, RelimgConfig};
use tracing_subscriber::EnvFilter;

use relimg_cli::commands::{dispatch, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --log-level wins over the config file; RUST_LOG wins over both
    let level = cli.log_level.or_else(|| {
        cli.config
            .as_deref()
            .and_then(|path| RelimgConfig::load(path).ok())
            .map(|config| config.log_level)
    });
    init_tracing(level, cli.log_format);

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(level: Option<LogLevel>, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(level.map_or_else(|| "warn".to_string(), |l| l.to_string()))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
