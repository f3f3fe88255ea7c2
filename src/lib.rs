pub mod authorization;
pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Binary entry point. Returns the process exit code.
pub fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: could not start runtime: {e}");
            return 1;
        }
    };

    let mut stdout = std::io::stdout().lock();
    match runtime.block_on(cli::execute(args, config::AppConfig::from_env(), &mut stdout)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    }
}
