//! sessmesh - admin tool for clustered memcached session storage
//!
//! Main entry point for the sessmesh CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use sessmesh_config::{LoggingSection, SessmeshConfig};
use tracing::warn;

mod commands;

use commands::{config, list, remove, run, scavenge, show};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// sessmesh - inspect and maintain clustered HTTP sessions stored in memcached
#[derive(Parser)]
#[command(name = "sessmesh")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of the discovered ones
    #[arg(long, global = true, env = "SESSMESH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Memcached host (overrides [cache] host)
    #[arg(long, global = true, env = "SESSMESH_HOST")]
    pub host: Option<String>,

    /// Memcached port (overrides [cache] port)
    #[arg(long, global = true, env = "SESSMESH_PORT")]
    pub port: Option<u16>,

    /// Worker name of this node (overrides [session] worker_name)
    #[arg(long, global = true, env = "SESSMESH_WORKER")]
    pub worker: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every indexed session
    List(list::ListArgs),

    /// Show one session's record and attributes
    Show(show::ShowArgs),

    /// Remove a session and its attributes
    Remove(remove::RemoveArgs),

    /// Run one scavenger sweep now
    Scavenge(scavenge::ScavengeArgs),

    /// Run the scavenger until interrupted
    Run(run::RunArgs),

    /// Inspect or create configuration files
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = sessmesh_config::load_config(cli.config.as_deref()).with_context(|| {
        match cli.config {
            Some(ref path) => format!("loading {}", path.display()),
            None => "loading config".to_string(),
        }
    })?;
    let mut config = loaded.config;

    // Keep the guard alive so the file writer flushes on exit.
    let _guard = init_tracing(&config.logging(), cli.verbose);

    for warning in &loaded.warnings {
        warn!("{warning}");
    }

    apply_overrides(&mut config, &cli);

    let ctx = commands::Context {
        config,
        layers: loaded.layers,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::List(args) => list::run(args, &ctx).await,
        Commands::Show(args) => show::run(args, &ctx).await,
        Commands::Remove(args) => remove::run(args, &ctx).await,
        Commands::Scavenge(args) => scavenge::run(args, &ctx).await,
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

fn apply_overrides(config: &mut SessmeshConfig, cli: &Cli) {
    if cli.host.is_some() || cli.port.is_some() {
        let mut cache = config.cache();
        if let Some(ref host) = cli.host {
            cache.host = host.clone();
        }
        if let Some(port) = cli.port {
            cache.port = port;
        }
        config.cache = Some(cache);
    }

    if let Some(ref worker) = cli.worker {
        let mut session = config.session();
        session.worker_name = Some(worker.clone());
        config.session = Some(session);
    }
}

/// Console output to stderr, plus a daily rolling JSON file when enabled.
///
/// `RUST_LOG` wins over the configured filter; `--verbose` wins over both.
fn init_tracing(
    logging: &LoggingSection,
    verbose: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let console_filter = if verbose {
        EnvFilter::new("sessmesh=debug,sessmesh_session=debug,sessmesh_cache=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter))
    };

    let (file_layer, guard) = match logging.json_file.then(|| logging.log_dir()).flatten() {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(&log_dir, "sessmesh.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "sessmesh=trace,sessmesh_session=trace,sessmesh_cache=debug,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbose_and_show_values_together() {
        let cli = Cli::try_parse_from(["sessmesh", "-v", "show", "abc", "--values"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Show(ref args) if args.values && args.id == "abc"));
    }

    #[test]
    fn test_overrides_replace_cache_and_worker() {
        let cli = Cli::try_parse_from(["sessmesh", "--port", "22122", "--worker", "node3", "list"])
            .unwrap();
        let mut config = SessmeshConfig::new();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.cache().addr(), "127.0.0.1:22122");
        assert_eq!(config.session().worker_name.as_deref(), Some("node3"));
    }
}
