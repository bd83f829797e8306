//! Run command - keep the scavenger going until ctrl-c.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use tracing::info;

use super::Context;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scavenge period in milliseconds (overrides [session] scavenge_period_ms)
    #[arg(long)]
    pub period_ms: Option<u64>,
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.manager().await?;

    if let Some(period_ms) = args.period_ms {
        manager.set_scavenge_period(Duration::from_millis(period_ms));
    }
    if manager.scavenge_period().is_zero() {
        bail!("scavenge period is 0; nothing to run");
    }

    manager.start();

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!(
            "{} {}",
            style("Scavenging").bold(),
            dim.apply_to(format!(
                "every {}ms on '{}' (ctrl-c to stop)",
                manager.scavenge_period().as_millis(),
                manager.index().key()
            ))
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupted, stopping scavenger");
    manager.stop().await;

    Ok(())
}
