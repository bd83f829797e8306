//! Scavenge command - one sweep over the index, or a preview of one.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use sessmesh_session::now_ms;

use super::Context;

/// Arguments for the scavenge command.
#[derive(Args, Debug)]
pub struct ScavengeArgs {
    /// List the sessions a sweep would remove, without removing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Preview expiry this many seconds from now (implies --dry-run)
    #[arg(long)]
    pub ahead_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ScavengeOutput {
    checked: usize,
    expired: usize,
    missing: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct PreviewOutput {
    at: i64,
    checked: usize,
    would_expire: Vec<String>,
    missing: Vec<String>,
}

/// Run the scavenge command.
pub async fn run(args: ScavengeArgs, ctx: &Context) -> Result<()> {
    if args.dry_run || args.ahead_secs.is_some() {
        let at = shifted_now(now_ms(), args.ahead_secs.unwrap_or(0));
        return preview(at, ctx).await;
    }

    let manager = ctx.manager().await?;
    let report = manager.scavenge().await?;

    let output = ScavengeOutput {
        checked: report.checked,
        expired: report.expired,
        missing: report.missing,
        failed: report.failed,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let red = Style::new().red();

    println!("{}", style("Scavenge sweep").bold());
    println!("  {} {}", dim.apply_to("Checked:"), output.checked);
    println!("  {} {}", dim.apply_to("Expired:"), output.expired);
    println!("  {} {}", dim.apply_to("Missing:"), output.missing);
    if output.failed > 0 {
        println!("  {} {}", red.apply_to("Failed:"), output.failed);
    }

    Ok(())
}

/// Read-only: nothing in the cache changes.
async fn preview(at: i64, ctx: &Context) -> Result<()> {
    let manager = ctx.manager().await?;
    let entries = manager.index_entries().await?;

    let mut output = PreviewOutput {
        at,
        checked: entries.len(),
        would_expire: Vec::new(),
        missing: Vec::new(),
    };
    for entry in entries {
        match entry.record {
            Some(record) if record.is_expired(at) => output.would_expire.push(entry.cluster_id),
            Some(_) => {}
            None => output.missing.push(entry.cluster_id),
        }
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!(
        "{} {}",
        style("Scavenge preview").bold(),
        dim.apply_to(format!("at {} (nothing removed)", super::format_millis(at)))
    );
    println!("  {} {}", dim.apply_to("Checked:"), output.checked);
    println!("  {} {}", dim.apply_to("Would expire:"), output.would_expire.len());
    for id in &output.would_expire {
        println!("    {id}");
    }
    if !output.missing.is_empty() {
        println!("  {} {}", dim.apply_to("Record missing:"), output.missing.len());
        for id in &output.missing {
            println!("    {id}");
        }
    }

    Ok(())
}

/// `now` moved forward by `secs`, pinned at `i64::MAX` instead of wrapping.
fn shifted_now(now: i64, secs: u64) -> i64 {
    let ahead_ms = i64::try_from(secs)
        .ok()
        .and_then(|s| s.checked_mul(1000))
        .unwrap_or(i64::MAX);
    now.saturating_add(ahead_ms)
}
