//! List command - every indexed session.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use sessmesh_session::now_ms;

use super::{Context, format_idle, format_millis};

/// Arguments for the list command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show sessions that are already past their idle timeout
    #[arg(long)]
    pub expired: bool,
}

#[derive(Debug, Serialize)]
struct SessionRow {
    id: String,
    node_id: String,
    /// `false` when the index lists an id whose record is gone.
    present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accessed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_idle_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expired: Option<bool>,
    attributes: usize,
}

/// Run the list command.
pub async fn run(args: ListArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.manager().await?;
    let now = now_ms();

    let rows: Vec<SessionRow> = manager
        .index_entries()
        .await?
        .into_iter()
        .map(|entry| {
            let node_id = manager.id_manager().node_id(&entry.cluster_id);
            match entry.record {
                Some(record) => SessionRow {
                    id: entry.cluster_id,
                    node_id,
                    present: true,
                    created: Some(record.created),
                    accessed: Some(record.accessed),
                    max_idle_ms: Some(record.max_idle_ms),
                    expired: Some(record.is_expired(now)),
                    attributes: record.keys.len(),
                },
                None => SessionRow {
                    id: entry.cluster_id,
                    node_id,
                    present: false,
                    created: None,
                    accessed: None,
                    max_idle_ms: None,
                    expired: None,
                    attributes: 0,
                },
            }
        })
        .filter(|row| !args.expired || row.expired == Some(true))
        .collect();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let yellow = Style::new().yellow();
    let red = Style::new().red();

    println!();
    println!(
        "{} {}",
        style("Sessions").bold(),
        dim.apply_to(format!("({} in '{}')", rows.len(), manager.index().key()))
    );
    println!("{}", dim.apply_to("─".repeat(60)));

    if rows.is_empty() {
        println!("  {}", dim.apply_to("no sessions"));
        println!();
        return Ok(());
    }

    for row in &rows {
        if !row.present {
            println!("  {} {}", row.id, yellow.apply_to("(indexed, record missing)"));
            continue;
        }

        let marker = if row.expired == Some(true) {
            red.apply_to(" expired").to_string()
        } else {
            String::new()
        };
        println!("  {}{}", style(&row.id).bold(), marker);
        println!(
            "    {} {}  {} {}",
            dim.apply_to("accessed:"),
            row.accessed.map(format_millis).unwrap_or_default(),
            dim.apply_to("max idle:"),
            row.max_idle_ms.map(format_idle).unwrap_or_default(),
        );
        if ctx.verbose {
            println!(
                "    {} {}  {} {}  {} {}",
                dim.apply_to("node id:"),
                row.node_id,
                dim.apply_to("created:"),
                row.created.map(format_millis).unwrap_or_default(),
                dim.apply_to("attributes:"),
                row.attributes,
            );
        }
    }
    println!();

    Ok(())
}
