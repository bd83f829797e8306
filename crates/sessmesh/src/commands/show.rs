//! Show command - one session's record and attributes.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use sessmesh_session::now_ms;

use super::{Context, format_idle, format_millis};

/// Arguments for the show command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Session id (cluster id or node id)
    pub id: String,

    /// Also print attribute values
    #[arg(long)]
    pub values: bool,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    id: String,
    node_id: String,
    created: i64,
    accessed: i64,
    max_idle_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_ms: Option<i64>,
    id_changed: bool,
    cookie_set: i64,
    attributes: Vec<AttributeOutput>,
}

#[derive(Debug, Serialize)]
struct AttributeOutput {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
}

/// Run the show command.
pub async fn run(args: ShowArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.manager().await?;
    let cluster_id = manager.id_manager().cluster_id(&args.id).to_string();

    let Some(record) = manager.store().load(&cluster_id).await? else {
        bail!("session '{}' not found", args.id);
    };

    let mut attributes = Vec::with_capacity(record.keys.len());
    for name in &record.keys {
        let value = if args.values {
            manager
                .store()
                .get_attribute::<serde_json::Value>(&cluster_id, name)
                .await?
        } else {
            None
        };
        attributes.push(AttributeOutput {
            name: name.clone(),
            value,
        });
    }

    let output = ShowOutput {
        node_id: manager.id_manager().node_id(&cluster_id),
        id: cluster_id,
        created: record.created,
        accessed: record.accessed,
        max_idle_ms: record.max_idle_ms,
        remaining_ms: record.remaining_ms(now_ms()),
        id_changed: record.id_changed,
        cookie_set: record.cookie_set,
        attributes,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();

    println!();
    println!("{}", style(&output.id).bold());
    println!("{}", dim.apply_to("─".repeat(60)));
    println!("  {} {}", dim.apply_to("Node id:"), output.node_id);
    println!("  {} {}", dim.apply_to("Created:"), format_millis(output.created));
    println!("  {} {}", dim.apply_to("Accessed:"), format_millis(output.accessed));
    println!("  {} {}", dim.apply_to("Max idle:"), format_idle(output.max_idle_ms));
    if let Some(remaining) = output.remaining_ms {
        println!("  {} {}ms", dim.apply_to("Expires in:"), remaining);
    }
    if ctx.verbose {
        println!("  {} {}", dim.apply_to("Id changed:"), output.id_changed);
        println!("  {} {}", dim.apply_to("Cookie set:"), output.cookie_set);
    }

    println!();
    println!("  {} ({})", style("Attributes").bold(), output.attributes.len());
    for attribute in &output.attributes {
        match attribute.value {
            Some(ref value) => println!("    {} = {}", attribute.name, value),
            None => println!("    {}", attribute.name),
        }
    }
    println!();

    Ok(())
}
