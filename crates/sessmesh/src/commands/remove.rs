//! Remove command - delete a session and its attributes.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde::Serialize;

use super::Context;

/// Arguments for the remove command.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Session ids (cluster ids or node ids)
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RemoveOutput {
    id: String,
    removed: bool,
}

/// Run the remove command.
pub async fn run(args: RemoveArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.manager().await?;

    let mut results = Vec::with_capacity(args.ids.len());
    for id in &args.ids {
        let cluster_id = manager.id_manager().cluster_id(id).to_string();
        let removed = manager.remove_session(&cluster_id).await?;
        results.push(RemoveOutput {
            id: cluster_id,
            removed,
        });
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let green = Style::new().green();
    let dim = Style::new().dim();
    for result in &results {
        if result.removed {
            println!("{} {}", green.apply_to("removed"), result.id);
        } else {
            println!("{} {}", dim.apply_to("not found"), result.id);
        }
    }

    Ok(())
}
