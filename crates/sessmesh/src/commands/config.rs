//! Config command - inspect and create config files.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;
use sessmesh_config::{ConfigError, LayerStatus, SessmeshConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration, CLI overrides included
    Show,

    /// Show which config files were considered and which were applied
    Which,

    /// Write a config file with every default filled in
    Init {
        /// Write ./sessmesh.toml instead of the user config file
        #[arg(long)]
        local: bool,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the user config file path
    Path,
}

#[derive(Debug, Serialize)]
struct LayerRow {
    layer: String,
    path: PathBuf,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local, force } => cmd_init(ctx, local, force),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let effective = ctx.config.resolved();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
    } else {
        print!("{}", effective.to_toml()?);
    }
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let rows: Vec<LayerRow> = ctx
        .layers
        .iter()
        .map(|report| {
            let (status, error) = match &report.status {
                LayerStatus::Applied => ("applied", None),
                LayerStatus::Absent => ("absent", None),
                LayerStatus::Rejected(reason) => ("rejected", Some(reason.clone())),
            };
            LayerRow {
                layer: report.layer.to_string(),
                path: report.path.clone(),
                status,
                error,
            }
        })
        .collect();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Config files (later overrides earlier)").bold());
    for row in &rows {
        let status = match row.status {
            "applied" => style(row.status).green(),
            "rejected" => style(row.status).red(),
            _ => style(row.status).dim(),
        };
        println!(
            "  {:<8} {:<8} {}",
            status,
            dim.apply_to(&row.layer),
            row.path.display()
        );
        if let Some(ref error) = row.error {
            println!("           {}", dim.apply_to(error));
        }
    }
    if !rows.iter().any(|r| r.status == "applied") {
        println!();
        println!("No config files applied. Run 'sessmesh config init' to create one.");
    }
    Ok(())
}

fn cmd_init(ctx: &Context, local: bool, force: bool) -> Result<()> {
    let path = if local {
        sessmesh_config::project_config_file(Path::new("."))
    } else {
        sessmesh_config::user_config_file()
            .ok_or_else(|| anyhow!("could not determine the user config directory"))?
    };

    match sessmesh_config::write_config_file(&SessmeshConfig::with_defaults(), &path, force) {
        Ok(()) => {}
        Err(e @ ConfigError::AlreadyExists { .. }) => bail!("{e}; use --force to replace it"),
        Err(e) => return Err(e.into()),
    }

    if ctx.json_output {
        println!("{}", serde_json::json!({ "created": path }));
    } else {
        println!("{} {}", style("Created").green(), path.display());
    }
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let path = sessmesh_config::user_config_file()
        .ok_or_else(|| anyhow!("could not determine the user config directory"))?;

    if ctx.json_output {
        println!("{}", serde_json::json!({ "path": path }));
    } else {
        println!("{}", path.display());
    }
    Ok(())
}
