//! `aflow config`: print the effective configuration.

use anyhow::{Context, Result};
use console::style;

use crate::state::AppState;

pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&state.config)?);
        return Ok(());
    }

    let rendered =
        toml::to_string_pretty(&state.config).context("Failed to render configuration as TOML")?;

    println!();
    println!(
        "  {} {}",
        style("Data directory:").bold(),
        style(state.data_dir.display()).cyan()
    );
    println!(
        "  {} {}",
        style("Config file:").bold(),
        style(state.data_dir.join("config.toml").display()).dim()
    );
    println!();
    for line in rendered.lines() {
        println!("  {line}");
    }
    println!();

    Ok(())
}
