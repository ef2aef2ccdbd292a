//! `pchat config` -- show the effective configuration.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {} peerchat v{}", style("*").cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("  {}  {}", style("Data dir:").bold(), style(state.data_dir.display()).dim());
    println!();
    println!("  {}", style("── config.toml ──").dim());
    for line in toml::to_string_pretty(&state.config)?.lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}
