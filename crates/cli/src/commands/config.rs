//! Config command - print the effective configuration as YAML

use super::load_config;
use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ConfigCommand {
    /// Show this file merged over the defaults instead of the bare defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let yaml = config.to_yaml().context("Failed to serialize configuration")?;
        print!("{yaml}");
        Ok(())
    }
}
