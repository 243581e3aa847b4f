//! Configuration management commands.

use parley_core::config::IssueSeverity;
use parley_core::Config;

use crate::{AppContext, ConfigAction};

pub fn handle(action: ConfigAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", ctx.config.to_toml()?);
        }
        ConfigAction::Validate => {
            let result = ctx.config.validate();
            if result.issues.is_empty() {
                println!("Configuration is valid.");
                return Ok(());
            }
            for issue in &result.issues {
                let level = match issue.severity {
                    IssueSeverity::Error => "error",
                    IssueSeverity::Warning => "warning",
                };
                println!("{level}: {}: {}", issue.field, issue.message);
            }
            if !result.is_ok() {
                anyhow::bail!("configuration has {} error(s)", result.errors().len());
            }
        }
        ConfigAction::Path => {
            println!("User config:    {}", Config::config_dir().join("config.toml").display());
            println!("Project config: .parley/config.toml");
            println!("Local config:   .parley/config.local.toml");
            println!("Environment:    PARLEY_<SECTION>__<KEY>");
            println!("Data directory: {}", Config::data_dir().display());
        }
    }
    Ok(())
}
