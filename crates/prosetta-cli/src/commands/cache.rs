use super::{json_pretty, load_config, open_store, EXIT_SUCCESS};
use clap::Subcommand;
use dialoguer::Confirm;
use prosetta_store::{CacheStore, StoreLock};
use std::io::{stdin, IsTerminal};
use std::path::Path;

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show cache entry counts.
    Stats,
    /// Remove entries older than the retention window.
    Cleanup {
        /// Maximum entry age in days (overrides CACHE_MAX_AGE_DAYS).
        #[arg(long)]
        max_age_days: Option<u32>,
    },
    /// Remove every cached translation.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

pub fn run(data_dir: &Path, action: &CacheAction, json: bool) -> Result<u8, String> {
    let layout = open_store(data_dir)?;

    match action {
        CacheAction::Stats => {
            let cache = CacheStore::new(layout);
            let stats = cache.stats().map_err(|e| format!("store error: {e}"))?;
            if json {
                println!("{}", json_pretty(&stats)?);
            } else {
                println!("cached translations: {}", stats.total_entries);
                println!("used in last 24h:    {}", stats.entries_last_24h);
            }
            Ok(EXIT_SUCCESS)
        }
        CacheAction::Cleanup { max_age_days } => {
            let max_age = match max_age_days {
                Some(days) => *days,
                None => load_config()?.cache.max_age_days,
            };
            let _lock = StoreLock::acquire(&layout.lock_file())
                .map_err(|e| format!("store lock: {e}"))?;
            let cache = CacheStore::new(layout);
            let removed = cache
                .cleanup(max_age)
                .map_err(|e| format!("store error: {e}"))?;
            if json {
                println!(
                    "{}",
                    json_pretty(&serde_json::json!({"removed": removed, "max_age_days": max_age}))?
                );
            } else {
                println!("removed {removed} entries older than {max_age} days");
            }
            Ok(EXIT_SUCCESS)
        }
        CacheAction::Clear { yes } => {
            if !yes {
                if !stdin().is_terminal() {
                    return Err(
                        "refusing to clear the cache without --yes in non-interactive mode"
                            .to_owned(),
                    );
                }
                let confirmed = Confirm::new()
                    .with_prompt("remove all cached translations?")
                    .default(false)
                    .interact()
                    .map_err(|e| format!("prompt failed: {e}"))?;
                if !confirmed {
                    println!("aborted");
                    return Ok(EXIT_SUCCESS);
                }
            }
            let _lock = StoreLock::acquire(&layout.lock_file())
                .map_err(|e| format!("store lock: {e}"))?;
            let cache = CacheStore::new(layout);
            let removed = cache.clear().map_err(|e| format!("store error: {e}"))?;
            if json {
                println!("{}", json_pretty(&serde_json::json!({"removed": removed}))?);
            } else {
                println!("removed {removed} entries");
            }
            Ok(EXIT_SUCCESS)
        }
    }
}
