use super::{EXIT_FAILURE, EXIT_SUCCESS};
use prosetta_config::{Config, Paths};
use prosetta_ollama::OllamaClient;
use prosetta_store::{CacheStore, JobStore, StoreLayout, StoreLock};
use std::path::Path;

pub fn run(data_dir: &Path, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let config = match Config::from_env() {
        Ok(config) => {
            checks.push(Check::pass("config", "Configuration valid"));
            Some(config)
        }
        Err(e) => {
            all_pass = false;
            checks.push(Check::fail("config", &format!("Configuration invalid: {e}")));
            None
        }
    };

    check_data_dir(data_dir, &mut checks, &mut all_pass);
    check_store(data_dir, &mut checks, &mut all_pass);
    if let Some(config) = config {
        check_ollama(&config, &mut checks, &mut all_pass);
    }

    print_results(&checks, all_pass, json_output)
}

fn check_data_dir(data_dir: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let paths = Paths::new(data_dir);
    if let Err(e) = paths.ensure_dirs() {
        *all_pass = false;
        checks.push(Check::fail(
            "data_dir",
            &format!("Cannot create data directories: {e}"),
        ));
        return;
    }
    match tempfile::NamedTempFile::new_in(data_dir) {
        Ok(_) => checks.push(Check::pass(
            "data_dir",
            &format!("Data directory {} is writable", data_dir.display()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "data_dir",
                &format!("Data directory not writable: {e}"),
            ));
        }
    }
}

fn check_store(data_dir: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layout = StoreLayout::new(Paths::new(data_dir).store_dir());

    match layout.initialize() {
        Ok(()) => checks.push(Check::pass("store_version", "Store format version valid")),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "store_version",
                &format!("Store version check failed: {e}"),
            ));
            return;
        }
    }

    match StoreLock::try_acquire(&layout.lock_file()) {
        Ok(Some(_)) => checks.push(Check::pass("store_lock", "Store lock is free")),
        Ok(None) => checks.push(Check::warn(
            "store_lock",
            "Store lock is held by another process",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "store_lock",
                &format!("Cannot check store lock: {e}"),
            ));
        }
    }

    let jobs = JobStore::new(layout.clone());
    match jobs.stats() {
        Ok(stats) => {
            let active = stats
                .by_status
                .iter()
                .filter(|(status, _)| *status == "pending" || *status == "processing")
                .map(|(_, count)| count)
                .sum::<usize>();
            checks.push(Check::info(
                "jobs",
                &format!("{} jobs ({active} active)", stats.total),
            ));
        }
        Err(e) => checks.push(Check::warn("jobs", &format!("Cannot read job store: {e}"))),
    }

    let cache = CacheStore::new(layout);
    match cache.stats() {
        Ok(stats) => checks.push(Check::info(
            "cache",
            &format!("{} cached translations", stats.total_entries),
        )),
        Err(e) => checks.push(Check::warn("cache", &format!("Cannot read cache: {e}"))),
    }
}

fn check_ollama(config: &Config, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let client = OllamaClient::new(config.ollama.clone());
    if !client.is_healthy() {
        *all_pass = false;
        checks.push(Check::fail(
            "ollama",
            &format!("Ollama unreachable at {}", config.ollama.base_url),
        ));
        return;
    }
    checks.push(Check::pass(
        "ollama",
        &format!("Ollama reachable at {}", config.ollama.base_url),
    ));

    match client.list_models() {
        Ok(models) if models.iter().any(|m| m.name == config.ollama.default_model) => {
            checks.push(Check::pass(
                "default_model",
                &format!("Default model {} is installed", config.ollama.default_model),
            ));
        }
        Ok(_) => {
            checks.push(Check::warn(
                "default_model",
                &format!(
                    "Default model {} not installed (try `ollama pull {}`)",
                    config.ollama.default_model, config.ollama.default_model
                ),
            ));
        }
        Err(e) => checks.push(Check::warn(
            "default_model",
            &format!("Cannot list models: {e}"),
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Prosetta Doctor\n");
        for check in checks {
            let icon = match check.status.as_str() {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: String,
    message: String,
}

impl Check {
    fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: "pass".to_owned(),
            message: message.to_owned(),
        }
    }

    fn fail(name: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: "fail".to_owned(),
            message: message.to_owned(),
        }
    }

    fn warn(name: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: "warn".to_owned(),
            message: message.to_owned(),
        }
    }

    fn info(name: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: "info".to_owned(),
            message: message.to_owned(),
        }
    }
}
