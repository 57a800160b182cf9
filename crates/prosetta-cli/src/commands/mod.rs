pub mod cache;
pub mod completions;
pub mod dist;
pub mod doctor;
pub mod jobs;
pub mod languages;
pub mod man_pages;
pub mod models;
pub mod serve;
pub mod translate;

use indicatif::{ProgressBar, ProgressStyle};
use prosetta_config::{Config, Paths};
use prosetta_store::{JobId, JobStore, StoreLayout};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_DIST_PRECONDITION: u8 = 4;
pub const EXIT_DIST_MANIFEST: u8 = 5;
pub const EXIT_PACKAGING: u8 = 6;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn load_config() -> Result<Config, String> {
    Config::from_env().map_err(|e| format!("config error: {e}"))
}

/// Open the store under `data_dir`, creating the runtime directories and
/// the store layout on first use.
pub fn open_store(data_dir: &Path) -> Result<StoreLayout, String> {
    let paths = Paths::new(data_dir);
    paths
        .ensure_dirs()
        .map_err(|e| format!("store error: {e}"))?;
    let layout = StoreLayout::new(paths.store_dir());
    layout
        .initialize()
        .map_err(|e| format!("store error: {e}"))?;
    Ok(layout)
}

pub fn resolve_job_id(jobs: &JobStore, input: &str) -> Result<JobId, String> {
    jobs.resolve(input).map_err(|e| e.to_string())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "completed" => Style::new().green().apply_to(status).to_string(),
        "processing" => Style::new().cyan().bold().apply_to(status).to_string(),
        "pending" => Style::new().yellow().apply_to(status).to_string(),
        "failed" => Style::new().red().apply_to(status).to_string(),
        "cancelled" => Style::new().dim().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_string() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn open_store_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = open_store(dir.path()).unwrap();
        assert!(layout.root().exists());
        assert!(dir.path().join("translations").is_dir());
    }

    #[test]
    fn colorize_passes_unknown_through() {
        assert_eq!(colorize_status("weird"), "weird");
    }
}
