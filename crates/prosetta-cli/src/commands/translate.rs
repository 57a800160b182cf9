use super::{json_pretty, load_config, open_store, EXIT_SUCCESS};
use indicatif::{ProgressBar, ProgressStyle};
use prosetta_engine::{EngineError, JobRunner, Stage, Translator};
use prosetta_ollama::OllamaClient;
use prosetta_store::CacheStore;
use std::path::Path;
use std::time::Instant;
use tracing::warn;

#[allow(clippy::too_many_lines)]
pub fn run(
    data_dir: &Path,
    file: &Path,
    source: &str,
    target: &str,
    model: Option<&str>,
    no_cache: bool,
    json: bool,
) -> Result<u8, String> {
    let config = load_config()?;
    let layout = open_store(data_dir)?;

    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    if text.trim().is_empty() {
        return Err(format!("{} is empty", file.display()));
    }

    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("{} has no file name", file.display()))?;
    let model = model.unwrap_or(&config.ollama.default_model);

    let mut cache_cfg = config.cache.clone();
    if no_cache {
        cache_cfg.enabled = false;
    }
    let cache = CacheStore::new(layout);
    let client = OllamaClient::new(config.ollama.clone());
    let mut translator = Translator::new(
        &client,
        model,
        config.translation.clone(),
        cache_cfg,
        Some(&cache),
    );

    let pb = if json { None } else { Some(progress_bar()) };
    let started = Instant::now();

    let outcome = translator
        .translate(&text, source, target, &mut |progress| {
            if let Some(ref pb) = pb {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                pb.set_position(progress.percent.round() as u64);
                let msg = match progress.stage {
                    Stage::Primary => format!(
                        "stage 1: chunk {}/{}",
                        progress.current_chunk, progress.total_chunks
                    ),
                    Stage::Refinement => format!(
                        "stage 2: chunk {}/{}",
                        progress.current_chunk, progress.total_chunks
                    ),
                    Stage::Completed => "finishing".to_owned(),
                };
                pb.set_message(msg);
            }
            true
        })
        .map_err(|e| {
            if let Some(ref pb) = pb {
                pb.abandon_with_message("translation failed");
            }
            match e {
                EngineError::Cancelled => "translation cancelled".to_owned(),
                other => other.to_string(),
            }
        })?;

    if outcome.chunk_count > 0 && outcome.failed_chunks == outcome.chunk_count {
        if let Some(ref pb) = pb {
            pb.abandon_with_message("translation failed");
        }
        return Err("no chunk produced a valid translation".to_owned());
    }
    if outcome.failed_chunks > 0 {
        warn!(
            "{} of {} chunks kept their failure placeholder",
            outcome.failed_chunks, outcome.chunk_count
        );
    }

    let translations_dir = prosetta_config::Paths::new(data_dir).translations_dir();
    let output_name = JobRunner::output_filename(&filename, target);
    let output_path = translations_dir.join(&output_name);
    std::fs::write(&output_path, &outcome.text)
        .map_err(|e| format!("failed to write {}: {e}", output_path.display()))?;

    let elapsed = started.elapsed().as_secs_f64();
    if let Some(ref pb) = pb {
        pb.finish_with_message("done");
    }

    if json {
        let payload = serde_json::json!({
            "output": output_path,
            "chunks": outcome.chunk_count,
            "failed_chunks": outcome.failed_chunks,
            "model": model,
            "processing_time_secs": elapsed,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "translated {} chunks in {elapsed:.1}s ({} failed)",
            outcome.chunk_count, outcome.failed_chunks
        );
        println!("output: {}", output_path.display());
    }
    Ok(EXIT_SUCCESS)
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {msg}")
            .expect("valid template"),
    );
    pb
}
