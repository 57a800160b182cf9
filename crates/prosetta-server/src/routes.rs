use crate::AppState;
use prosetta_config::{sanitize_filename, validate_model_name, SUPPORTED_LANGUAGES};
use prosetta_engine::{JobRunner, Translator};
use prosetta_store::{JobRecord, JobStatus, StoreError};
use serde::Deserialize;
use serde_json::json;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, error, info, warn};

const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Deserialize)]
struct TranslateRequest {
    filename: String,
    text: String,
    source_lang: String,
    target_lang: String,
    #[serde(default)]
    model: Option<String>,
}

fn respond_err(req: Request, code: u16, msg: &str) {
    let body = json!({ "error": msg }).to_string();
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(
        Response::from_string(body)
            .with_header(header)
            .with_status_code(StatusCode(code)),
    );
}

fn respond_json(req: Request, code: u16, value: &serde_json::Value) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(
        Response::from_string(value.to_string())
            .with_header(header)
            .with_status_code(StatusCode(code)),
    );
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_owned())
    })
}

fn header_value<'r>(req: &'r Request, name: &'static str) -> Option<&'r str> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str())
}

/// Mutating routes require the configured key; everything read-only and
/// the health probe stay open.
fn authorized(state: &AppState, req: &Request) -> bool {
    let expected = state.config.server.api_key.as_str();
    expected.is_empty() || header_value(req, "X-API-Key") == Some(expected)
}

fn read_body(req: &mut Request, limit: u64) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    let mut reader = req.as_reader().take(limit + 1);
    if reader.read_to_end(&mut body).is_err() || body.len() as u64 > limit {
        return None;
    }
    Some(body)
}

/// Reject any static path that could escape the static root.
fn resolve_static(static_dir: &Path, rest: &str) -> Option<PathBuf> {
    let relative = Path::new(rest);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let path = static_dir.join(relative);
    path.is_file().then_some(path)
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

fn job_summary(record: &JobRecord) -> serde_json::Value {
    json!({
        "id": record.job_id.as_str(),
        "short_id": record.job_id.short(),
        "filename": record.filename,
        "source_lang": record.source_lang,
        "target_lang": record.target_lang,
        "model": record.model,
        "status": record.status.as_str(),
        "progress": record.progress,
        "stage": record.stage,
        "error_message": record.error_message,
        "file_size": record.file_size,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
        "completed_at": record.completed_at,
    })
}

fn job_detail(record: &JobRecord) -> serde_json::Value {
    let mut value = job_summary(record);
    let extra = json!({
        "draft_translation": record.draft_translation,
        "translated_text": record.translated_text,
        "translated_filename": record.translated_filename,
        "chunk_count": record.chunk_count,
        "processing_time_secs": record.processing_time_secs,
    });
    if let (Some(obj), Some(more)) = (value.as_object_mut(), extra.as_object()) {
        obj.extend(more.clone());
    }
    value
}

fn resolve_job(state: &AppState, req: Request, id: &str) -> Option<(Request, JobRecord)> {
    match state.jobs.resolve(id).and_then(|id| state.jobs.get(&id)) {
        Ok(record) => Some((req, record)),
        Err(StoreError::JobNotFound(_)) => {
            respond_err(req, 404, "translation not found");
            None
        }
        Err(e @ StoreError::AmbiguousJobId { .. }) => {
            respond_err(req, 400, &e.to_string());
            None
        }
        Err(e) => {
            respond_err(req, 500, &e.to_string());
            None
        }
    }
}

fn handle_health(state: &AppState, req: Request) {
    let connected = state.ollama.is_healthy();
    let body = json!({
        "status": if connected { "healthy" } else { "degraded" },
        "ollama": if connected { "connected" } else { "disconnected" },
        "version": env!("CARGO_PKG_VERSION"),
    });
    // Liveness stays 200 regardless of the upstream; orchestrators must
    // not restart this process because Ollama is down.
    respond_json(req, 200, &body);
}

fn handle_languages(req: Request) {
    let languages: Vec<_> = SUPPORTED_LANGUAGES
        .iter()
        .map(|(code, name)| json!({ "code": code, "name": name }))
        .collect();
    respond_json(req, 200, &json!({ "languages": languages }));
}

fn handle_models(state: &AppState, req: Request) {
    match state.ollama.list_models() {
        Ok(models) => respond_json(
            req,
            200,
            &json!({
                "models": models,
                "default": state.config.ollama.default_model,
            }),
        ),
        Err(e) => respond_err(req, 502, &format!("model listing failed: {e}")),
    }
}

fn handle_translate(state: &Arc<AppState>, mut req: Request) {
    let Some(body) = read_body(&mut req, state.config.file.max_file_size_bytes()) else {
        respond_err(req, 413, "request body too large");
        return;
    };
    let parsed: TranslateRequest = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            respond_err(req, 400, &format!("invalid request body: {e}"));
            return;
        }
    };

    let Some(filename) = sanitize_filename(&parsed.filename) else {
        respond_err(req, 400, "invalid filename");
        return;
    };
    if !state.config.file.extension_allowed(&filename) {
        respond_err(req, 400, "unsupported file type");
        return;
    }
    if parsed.text.trim().is_empty() {
        respond_err(req, 400, "text must not be empty");
        return;
    }
    if !prosetta_config::is_supported_language(&parsed.target_lang) {
        respond_err(req, 400, "unsupported target language");
        return;
    }
    if parsed.source_lang != "auto" && !prosetta_config::is_supported_language(&parsed.source_lang)
    {
        respond_err(req, 400, "unsupported source language");
        return;
    }
    let model = parsed
        .model
        .unwrap_or_else(|| state.config.ollama.default_model.clone());
    if let Err(e) = validate_model_name(&model) {
        respond_err(req, 400, &e.to_string());
        return;
    }

    if let Err(e) = std::fs::write(state.paths.uploads_dir().join(&filename), &parsed.text) {
        warn!("failed to persist upload {filename}: {e}");
    }

    let source_lang = Translator::resolve_source(&parsed.text, &parsed.source_lang);
    let record = JobRecord::new(
        &filename,
        &source_lang,
        &parsed.target_lang,
        &model,
        parsed.text,
    );
    if let Err(e) = state.jobs.create(&record) {
        respond_err(req, 500, &e.to_string());
        return;
    }

    let job_id = record.job_id.clone();
    let worker_state = Arc::clone(state);
    std::thread::spawn(move || {
        let cache = worker_state
            .config
            .cache
            .enabled
            .then_some(&worker_state.cache);
        let mut translator = Translator::new(
            &worker_state.ollama,
            record.model.clone(),
            worker_state.config.translation.clone(),
            worker_state.config.cache.clone(),
            cache,
        );
        let runner = JobRunner::new(&worker_state.jobs, worker_state.paths.translations_dir());
        if let Err(e) = runner.run(&mut translator, &record.job_id) {
            error!("job {} runner error: {e}", record.job_id.short());
        }
    });

    info!("accepted translation job {}", job_id.short());
    respond_json(
        req,
        202,
        &json!({
            "id": job_id.as_str(),
            "short_id": job_id.short(),
            "status": "pending",
        }),
    );
}

fn handle_list(state: &AppState, req: Request, query: &str) {
    let status = match query_param(query, "status") {
        Some(raw) => match JobStatus::parse(&raw) {
            Some(s) => Some(s),
            None => {
                respond_err(req, 400, "unknown status filter");
                return;
            }
        },
        None => None,
    };
    let limit = query_param(query, "limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = query_param(query, "offset")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    match state.jobs.list(status, limit, offset) {
        Ok(records) => {
            let items: Vec<_> = records.iter().map(job_summary).collect();
            respond_json(req, 200, &json!({ "translations": items }));
        }
        Err(e) => respond_err(req, 500, &e.to_string()),
    }
}

fn handle_stats(state: &AppState, req: Request) {
    match state.jobs.stats() {
        Ok(stats) => match serde_json::to_value(&stats) {
            Ok(value) => respond_json(req, 200, &value),
            Err(e) => respond_err(req, 500, &e.to_string()),
        },
        Err(e) => respond_err(req, 500, &e.to_string()),
    }
}

fn handle_cancel(state: &AppState, req: Request, id: &str) {
    let Some((req, record)) = resolve_job(state, req, id) else {
        return;
    };
    match state.jobs.mark_cancelled(&record.job_id) {
        Ok(record) => respond_json(req, 200, &job_summary(&record)),
        Err(StoreError::JobFinished(_)) => {
            respond_err(req, 409, "translation already finished");
        }
        Err(e) => respond_err(req, 500, &e.to_string()),
    }
}

fn handle_download(state: &AppState, req: Request, id: &str) {
    let Some((req, record)) = resolve_job(state, req, id) else {
        return;
    };
    if record.status != JobStatus::Completed {
        respond_err(req, 409, "translation not completed");
        return;
    }
    let filename = record
        .translated_filename
        .clone()
        .unwrap_or_else(|| JobRunner::output_filename(&record.filename, &record.target_lang));
    let content = match std::fs::read_to_string(state.paths.translations_dir().join(&filename)) {
        Ok(text) => text,
        // The store record is the source of truth if the file vanished.
        Err(_) => record.translated_text.clone(),
    };

    let ct = Header::from_bytes("Content-Type", "text/plain; charset=utf-8").expect("valid header");
    let cd = Header::from_bytes(
        "Content-Disposition",
        format!("attachment; filename=\"{filename}\""),
    )
    .expect("valid header");
    let _ = req.respond(Response::from_string(content).with_header(ct).with_header(cd));
}

fn handle_cache_stats(state: &AppState, req: Request) {
    match state.cache.stats() {
        Ok(stats) => respond_json(
            req,
            200,
            &json!({
                "enabled": state.config.cache.enabled,
                "total_entries": stats.total_entries,
                "entries_last_24h": stats.entries_last_24h,
            }),
        ),
        Err(e) => respond_err(req, 500, &e.to_string()),
    }
}

fn handle_cache_clear(state: &AppState, req: Request) {
    match state.cache.clear() {
        Ok(removed) => respond_json(req, 200, &json!({ "removed": removed })),
        Err(e) => respond_err(req, 500, &e.to_string()),
    }
}

fn handle_static(state: &AppState, req: Request, rest: &str) {
    let Some(static_dir) = state.paths.static_dir.as_deref() else {
        respond_err(req, 404, "not found");
        return;
    };
    let Some(path) = resolve_static(static_dir, rest) else {
        respond_err(req, 404, "not found");
        return;
    };
    match std::fs::read(&path) {
        Ok(data) => {
            let header =
                Header::from_bytes("Content-Type", content_type_for(&path)).expect("valid header");
            let _ = req.respond(Response::from_data(data).with_header(header));
        }
        Err(_) => respond_err(req, 404, "not found"),
    }
}

/// Dispatch a single request.
pub fn handle_request(state: &Arc<AppState>, req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
    debug!("{method} {path}");

    let mutating = matches!(method, Method::Post | Method::Delete);
    if mutating && path.starts_with("/api/") && !authorized(state, &req) {
        respond_err(req, 401, "missing or invalid API key");
        return;
    }

    match (&method, path) {
        (Method::Get, "/health" | "/api/health") => handle_health(state, req),
        (Method::Get, "/api/languages") => handle_languages(req),
        (Method::Get, "/api/models") => handle_models(state, req),
        (Method::Get, "/api/models/current") => respond_json(
            req,
            200,
            &json!({ "model": state.config.ollama.default_model }),
        ),
        (Method::Post, "/api/translate") => handle_translate(state, req),
        (Method::Get, "/api/translations") => handle_list(state, req, query),
        (Method::Get, "/api/translations/stats") => handle_stats(state, req),
        (Method::Get, "/api/cache/stats") => handle_cache_stats(state, req),
        (Method::Post, "/api/cache/clear") => handle_cache_clear(state, req),
        (Method::Get, _) if path.starts_with("/api/translations/") => {
            let id = &path["/api/translations/".len()..];
            let Some((req, record)) = resolve_job(state, req, id) else {
                return;
            };
            respond_json(req, 200, &job_detail(&record));
        }
        (Method::Delete, _) if path.starts_with("/api/translations/") => {
            handle_cancel(state, req, &path["/api/translations/".len()..]);
        }
        (Method::Get, _) if path.starts_with("/api/download/") => {
            handle_download(state, req, &path["/api/download/".len()..]);
        }
        (Method::Get, "/") => handle_static(state, req, "index.html"),
        (Method::Get, _) if path.starts_with("/static/") => {
            handle_static(state, req, &path["/static/".len()..]);
        }
        _ => respond_err(req, 404, "not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_extracts_values() {
        assert_eq!(
            query_param("status=failed&limit=5", "status").as_deref(),
            Some("failed")
        );
        assert_eq!(
            query_param("status=failed&limit=5", "limit").as_deref(),
            Some("5")
        );
        assert_eq!(query_param("status=failed", "offset"), None);
        assert_eq!(query_param("", "status"), None);
    }

    #[test]
    fn static_resolution_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();

        assert!(resolve_static(dir.path(), "index.html").is_some());
        assert!(resolve_static(dir.path(), "../index.html").is_none());
        assert!(resolve_static(dir.path(), "/etc/passwd").is_none());
        assert!(resolve_static(dir.path(), "missing.html").is_none());
    }

    #[test]
    fn content_types_cover_ui_assets() {
        assert_eq!(
            content_type_for(Path::new("index.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_for(Path::new("app.js")), "application/javascript");
        assert_eq!(
            content_type_for(Path::new("data.bin")),
            "application/octet-stream"
        );
    }
}
