//! End-to-end API tests against a real in-process server on a random port.
//!
//! The upstream Ollama endpoint points at an unreachable loopback port, so
//! accepted jobs fail fast; that exercises the full accept/run/fail path
//! without a live model.

use prosetta_server::TestServer;
use prosetta_store::{JobRecord, JobStatus};
use std::io::Read;
use std::time::{Duration, Instant};

fn start_server() -> (TestServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(dir.path().to_path_buf());
    (server, dir)
}

fn agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .into()
}

fn get(url: &str) -> (u16, serde_json::Value) {
    let resp = agent().get(url).call().unwrap();
    let status = resp.status().as_u16();
    let mut body = String::new();
    resp.into_body()
        .into_reader()
        .read_to_string(&mut body)
        .unwrap();
    let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn post_json(url: &str, body: &serde_json::Value) -> (u16, serde_json::Value) {
    let payload = body.to_string();
    let resp = agent()
        .post(url)
        .header("Content-Type", "application/json")
        .send(payload.as_bytes())
        .unwrap();
    let status = resp.status().as_u16();
    let mut text = String::new();
    resp.into_body()
        .into_reader()
        .read_to_string(&mut text)
        .unwrap();
    let json = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn translate_body() -> serde_json::Value {
    serde_json::json!({
        "filename": "book.txt",
        "text": "The old man walked slowly through the quiet village square, and he \
                 did not want to speak with anyone about the things he had seen.",
        "source_lang": "en",
        "target_lang": "es",
    })
}

#[test]
fn health_is_200_even_with_dead_upstream() {
    let (server, _dir) = start_server();
    let (status, body) = get(&format!("{}/health", server.url));
    assert_eq!(status, 200);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["ollama"], "disconnected");
    assert!(body["version"].is_string());
}

#[test]
fn languages_are_listed() {
    let (server, _dir) = start_server();
    let (status, body) = get(&format!("{}/api/languages", server.url));
    assert_eq!(status, 200);
    let langs = body["languages"].as_array().unwrap();
    assert!(langs.iter().any(|l| l["code"] == "es"));
}

#[test]
fn models_route_reports_upstream_failure() {
    let (server, _dir) = start_server();
    let (status, body) = get(&format!("{}/api/models", server.url));
    assert_eq!(status, 502);
    assert!(body["error"].is_string());
}

#[test]
fn translate_validates_the_request() {
    let (server, _dir) = start_server();
    let url = format!("{}/api/translate", server.url);

    let mut bad_ext = translate_body();
    bad_ext["filename"] = "book.pdf".into();
    assert_eq!(post_json(&url, &bad_ext).0, 400);

    let mut bad_lang = translate_body();
    bad_lang["target_lang"] = "tlh".into();
    assert_eq!(post_json(&url, &bad_lang).0, 400);

    let mut empty = translate_body();
    empty["text"] = "   ".into();
    assert_eq!(post_json(&url, &empty).0, 400);

    let mut bad_model = translate_body();
    bad_model["model"] = "rm -rf /".into();
    assert_eq!(post_json(&url, &bad_model).0, 400);
}

#[test]
fn accepted_job_runs_to_failure_against_dead_upstream() {
    let (server, _dir) = start_server();
    let (status, body) = post_json(&format!("{}/api/translate", server.url), &translate_body());
    assert_eq!(status, 202);
    let id = body["id"].as_str().unwrap().to_owned();
    assert_eq!(body["status"], "pending");

    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let (status, job) = get(&format!("{}/api/translations/{id}", server.url));
        assert_eq!(status, 200);
        let state = job["status"].as_str().unwrap().to_owned();
        if state == "failed" {
            assert!(job["error_message"].is_string());
            break;
        }
        assert_ne!(state, "completed");
        assert!(Instant::now() < deadline, "job never reached a terminal state");
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn job_listing_and_stats_reflect_the_store() {
    let (server, _dir) = start_server();
    let record = JobRecord::new("book.txt", "en", "es", "m", "text".to_owned());
    server.state.jobs.create(&record).unwrap();
    server
        .state
        .jobs
        .mark_completed(&record.job_id, "texto", "book_es.txt", 1, 0.5)
        .unwrap();

    let (status, body) = get(&format!(
        "{}/api/translations?status=completed",
        server.url
    ));
    assert_eq!(status, 200);
    let items = body["translations"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["short_id"], record.job_id.short());

    let (status, stats) = get(&format!("{}/api/translations/stats", server.url));
    assert_eq!(status, 200);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["by_status"]["completed"], 1);
}

#[test]
fn short_id_resolves_and_unknown_id_is_404() {
    let (server, _dir) = start_server();
    let record = JobRecord::new("book.txt", "en", "es", "m", "text".to_owned());
    server.state.jobs.create(&record).unwrap();

    let (status, body) = get(&format!(
        "{}/api/translations/{}",
        server.url,
        record.job_id.short()
    ));
    assert_eq!(status, 200);
    assert_eq!(body["id"], record.job_id.as_str());

    let (status, _) = get(&format!("{}/api/translations/ffffffffffff", server.url));
    assert_eq!(status, 404);
}

#[test]
fn cancelling_a_finished_job_conflicts() {
    let (server, _dir) = start_server();
    let record = JobRecord::new("book.txt", "en", "es", "m", "text".to_owned());
    server.state.jobs.create(&record).unwrap();
    server
        .state
        .jobs
        .mark_completed(&record.job_id, "texto", "book_es.txt", 1, 0.5)
        .unwrap();

    let resp = agent()
        .delete(format!(
            "{}/api/translations/{}",
            server.url,
            record.job_id.short()
        ))
        .call()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[test]
fn pending_job_can_be_cancelled() {
    let (server, _dir) = start_server();
    let record = JobRecord::new("book.txt", "en", "es", "m", "text".to_owned());
    server.state.jobs.create(&record).unwrap();

    let resp = agent()
        .delete(format!(
            "{}/api/translations/{}",
            server.url,
            record.job_id.as_str()
        ))
        .call()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let stored = server.state.jobs.get(&record.job_id).unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
}

#[test]
fn download_serves_completed_translation() {
    let (server, dir) = start_server();
    let record = JobRecord::new("book.txt", "en", "es", "m", "text".to_owned());
    server.state.jobs.create(&record).unwrap();
    std::fs::write(dir.path().join("translations").join("book_es.txt"), "Hola").unwrap();
    server
        .state
        .jobs
        .mark_completed(&record.job_id, "Hola", "book_es.txt", 1, 0.5)
        .unwrap();

    let resp = agent()
        .get(format!(
            "{}/api/download/{}",
            server.url,
            record.job_id.short()
        ))
        .call()
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let disposition = resp
        .headers()
        .get("Content-Disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(disposition.contains("book_es.txt"));
    let mut body = String::new();
    resp.into_body()
        .into_reader()
        .read_to_string(&mut body)
        .unwrap();
    assert_eq!(body, "Hola");
}

#[test]
fn download_of_unfinished_job_conflicts() {
    let (server, _dir) = start_server();
    let record = JobRecord::new("book.txt", "en", "es", "m", "text".to_owned());
    server.state.jobs.create(&record).unwrap();

    let (status, _) = get(&format!(
        "{}/api/download/{}",
        server.url,
        record.job_id.as_str()
    ));
    assert_eq!(status, 409);
}

#[test]
fn cache_stats_and_clear() {
    let (server, _dir) = start_server();
    let (status, body) = get(&format!("{}/api/cache/stats", server.url));
    assert_eq!(status, 200);
    assert_eq!(body["total_entries"], 0);

    let (status, body) = post_json(
        &format!("{}/api/cache/clear", server.url),
        &serde_json::Value::Null,
    );
    assert_eq!(status, 200);
    assert_eq!(body["removed"], 0);
}

#[test]
fn api_key_gates_mutating_routes() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start_with(dir.path().to_path_buf(), &|key| match key {
        "PROSETTA_API_KEY" => Some("sekrit".to_owned()),
        _ => None,
    });

    // Reads and health stay open.
    assert_eq!(get(&format!("{}/health", server.url)).0, 200);
    assert_eq!(get(&format!("{}/api/translations", server.url)).0, 200);

    let url = format!("{}/api/translate", server.url);
    let (status, _) = post_json(&url, &translate_body());
    assert_eq!(status, 401);

    let resp = agent()
        .post(&url)
        .header("Content-Type", "application/json")
        .header("X-API-Key", "sekrit")
        .send(translate_body().to_string().as_bytes())
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);
}

#[test]
fn unknown_routes_are_404() {
    let (server, _dir) = start_server();
    assert_eq!(get(&format!("{}/api/nonsense", server.url)).0, 404);
    // No static dir configured, so the UI root is absent too.
    assert_eq!(get(&format!("{}/", server.url)).0, 404);
}
