//! HTTP client for the Ollama API.
//!
//! Covers the three endpoints the translation pipeline needs: text
//! generation, model listing, and a health probe. All calls are blocking;
//! concurrency comes from the caller's worker threads.

use prosetta_config::{validate_model_name, OllamaConfig};
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("ollama request failed: {0}")]
    Http(String),
    #[error("ollama request timed out: {0}")]
    Timeout(String),
    #[error("unexpected ollama response: {0}")]
    Serialization(String),
    #[error("invalid request: {0}")]
    Config(String),
}

/// Result of a single non-streaming generation call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub eval_count: Option<u64>,
    pub eval_duration: Option<u64>,
}

/// One installed model as reported by `/api/tags`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
    #[serde(default)]
    pub digest: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: String,
    response: String,
    eval_count: Option<u64>,
    eval_duration: Option<u64>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

pub struct OllamaClient {
    config: OllamaConfig,
    agent: ureq::Agent,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(config.connect_timeout()))
            .build()
            .into();
        Self { config, agent }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Run one non-streaming generation with the configured sampling
    /// parameters. Generation can take minutes on large models, so this
    /// uses the long read timeout.
    pub fn generate(&self, prompt: &str, model: &str) -> Result<Generation, OllamaError> {
        validate_model_name(model).map_err(|e| OllamaError::Config(e.to_string()))?;

        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
            },
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| OllamaError::Serialization(e.to_string()))?;

        let url = self.url("/api/generate");
        debug!("POST {url} model={model} prompt_len={}", prompt.len());
        let resp = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json")
            .config()
            .timeout_global(Some(self.config.read_timeout()))
            .build()
            .send(&body[..])
            .map_err(|e| map_transport_err(&e, &url))?;

        let parsed: GenerateResponse = read_json(resp, &url)?;
        Ok(Generation {
            model: if parsed.model.is_empty() {
                model.to_owned()
            } else {
                parsed.model
            },
            text: parsed.response,
            eval_count: parsed.eval_count,
            eval_duration: parsed.eval_duration,
        })
    }

    /// List installed models via `/api/tags`.
    pub fn list_models(&self) -> Result<Vec<ModelInfo>, OllamaError> {
        let url = self.url("/api/tags");
        debug!("GET {url}");
        let resp = self
            .agent
            .get(&url)
            .config()
            .timeout_global(Some(self.config.health_timeout()))
            .build()
            .call()
            .map_err(|e| map_transport_err(&e, &url))?;

        let parsed: TagsResponse = read_json(resp, &url)?;
        Ok(parsed.models)
    }

    /// Probe reachability. Any failure reads as unhealthy; an unreachable
    /// upstream must never take the caller down.
    pub fn is_healthy(&self) -> bool {
        let url = self.url("/api/tags");
        let result = self
            .agent
            .get(&url)
            .config()
            .timeout_global(Some(self.config.health_timeout()))
            .build()
            .call();
        match result {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("health probe failed: {e}");
                false
            }
        }
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }
}

fn map_transport_err(e: &ureq::Error, url: &str) -> OllamaError {
    match e {
        ureq::Error::StatusCode(code) => OllamaError::Http(format!("HTTP {code} for {url}")),
        ureq::Error::Timeout(reason) => OllamaError::Timeout(format!("{reason} for {url}")),
        other => OllamaError::Http(other.to_string()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    resp: ureq::http::Response<ureq::Body>,
    url: &str,
) -> Result<T, OllamaError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(OllamaError::Http(format!("HTTP {status} for {url}")));
    }
    let mut body = String::new();
    resp.into_body()
        .into_reader()
        .read_to_string(&mut body)
        .map_err(|e| OllamaError::Http(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| OllamaError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    /// Minimal canned-response HTTP server for exercising the client.
    struct MockServer {
        addr: String,
        _handle: std::thread::JoinHandle<()>,
    }

    impl MockServer {
        fn start(responder: impl Fn(&str, &str, &str) -> String + Send + 'static) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = format!("http://{}", listener.local_addr().unwrap());
            let handle = std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    let mut reader = BufReader::new(stream.try_clone().unwrap());
                    let mut request_line = String::new();
                    if reader.read_line(&mut request_line).is_err() {
                        continue;
                    }
                    let parts: Vec<&str> = request_line.trim().splitn(3, ' ').collect();
                    if parts.len() < 2 {
                        continue;
                    }
                    let (method, path) = (parts[0].to_owned(), parts[1].to_owned());

                    let mut content_length = 0usize;
                    loop {
                        let mut line = String::new();
                        if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
                            break;
                        }
                        if let Some(v) = line.to_lowercase().strip_prefix("content-length: ") {
                            content_length = v.trim().parse().unwrap_or(0);
                        }
                    }
                    let mut body = vec![0u8; content_length];
                    if content_length > 0 {
                        let _ = reader.read_exact(&mut body);
                    }
                    let body = String::from_utf8_lossy(&body).into_owned();

                    let payload = responder(&method, &path, &body);
                    let status = if payload.starts_with("ERROR:") {
                        let code = payload.trim_start_matches("ERROR:");
                        format!("HTTP/1.1 {code}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    } else {
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                            payload.len()
                        )
                    };
                    let _ = stream.write_all(status.as_bytes());
                    let _ = stream.flush();
                }
            });
            MockServer {
                addr,
                _handle: handle,
            }
        }
    }

    fn test_config(base_url: &str) -> OllamaConfig {
        OllamaConfig {
            base_url: base_url.to_owned(),
            default_model: "testmodel".to_owned(),
            connect_timeout_secs: 2,
            read_timeout_secs: 5,
            health_timeout_secs: 2,
            temperature: 0.3,
            top_p: 0.9,
        }
    }

    #[test]
    fn generate_parses_response() {
        let server = MockServer::start(|method, path, body| {
            assert_eq!(method, "POST");
            assert_eq!(path, "/api/generate");
            let req: serde_json::Value = serde_json::from_str(body).unwrap();
            assert_eq!(req["model"], "testmodel");
            assert_eq!(req["stream"], false);
            assert_eq!(req["options"]["temperature"], 0.3);
            r#"{"model":"testmodel","response":"Hola mundo","eval_count":12,"eval_duration":900}"#
                .to_owned()
        });
        let client = OllamaClient::new(test_config(&server.addr));
        let gen = client.generate("Hello world", "testmodel").unwrap();
        assert_eq!(gen.text, "Hola mundo");
        assert_eq!(gen.eval_count, Some(12));
    }

    #[test]
    fn generate_rejects_invalid_model_name() {
        let client = OllamaClient::new(test_config("http://127.0.0.1:1"));
        let err = client.generate("hi", "bad model/name").unwrap_err();
        assert!(matches!(err, OllamaError::Config(_)));
    }

    #[test]
    fn generate_surfaces_http_errors() {
        let server = MockServer::start(|_, _, _| "ERROR:500 Internal Server Error".to_owned());
        let client = OllamaClient::new(test_config(&server.addr));
        let err = client.generate("hi", "testmodel").unwrap_err();
        assert!(matches!(err, OllamaError::Http(_)));
    }

    #[test]
    fn generate_rejects_malformed_json() {
        let server = MockServer::start(|_, _, _| "not json".to_owned());
        let client = OllamaClient::new(test_config(&server.addr));
        let err = client.generate("hi", "testmodel").unwrap_err();
        assert!(matches!(err, OllamaError::Serialization(_)));
    }

    #[test]
    fn list_models_parses_tags() {
        let server = MockServer::start(|method, path, _| {
            assert_eq!(method, "GET");
            assert_eq!(path, "/api/tags");
            r#"{"models":[{"name":"llama3:8b","size":4000000,"modified_at":"2024-01-01T00:00:00Z","digest":"abc"}]}"#
                .to_owned()
        });
        let client = OllamaClient::new(test_config(&server.addr));
        let models = client.list_models().unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "llama3:8b");
    }

    #[test]
    fn is_healthy_when_tags_responds() {
        let server = MockServer::start(|_, _, _| r#"{"models":[]}"#.to_owned());
        let client = OllamaClient::new(test_config(&server.addr));
        assert!(client.is_healthy());
    }

    #[test]
    fn is_healthy_false_when_unreachable() {
        // Grab a port with no listener behind it.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = OllamaClient::new(test_config(&addr));
        assert!(!client.is_healthy());
    }

    #[test]
    fn is_healthy_false_on_server_error() {
        let server = MockServer::start(|_, _, _| "ERROR:503 Service Unavailable".to_owned());
        let client = OllamaClient::new(test_config(&server.addr));
        assert!(!client.is_healthy());
    }
}
