//! HTTP API for the Prosetta translation service.
//!
//! A fixed pool of worker threads pulls requests from one shared
//! [`tiny_http::Server`], matching the process model the container image
//! runs with. Translation jobs themselves run on detached threads; workers
//! only validate, enqueue, and report.
//!
//! The [`TestServer`] helper starts the full stack on a random port for
//! integration testing.

mod routes;

pub use routes::handle_request;

use prosetta_config::{Config, ConfigError, Paths};
use prosetta_ollama::OllamaClient;
use prosetta_store::{CacheStore, JobStore, StoreError, StoreLayout};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tiny_http::Server;
use tracing::info;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

/// Everything a request handler needs, shared across worker threads.
pub struct AppState {
    pub config: Config,
    pub paths: Paths,
    pub jobs: JobStore,
    pub cache: CacheStore,
    pub ollama: OllamaClient,
}

impl AppState {
    /// Set up directories, the store, and the upstream client.
    pub fn new(config: Config, paths: Paths) -> Result<Self, ServerError> {
        paths.ensure_dirs()?;
        let layout = StoreLayout::new(paths.store_dir());
        layout.initialize()?;

        let ollama = OllamaClient::new(config.ollama.clone());
        Ok(Self {
            config,
            paths,
            jobs: JobStore::new(layout.clone()),
            cache: CacheStore::new(layout),
            ollama,
        })
    }
}

/// Run the server loop with the configured number of worker threads,
/// blocking until the listener shuts down.
pub fn run_server(state: &Arc<AppState>, addr: &str, workers: usize) -> Result<(), ServerError> {
    let server = Server::http(addr).map_err(|e| ServerError::Bind {
        addr: addr.to_owned(),
        reason: e.to_string(),
    })?;
    let server = Arc::new(server);
    info!("listening on {addr} with {workers} workers");

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let server = Arc::clone(&server);
        let state = Arc::clone(state);
        handles.push(
            std::thread::Builder::new()
                .name(format!("http-worker-{worker}"))
                .spawn(move || {
                    for request in server.incoming_requests() {
                        handle_request(&state, request);
                    }
                })
                .map_err(|e| ServerError::Bind {
                    addr: addr.to_owned(),
                    reason: format!("failed to spawn worker: {e}"),
                })?,
        );
    }
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

/// Starts a full server on `127.0.0.1:0` backed by a caller-provided data
/// directory. Drop to stop accepting requests.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub state: Arc<AppState>,
    server: Arc<Server>,
    _handles: Vec<std::thread::JoinHandle<()>>,
}

impl TestServer {
    /// Start with impatient timeouts and an unreachable default upstream;
    /// tests that need a live model swap the env lookup.
    pub fn start(data_dir: PathBuf) -> Self {
        Self::start_with(data_dir, &|_| None)
    }

    pub fn start_with(
        data_dir: PathBuf,
        overrides: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let lookup = |key: &str| {
            overrides(key).or_else(|| match key {
                // Port 9 is discard; nothing answers on loopback.
                "OLLAMA_BASE_URL" => Some("http://127.0.0.1:9".to_owned()),
                "OLLAMA_CONNECT_TIMEOUT" => Some("1".to_owned()),
                "OLLAMA_HEALTH_TIMEOUT" => Some("1".to_owned()),
                "MAX_RETRIES" => Some("1".to_owned()),
                "RETRY_DELAY" => Some("0".to_owned()),
                "CHUNK_DELAY" => Some("0".to_owned()),
                _ => None,
            })
        };
        let config = Config::from_lookup(&lookup).expect("test config");
        let paths = Paths::new(&data_dir);
        let state = Arc::new(AppState::new(config, paths).expect("test state"));

        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind test server"));
        let port = server
            .server_addr()
            .to_ip()
            .expect("not an IP addr")
            .port();
        let url = format!("http://127.0.0.1:{port}");

        let mut handles = Vec::new();
        for _ in 0..2 {
            let srv = Arc::clone(&server);
            let st = Arc::clone(&state);
            handles.push(std::thread::spawn(move || {
                for request in srv.incoming_requests() {
                    handle_request(&st, request);
                }
            }));
        }

        Self {
            url,
            port,
            state,
            server,
            _handles: handles,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}
