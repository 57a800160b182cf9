use super::{load_config, EXIT_SUCCESS};
use prosetta_config::Paths;
use prosetta_server::{run_server, AppState, ServerError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn run(
    data_dir: &Path,
    host: Option<&str>,
    port: Option<u16>,
    workers: Option<usize>,
    static_dir: Option<PathBuf>,
) -> Result<u8, String> {
    let mut config = load_config()?;
    if let Some(host) = host {
        config.server.host = host.to_owned();
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(workers) = workers {
        config.server.workers = workers;
    }
    config.validate().map_err(|e| format!("config error: {e}"))?;

    let addr = config.server.bind_addr();
    let worker_count = config.server.workers;
    let paths = Paths::new(data_dir).with_static_dir(static_dir);

    let state = AppState::new(config, paths).map_err(server_err)?;
    let state = Arc::new(state);

    println!("prosetta listening on http://{addr}");
    run_server(&state, &addr, worker_count).map_err(server_err)?;
    Ok(EXIT_SUCCESS)
}

fn server_err(e: ServerError) -> String {
    match e {
        ServerError::Config(e) => format!("config error: {e}"),
        ServerError::Store(e) => format!("store error: {e}"),
        ServerError::Bind { addr, reason } => format!("failed to bind {addr}: {reason}"),
    }
}
