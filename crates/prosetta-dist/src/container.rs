use crate::DistError;
use std::path::Path;

/// Inputs for the generated container build descriptor.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub binary: String,
    pub port: u16,
    pub build_image: String,
    pub runtime_image: String,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            binary: "prosetta".to_owned(),
            port: 5001,
            build_image: "rust:1.83-slim".to_owned(),
            runtime_image: "debian:bookworm-slim".to_owned(),
        }
    }
}

/// Render a two-stage Dockerfile.
///
/// Stage one compiles with the full toolchain; stage two ships only the
/// binary and static assets on a slim base, runs as a dedicated non-root
/// user, and probes `GET /health` with a bounded timeout. Runtime-tunable
/// values stay environment variables; the baked values are only defaults,
/// with the bind host flipped to `0.0.0.0` because loopback is unreachable
/// from outside the container.
pub fn dockerfile(spec: &ContainerSpec) -> String {
    let ContainerSpec {
        binary,
        port,
        build_image,
        runtime_image,
    } = spec;
    format!(
        r#"# Build stage: full Rust toolchain, discarded after compilation.
FROM {build_image} AS build
WORKDIR /src
COPY . .
RUN cargo build --release --locked

# Runtime stage: binary and assets only, no toolchain.
FROM {runtime_image}
RUN apt-get update \
    && apt-get install -y --no-install-recommends ca-certificates curl \
    && rm -rf /var/lib/apt/lists/* \
    && useradd --system --create-home --home-dir /app {binary}
WORKDIR /app
COPY --from=build /src/target/release/{binary} /usr/local/bin/{binary}
COPY --from=build /src/static /app/static
RUN mkdir -p /app/data/uploads /app/data/translations /app/data/logs \
    && chown -R {binary}:{binary} /app
USER {binary}

ENV PROSETTA_HOST=0.0.0.0 \
    PROSETTA_PORT={port} \
    PROSETTA_VERBOSE=false \
    OLLAMA_BASE_URL=http://localhost:11434 \
    PROSETTA_DATA_DIR=/app/data

EXPOSE {port}
HEALTHCHECK --interval=30s --timeout=10s --start-period=5s --retries=3 \
    CMD curl -fsS --max-time 10 http://127.0.0.1:{port}/health || exit 1

CMD ["{binary}", "serve", "--static-dir", "/app/static"]
"#
    )
}

/// Write the descriptor, refusing to clobber a hand-edited one unless
/// `force` is set.
pub fn write_dockerfile(path: &Path, spec: &ContainerSpec, force: bool) -> Result<(), DistError> {
    if path.exists() && !force {
        return Err(DistError::Precondition(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    std::fs::write(path, dockerfile(spec))?;
    Ok(())
}
