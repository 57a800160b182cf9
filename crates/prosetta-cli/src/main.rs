mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    EXIT_CONFIG_ERROR, EXIT_DIST_MANIFEST, EXIT_DIST_PRECONDITION, EXIT_FAILURE, EXIT_PACKAGING,
    EXIT_STORE_ERROR,
};
use prosetta_engine::install_signal_handler;
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_DATA_DIR: &str = "~/.local/share/prosetta";

#[derive(Debug, Parser)]
#[command(
    name = "prosetta",
    version,
    about = "Two-stage book translation service backed by a local Ollama instance"
)]
struct Cli {
    /// Data directory for uploads, translations, and the store
    /// (defaults to $PROSETTA_DATA_DIR, then ~/.local/share/prosetta).
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP translation server.
    Serve {
        /// Address to bind (overrides PROSETTA_HOST).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides PROSETTA_PORT).
        #[arg(long)]
        port: Option<u16>,
        /// Number of worker threads (overrides PROSETTA_WORKERS).
        #[arg(long)]
        workers: Option<usize>,
        /// Directory to serve the web UI from.
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Translate a text file synchronously.
    Translate {
        /// Path to the text file to translate.
        file: PathBuf,
        /// Source language code, or "auto" to detect.
        #[arg(long, default_value = "auto")]
        source: String,
        /// Target language code.
        #[arg(long)]
        target: String,
        /// Model to use (overrides OLLAMA_DEFAULT_MODEL).
        #[arg(long)]
        model: Option<String>,
        /// Skip the translation cache for this run.
        #[arg(long, default_value_t = false)]
        no_cache: bool,
    },
    /// Inspect and manage translation jobs.
    Jobs {
        #[command(subcommand)]
        action: commands::jobs::JobsAction,
    },
    /// List models available on the Ollama instance.
    Models,
    /// List supported languages.
    Languages,
    /// Translation cache maintenance.
    Cache {
        #[command(subcommand)]
        action: commands::cache::CacheAction,
    },
    /// Package the application for distribution.
    Dist {
        #[command(subcommand)]
        action: commands::dist::DistAction,
    },
    /// Run diagnostic checks on the data directory and upstream.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let verbose_env =
        std::env::var("PROSETTA_VERBOSE").is_ok_and(|v| v == "true" || v == "1");
    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose || verbose_env {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PROSETTA_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let data_dir = expand_tilde(
        &cli.data_dir
            .or_else(|| std::env::var("PROSETTA_DATA_DIR").ok())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_owned()),
    );
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            workers,
            static_dir,
        } => commands::serve::run(&data_dir, host.as_deref(), port, workers, static_dir),
        Commands::Translate {
            file,
            source,
            target,
            model,
            no_cache,
        } => commands::translate::run(
            &data_dir,
            &file,
            &source,
            &target,
            model.as_deref(),
            no_cache,
            json_output,
        ),
        Commands::Jobs { action } => commands::jobs::run(&data_dir, &action, json_output),
        Commands::Models => commands::models::run(json_output),
        Commands::Languages => commands::languages::run(json_output),
        Commands::Cache { action } => commands::cache::run(&data_dir, &action, json_output),
        Commands::Dist { action } => commands::dist::run(&action, json_output),
        Commands::Doctor => commands::doctor::run(&data_dir, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else if msg.starts_with("dist precondition:") {
                EXIT_DIST_PRECONDITION
            } else if msg.starts_with("dist manifest:") {
                EXIT_DIST_MANIFEST
            } else if msg.starts_with("packaging failed:") {
                EXIT_PACKAGING
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
