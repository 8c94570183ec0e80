// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Server daemon: loads a TOML configuration, attaches the configured
//! databases, and runs the listener until `Ctrl-C`.

use clap::Parser;
use snapdb::config::{ConfigBuilder, FileCredentialStore};
use snapdb::engine::Engine;
use snapdb::security::{CredentialStore, ResumeRegistry, TlsAcceptor};
use snapdb::server::{Listener, ServerOptions};
use snapdb::session::Catalog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

#[derive(Parser, Debug)]
#[command(name = "snapdbd", about = "A time-series storage engine server")]
struct Args {
    /// Suppress all output except for errors. Overrides `-v`.
    #[arg(short, long)]
    quiet: bool,

    /// Turn on verbose output; repeat to increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to the server's TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the credentials database file, if authentication beyond
    /// `None` is configured.
    #[arg(long)]
    credentials: Option<PathBuf>,
}

/// Bridges `log`-crate call sites to `tracing` and installs a
/// stderr-formatted subscriber whose level follows `-q`/`-v`.
fn init_tracing(quiet: bool, verbose: u8) -> LevelFilter {
    let level_filter = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    tracing_log::LogTracer::init().expect("failed to install the log-to-tracing bridge");

    let env_filter = EnvFilter::builder().with_default_directive(level_filter.into()).with_env_var("SNAPDB_LOG").from_env_lossy();

    let subscriber = Registry::default().with(env_filter).with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact());

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("internal error: setting the default tracing subscriber failed");
        std::process::exit(1);
    }

    level_filter
}

fn load_config(path: Option<&PathBuf>) -> ConfigBuilder {
    let Some(path) = path else {
        return ConfigBuilder::new();
    };
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: reading {}: {e}", path.display());
        std::process::exit(1);
    });
    ConfigBuilder::from_toml(&text).unwrap_or_else(|e| {
        eprintln!("error: parsing {}: {e}", path.display());
        std::process::exit(1);
    })
}

/// Builds a [`Catalog`] from the configuration's `databases[]`, attaching
/// every `*.snapdb` archive already present in each database's directory.
fn build_catalog(builder: &ConfigBuilder) -> std::io::Result<Catalog> {
    let mut catalog = Catalog::new();
    for db in &builder.databases {
        std::fs::create_dir_all(&db.directory)?;
        let engine = Engine::new(db.directory.clone(), db.key_type, db.value_type, snapdb::session::WIRE_ENCODING_FIXED_SIZE, db.block_size);

        for entry in std::fs::read_dir(&db.directory)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "snapdb") {
                if let Err(err) = engine.attach(&path) {
                    tracing::warn!("skipping archive {}: {err}", path.display());
                }
            }
        }

        tracing::info!("attached database \"{}\" at {}", db.name, db.directory.display());
        catalog.insert(db.name.clone(), Arc::new(engine));
    }
    Ok(catalog)
}

fn build_credentials(path: Option<&PathBuf>) -> Arc<dyn CredentialStore + Send + Sync> {
    match path {
        Some(path) => match FileCredentialStore::load(path) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                eprintln!("error: reading {}: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => Arc::new(NoCredentials),
    }
}

/// Stands in for a credentials database when none is configured; every
/// lookup fails, so only `AuthMode::None` succeeds against it.
struct NoCredentials;

impl CredentialStore for NoCredentials {
    fn srp_verifier(&self, _user: &str) -> Option<snapdb::security::srp::Verifier> {
        None
    }
    fn scram_credential(&self, _user: &str) -> Option<snapdb::security::scram::StoredCredential<sha2::Sha256>> {
        None
    }
    fn user_exists(&self, _user: &str) -> bool {
        false
    }
}

fn main() {
    let args = Args::parse();
    let level_filter = init_tracing(args.quiet, args.verbose);

    tracing::info!("starting snapdbd ({} {}), log level: {level_filter}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let builder = load_config(args.config.as_ref());
    let catalog = match build_catalog(&builder) {
        Ok(catalog) => catalog,
        Err(err) => {
            eprintln!("error: attaching configured databases: {err}");
            std::process::exit(1);
        }
    };
    let credentials = build_credentials(args.credentials.as_ref());

    let options = ServerOptions {
        config: Arc::new(builder.freeze()),
        catalog: Arc::new(catalog),
        credentials,
        tls_acceptor: None::<Arc<TlsAcceptor>>,
        resumes: Arc::new(ResumeRegistry::default()),
    };

    let listener = match Listener::bind(options) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("error: binding the listener: {err}");
            std::process::exit(1);
        }
    };

    let listener = Arc::new(listener);
    let stop_handle = Arc::clone(&listener);
    if let Err(err) = ctrlc::set_handler(move || stop_handle.shutdown()) {
        tracing::warn!("could not install a Ctrl-C handler: {err}");
    }

    if let Err(err) = listener.run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
