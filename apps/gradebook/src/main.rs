//! # Gradebook
//!
//! The main binary for the gradebook grading engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for grade entry, final grades, pendencies and export
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              apps/gradebook (THE BINARY)         │
//! │                                                  │
//! │   ┌─────────────┐          ┌─────────────┐       │
//! │   │    CLI      │          │  HTTP API   │       │
//! │   │   (clap)    │          │   (axum)    │       │
//! │   └──────┬──────┘          └──────┬──────┘       │
//! │          └───────────┬────────────┘              │
//! │                      ▼                           │
//! │             ┌────────────────┐                   │
//! │             │ gradebook-core │                   │
//! │             │  (THE LOGIC)   │                   │
//! │             └────────────────┘                   │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! gradebook server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! gradebook seed -f roster.json
//! gradebook -P 1 grade -e 1 -m 2 -v 7.5
//! gradebook -P 1 final-grades -d 1 -k 1
//! ```

use clap::Parser;
use gradebook::cli;
use gradebook::config::{AppConfig, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "gradebook=info,gradebook_core=info,tower_http=debug";

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Configuration must load before tracing so that the log format applies.
    let config = match AppConfig::load(cli.config.as_deref()).and_then(|mut config| {
        cli.apply_to(&mut config)?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!(code = e.code(), "Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing; `RUST_LOG` overrides the configured filter.
fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        config
            .logging
            .filter
            .as_deref()
            .unwrap_or(DEFAULT_LOG_FILTER)
            .into()
    });

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

fn print_banner() {
    println!(
        r#"
   ____               _      _                 _
  / ___|_ __ __ _  __| | ___| |__   ___   ___ | | __
 | |  _| '__/ _` |/ _` |/ _ \ '_ \ / _ \ / _ \| |/ /
 | |_| | | | (_| | (_| |  __/ |_) | (_) | (_) |   <
  \____|_|  \__,_|\__,_|\___|_.__/ \___/ \___/|_|\_\

  Gradebook v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
