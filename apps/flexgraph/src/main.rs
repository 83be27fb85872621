//! # flexgraph - Node-Based Compositing Editor
//!
//! The main binary for the flexgraph editor core.
//!
//! This application provides:
//! - CLI interface for one-shot graph and library edits
//! - Interactive shell with debounced auto-save and frame-throttled evaluation
//! - Shareable state links (`?state=...`)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    apps/flexgraph (THE BINARY)                  │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐    │
//! │  │   CLI       │    │   Shell     │    │  Config          │    │
//! │  │  (clap)     │    │  (tokio)    │    │  (toml + env)    │    │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘    │
//! │         │                  │                    │               │
//! │         └──────────────────┼────────────────────┘               │
//! │                            ▼                                    │
//! │                    ┌────────────────┐                           │
//! │                    │ flexgraph-core │                           │
//! │                    │  (THE LOGIC)   │                           │
//! │                    └────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! flexgraph import logo.png frame.9.png
//! flexgraph add source --content img-3
//! flexgraph connect image-node-1.out renderer.in
//! flexgraph evaluate
//! flexgraph share
//! flexgraph --state '?state=eyJ2...' status
//! flexgraph shell
//! ```

use clap::Parser;
use flexgraph::cli;
use flexgraph::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Config decides the log format, so it is loaded before tracing exists.
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config.with_env(|key| std::env::var(key).ok()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "flexgraph=info,flexgraph_core=info".into());

    if config.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the flexgraph startup banner.
fn print_banner() {
    eprintln!(
        r#"
  ┌─┐┬  ┌─┐─┐ ┬┌─┐┬─┐┌─┐┌─┐┬ ┬
  ├┤ │  ├┤ ┌┴┬┘│ ┬├┬┘├─┤├─┘├─┤
  └  ┴─┘└─┘┴ └─└─┘┴└─┴ ┴┴  ┴ ┴

  Node-based compositing editor v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
