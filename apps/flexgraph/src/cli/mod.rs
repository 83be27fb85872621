//! # flexgraph CLI Module
//!
//! This module implements the CLI interface for flexgraph.
//!
//! Every invocation is one editor lifetime: the session is restored from
//! `--state` or the durable store, the command runs, and the teardown save
//! writes the result back.
//!
//! ## Available Commands
//!
//! - `status` - Show library and graph summary
//! - `share` - Print the shareable `?state=` query
//! - `reset` - Clear the durable store
//! - `shell` - Interactive session with auto-save and frame throttling
//! - `evaluate` - Run one evaluation pass
//! - edit commands (`import`, `output`, `add`, `connect`, ...) shared with
//!   the shell

mod commands;

use clap::{Args, Parser, Subcommand};
use flexgraph_core::FlexError;
use std::path::PathBuf;

use crate::config::Config;
pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// flexgraph - node-based image compositing editor
///
/// Edits the graph and content library stored in a redb database, one
/// command per editor lifetime.
#[derive(Parser, Debug)]
#[command(name = "flexgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the state database (overrides config and FLEXGRAPH_DB)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Shareable state to open: a URL, a `?state=` query or the bare value
    #[arg(short = 's', long, global = true)]
    pub state: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show library and graph summary
    Status,

    /// Save, then print the shareable query string
    Share,

    /// Clear the durable store; nothing is saved on exit
    Reset,

    /// Interactive shell reading edit commands from stdin
    Shell,

    /// Run one evaluation pass and update the Output items
    Evaluate,

    #[command(flatten)]
    Edit(EditCommand),
}

/// Commands that mutate the session. Shared by the CLI and the shell.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum EditCommand {
    /// Import image files into the content library
    Import {
        /// Files to decode; non-image files are skipped
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Create an Output item and its Sink node
    Output {
        /// Width in pixels
        width: String,

        /// Height in pixels
        height: String,

        /// Display name (defaults to "Output N")
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Add a node: source, ninepatch, sink, composite, matte, distributor,
    /// affine or a filter name
    Add {
        kind: String,

        /// Content item the node shows (source, ninepatch, sink)
        #[arg(short = 'i', long)]
        content: Option<String>,

        /// Node title
        #[arg(short, long)]
        title: Option<String>,

        #[command(flatten)]
        at: Position,
    },

    /// Remove a node and its connections
    Remove { node: String },

    /// Connect `node.port` to `node.port`, replacing the target's edge
    Connect { from: String, to: String },

    /// Remove the connection between two endpoints
    Disconnect { from: String, to: String },

    /// Add an input to a Composite or an output to a Distributor
    Grow { node: String },

    /// Move a node on the canvas
    Move {
        node: String,

        #[command(flatten)]
        at: Position,
    },

    /// Set a filter parameter
    Param {
        node: String,
        name: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Set an Affine node's parametric transform
    Transform {
        node: String,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        tx: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        ty: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        rotation: f64,
        #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
        sx: f64,
        #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
        sy: f64,
    },

    /// Remove a content item; an Image in use needs --yes
    DeleteContent {
        id: String,

        /// Also remove every node that shows the Image
        #[arg(short, long)]
        yes: bool,
    },

    /// Focus a content item, or clear focus when omitted
    Focus { id: Option<String> },

    /// Manage palettes
    Palette {
        #[command(subcommand)]
        action: PaletteAction,
    },

    /// Set the pixel format of a Source or Sink node
    Format { node: String, format: String },

    /// Set the Renderer's virtual screen size
    Screen { width: u32, height: u32 },

    /// Set the tile size and checkerboard debug flag
    Tile {
        width: u32,
        height: u32,
        #[arg(long)]
        checkerboard: bool,
    },
}

/// Optional canvas position.
#[derive(Args, Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    #[arg(long, allow_negative_numbers = true)]
    pub x: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub y: Option<f64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PaletteAction {
    /// Add a built-in palette: grayscale, websafe or basic8
    Add { preset: String },

    /// Remove a palette and detach it from every image
    Remove { id: String },

    /// Assign a palette to a Source node, or clear it when omitted
    Assign { node: String, palette: Option<String> },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli, config: Config) -> Result<(), FlexError> {
    let ctx = Context {
        database: cli.database.unwrap_or_else(|| config.storage.path.clone()),
        share: cli.state,
        json_mode: cli.json_mode,
        config,
    };

    match cli.command {
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::Share) => cmd_share(&ctx),
        Some(Commands::Reset) => cmd_reset(&ctx),
        Some(Commands::Shell) => cmd_shell(&ctx).await,
        Some(Commands::Evaluate) => cmd_evaluate(&ctx),
        Some(Commands::Edit(edit)) => cmd_edit(&ctx, edit),
    }
}
