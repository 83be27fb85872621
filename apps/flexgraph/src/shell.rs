//! # Interactive Shell
//!
//! One editor lifetime driven from stdin. Each line is an edit command
//! (the same grammar as the CLI) or a shell command such as `save`,
//! `share` or `quit`.
//!
//! The loop owns the session. Mutations only record requests; after every
//! event the loop drains them into the frame throttle (evaluation) and the
//! debouncer (auto-save). Image decoding runs on the blocking pool and the
//! decoded batch is registered back on the loop.

use crate::cli::{EditCommand, Page, apply_edit, import_summary, outcome_summary, source_name};
use clap::{Parser, Subcommand};
use flexgraph_core::formats::share_query;
use flexgraph_core::{FlexError, FrameThrottle, ImportBatch};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

// =============================================================================
// GRAMMAR
// =============================================================================

#[derive(Parser, Debug)]
#[command(name = "flexgraph", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ShellCommand {
    /// Show library and graph summary
    Status,

    /// Run one evaluation pass now
    Evaluate,

    /// Save immediately
    Save,

    /// Print the shareable query string
    Share,

    /// Clear the durable store and leave without saving
    Reset,

    /// Save and leave
    #[command(alias = "exit")]
    Quit,

    #[command(flatten)]
    Edit(EditCommand),
}

/// Split a line into words; double quotes group words with spaces.
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    words.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        words.push(current);
    }
    words
}

/// Parse one shell line. Blank lines yield `Ok(None)`; the error carries
/// clap's rendered message (including help output).
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
    let words = split_words(line);
    if words.is_empty() {
        return Ok(None);
    }
    ShellLine::try_parse_from(words)
        .map(|parsed| Some(parsed.command))
        .map_err(|e| e.to_string())
}

// =============================================================================
// LOOP
// =============================================================================

enum Flow {
    Continue,
    Quit,
}

/// Run the shell on stdin until `quit`, end of input or Ctrl-C, then tear down.
pub async fn run(page: Page, frame: Duration) -> Result<(), FlexError> {
    run_with(page, frame, BufReader::new(tokio::io::stdin())).await
}

/// Run the shell on any line source. Imports still decoding when the loop
/// ends are registered before the final save.
pub async fn run_with<R>(mut page: Page, frame: Duration, input: R) -> Result<(), FlexError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut frames = tokio::time::interval(frame);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut throttle = FrameThrottle::new();
    let (decoded_tx, mut decoded_rx) = mpsc::unbounded_channel::<ImportBatch>();

    tracing::info!(
        source = source_name(page.source),
        frame_ms = frame.as_millis() as u64,
        "Shell ready"
    );
    // Outputs are not persisted with pixels; draw them once on start.
    throttle.request();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Flow::Quit = handle_line(&mut page, &line, &decoded_tx) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read input");
                    break;
                }
            },
            Some(batch) = decoded_rx.recv() => {
                let report = batch.apply(&mut page.session);
                println!("{}", import_summary(&report));
            }
            _ = frames.tick() => {
                if throttle.on_frame() {
                    let outcome = page.evaluate();
                    tracing::debug!("{}", outcome_summary(&outcome));
                }
                page.persistence.poll(Instant::now(), &page.session);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
        drain_requests(&mut page, &mut throttle);
    }

    drop(decoded_tx);
    while let Some(batch) = decoded_rx.recv().await {
        let report = batch.apply(&mut page.session);
        println!("{}", import_summary(&report));
    }

    if throttle.dropped() > 0 {
        tracing::debug!(coalesced = throttle.dropped(), "Evaluation requests coalesced");
    }
    if page.close() {
        tracing::info!("State saved");
    }
    Ok(())
}

/// Route recorded requests to the scheduler.
fn drain_requests(page: &mut Page, throttle: &mut FrameThrottle) {
    let requests = page.session.take_requests();
    if requests.evaluate {
        throttle.request();
    }
    if requests.save {
        page.persistence.request_save(Instant::now());
    }
}

fn handle_line(page: &mut Page, line: &str, decoded: &mpsc::UnboundedSender<ImportBatch>) -> Flow {
    let command = match parse_line(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Flow::Continue,
        Err(message) => {
            eprintln!("{}", message.trim_end());
            return Flow::Continue;
        }
    };

    match command {
        ShellCommand::Status => {
            let library = page.session.library();
            println!(
                "{} image(s), {} output(s), {} palette(s), {} node(s), {} connection(s)",
                library.images().count(),
                library.outputs().count(),
                library.palettes().len(),
                page.session.graph().node_count(),
                page.session.graph().connection_count()
            );
        }
        ShellCommand::Evaluate => {
            let outcome = page.evaluate();
            println!("{}", outcome_summary(&outcome));
        }
        ShellCommand::Save => {
            if page.persistence.save_now(&page.session) {
                println!("Saved");
            } else {
                eprintln!("Save failed");
            }
        }
        ShellCommand::Share => match page.persistence.share(&page.session) {
            Ok(encoded) => println!("{}", share_query(&encoded)),
            Err(e) => eprintln!("error: {e}"),
        },
        ShellCommand::Reset => {
            if page.persistence.reset() {
                println!("State cleared");
            }
            return Flow::Quit;
        }
        ShellCommand::Quit => return Flow::Quit,
        ShellCommand::Edit(EditCommand::Import { paths }) => {
            println!("Decoding {} file(s)", paths.len());
            let tx = decoded.clone();
            tokio::task::spawn_blocking(move || {
                if tx.send(ImportBatch::decode(&paths)).is_err() {
                    tracing::debug!("Shell closed before import finished");
                }
            });
        }
        ShellCommand::Edit(edit) => match apply_edit(&mut page.session, edit) {
            Ok(message) => println!("{message}"),
            Err(e) => eprintln!("error: {e}"),
        },
    }
    Flow::Continue
}
