//! # CLI Tests
//!
//! Argument parsing, the shell grammar, configuration and page lifetimes
//! against a temporary redb file.

#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use flexgraph::cli::{
    Cli, Commands, Context, EditCommand, Page, PaletteAction, Position, apply_edit, endpoint,
};
use flexgraph::config::{Config, ENV_DATABASE, ENV_LOG_FORMAT};
use flexgraph::shell::{ShellCommand, parse_line, run_with, split_words};
use flexgraph_core::{
    ContentId, FlexError, HeadlessEngine, NodeId, NodeKind, PixelFormat, RestoreSource, Session,
};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn session() -> Session {
    Session::new(Box::new(HeadlessEngine::new()))
}

fn context(dir: &TempDir) -> Context {
    Context {
        database: dir.path().join("state.redb"),
        share: None,
        json_mode: false,
        config: Config::default(),
    }
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

#[test]
fn no_subcommand_defaults_to_status() {
    let cli = Cli::try_parse_from(["flexgraph"]).expect("parse");
    assert!(cli.command.is_none());
    assert!(cli.database.is_none());
    assert!(!cli.json_mode);
}

#[test]
fn global_flags_follow_the_subcommand() {
    let cli = Cli::try_parse_from([
        "flexgraph",
        "status",
        "--json-mode",
        "-D",
        "custom.redb",
        "--state",
        "?state=abc",
    ])
    .expect("parse");
    assert!(matches!(cli.command, Some(Commands::Status)));
    assert!(cli.json_mode);
    assert_eq!(cli.database, Some(PathBuf::from("custom.redb")));
    assert_eq!(cli.state.as_deref(), Some("?state=abc"));
}

#[test]
fn edit_commands_are_flattened_into_the_cli() {
    let cli = Cli::try_parse_from(["flexgraph", "connect", "image-node-1.out", "renderer.in"])
        .expect("parse");
    let Some(Commands::Edit(EditCommand::Connect { from, to })) = cli.command else {
        panic!("expected connect");
    };
    assert_eq!(from, "image-node-1.out");
    assert_eq!(to, "renderer.in");
}

#[test]
fn add_accepts_negative_positions() {
    let cli = Cli::try_parse_from(["flexgraph", "add", "affine", "--x", "-40", "--y", "12.5"])
        .expect("parse");
    let Some(Commands::Edit(EditCommand::Add { kind, at, .. })) = cli.command else {
        panic!("expected add");
    };
    assert_eq!(kind, "affine");
    assert_eq!(
        at,
        Position {
            x: Some(-40.0),
            y: Some(12.5)
        }
    );
}

#[test]
fn import_requires_at_least_one_path() {
    assert!(Cli::try_parse_from(["flexgraph", "import"]).is_err());
}

// =============================================================================
// SHELL GRAMMAR
// =============================================================================

#[test]
fn split_words_honours_quotes() {
    assert_eq!(
        split_words(r#"output 320 240 --name "Front panel""#),
        ["output", "320", "240", "--name", "Front panel"]
    );
    assert_eq!(split_words("   "), Vec::<String>::new());
    assert_eq!(split_words(r#"focus """#), ["focus", ""]);
}

#[test]
fn shell_lines_parse_into_commands() {
    assert_eq!(parse_line("").expect("blank"), None);
    assert_eq!(parse_line("exit").expect("alias"), Some(ShellCommand::Quit));
    assert_eq!(
        parse_line("grow composite-1").expect("grow"),
        Some(ShellCommand::Edit(EditCommand::Grow {
            node: "composite-1".to_string()
        }))
    );
    assert_eq!(
        parse_line("palette add websafe").expect("palette"),
        Some(ShellCommand::Edit(EditCommand::Palette {
            action: PaletteAction::Add {
                preset: "websafe".to_string()
            }
        }))
    );
    assert!(parse_line("frobnicate").is_err());
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[test]
fn empty_config_uses_defaults() {
    let config = Config::from_toml("").expect("parse");
    assert_eq!(config, Config::default());
    assert_eq!(config.debounce(), Duration::from_millis(500));
    assert_eq!(config.frame_interval(), Duration::from_millis(16));
    assert!(!config.json_logs());
}

#[test]
fn partial_config_overrides_only_named_fields() {
    let config = Config::from_toml(
        r#"
        [autosave]
        debounce_ms = 250

        [log]
        format = "JSON"
        "#,
    )
    .expect("parse");
    assert_eq!(config.debounce(), Duration::from_millis(250));
    assert_eq!(config.storage.path, PathBuf::from("flexgraph.redb"));
    assert!(config.json_logs());
}

#[test]
fn malformed_config_is_rejected() {
    assert!(matches!(
        Config::from_toml("[autosave]\ndebounce_ms = \"soon\""),
        Err(FlexError::DeserializationError(_))
    ));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        Config::load(Some(missing.as_path())),
        Err(FlexError::IoError(_))
    ));
}

#[test]
fn environment_overrides_file_values() {
    let config = Config::default().with_env(|key| match key {
        k if k == ENV_DATABASE => Some("/tmp/other.redb".to_string()),
        k if k == ENV_LOG_FORMAT => Some("json".to_string()),
        _ => None,
    });
    assert_eq!(config.storage.path, PathBuf::from("/tmp/other.redb"));
    assert!(config.json_logs());

    let untouched = Config::default().with_env(|_| Some(String::new()));
    assert_eq!(untouched, Config::default());
}

#[test]
fn frame_interval_is_never_zero() {
    let config = Config::from_toml("[render]\nframe_ms = 0").expect("parse");
    assert_eq!(config.frame_interval(), Duration::from_millis(1));
}

// =============================================================================
// EDITS
// =============================================================================

#[test]
fn endpoint_requires_node_and_port() {
    let parsed = endpoint("composite-1.in2").expect("endpoint");
    assert_eq!(parsed.node, NodeId::new("composite-1"));
    assert_eq!(parsed.port.as_str(), "in2");
    assert!(matches!(
        endpoint("renderer"),
        Err(FlexError::InvalidEndpoint(_))
    ));
}

#[test]
fn output_edit_creates_item_and_sink() {
    let mut s = session();
    let message = apply_edit(
        &mut s,
        EditCommand::Output {
            width: "64".to_string(),
            height: "32".to_string(),
            name: None,
        },
    )
    .expect("output");
    assert!(message.contains("out-3"));
    let item = s.library().get(&ContentId::new("out-3")).expect("item");
    assert_eq!(item.name, "LCD #3");
    assert!(
        s.graph()
            .nodes()
            .iter()
            .any(|n| matches!(&n.kind, NodeKind::Sink { content, .. } if content == &item.id))
    );

    let err = apply_edit(
        &mut s,
        EditCommand::Output {
            width: "0".to_string(),
            height: "32".to_string(),
            name: None,
        },
    )
    .expect_err("zero width");
    assert!(matches!(err, FlexError::InvalidDimensions(_)));
}

#[test]
fn add_source_without_content_is_rejected() {
    let mut s = session();
    let err = apply_edit(
        &mut s,
        EditCommand::Add {
            kind: "source".to_string(),
            content: None,
            title: None,
            at: Position::default(),
        },
    )
    .expect_err("missing content");
    assert!(matches!(err, FlexError::MissingContent(_)));
    assert_eq!(s.graph().node_count(), 1);
}

#[test]
fn add_filter_at_position() {
    let mut s = session();
    apply_edit(
        &mut s,
        EditCommand::Add {
            kind: "grayscale".to_string(),
            content: None,
            title: Some("Soften".to_string()),
            at: Position {
                x: Some(10.0),
                y: None,
            },
        },
    )
    .expect("add filter");
    let node = s
        .graph()
        .nodes()
        .iter()
        .find(|n| !n.kind.is_renderer())
        .expect("filter node");
    assert_eq!(node.title, "Soften");
    assert_eq!(node.position.x, 10.0);
    assert_eq!(node.position.y, 0.0);
}

#[test]
fn delete_content_in_use_needs_consent() {
    let mut s = session();
    let img = s
        .add_image("a.png", 2, 2, vec![0; 16], false)
        .expect("image");
    s.add_source(&img).expect("source");

    let message = apply_edit(
        &mut s,
        EditCommand::DeleteContent {
            id: img.as_str().to_string(),
            yes: false,
        },
    )
    .expect("needs consent");
    assert!(message.contains("--yes"));
    assert!(s.library().get(&img).is_some());

    apply_edit(
        &mut s,
        EditCommand::DeleteContent {
            id: img.as_str().to_string(),
            yes: true,
        },
    )
    .expect("removed");
    assert!(s.library().get(&img).is_none());
    assert_eq!(s.graph().node_count(), 1);
}

#[test]
fn format_edit_targets_sources_and_sinks_only() {
    let mut s = session();
    let (_, sink) = s.create_output(None, 8, 8).expect("output");
    apply_edit(
        &mut s,
        EditCommand::Format {
            node: sink.as_str().to_string(),
            format: PixelFormat::Rgb565Le.name().to_string(),
        },
    )
    .expect("sink format");
    let Some(NodeKind::Sink { format, .. }) = s.graph().node(&sink).map(|n| &n.kind) else {
        panic!("sink missing");
    };
    assert_eq!(*format, PixelFormat::Rgb565Le);

    let err = apply_edit(
        &mut s,
        EditCommand::Format {
            node: "renderer".to_string(),
            format: PixelFormat::Rgb565Le.name().to_string(),
        },
    )
    .expect_err("renderer has no format");
    assert!(matches!(err, FlexError::WrongNodeKind { .. }));
}

// =============================================================================
// PAGE LIFETIME
// =============================================================================

#[test]
fn page_round_trips_through_the_database() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);

    let mut page = Page::open(&ctx).expect("open");
    assert_eq!(page.source, RestoreSource::Default);
    apply_edit(
        &mut page.session,
        EditCommand::Add {
            kind: "composite".to_string(),
            content: None,
            title: None,
            at: Position::default(),
        },
    )
    .expect("add composite");
    assert!(page.settle().is_some());
    assert!(page.close());

    let page = Page::open(&ctx).expect("reopen");
    assert_eq!(page.source, RestoreSource::Durable);
    assert!(page.session.graph().contains(&NodeId::new("composite-1")));
}

#[test]
fn reset_suppresses_the_teardown_save() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);

    let page = Page::open(&ctx).expect("open");
    assert!(page.close());

    let mut page = Page::open(&ctx).expect("reopen");
    assert!(page.persistence.reset());
    assert!(!page.close());

    let page = Page::open(&ctx).expect("after reset");
    assert_eq!(page.source, RestoreSource::Default);
}

#[test]
fn shared_state_takes_priority_over_the_database() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);

    let mut page = Page::open(&ctx).expect("open");
    page.session
        .add_output("Shared", 16, 16)
        .expect("shared output");
    let share = page.persistence.share(&page.session).expect("share");
    assert!(page.close());

    let mut page = Page::open(&ctx).expect("reopen");
    page.session
        .remove_content(&ContentId::new("out-3"), true);
    assert!(page.close());

    let shared_ctx = Context {
        share: Some(format!("https://example.test/editor?state={share}")),
        ..context(&dir)
    };
    let page = Page::open(&shared_ctx).expect("open shared");
    assert_eq!(page.source, RestoreSource::Shareable);
    assert!(page.session.library().get(&ContentId::new("out-3")).is_some());
}

#[tokio::test]
async fn import_then_quit_keeps_the_image() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);
    let png = dir.path().join("logo.png");
    image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]))
        .save(&png)
        .expect("write png");

    let script = format!("import \"{}\"\nquit\n", png.display());
    let page = Page::open(&ctx).expect("open");
    run_with(page, Duration::from_millis(1), script.as_bytes())
        .await
        .expect("shell");

    let page = Page::open(&ctx).expect("reopen");
    assert_eq!(page.source, RestoreSource::Durable);
    let item = page
        .session
        .library()
        .images()
        .find(|c| c.name == "logo.png")
        .expect("imported image");
    assert_eq!(item.pixels.as_ref().map(Vec::len), Some(3 * 2 * 4));
}
