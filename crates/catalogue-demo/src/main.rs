//! Catalogue demo binary
//!
//! Builds a catalogue in memory, paces a bulk creation over frame ticks,
//! copies a folder with the duplicate modifier held, edits the selection and
//! prints a JSON summary of the result on stdout.
//!
//! ## Usage
//!
//! ```bash
//! catalogue-demo [--config catalogue.ron] [--folders N] [--items N]
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use catalogue_engine::{Catalogue, CatalogueConfig, CatalogueFlow, DragGesture, FrameTicker};
use catalogue_types::{EntityPatch, EntityRef};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FOLDERS: i64 = 1000;
const DEFAULT_ITEMS: i64 = 600;

fn print_usage() {
    eprintln!(
        r#"catalogue-demo - exercise the catalogue collection engine

USAGE:
    catalogue-demo [OPTIONS]

OPTIONS:
    --config <PATH>     RON configuration file (default: built-in defaults)
    --folders <N>       Folders to create (default: {folders})
    --items <N>         Items to create in the first folder (default: {items})
    --help, -h          Show this help

Set RUST_LOG=debug to see ignored requests and per-batch progress.
"#,
        folders = DEFAULT_FOLDERS,
        items = DEFAULT_ITEMS,
    );
}

struct Options {
    config: Option<PathBuf>,
    folders: i64,
    items: i64,
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<Options>> {
    let mut options = Options {
        config: None,
        folders: DEFAULT_FOLDERS,
        items: DEFAULT_ITEMS,
    };

    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                options.config = Some(PathBuf::from(path));
            }
            "--folders" => {
                let n = args.next().context("--folders needs a count")?;
                options.folders = n.parse().with_context(|| format!("bad folder count: {n}"))?;
            }
            "--items" => {
                let n = args.next().context("--items needs a count")?;
                options.items = n.parse().with_context(|| format!("bad item count: {n}"))?;
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(Some(options))
}

/// What the run produced, printed as JSON.
#[derive(Serialize)]
struct Summary {
    version: u64,
    folders: usize,
    items: usize,
    commits_observed: usize,
    copied_folder: Option<String>,
    selection: Option<EntityRef>,
    selected_name: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e:#}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(options).await {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("Failed to encode summary: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::error!("Demo failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(options: Options) -> anyhow::Result<Summary> {
    let config = match &options.config {
        Some(path) => CatalogueConfig::load(path)?,
        None => CatalogueConfig::default(),
    };
    let catalogue = Catalogue::new(config);

    let commits = Arc::new(AtomicUsize::new(0));
    let counter = commits.clone();
    let _watch = catalogue.store().subscribe(move |snapshot| {
        if snapshot.change.is_some() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });
    let mut copies = catalogue.store().subscribe_flows("folder.copied");

    tracing::info!(folders = options.folders, "Creating folders");
    catalogue.create_folders(options.folders);
    let mut ticker = FrameTicker::default();
    catalogue.drive(&mut ticker).await;

    let first = catalogue
        .store()
        .snapshot()
        .folders
        .first()
        .map(|f| f.key)
        .context("no folders were created")?;

    tracing::info!(folder = %first, items = options.items, "Creating items");
    catalogue.create_items(first, options.items);
    catalogue.drive(&mut ticker).await;

    // Shift-drag the first folder to the third slot.
    catalogue.key_down("Shift");
    let mode = catalogue.duplicate_mode();
    let outcome = catalogue.drop_folder(DragGesture::reorder(0, 2), mode);
    catalogue.key_up("Shift");
    tracing::info!(?mode, ?outcome, "Dropped folder");

    let copied = match copies.try_recv().map(|msg| msg.payload) {
        Some(CatalogueFlow::FolderCopied { copy, .. }) => Some(copy),
        _ => None,
    };

    if let Some(copy) = copied {
        catalogue.select(Some(EntityRef::Folder(copy)));
        catalogue.apply_edit(
            &EntityPatch::new()
                .with_name("Copied folder")
                .with_description("made with the duplicate modifier held"),
        );
    }

    let snapshot = catalogue.store().snapshot();
    let selection = catalogue.selection();
    Ok(Summary {
        version: snapshot.version,
        folders: snapshot.len(),
        items: snapshot.total_items(),
        commits_observed: commits.load(Ordering::Relaxed),
        copied_folder: copied.map(|key| key.to_string()),
        selection: selection.current_selection(),
        selected_name: selection.selected_fields().name,
    })
}
