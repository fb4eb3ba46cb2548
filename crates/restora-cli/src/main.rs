use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Url;
use restora_client::{AssetHost, HttpFaceService, FACES_ARCHIVE_NAME, MERGED_ARCHIVE_NAME};
use restora_core::{DetectedFace, FaceIndex, Mode, OpKind};
use restora_engine::{spawn_engine, EngineError, EngineHandle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::Config;

#[derive(Parser)]
#[command(name = "restora", about = "Face restoration workflow client")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in an image and list the crops
    Detect {
        /// Image to upload
        image: PathBuf,
    },
    /// Detect, restore and rank faces, then optionally merge and download
    Run {
        /// Image to upload
        image: PathBuf,
        /// Face indices to restore, comma separated (default: all detected faces)
        #[arg(long, value_delimiter = ',')]
        faces: Vec<FaceIndex>,
        /// Restored positions to flag for a selected download, comma separated
        #[arg(long, value_delimiter = ',')]
        keep: Vec<usize>,
        /// Package restored faces into a zip archive
        #[arg(long, value_enum)]
        download: Option<DownloadMode>,
        /// Merge the restored faces back into the full image
        #[arg(long)]
        merge: bool,
        /// Directory for saved archives (overrides configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DownloadMode {
    Selected,
    All,
}

impl From<DownloadMode> for Mode {
    fn from(mode: DownloadMode) -> Self {
        match mode {
            DownloadMode::Selected => Mode::Selected,
            DownloadMode::All => Mode::All,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    let base = Url::parse(&config.service_url)
        .with_context(|| format!("invalid service url {}", config.service_url))?;
    let client = restora_client::client(config.request_timeout(), config.connect_timeout())?;
    let assets = AssetHost::new(client.clone(), base.clone());
    let engine = spawn_engine(HttpFaceService::new(client, base), config.queue_depth);
    watch_progress(&engine);

    match cli.command {
        Commands::Detect { image } => {
            let image = read_image(&image).await?;
            if let Some(faces) = detect(&engine, image).await {
                render::print_detected(&faces, &assets);
            }
        }
        Commands::Run {
            image,
            faces,
            keep,
            download,
            merge,
            output,
        } => {
            let image = read_image(&image).await?;
            let output = output.unwrap_or_else(|| config.output_dir.clone());
            let run = RunOptions {
                faces,
                keep,
                download: download.map(Mode::from),
                merge,
                output,
            };
            run_workflow(&engine, &assets, image, run).await;
        }
    }

    Ok(())
}

struct ImageFile {
    bytes: Vec<u8>,
    file_name: Option<String>,
}

struct RunOptions {
    faces: Vec<FaceIndex>,
    keep: Vec<usize>,
    download: Option<Mode>,
    merge: bool,
    output: PathBuf,
}

async fn read_image(path: &Path) -> Result<ImageFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    Ok(ImageFile { bytes, file_name })
}

/// Print a failed step as a user notice. The workflow record stays as it was.
fn notice<T>(result: Result<T, EngineError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            eprintln!("notice: {e}");
            None
        }
    }
}

async fn detect(engine: &EngineHandle, image: ImageFile) -> Option<Vec<DetectedFace>> {
    let run_id = notice(engine.choose_image(image.bytes, image.file_name).await)?;
    tracing::info!(%run_id, "workflow started");
    notice(engine.detect().await)
}

async fn run_workflow(engine: &EngineHandle, assets: &AssetHost, image: ImageFile, run: RunOptions) {
    let Some(detected) = detect(engine, image).await else {
        return;
    };
    render::print_detected(&detected, assets);
    if detected.is_empty() {
        println!("No faces to restore.");
        return;
    }

    let mode = if run.faces.is_empty() {
        Mode::All
    } else {
        for index in &run.faces {
            notice(engine.toggle_face(*index).await);
        }
        Mode::Selected
    };
    if notice(engine.restore(mode).await).is_none() {
        return;
    }
    for position in &run.keep {
        notice(engine.toggle_download(*position).await);
    }
    println!();
    render::print_comparisons(&engine.snapshot(), assets);

    if run.merge {
        println!();
        if let Some(merged) = notice(engine.merge().await) {
            render::print_merged(&merged, assets);
            save(assets, &merged.artifact_url, &run.output, MERGED_ARCHIVE_NAME).await;
        }
    }

    if let Some(mode) = run.download {
        if let Some(url) = notice(engine.download(mode).await) {
            save(assets, &url, &run.output, FACES_ARCHIVE_NAME).await;
        }
    }
}

async fn save(assets: &AssetHost, url: &str, dir: &Path, file_name: &str) {
    match assets.save(url, dir, file_name).await {
        Ok(path) => println!("Saved {}", path.display()),
        Err(e) => eprintln!("notice: could not save {file_name}: {e}"),
    }
}

/// Print a progress line whenever an operation starts.
///
/// `watch` keeps only the latest snapshot, so an operation that starts and
/// settles between two wakeups of this task is never seen and prints nothing.
/// Results and notices are printed on the request path and are not affected.
fn watch_progress(engine: &EngineHandle) {
    let mut updates = engine.subscribe();
    tokio::spawn(async move {
        let mut previous: Vec<OpKind> = Vec::new();
        while updates.changed().await.is_ok() {
            let pending: Vec<OpKind> = updates.borrow_and_update().pending().collect();
            for op in pending.iter().filter(|op| !previous.contains(op)) {
                println!("{}", render::progress_label(*op));
            }
            previous = pending;
        }
    });
}
