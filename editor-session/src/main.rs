//! # Editor Studio
//!
//! Command-line front end for an editing session: crop local images or
//! request generated variants from a studio backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use clap::{Parser, Subcommand};
use editor_session::{
    Collaborators, EditSession, FilePreferenceStore, FixedModeSelector, HttpStudioClient,
    ImageRasterizer, ResourceMode, SessionConfig, StaticAuth, TaskEvent,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default studio backend.
const DEFAULT_BACKEND: &str = "http://127.0.0.1:8080/";

#[derive(Debug, Parser)]
#[command(name = "editor-studio", version, about = "Image editing session")]
struct Cli {
    /// Studio backend base URL.
    #[arg(long, env = "EDITOR_BACKEND_URL", default_value = DEFAULT_BACKEND, global = true)]
    backend: String,

    /// Bearer token for the backend.
    #[arg(long, env = "EDITOR_TOKEN", global = true)]
    token: Option<String>,

    /// Directory for stored preferences.
    #[arg(long, env = "EDITOR_DATA_DIR", default_value = ".editor-studio", global = true)]
    data_dir: PathBuf,

    /// Font used when flattening text.
    #[arg(long, env = "EDITOR_FONT", global = true)]
    font: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Crop a local image. Box values are percentages of the image.
    Crop {
        /// Source image.
        #[arg(long)]
        input: PathBuf,
        /// Left edge.
        #[arg(long)]
        x: f32,
        /// Top edge.
        #[arg(long)]
        y: f32,
        /// Width.
        #[arg(long)]
        w: f32,
        /// Height.
        #[arg(long)]
        h: f32,
        /// Lock to this width/height ratio.
        #[arg(long)]
        ratio: Option<f32>,
        /// Destination PNG.
        #[arg(long)]
        output: PathBuf,
    },
    /// Request a generated variant and wait for the result.
    Generate {
        /// Edit instruction.
        #[arg(long)]
        prompt: String,
        /// Local image to start from.
        #[arg(long, conflicts_with = "image")]
        input: Option<PathBuf>,
        /// Remote image to start from.
        #[arg(long)]
        image: Option<String>,
        /// Resource mode, if none is stored yet.
        #[arg(long)]
        mode: Option<ResourceMode>,
        /// Credits charged in prepaid mode.
        #[arg(long)]
        cost: Option<u64>,
    },
}

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,editor_session=debug,editor_core=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,editor_session=debug,editor_core=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = SessionConfig::from_env();
    let mode = match &cli.command {
        Command::Generate { mode, cost, .. } => {
            if let Some(cost) = cost {
                config.generation_cost = *cost;
            }
            *mode
        }
        Command::Crop { .. } => None,
    };
    let mut session = build_session(&cli, config, mode)?;

    match cli.command {
        Command::Crop {
            input,
            x,
            y,
            w,
            h,
            ratio,
            output,
        } => {
            session.load_image(read_inline(&input)?).await?;
            session.begin_crop()?;
            session.set_crop_box(x, y, w, h)?;
            if ratio.is_some() {
                session.lock_crop_ratio(ratio)?;
            }
            let frame = session.apply_crop().await?;
            let bytes = editor_session::raster::decode_data_uri(&frame.uri)?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if let Some(size) = frame.size {
                tracing::info!(width = size.width, height = size.height, "Cropped image written");
            }
            println!("{}", output.display());
        }
        Command::Generate {
            prompt,
            input,
            image,
            ..
        } => {
            let uri = match (input, image) {
                (Some(path), _) => read_inline(&path)?,
                (None, Some(uri)) => uri,
                (None, None) => anyhow::bail!("Either --input or --image is required"),
            };
            session.load_image(uri).await?;

            let mut events = session.subscribe();
            let task_id = session.generate(&prompt).await?;
            tracing::info!(%task_id, "Generation submitted");

            loop {
                match events.recv().await? {
                    TaskEvent::Succeeded { task_id: id, frame } if id == task_id => {
                        println!("{}", frame.uri);
                        break;
                    }
                    TaskEvent::Failed {
                        task_id: id,
                        message,
                        ..
                    } if id == task_id => {
                        session.shutdown();
                        anyhow::bail!(message);
                    }
                    _ => {}
                }
            }
        }
    }

    session.shutdown();
    Ok(())
}

fn build_session(
    cli: &Cli,
    config: SessionConfig,
    mode: Option<ResourceMode>,
) -> anyhow::Result<EditSession> {
    let mut client = HttpStudioClient::new(&cli.backend)?;
    if let Some(token) = &cli.token {
        client = client.with_token(token.clone());
    }
    let client = Arc::new(client);

    let mut raster = ImageRasterizer::new()?;
    if let Some(font) = &cli.font {
        raster = raster.with_font_file(font)?;
    }

    let auth = if cli.token.is_some() {
        StaticAuth::signed_in()
    } else {
        StaticAuth::signed_out()
    };
    let prefs = FilePreferenceStore::open(&cli.data_dir, client.base_url().as_str())?;

    let mut session = EditSession::new(
        config,
        Collaborators {
            jobs: client.clone(),
            media: client.clone(),
            balance: client,
            auth: Arc::new(auth),
            modes: Arc::new(FixedModeSelector(mode)),
            prefs: Arc::new(prefs),
            raster: Arc::new(raster),
        },
    );
    if let Some(mode) = mode {
        session.set_resource_mode(mode)?;
    }
    Ok(session)
}

fn read_inline(path: &Path) -> anyhow::Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:application/octet-stream;base64,{encoded}"))
}
