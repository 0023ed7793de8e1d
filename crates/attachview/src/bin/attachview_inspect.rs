use bevy::log::{info, warn};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use attachview::lib::attachment::ViewerKind;
use attachview::lib::fetch::ApiClient;
use attachview::lib::geometry::{NormalizationScope, MESH_TARGET_EXTENT, SPLINE_TARGET_EXTENT};
use attachview::lib::settings::{Settings, SETTINGS_FILENAME};
use attachview::lib::workers::{fetch_and_classify, load_mesh, normalize_splines, CancelToken};

#[derive(Parser, Debug)]
#[command(name = "attachview-inspect")]
#[command(about = "Fetch an attachment without a window and print what the viewer would show")]
struct Args {
    /// Attachment data href (relative to the base URL, or absolute)
    href: String,

    /// Media type; guessed from the href extension when omitted
    #[arg(long, value_name = "TYPE")]
    media_type: Option<String>,

    /// Base URL of the record service
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Spline normalization scope: 'global' or 'per-spline'
    #[arg(long, value_name = "SCOPE")]
    scope: Option<String>,

    /// Settings file (defaults to ./attachview.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

/// `RUST_LOG` when set, otherwise info (debug with `--verbose`)
fn log_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Subscriber for the library's tracing events, which are also what the
/// bevy log macros emit
fn log_subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

fn guess_kind(href: &str, media_type: Option<&str>) -> ViewerKind {
    if let Some(media_type) = media_type {
        return ViewerKind::for_media_type(media_type);
    }
    let path = href.split(['?', '#']).next().unwrap_or(href).to_ascii_lowercase();
    if path.ends_with(".gltf") || path.ends_with(".glb") {
        ViewerKind::Mesh
    } else {
        ViewerKind::Spline
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    log_subscriber(log_filter(args.verbose), std::io::stderr).try_init()?;

    let settings_path = args.config.unwrap_or_else(|| SETTINGS_FILENAME.into());
    let mut config = Settings::load_from_path(&settings_path)?
        .unwrap_or_default()
        .resolve();
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(scope) = args.scope.as_deref() {
        config.normalization_scope = NormalizationScope::from_str(scope)?;
    }

    let client = ApiClient::new(&config.base_url, config.timeout)?;
    let cancel = CancelToken::new();
    info!("Inspecting {} via {}", args.href, client.base_url());

    match guess_kind(&args.href, args.media_type.as_deref()) {
        ViewerKind::Mesh => {
            let mut last_percent = None;
            let asset = load_mesh(&client, &args.href, &cancel, |loaded, total| {
                if let Some(total) = total.filter(|t| *t > 0) {
                    let percent = loaded * 100 / total;
                    if last_percent != Some(percent) {
                        info!("{}% ({} / {} bytes)", percent, loaded, total);
                        last_percent = Some(percent);
                    }
                }
            })?;

            println!("Mesh Information:");
            println!("=================");
            println!("Parts: {}", asset.parts.len());
            println!("Vertices: {}", asset.vertex_count());
            println!("Triangles: {}", asset.triangle_count());
            let bounds = asset.bounds;
            println!(
                "  Min: [{:.6}, {:.6}, {:.6}]",
                bounds.min.x, bounds.min.y, bounds.min.z
            );
            println!(
                "  Max: [{:.6}, {:.6}, {:.6}]",
                bounds.max.x, bounds.max.y, bounds.max.z
            );
            match asset.fit_transform(MESH_TARGET_EXTENT) {
                Ok((scale, offset)) => println!("Fit: scale {:.6}, offset {:?}", scale, offset),
                Err(e) => warn!("Mesh cannot be fitted: {}", e),
            }
        }
        ViewerKind::Spline => {
            let dataset = fetch_and_classify(&client, &args.href, &cancel)?;

            println!("Dataset Information:");
            println!("====================");
            println!("Scalars: {}", dataset.scalars.len());
            for scalar in &dataset.scalars {
                println!("  {} = {}", scalar.label, scalar.display_value());
            }
            println!("Splines: {}", dataset.splines.len());
            for spline in &dataset.splines {
                println!("  {} ({} points)", spline.label, spline.points.len());
            }

            if dataset.splines.is_empty() {
                return Ok(());
            }
            let normalized = normalize_splines(
                &dataset.splines,
                SPLINE_TARGET_EXTENT,
                config.normalization_scope,
            )?;
            println!("\nNormalization ({:?}):", config.normalization_scope);
            for spline in &normalized {
                println!(
                    "  {}: scale {:.6}, center [{:.6}, {:.6}, {:.6}]",
                    spline.label, spline.scale, spline.center.x, spline.center.y, spline.center.z
                );
            }
        }
        ViewerKind::Image => println!("Image attachment: {}", client.resolve(&args.href)?),
        ViewerKind::Unsupported(media_type) => {
            eprintln!("No viewer available for media type: {}", media_type);
            std::process::exit(2);
        }
    }

    Ok(())
}
