use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lookbook_contracts::descriptors::{BodyType, BATCH_SKIN_COLORS};
use lookbook_contracts::events::{EventWriter, RunEvent};
use lookbook_contracts::generation::{Framing, Quality};
use lookbook_engine::{
    Classifier, EngineConfig, GenerationClient, LibraryPlan, OpenAiImages, OpenAiVision,
    TransformRequest, Transformer, VariationRequest,
};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "lookbook", version, about = "Catalog image generation across body types and skin tones")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Transform one reference image into a single body type and skin tone.
    Transform(TransformArgs),
    /// Transform one reference image into every body type and skin tone.
    Batch(BatchArgs),
    /// Generate a base body with no garment reference.
    Body(BodyArgs),
    /// Two-step generation: base body first, then the reference outfit.
    Variation(VariationArgs),
    /// Pre-generate base bodies for later reuse.
    Library(LibraryArgs),
    /// Classify the person in a local photo and print the JSON result.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Parser)]
struct GenerationOptions {
    #[arg(long)]
    quality: Option<Quality>,
    #[arg(long, default_value = "full")]
    framing: Framing,
    #[arg(long)]
    tux_instructions: Option<String>,
}

#[derive(Debug, Parser)]
struct FabricOptions {
    /// Explicit fabric close-up sent alongside the reference.
    #[arg(long)]
    fabric_detail: Option<PathBuf>,
    /// Directory searched for `<product-code>*_FABRIC*.jpg`.
    #[arg(long, requires = "product_code")]
    fabric_dir: Option<PathBuf>,
    #[arg(long)]
    product_code: Option<String>,
}

#[derive(Debug, Parser)]
struct TransformArgs {
    #[arg(long)]
    reference: PathBuf,
    #[arg(long)]
    body_type: String,
    #[arg(long)]
    skin_color: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    cooldown_secs: Option<u64>,
    #[command(flatten)]
    fabric: FabricOptions,
    #[command(flatten)]
    options: GenerationOptions,
}

#[derive(Debug, Parser)]
struct BatchArgs {
    #[arg(long)]
    reference: PathBuf,
    #[arg(long)]
    out_root: PathBuf,
    #[arg(long, value_delimiter = ',')]
    body_types: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    skin_colors: Vec<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    cooldown_secs: Option<u64>,
    #[command(flatten)]
    fabric: FabricOptions,
    #[command(flatten)]
    options: GenerationOptions,
}

#[derive(Debug, Parser)]
struct BodyArgs {
    #[arg(long)]
    body_type: String,
    #[arg(long)]
    skin_color: String,
    #[arg(long)]
    out: Option<PathBuf>,
    #[command(flatten)]
    options: GenerationOptions,
}

#[derive(Debug, Parser)]
struct VariationArgs {
    #[arg(long)]
    reference: PathBuf,
    #[arg(long)]
    body_type: String,
    /// Free text; a "<word> skin tone" phrase selects the skin tone.
    #[arg(long)]
    description: String,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    base_library: Option<PathBuf>,
    #[command(flatten)]
    fabric: FabricOptions,
    #[command(flatten)]
    options: GenerationOptions,
}

#[derive(Debug, Parser)]
struct LibraryArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long, value_delimiter = ',')]
    body_types: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    skin_colors: Vec<String>,
    #[arg(long, default_value_t = 1)]
    poses: u32,
    #[arg(long)]
    quality: Option<Quality>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    image: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lookbook error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    match cli.command {
        Command::Transform(args) => run_transform(&config, args),
        Command::Batch(args) => run_batch(&config, args),
        Command::Body(args) => run_body(&config, args),
        Command::Variation(args) => run_variation(&config, args),
        Command::Library(args) => run_library(&config, args),
        Command::Analyze(args) => run_analyze(&config, args),
    }
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,reqwest=warn".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn build_transformer(config: &EngineConfig, quality: Option<Quality>) -> Result<Transformer> {
    let config = match quality {
        Some(quality) => config.clone().with_quality(quality),
        None => config.clone(),
    };
    let api = Arc::new(OpenAiImages::new(&config)?);
    let client = GenerationClient::new(api, config.retry);
    Ok(Transformer::new(client, &config))
}

fn with_cooldown(config: &EngineConfig, cooldown_secs: Option<u64>) -> EngineConfig {
    match cooldown_secs {
        Some(secs) => config.clone().with_cooldown(Duration::from_secs(secs)),
        None => config.clone(),
    }
}

/// An explicit fabric image wins; otherwise the directory lookup runs with
/// fabric details switched on.
fn resolve_fabric(config: &EngineConfig, fabric: &FabricOptions) -> Result<Option<PathBuf>> {
    if let Some(path) = &fabric.fabric_detail {
        if !path.is_file() {
            bail!("fabric detail image not found: {}", path.display());
        }
        return Ok(Some(path.clone()));
    }
    let (Some(dir), Some(code)) = (&fabric.fabric_dir, &fabric.product_code) else {
        return Ok(None);
    };
    let lookup = build_transformer(&config.clone().with_fabric_details(true), None)?;
    Ok(lookup.find_fabric_detail_image(code, dir))
}

fn run_transform(config: &EngineConfig, args: TransformArgs) -> Result<i32> {
    let config = with_cooldown(config, args.cooldown_secs);
    let fabric = resolve_fabric(&config, &args.fabric)?;
    let transformer = build_transformer(&config, args.options.quality)?;

    let mut request = TransformRequest::new(&args.reference, &args.body_type, &args.skin_color)
        .with_output(&args.out)
        .with_framing(args.options.framing);
    if let Some(description) = args.description {
        request = request.with_description(description);
    }
    if let Some(fabric) = fabric {
        request = request.with_fabric_detail(fabric);
    }
    if let Some(tux) = args.options.tux_instructions {
        request = request.with_tux_instructions(tux);
    }

    match transformer.transform_reference_image(&request) {
        Ok(bytes) => {
            println!("saved {} ({} bytes)", args.out.display(), bytes.len());
            Ok(0)
        }
        Err(err) => {
            tracing::error!(error = %err, "transformation failed");
            Ok(1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BatchItem {
    body_type: String,
    skin_color: String,
    output: PathBuf,
}

/// `<out_root>/<body>/<reference stem>_<skin>.png` for every combination.
fn batch_items(
    out_root: &Path,
    reference: &Path,
    body_types: &[String],
    skin_colors: &[String],
) -> Vec<BatchItem> {
    let stem = reference
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reference".to_string());
    let stem = stem.as_str();
    let body_types: Vec<String> = if body_types.is_empty() {
        BodyType::ALL.iter().map(|body| body.key().to_string()).collect()
    } else {
        body_types.to_vec()
    };
    let skin_colors: Vec<String> = if skin_colors.is_empty() {
        BATCH_SKIN_COLORS.iter().map(|skin| skin.to_string()).collect()
    } else {
        skin_colors.to_vec()
    };

    body_types
        .iter()
        .flat_map(|body_type| {
            skin_colors.iter().map(move |skin_color| BatchItem {
                body_type: body_type.clone(),
                skin_color: skin_color.clone(),
                output: out_root
                    .join(body_type)
                    .join(format!("{stem}_{skin_color}.png")),
            })
        })
        .collect()
}

fn run_batch(config: &EngineConfig, args: BatchArgs) -> Result<i32> {
    if !args.reference.is_file() {
        bail!("reference image not found: {}", args.reference.display());
    }
    let config = with_cooldown(config, args.cooldown_secs);
    let fabric = resolve_fabric(&config, &args.fabric)?;
    let transformer = build_transformer(&config, args.options.quality)?;
    let items = batch_items(
        &args.out_root,
        &args.reference,
        &args.body_types,
        &args.skin_colors,
    );

    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out_root.join("events.jsonl"));
    let events = EventWriter::new(events_path, uuid::Uuid::new_v4().to_string());
    events.emit(RunEvent::RunStarted {
        reference: args.reference.to_string_lossy().into_owned(),
        items: items.len(),
        framing: args.options.framing,
    })?;

    let mut failed = 0usize;
    for (index, item) in items.iter().enumerate() {
        tracing::info!(
            item = index + 1,
            total = items.len(),
            body_type = %item.body_type,
            skin_color = %item.skin_color,
            "batch item"
        );
        events.emit(RunEvent::ItemStarted {
            body_type: item.body_type.clone(),
            skin_color: item.skin_color.clone(),
        })?;

        let mut request = TransformRequest::new(&args.reference, &item.body_type, &item.skin_color)
            .with_output(&item.output)
            .with_framing(args.options.framing);
        if let Some(description) = &args.description {
            request = request.with_description(description.clone());
        }
        if let Some(fabric) = &fabric {
            request = request.with_fabric_detail(fabric);
        }
        if let Some(tux) = &args.options.tux_instructions {
            request = request.with_tux_instructions(tux.clone());
        }

        match transformer.transform_reference_image(&request) {
            Ok(bytes) => {
                events.emit(RunEvent::ArtifactCreated {
                    body_type: item.body_type.clone(),
                    skin_color: item.skin_color.clone(),
                    image_path: item.output.to_string_lossy().into_owned(),
                    bytes: bytes.len(),
                })?;
            }
            Err(err) => {
                failed += 1;
                tracing::error!(body_type = %item.body_type, skin_color = %item.skin_color, error = %err, "batch item failed");
                events.emit(RunEvent::ItemFailed {
                    body_type: item.body_type.clone(),
                    skin_color: item.skin_color.clone(),
                    error: err.to_string(),
                })?;
            }
        }
    }

    events.emit(RunEvent::RunFinished {
        succeeded: items.len() - failed,
        failed,
    })?;
    println!(
        "batch finished: {} succeeded, {failed} failed (events: {})",
        items.len() - failed,
        events.path().display()
    );
    Ok(if failed == 0 { 0 } else { 1 })
}

fn run_body(config: &EngineConfig, args: BodyArgs) -> Result<i32> {
    let transformer = build_transformer(config, args.options.quality)?;
    let path = transformer.generate_body_variation(
        &args.body_type,
        &args.skin_color,
        args.out.as_deref(),
        args.options.framing,
        args.options.tux_instructions.as_deref(),
    );
    Ok(report_path(path))
}

fn run_variation(config: &EngineConfig, args: VariationArgs) -> Result<i32> {
    let fabric = resolve_fabric(config, &args.fabric)?;
    let transformer = build_transformer(config, args.options.quality)?;
    let request = VariationRequest {
        output_file: args.out,
        base_library: args.base_library,
        fabric_detail_image: fabric,
        framing: args.options.framing,
        tux_instructions: args.options.tux_instructions,
        ..VariationRequest::new(args.reference, args.body_type, args.description)
    };
    Ok(report_path(transformer.generate_variation_with_reference(&request)))
}

fn run_library(config: &EngineConfig, args: LibraryArgs) -> Result<i32> {
    let transformer = build_transformer(config, None)?;
    let mut plan = LibraryPlan {
        poses_per_combination: args.poses,
        quality: args.quality,
        ..LibraryPlan::default()
    };
    if !args.body_types.is_empty() {
        plan.body_types = args.body_types;
    }
    if !args.skin_colors.is_empty() {
        plan.skin_colors = args.skin_colors;
    }
    let library = transformer
        .generate_base_body_library(&args.out, &plan)
        .with_context(|| format!("failed to build base body library in {}", args.out.display()))?;
    let summary: serde_json::Map<String, Value> = library
        .into_iter()
        .map(|(key, paths)| {
            let paths = paths
                .iter()
                .map(|path| Value::String(path.to_string_lossy().into_owned()))
                .collect();
            (key, Value::Array(paths))
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&Value::Object(summary))?);
    Ok(0)
}

fn run_analyze(config: &EngineConfig, args: AnalyzeArgs) -> Result<i32> {
    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let vision = Arc::new(OpenAiVision::new(config)?);
    let classifier = Classifier::new(vision, config.retry);
    let result = classifier
        .classify(&bytes)
        .with_context(|| format!("failed to analyze {}", args.image.display()))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(0)
}

fn report_path(path: Option<PathBuf>) -> i32 {
    match path {
        Some(path) => {
            println!("saved {}", path.display());
            0
        }
        None => 1,
    }
}
