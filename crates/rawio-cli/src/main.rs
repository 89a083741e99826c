use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rawio_core::{can_read_format, CanonicalImage, RawImageHandler, Size};

#[derive(Parser)]
#[command(name = "rawio")]
#[command(about = "Decode camera RAW files into plain images", long_about = None)]
#[command(version)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true, default_value_t)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the metadata of a RAW file
    Probe {
        /// Input RAW file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode a RAW file and save it as PNG
    Decode {
        /// Input RAW file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output image
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Output width (requires --height)
        #[arg(short = 'W', long, value_name = "PIXELS", requires = "height")]
        width: Option<u32>,

        /// Output height (requires --width)
        #[arg(short = 'H', long, value_name = "PIXELS", requires = "width")]
        height: Option<u32>,

        /// Decode quality (0-100, -1 for the default)
        #[arg(
            short,
            long,
            value_name = "QUALITY",
            default_value_t = -1,
            allow_hyphen_values = true
        )]
        quality: i32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose);

    match args.command {
        Command::Probe { input, json } => probe(&input, json),
        Command::Decode {
            input,
            output,
            width,
            height,
            quality,
        } => {
            let size = width.zip(height).map(Size::from);
            decode(&input, &output, size, quality)
        }
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn open_handler(input: &Path) -> Result<RawImageHandler> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;

    let extension = input
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if can_read_format(extension) == Some(false) {
        tracing::warn!(
            "`{}` does not have a known RAW extension, trying anyway",
            input.display()
        );
    }

    let mut handler = RawImageHandler::new();
    handler.set_device(BufReader::new(file));
    Ok(handler)
}

fn probe(input: &Path, json: bool) -> Result<()> {
    let mut handler = open_handler(input)?;
    let metadata = handler
        .metadata()
        .with_context(|| format!("Cannot read `{}`", input.display()))?
        .clone();

    if json {
        let out = serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
        println!("{out}");
        return Ok(());
    }

    println!("File:    {}", input.display());
    if let Some(make) = &metadata.make {
        println!("Make:    {make}");
    }
    if let Some(model) = &metadata.model {
        println!("Model:   {model}");
    }
    println!("Sensor:  {}x{}", metadata.width, metadata.height);
    println!("Flip:    {}", metadata.flip.code());
    println!("Size:    {}", metadata.default_size());
    if metadata.preview.is_valid() {
        println!("Preview: {}", metadata.preview_size());
    } else {
        println!("Preview: none");
    }
    Ok(())
}

fn decode(input: &Path, output: &Path, size: Option<Size>, quality: i32) -> Result<()> {
    let mut handler = open_handler(input)?;
    handler.set_target_size(size);
    handler.set_quality(quality);

    let image = handler
        .decode()
        .with_context(|| format!("Failed to decode `{}`", input.display()))?;

    if let Some(summary) = handler.last_decode() {
        tracing::info!(
            "Decoded {} via {:?} ({:?} filter)",
            summary.size,
            summary.path,
            summary.filter
        );
    }

    save(image, output)?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn save(image: CanonicalImage, output: &Path) -> Result<()> {
    let rgba = image
        .into_rgba_image()
        .context("Decoded buffer does not match its dimensions")?;
    // The fourth byte carries no alpha for RAW sources.
    let rgb = image::DynamicImage::ImageRgba8(rgba).into_rgb8();
    rgb.save(output)
        .with_context(|| format!("Failed to write {}", output.display()))
}
