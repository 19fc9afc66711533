use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use colorbook::{
    encode, kdp::PRINT_DPI, service::decode_and_filter, subscription::SubscriptionTier,
    ConversionOptions, Converter, FileOutcome, FilterParams, LineArtFilter, UploadedFile,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "colorbook", version, about = "Turn photos into coloring-book line art")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one image into a 300 DPI coloring page.
    Convert(ConvertArgs),
    /// Convert many images with default settings and print the JSON report.
    Batch(BatchArgs),
    /// Print the subscription tier table as JSON.
    Tiers,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    input: PathBuf,

    /// Output PNG path. Required unless --json is given.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = 11)]
    block_size: u32,

    #[arg(long, default_value_t = 2.0, allow_hyphen_values = true)]
    c_value: f64,

    /// Accepted for compatibility; has no effect on the result.
    #[arg(long, default_value_t = 127)]
    threshold: i32,

    /// White lines on a black page.
    #[arg(long)]
    invert: bool,

    /// Skip the line-closing pass.
    #[arg(long)]
    no_enhance: bool,

    /// Print the JSON response envelope instead of writing a file.
    #[arg(long)]
    json: bool,
}

impl ConvertArgs {
    fn params(&self) -> FilterParams {
        FilterParams::new(
            self.threshold,
            self.block_size,
            self.c_value,
            self.invert,
            !self.no_enhance,
        )
    }
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Also write every converted page to this directory as `<stem>.png`,
    /// suffixing the index when two inputs share a stem.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn read_upload(path: &Path) -> Result<UploadedFile> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(UploadedFile::new(filename, bytes))
}

fn convert(args: &ConvertArgs) -> Result<()> {
    let upload = read_upload(&args.input)?;
    let options = ConversionOptions {
        params: args.params(),
        user_id: None,
    };

    if args.json {
        let response = Converter::default().convert(&upload, &options)?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let Some(output) = &args.output else {
        bail!("--output is required unless --json is given");
    };
    let filter = LineArtFilter::new(options.params)?;
    let art = decode_and_filter(&upload.bytes, &filter)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;
    let png = encode::encode_png(&art, Some(PRINT_DPI))?;
    fs::write(output, &png).with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        "Wrote {} ({:.2} MB)",
        output.display(),
        encode::file_size_mb(png.len())
    );
    Ok(())
}

/// Output file names for a batch, `<stem>.png`, with `_<index>` appended to
/// any stem already taken by an earlier input.
fn output_names(files: &[PathBuf]) -> Vec<String> {
    let mut taken = HashSet::new();
    files
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("file_{index}"));
            let mut name = format!("{stem}.png");
            let mut suffix = index;
            while !taken.insert(name.clone()) {
                name = format!("{stem}_{suffix}.png");
                suffix += 1;
            }
            name
        })
        .collect()
}

fn batch(args: &BatchArgs) -> Result<()> {
    let uploads = args
        .files
        .iter()
        .map(|path| read_upload(path))
        .collect::<Result<Vec<_>>>()?;
    let report = Converter::default().process_batch(&uploads, None)?;

    if let Some(dir) = &args.out_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        for (index, name) in output_names(&args.files).into_iter().enumerate() {
            let Some(FileOutcome::Converted { data, .. }) = report.outcome(index) else {
                continue;
            };
            let target = dir.join(name);
            let png = STANDARD
                .decode(data)
                .context("Batch produced invalid base64")?;
            fs::write(&target, png)
                .with_context(|| format!("Failed to write {}", target.display()))?;
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn tiers() -> Result<()> {
    let table: Vec<_> = SubscriptionTier::ALL
        .iter()
        .map(|tier| (tier, tier.limits()))
        .collect();
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Convert(args) => convert(args),
        Command::Batch(args) => batch(args),
        Command::Tiers => tiers(),
    }
}
