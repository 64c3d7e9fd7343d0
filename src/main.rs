use clap::{Parser, Subcommand};
use pinstar_media::imaging::SourceImage;
use pinstar_media::{Normalizer, config, output, process, upload};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "pinstar-media")]
#[command(about = "Normalize images for pin uploads")]
#[command(long_about = "\
Normalize images for pin uploads

Every image is type-checked, scaled down to fit the pixel bounds (never up),
and re-encoded at the highest quality that fits the byte budget:

  quality 0.9 → 0.8 → 0.7 → 0.6 → 0.5 (floor)

If even the floor is too large, the floor result is kept and flagged as
over budget.

Configuration is read from pinstar.toml in the working directory, or from
--config. Upload credentials can come from CLOUDINARY_CLOUD_NAME,
CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET.

Set RUST_LOG=debug to trace every encode attempt.

Run 'pinstar-media gen-config' to generate a documented pinstar.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./pinstar.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize image files and write them with a manifest
    Normalize {
        /// Image files to normalize
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(long, default_value = "normalized")]
        out_dir: PathBuf,
    },
    /// Type-check and decode files without encoding
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a signed upload parameter set as JSON
    Sign {
        /// Destination folder (default: upload.folder from config)
        #[arg(long)]
        folder: Option<String>,

        /// Unix timestamp to sign (default: now)
        #[arg(long)]
        timestamp: Option<u64>,
    },
    /// Print a stock pinstar.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Normalize { files, out_dir } => {
            let config = load_config(cli.config.as_deref())?;
            let settings = config.normalize_settings()?;
            init_thread_pool(&config.processing);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let manifest = process::process(&files, &out_dir, &settings, Some(tx))?;
            printer
                .join()
                .map_err(|_| "progress printer panicked")?;
            println!();
            println!("{}", output::format_summary(&manifest));
            if manifest.failed_count() > 0 {
                let failed = manifest.failed_count();
                return Err(format!("{failed} file(s) could not be normalized").into());
            }
        }
        Command::Check { files } => {
            let config = load_config(cli.config.as_deref())?;
            let normalizer = Normalizer::new(config.normalize_settings()?);
            let mut failed = 0;
            for (i, path) in files.iter().enumerate() {
                let declared = process::declared_type_for(path);
                let result = std::fs::read(path)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| {
                        normalizer
                            .inspect(&SourceImage::new(bytes, declared))
                            .map_err(|e| e.to_string())
                    });
                if result.is_err() {
                    failed += 1;
                }
                let media_type = normalizer.settings().accepted.resolve(declared);
                println!(
                    "{}",
                    output::format_check_line(i + 1, path, media_type, &result)
                );
            }
            if failed > 0 {
                return Err(format!("{failed} file(s) failed the check").into());
            }
        }
        Command::Sign { folder, timestamp } => {
            let config = load_config(cli.config.as_deref())?;
            let credentials = upload::UploadCredentials::from_config(&config.upload)?;
            let folder = folder.unwrap_or_else(|| config.upload.folder.clone());
            let timestamp = timestamp.unwrap_or_else(upload::current_timestamp);
            let signature = upload::create_signature(&credentials, &folder, timestamp);
            println!("{}", serde_json::to_string_pretty(&signature)?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load `pinstar.toml` (or `--config`) and apply credential overrides from the environment.
fn load_config(path: Option<&Path>) -> Result<config::Config, config::ConfigError> {
    let mut config = config::load_config(path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
