use clap::Parser;
use memories_dl::{
    Config, FfmpegThumbnailer, MediaStore, Orchestrator, RunMode, generate_thumbnails,
    write_gallery,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MEMORIES_DL_LOG";

/// Download a memories archive, then build thumbnails and a gallery page
#[derive(Debug, Parser)]
#[command(name = "memories-dl", version, about)]
struct Cli {
    /// Only retry the assets listed in the failure ledger
    #[arg(long)]
    failed_only: bool,

    /// Exported manifest to read
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Directory that receives media, thumbnails, ledger and gallery
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of concurrent downloads
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Skip the thumbnail stage
    #[arg(long)]
    no_thumbnails: bool,

    /// Skip the gallery stage
    #[arg(long)]
    no_gallery: bool,
}

impl Cli {
    fn load_config(&self) -> memories_dl::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_toml_file(path)?,
            None => Config::default(),
        };
        if let Some(manifest) = &self.manifest {
            config.paths.manifest_path = manifest.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.paths.output_dir = output_dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.fetch.max_concurrent_fetches = concurrency;
        }
        config.validate()?;
        Ok(config)
    }

    fn mode(&self) -> RunMode {
        if self.failed_only {
            RunMode::FailedOnly
        } else {
            RunMode::Full
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "unable to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = match Orchestrator::from_config(&config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!(error = %e, "unable to set up downloader");
            return ExitCode::FAILURE;
        }
    };

    let summary = match orchestrator.run(cli.mode()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "run aborted");
            return ExitCode::FAILURE;
        }
    };
    println!("{summary}");
    if summary.pending > 0 {
        info!(
            ledger = %orchestrator.ledger().path().display(),
            "some assets are pending, rerun with --failed-only to retry them"
        );
    }

    let store = MediaStore::new(config.media_dir());
    let thumb_dir = config.thumbnail_dir();

    if !cli.no_thumbnails {
        let tool = FfmpegThumbnailer::from_config(&config.tools);
        if let Err(e) = generate_thumbnails(&store, &thumb_dir, tool.as_ref()).await {
            warn!(error = %e, "thumbnail stage failed");
        }
    }

    if !cli.no_gallery {
        let page = config.gallery_path();
        match write_gallery(&store, &thumb_dir, &page).await {
            Ok(count) => println!("Gallery with {count} items written to {}", page.display()),
            Err(e) => warn!(error = %e, "gallery stage failed"),
        }
    }

    ExitCode::SUCCESS
}
