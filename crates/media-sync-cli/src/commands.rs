use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "media-sync")]
#[command(about = "Sort photos and videos into dated folders, setting duplicates aside", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Move media from the source into the dated destination layout.
    /// Type pause, resume or cancel and press Enter while it runs.
    Sync(SyncArgs),
    /// Time sequential vs parallel hashing on sample files and suggest a threshold
    Benchmark {
        dir: PathBuf,
        #[arg(long, default_value_t = media_sync_core::parallel::benchmark::DEFAULT_SAMPLE_SIZE)]
        sample: usize,
    },
    /// Show processor count and the estimated parallel threshold
    Profile,
    /// Group visually similar images with the configured detector
    FindSimilar {
        dir: PathBuf,
        #[arg(long, default_value = "phash")]
        method: String,
        #[arg(long, default_value_t = media_sync_core::detect::DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: f64,
        #[arg(long)]
        gpu: bool,
    },
    /// Print configuration values
    PrintConfig,
    /// Forget every stored fingerprint
    ClearIndex,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[arg(long)]
    pub source: Option<PathBuf>,
    #[arg(long)]
    pub destination: Option<PathBuf>,
    #[arg(long)]
    pub reject: Option<PathBuf>,
    /// Maximum worker threads; 1 forces sequential processing
    #[arg(long)]
    pub workers: Option<usize>,
    /// File count at which processing goes parallel
    #[arg(long)]
    pub threshold: Option<usize>,
    #[arg(long)]
    pub music: bool,
    #[arg(long)]
    pub documents: bool,
    #[arg(long)]
    pub no_videos: bool,
    /// Extra extensions to sync, e.g. --ext cr2 --ext nef
    #[arg(long = "ext")]
    pub extensions: Vec<String>,
    /// Append the run statistics to this CSV file
    #[arg(long)]
    pub stats_csv: Option<PathBuf>,
}
