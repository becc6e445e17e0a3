mod commands;
mod logging;
mod progress;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, SyncArgs};
use dotenv::dotenv;
use media_sync_core::detect::{AdvancedDetector, DetectionMethod, DetectionRequest, ProcessDetector};
use media_sync_core::parallel::{benchmark, SystemProfile};
use media_sync_core::scanner::enumerate_files;
use media_sync_core::storage::{keys, SettingsStore, TomlSettingsStore};
use media_sync_core::{AppConfig, SyncEngine, SyncHandle, SyncOptions};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match media_sync_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Sync(sync_args)) => {
            if let Err(err) = run_sync(config, sync_args) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::Benchmark { dir, sample }) => run_benchmark(&dir, sample),
        Some(Commands::Profile) => {
            let profile = SystemProfile::detect();
            info!("{}", profile.to_string().cyan());
        }
        Some(Commands::FindSimilar {
            dir,
            method,
            threshold,
            gpu,
        }) => {
            if let Err(err) = run_find_similar(&config, &dir, &method, threshold, gpu) {
                error!("Error: {:#}", err);
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        Some(Commands::ClearIndex) => {
            match prompt_confirm(
                "Are you SURE you want to forget every stored fingerprint?",
                Some(false),
            ) {
                Ok(true) => {
                    let settings = TomlSettingsStore::open(&config.settings_path)?;
                    settings.remove_setting(keys::HASHES)?;
                    settings.remove_setting(keys::EMERGENCY_SAVE)?;
                    println!("Fingerprint index cleared");
                }
                _ => {
                    process::exit(0);
                }
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_sync(mut config: AppConfig, args: SyncArgs) -> anyhow::Result<()> {
    let settings = Arc::new(
        TomlSettingsStore::open(&config.settings_path)
            .with_context(|| format!("opening {}", config.settings_path.display()))?,
    );
    apply_sync_args(&mut config, &args, settings.as_ref());

    let engine = SyncEngine::new(config, settings);
    spawn_control_listener(engine.handle());

    let reporter = CliReporter::new();
    let report = engine.run_configured(&reporter)?;
    let stats = &report.statistics;

    println!();
    info!(
        "Moved: {}, Duplicates: {}, Errors: {}, Skipped: {}",
        format!("{}", stats.successful_files).green(),
        format!("{}", stats.duplicates_found).yellow(),
        format!("{}", stats.error_files).red(),
        format!("{}", stats.skipped_files).yellow(),
    );
    info!(
        "{:.2} MB in {:.2}s ({:.2} MB/s, {:.1} files/min) on {} worker(s)",
        stats.mb_processed(),
        stats.duration.as_secs_f64(),
        stats.mb_per_second(),
        stats.files_per_minute(),
        report.workers,
    );
    info!(
        "{} fingerprints known",
        format!("{}", report.known_fingerprints).cyan()
    );
    for warning in &stats.warnings {
        warn!("{}", warning.yellow());
    }

    if let Some(path) = &args.stats_csv {
        stats
            .write_csv(path)
            .with_context(|| format!("writing statistics to {}", path.display()))?;
        info!("Statistics appended to {}", path.display());
    }

    Ok(())
}

/// Command-line flags win over configuration; remembered folders fill gaps.
fn apply_sync_args(config: &mut AppConfig, args: &SyncArgs, settings: &dyn SettingsStore) {
    let remembered = |key: &str| settings.read_setting(key).ok().flatten().map(PathBuf::from);

    config.source = args
        .source
        .clone()
        .or_else(|| config.source.take())
        .or_else(|| remembered(keys::SOURCE_FOLDER));
    config.destination = args
        .destination
        .clone()
        .or_else(|| config.destination.take())
        .or_else(|| remembered(keys::DESTINATION_FOLDER));
    config.reject = args.reject.clone().or_else(|| config.reject.take());
    for path in [&mut config.source, &mut config.destination, &mut config.reject]
        .into_iter()
        .flatten()
    {
        *path = absolutize(path);
    }

    if args.workers.is_some() {
        config.max_workers = args.workers;
    }
    if let Some(threshold) = args.threshold {
        config.parallel_threshold = threshold;
    }

    let options: &mut SyncOptions = &mut config.options;
    options.include_music |= args.music;
    options.include_documents |= args.documents;
    if args.no_videos {
        options.include_videos = false;
    }
    options.custom_extensions.extend(args.extensions.iter().cloned());
}

/// Resolve a relative path against the working directory. Paths that cannot
/// be resolved are left as given for the engine to reject.
fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Read pause/resume/cancel commands from stdin for the lifetime of the process.
fn spawn_control_listener(handle: Arc<SyncHandle>) {
    let spawned = thread::Builder::new()
        .name("media-sync-control".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let result = match line.trim().to_lowercase().as_str() {
                    "p" | "pause" => handle.pause(),
                    "r" | "resume" => handle.resume(),
                    "c" | "cancel" => handle.cancel(),
                    "" => continue,
                    other => {
                        warn!("Unknown command '{}'; use pause, resume or cancel", other);
                        continue;
                    }
                };
                match result {
                    Ok(()) => info!("Sync {}", handle.state()),
                    Err(e) => warn!("{}", e),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Interactive controls unavailable: {}", e);
    }
}

fn run_benchmark(dir: &Path, sample: usize) {
    let profile = SystemProfile::detect();
    info!("{}", profile);

    let (threshold, results) =
        benchmark::auto_tune(dir, sample, profile.processor_count);
    if results.is_empty() {
        warn!(
            "Not enough files under {} to benchmark; keeping the default threshold",
            dir.display()
        );
    }
    for result in &results {
        let speedup = format!("{:.2}x", result.speedup);
        info!(
            "{} files: sequential {:.3}s, parallel {:.3}s, speedup {}",
            result.file_count,
            result.sequential.as_secs_f64(),
            result.parallel.as_secs_f64(),
            if result.beats_margin() {
                speedup.green()
            } else {
                speedup.red()
            },
        );
    }
    info!(
        "Recommended parallel threshold: {} files",
        format!("{}", threshold).cyan()
    );
}

fn run_find_similar(
    config: &AppConfig,
    dir: &Path,
    method: &str,
    threshold: f64,
    gpu: bool,
) -> anyhow::Result<()> {
    let Some(program) = &config.detector_command else {
        bail!("no detector_command configured");
    };
    let detector = ProcessDetector::new(program).with_args(config.detector_args.clone());
    if !detector.is_available() {
        bail!("detector {} is not available", detector.program().display());
    }

    let options = SyncOptions {
        include_videos: false,
        ..SyncOptions::default()
    };
    let images = enumerate_files(dir, &options, &[])
        .candidates
        .into_iter()
        .map(|c| c.path)
        .collect();

    let mut request = DetectionRequest::new(images, method.parse::<DetectionMethod>()?);
    request.threshold = threshold;
    request.use_gpu = gpu;

    let response = detector.find_duplicates(&request)?;
    info!(
        "{} similar groups, {} duplicates among {} valid images{}",
        format!("{}", response.statistics.duplicate_groups).cyan(),
        format!("{}", response.statistics.total_duplicates).red(),
        response.statistics.valid_files,
        if response.gpu_used { " (GPU)" } else { "" },
    );
    let mut groups: Vec<_> = response.duplicates.iter().collect();
    groups.sort();
    for (original, similar) in groups {
        println!("{}", original.bold());
        for path in similar {
            println!("    {}", path);
        }
    }
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_sync_core::storage::MemorySettingsStore;

    #[test]
    fn test_relative_sync_folders_become_absolute() {
        let cli = Cli::parse_from([
            "media-sync",
            "sync",
            "--source",
            "./photos",
            "--destination",
            "sorted",
        ]);
        let Some(Commands::Sync(args)) = cli.command else {
            panic!("expected the sync subcommand");
        };

        let mut config = AppConfig::default();
        apply_sync_args(&mut config, &args, &MemorySettingsStore::new());

        let cwd = std::env::current_dir().unwrap();
        let source = config.source.unwrap();
        assert!(source.is_absolute());
        assert!(source.starts_with(&cwd));
        assert!(source.ends_with("photos"));
        assert_eq!(config.destination.unwrap(), cwd.join("sorted"));
        assert!(media_sync_core::config::validate_directory_path(&source).is_ok());
    }
}
