//! pakscope - Mount encrypted game paks and decode their assets
//!
//! Usage:
//!   pakscope keys <dir>                            - Show the key slots for a game
//!   pakscope mount <dir> [--key GUID=KEY]...       - Set keys, mount and save them
//!   pakscope list <dir> [filter]                   - List mounted files
//!   pakscope dispatch <dir> <path>                 - Decode one asset
//!   pakscope extract-folder <dir> <folder>         - Decode every asset in a folder
//!   pakscope export-folder <dir> <folder>          - Write raw package data to disk

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pakscope::dispatch::DocumentFormat;
use pakscope::media::encode_png;
use pakscope::utils::{output_path, strip_extension};
use pakscope::{
    create_glob_matcher, format_size, matches_filter, BatchItem, BatchReport, CancellationToken,
    DirectoryProvider, Guid, HeadlessSurface, Level, SessionCore, UserSettings,
};

#[derive(Parser)]
#[command(name = "pakscope")]
#[command(version = "0.1.0")]
#[command(about = "Mount encrypted game paks and decode their assets", long_about = None)]
struct Cli {
    /// Settings file holding output folders and saved keys
    #[arg(long, global = true, default_value = "pakscope.json")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the archives and key slots of a game directory
    Keys {
        /// Directory containing the game's paks
        dir: PathBuf,
    },
    /// Set keys, mount, and save the keys to the settings file
    Mount {
        /// Directory containing the game's paks
        dir: PathBuf,
        /// Dynamic key as GUID=KEY (repeatable)
        #[arg(short, long = "key")]
        keys: Vec<String>,
        /// Primary key for archives with the zero GUID
        #[arg(short, long)]
        main_key: Option<String>,
    },
    /// List mounted files
    List {
        /// Directory containing the game's paks
        dir: PathBuf,
        /// Filter pattern (e.g., *.uasset, Game/Content/*)
        filter: Option<String>,
    },
    /// Decode one asset and print what it produced
    Dispatch {
        /// Directory containing the game's paks
        dir: PathBuf,
        /// Virtual path of the asset
        path: String,
    },
    /// Decode every asset under a folder
    ExtractFolder {
        /// Directory containing the game's paks
        dir: PathBuf,
        /// Virtual folder (e.g., Game/Content/Localization)
        folder: String,
    },
    /// Write the raw data of every asset under a folder
    ExportFolder {
        /// Directory containing the game's paks
        dir: PathBuf,
        /// Virtual folder
        folder: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keys { dir } => {
            let core = open_core(&dir, &cli.settings)?;
            show_keys(&core);
        }
        Commands::Mount {
            dir,
            keys,
            main_key,
        } => {
            let mut core = open_core(&dir, &cli.settings)?;
            if let Some(key) = main_key {
                core.edit_key(0, &key)?;
            }
            for arg in &keys {
                let (guid, key) = parse_key_arg(arg)?;
                let index = core
                    .key_entries()
                    .iter()
                    .position(|entry| entry.guid == guid)
                    .with_context(|| format!("No archive uses GUID {}", guid))?;
                core.edit_key(index, key)?;
            }
            mount(&mut core)?;
            show_keys(&core);
            println!("\nKeys saved to {}", cli.settings.display());
        }
        Commands::List { dir, filter } => {
            let mut core = open_core(&dir, &cli.settings)?;
            mount(&mut core)?;
            list_files(&core, filter.as_deref())?;
        }
        Commands::Dispatch { dir, path } => {
            let mut core = open_core(&dir, &cli.settings)?;
            mount(&mut core)?;
            dispatch(&mut core, &path)?;
        }
        Commands::ExtractFolder { dir, folder } => {
            let mut core = open_core(&dir, &cli.settings)?;
            mount(&mut core)?;
            let pb = folder_progress(&core, &folder)?;
            let report = core.extract_folder_with(&folder, &CancellationToken::new(), |item| {
                progress(&pb, item)
            })?;
            pb.finish_with_message("Done");
            print_report(&report);
        }
        Commands::ExportFolder { dir, folder } => {
            let mut core = open_core(&dir, &cli.settings)?;
            mount(&mut core)?;
            let pb = folder_progress(&core, &folder)?;
            let report = core.export_folder_with(&folder, &CancellationToken::new(), |item| {
                progress(&pb, item)
            })?;
            pb.finish_with_message("Done");
            print_report(&report);
        }
    }

    Ok(())
}

fn open_core(dir: &Path, settings_path: &Path) -> Result<SessionCore> {
    let engine = DirectoryProvider::new(dir)
        .with_context(|| format!("Failed to open {}", dir.display()))?;
    let settings = UserSettings::load(settings_path)
        .with_context(|| format!("Failed to load settings {}", settings_path.display()))?;

    let mut core = SessionCore::new(
        Box::new(engine),
        Box::new(HeadlessSurface),
        settings,
        settings_path.to_path_buf(),
    );
    core.initialize(&CancellationToken::new())
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    Ok(core)
}

fn mount(core: &mut SessionCore) -> Result<()> {
    let report = core
        .update_provider(true, &CancellationToken::new())?
        .context("Mount pass did not run")?;
    for submitted in report.submitted.iter().filter(|s| !s.accepted) {
        println!("Key for {} was rejected", submitted.guid);
    }
    info!(
        game = %report.game_name,
        mounted = report.mounted,
        unmounted = report.unmounted,
        "Mounted archives"
    );
    Ok(())
}

fn parse_key_arg(arg: &str) -> Result<(Guid, &str)> {
    let Some((guid, key)) = arg.split_once('=') else {
        bail!("Expected GUID=KEY, got '{}'", arg);
    };
    let guid = guid
        .parse::<Guid>()
        .with_context(|| format!("Invalid GUID in '{}'", arg))?;
    Ok((guid, key))
}

fn show_keys(core: &SessionCore) {
    println!("Game: {}", core.game_name());
    println!();
    println!("{:<40} {:>10} {:>8} {:>7}", "Archive", "Size", "Files", "Mounted");
    for entry in core.catalog().iter() {
        let files = if entry.file_count < 0 {
            "-".to_string()
        } else {
            entry.file_count.to_string()
        };
        println!(
            "{:<40} {:>10} {:>8} {:>7}",
            entry.name,
            format_size(entry.size),
            files,
            if entry.is_enabled { "yes" } else { "no" }
        );
    }

    println!();
    for (index, entry) in core.key_entries().iter().enumerate() {
        let label = if entry.is_primary() {
            "main".to_string()
        } else {
            entry.file_name.clone()
        };
        let key = if entry.key.is_empty() {
            "<none>"
        } else {
            entry.key.as_str()
        };
        println!("[{}] {} {} ({})", index, entry.guid, key, label);
    }
}

fn list_files(core: &SessionCore, filter: Option<&str>) -> Result<()> {
    let matcher = filter.map(create_glob_matcher).transpose()?;

    let mut count = 0usize;
    for path in core.files() {
        if matches_filter(&path, matcher.as_ref()) {
            println!("{}", path);
            count += 1;
        }
    }

    println!();
    println!("Total: {} files", count);
    Ok(())
}

fn dispatch(core: &mut SessionCore, path: &str) -> Result<()> {
    let result = core.dispatch(path);

    println!("{}: {:?}", result.path, result.kind);
    for message in &result.messages {
        let level = match message.level {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        println!("[{}] {}", level, message.text);
    }
    for saved in &result.saved {
        println!("Saved: {}", saved.display());
    }
    for artifact in &result.artifacts {
        println!(
            "Artifact: {}.{} ({})",
            artifact.name,
            artifact.extension(),
            format_size(artifact.data.len() as u64)
        );
    }

    if let Some(image) = &result.image {
        let settings = core.settings();
        let target = output_path(
            &settings.output_directory,
            &format!("{}.png", strip_extension(path)),
            settings.keep_directory_structure,
        );
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let png = encode_png(image)?;
        fs::write(&target, png)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        println!(
            "Image: {}x{} -> {}",
            image.width(),
            image.height(),
            target.display()
        );
    }

    if let Some(document) = &result.document {
        let format = match result.document_format {
            DocumentFormat::Json => "json",
            DocumentFormat::Text => "text",
        };
        println!("\n--- {} ---", format);
        println!("{}", document);
    }

    Ok(())
}

fn folder_progress(core: &SessionCore, folder: &str) -> Result<ProgressBar> {
    let total = core
        .tree()
        .find(folder)
        .map(|f| f.asset_count())
        .with_context(|| format!("No folder '{}'", folder))?;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    )?);
    Ok(pb)
}

fn progress(pb: &ProgressBar, item: &BatchItem) {
    pb.set_message(item.path.clone());
    if let Err(e) = &item.result {
        pb.println(format!("Error processing {}: {}", item.path, e));
    }
    pb.inc(1);
}

fn print_report(report: &BatchReport) {
    println!();
    println!("Processed: {} files", report.processed());
    if report.failed() > 0 {
        println!("Failed: {} files", report.failed());
    }
}
