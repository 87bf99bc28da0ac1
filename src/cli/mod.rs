//! # CLI Module
//!
//! Command-line interface for the media deduplicator.
//!
//! ## Usage
//! ```bash
//! # Scan a directory into the library database
//! media-dedup scan ~/Photos
//!
//! # Resume is offered automatically; force a clean restart instead
//! media-dedup scan ~/Photos --force-restart
//!
//! # Inspect the library
//! media-dedup summary
//!
//! # Turn duplicates into a task list, then apply it
//! media-dedup prepare
//! media-dedup deduplicate
//! ```

use media_deduplicator::core::device::SysDeviceInfo;
use media_deduplicator::core::exec::TaskExecutor;
use media_deduplicator::core::plan;
use media_deduplicator::core::report;
use media_deduplicator::core::scan::ScanEngine;
use media_deduplicator::core::store::Store;
use media_deduplicator::error::Result;
use media_deduplicator::events::{Event, EventChannel, ScanEvent, TaskEvent};
use clap::{Parser, Subcommand};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::thread;

/// Media Deduplicator - One copy of every photo, wherever the drive mounts
#[derive(Parser, Debug)]
#[command(name = "media-dedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a directory and record every photo and video
    Scan {
        /// Directory to scan
        directory: PathBuf,

        /// Library database path
        #[arg(long, default_value = "./media-dedup.db")]
        db: PathBuf,

        /// Abandon any interrupted scan instead of resuming it
        #[arg(long)]
        force_restart: bool,
    },
    /// Show library statistics and potential space savings
    Summary {
        /// Library database path
        #[arg(long, default_value = "./media-dedup.db")]
        db: PathBuf,
    },
    /// Build the dedup task list from the scanned library
    Prepare {
        /// Library database path
        #[arg(long, default_value = "./media-dedup.db")]
        db: PathBuf,
    },
    /// Apply the prepared tasks: delete redundant copies, retime the kept ones
    Deduplicate {
        /// Library database path
        #[arg(long, default_value = "./media-dedup.db")]
        db: PathBuf,
    },
}

/// Run the CLI
pub fn run() -> Result<()> {
    media_deduplicator::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            directory,
            db,
            force_restart,
        } => run_scan(directory, db, force_restart),
        Commands::Summary { db } => run_summary(db),
        Commands::Prepare { db } => run_prepare(db),
        Commands::Deduplicate { db } => run_deduplicate(db),
    }
}

fn run_scan(directory: PathBuf, db: PathBuf, force_restart: bool) -> Result<()> {
    let term = Term::stderr();
    let store = Store::open(&db)?;
    let (sender, receiver) = EventChannel::new();
    let mut engine = ScanEngine::new(&store, SysDeviceInfo::new(), sender);

    let target = engine.begin(&directory)?;
    let resume = match &target.resumable {
        Some(session) if !force_restart => {
            let done = session.files_processed;
            confirm(
                &term,
                &format!("An interrupted scan covered {done} files already. Resume it?"),
                true,
            )
        }
        _ => false,
    };

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓░"),
    );

    let progress_clone = progress.clone();
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Scan(ScanEvent::DiscoveryStarted { root }) => {
                    progress_clone.set_message(format!("discovering {}", root.display()));
                }
                Event::Scan(ScanEvent::DiscoveryCompleted { pending, resumed }) => {
                    progress_clone.set_length((pending + resumed) as u64);
                    progress_clone.set_position(resumed as u64);
                    progress_clone.set_message("fingerprinting");
                }
                Event::Scan(ScanEvent::Progress(p)) => {
                    progress_clone.set_position(p.processed);
                    progress_clone.set_message(
                        p.current_path
                            .file_name()
                            .unwrap_or_default()
                            .to_string_lossy()
                            .into_owned(),
                    );
                }
                Event::Scan(ScanEvent::FileFailed { path, message }) => {
                    progress_clone.println(format!(
                        "{} {}: {}",
                        style("skipped").yellow(),
                        path.display(),
                        message
                    ));
                }
                Event::Scan(ScanEvent::Completed { .. }) => {
                    progress_clone.finish_and_clear();
                }
                _ => {}
            }
        }
    });

    let outcome = engine.run(&target, resume);
    drop(engine);
    event_thread.join().ok();
    let outcome = outcome?;

    term.write_line("").ok();
    term.write_line(&format!("{} Scan Complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!(
        "  {} files recorded",
        style(outcome.files_processed).cyan()
    ))
    .ok();
    if outcome.orphans_removed > 0 {
        term.write_line(&format!(
            "  {} stale records removed",
            style(outcome.orphans_removed).cyan()
        ))
        .ok();
    }
    Ok(())
}

fn run_summary(db: PathBuf) -> Result<()> {
    let term = Term::stdout();
    let store = Store::open_existing(&db)?;
    let summary = report::summarize(&store)?;

    term.write_line(&format!("{}", style("Library Summary").bold().cyan()))
        .ok();
    term.write_line("").ok();
    term.write_line(&format!(
        "  {} files tracked",
        style(summary.total_files).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} duplicate groups ({} files)",
        style(summary.duplicate_groups).cyan(),
        style(summary.duplicate_files).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} kept after dedup, {} reclaimable",
        style(format_bytes(summary.unique_bytes)).green(),
        style(format_bytes(summary.wasted_bytes)).yellow()
    ))
    .ok();
    Ok(())
}

fn run_prepare(db: PathBuf) -> Result<()> {
    let term = Term::stdout();
    let store = Store::open_existing(&db)?;
    let (sender, _receiver) = EventChannel::new();
    let summary = plan::prepare_tasks(&store, &sender)?;

    term.write_line(&format!("{} Plan Ready", style("✓").green().bold()))
        .ok();
    term.write_line(&format!(
        "  {} duplicate groups, {} redundant copies",
        style(summary.groups).cyan(),
        style(summary.duplicates).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} tasks written; run {} to apply them",
        style(summary.tasks_created).cyan(),
        style("media-dedup deduplicate").bold()
    ))
    .ok();
    Ok(())
}

fn run_deduplicate(db: PathBuf) -> Result<()> {
    let term = Term::stderr();
    let store = Store::open_existing(&db)?;
    let pending = store.task_count()?;
    if pending == 0 {
        term.write_line(&format!(
            "{} No pending tasks. Run {} first.",
            style("!").yellow().bold(),
            style("media-dedup prepare").bold()
        ))
        .ok();
        return Ok(());
    }

    let (sender, receiver) = EventChannel::new();
    let event_thread = thread::spawn(move || {
        let term = Term::stderr();
        for event in receiver.iter() {
            match event {
                Event::Task(TaskEvent::ContainerStarted { mount, tasks }) => {
                    term.write_line(&format!(
                        "{} {} ({} tasks)",
                        style("→").cyan(),
                        mount.display(),
                        tasks
                    ))
                    .ok();
                }
                Event::Task(TaskEvent::ContainerOffline { disk_id }) => {
                    term.write_line(&format!(
                        "{} drive {} not attached, keeping its tasks",
                        style("!").yellow().bold(),
                        disk_id
                    ))
                    .ok();
                }
                Event::Task(TaskEvent::TaskFailed { task_id, message }) => {
                    term.write_line(&format!(
                        "{} task {}: {}",
                        style("failed").red(),
                        task_id,
                        message
                    ))
                    .ok();
                }
                _ => {}
            }
        }
    });

    let prompt = Term::stderr();
    let mut executor = TaskExecutor::new(&store, SysDeviceInfo::new(), sender);
    let report = executor.execute(|identity| {
        confirm(
            &prompt,
            &format!(
                "Drive {} is not attached. Connect it now and retry?",
                identity.disk_id
            ),
            false,
        )
    });
    drop(executor);
    event_thread.join().ok();
    let report = report?;

    term.write_line("").ok();
    term.write_line(&format!(
        "{} Deduplication Complete",
        style("✓").green().bold()
    ))
    .ok();
    term.write_line(&format!("  {} tasks applied", style(report.processed).cyan()))
        .ok();
    if report.failed > 0 {
        term.write_line(&format!(
            "  {} tasks failed and remain pending",
            style(report.failed).red()
        ))
        .ok();
    }
    if report.offline_containers > 0 {
        term.write_line(&format!(
            "  {} drives were offline; rerun once they are attached",
            style(report.offline_containers).yellow()
        ))
        .ok();
    }
    Ok(())
}

fn confirm(term: &Term, question: &str, default_yes: bool) -> bool {
    let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    term.write_str(&format!("{question} {hint} ")).ok();
    match term.read_line() {
        Ok(answer) => {
            let answer = answer.trim().to_lowercase();
            if answer.is_empty() {
                default_yes
            } else {
                answer.starts_with('y')
            }
        }
        Err(_) => false,
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
