//! # snapback CLI - Tiered snapshots of your directories
//!
//! Command-line front end for the snapback library. Meant to be driven by
//! cron for the rotation commands and by hand for everything else.
//!
//! ## Usage
//! ```bash
//! # Write a starter configuration
//! snapback sampleconfig > ~/.snapshotrc
//!
//! # Create the snapshot layout
//! snapback init
//!
//! # From cron
//! snapback hourly    # every hour
//! snapback daily     # once a day, before the hourly run
//! snapback weekly
//! snapback monthly
//!
//! # Bring back files deleted since the last hour
//! snapback undel hour-1
//!
//! # Compare a file with its copy from two snapshots ago
//! snapback diff notes.txt 2 --text
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use snapback::compare::{Comparer, DEFAULT_TOOL};
use snapback::config::LOCAL_CONFIG_NAME;
use snapback::diff::{DiffOptions, FileDiff, LineChange};
use snapback::history::{self, age_description, format_listing};
use snapback::{
    Backup, Config, DeleteOutcome, RecoveryOps, Result, RotationOp, SnapbackError, SyncSummary, Tier,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// snapback - tiered hard-link snapshots
#[derive(Parser)]
#[command(name = "snapback")]
#[command(version)]
#[command(about = "Hourly, daily, weekly and monthly snapshots of your directories")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file (defaults to $SNAPSHOTRC, ./.snapshotrc, ~/.snapshotrc)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show what would happen without changing anything
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the snapshot base and every slot directory
    Init,

    /// Print a sample configuration
    Sampleconfig {
        /// Write a project-local .snapshotrc in the current directory instead
        #[arg(long)]
        write: bool,

        /// Overwrite an existing .snapshotrc
        #[arg(long, requires = "write")]
        force: bool,
    },

    /// Rotate the hourly ring and back up all sources into hour-0
    Hourly,

    /// Promote the oldest hourly snapshot into the daily ring
    Daily,

    /// Rotate weeks and copy the oldest daily snapshot into week-0
    Weekly,

    /// Promote the oldest weekly snapshot into the monthly ring
    Monthly,

    /// Restore sources to the state of a snapshot (deletes newer files)
    #[command(alias = "restore")]
    Recover {
        /// Snapshot or tag to restore from
        snapshot: String,
    },

    /// Restore files missing from the sources, leaving existing files alone
    Undel {
        /// Snapshot or tag to restore from
        snapshot: String,
    },

    /// Keep a snapshot permanently under a custom name
    Tag {
        /// Snapshot to preserve
        snapshot: String,

        /// Tag name
        tag: String,
    },

    /// Remove a file or directory from hour-0
    #[command(alias = "rm")]
    Delete {
        /// Live path whose snapshot copy should go
        path: PathBuf,
    },

    /// List snapshots, or every saved copy of a file
    #[command(alias = "ls")]
    List {
        /// File name to search for
        filename: Option<String>,

        /// Only show tags
        #[arg(long, conflicts_with = "filename")]
        tags: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a tag
    Untag {
        /// Tag name
        tag: String,
    },

    /// Compare a file with an older snapshot copy
    Diff {
        /// Live file
        file: PathBuf,

        /// How many versions back to compare with
        #[arg(default_value_t = 1)]
        periods: usize,

        /// External diff tool
        #[arg(short, long, default_value = DEFAULT_TOOL)]
        tool: String,

        /// Print a unified diff instead of launching a tool
        #[arg(long)]
        text: bool,

        /// Number of context lines for --text
        #[arg(long, default_value_t = 3)]
        context: usize,

        /// Ignore whitespace changes for --text
        #[arg(long)]
        ignore_whitespace: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Dry runs narrate through info-level logs
    let default_level = if cli.verbose {
        "snapback=debug"
    } else if cli.dry_run {
        "snapback=info"
    } else {
        "snapback=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            std::process::exit(1);
        }
    }
}

/// Main command runner
///
/// Returns `Ok(false)` when the command ran but every source failed.
fn run(cli: Cli) -> Result<bool> {
    let dry_run = cli.dry_run;
    if let Commands::Sampleconfig { write, force } = cli.command {
        return cmd_sampleconfig(write, force).map(|()| true);
    }

    let config = Config::load(cli.config.as_deref())?;
    if dry_run {
        println!("{}", "Dry run: nothing will be changed".yellow());
    }

    match cli.command {
        Commands::Sampleconfig { .. } => Ok(true),
        Commands::Init => cmd_init(&config, dry_run).map(|()| true),
        Commands::Hourly => cmd_hourly(&config, dry_run),
        Commands::Daily => cmd_rotate(&config, Tier::Day, dry_run).map(|()| true),
        Commands::Weekly => cmd_rotate(&config, Tier::Week, dry_run).map(|()| true),
        Commands::Monthly => cmd_rotate(&config, Tier::Month, dry_run).map(|()| true),
        Commands::Recover { snapshot } => cmd_restore(&config, &snapshot, false, dry_run),
        Commands::Undel { snapshot } => cmd_restore(&config, &snapshot, true, dry_run),
        Commands::Tag { snapshot, tag } => cmd_tag(&config, &snapshot, &tag, dry_run).map(|()| true),
        Commands::Delete { path } => cmd_delete(&config, &path, dry_run).map(|()| true),
        Commands::List { filename, tags, json } => {
            cmd_list(&config, filename.as_deref(), tags, json).map(|()| true)
        }
        Commands::Untag { tag } => cmd_untag(&config, &tag, dry_run).map(|()| true),
        Commands::Diff {
            file,
            periods,
            tool,
            text,
            context,
            ignore_whitespace,
        } => {
            let options = DiffOptions {
                context_lines: context,
                ignore_whitespace,
                ..Default::default()
            };
            cmd_diff(&config, &file, periods, &tool, text, &options).map(|()| true)
        }
    }
}

/// Print a sample configuration, or write a project-local one
fn cmd_sampleconfig(write: bool, force: bool) -> Result<()> {
    if !write {
        print!("{}", Config::sample());
        return Ok(());
    }

    let path = Path::new(LOCAL_CONFIG_NAME);
    if path.exists() && !force {
        return Err(SnapbackError::invalid(format!(
            "{} already exists. Use --force to overwrite it.",
            LOCAL_CONFIG_NAME
        )));
    }
    std::fs::write(path, Config::sample_local())?;

    println!("{} Wrote {}", "✓".green().bold(), LOCAL_CONFIG_NAME.cyan());
    println!("\nNext steps:");
    println!("  - Create the snapshot directories: {}", "snapback init".yellow());
    println!("  - Take the first snapshot: {}", "snapback hourly".yellow());
    Ok(())
}

/// Create the snapshot layout
///
/// In project-local mode the snapshot directory is also added to the
/// workspace's `.gitignore`.
fn cmd_init(config: &Config, dry_run: bool) -> Result<()> {
    let store = config.store();
    config.workspace().validate(store.base(), "init")?;

    if dry_run {
        println!("Would create {}", store.base().display().to_string().cyan());
        return Ok(());
    }
    store.init()?;
    println!("{} Initialized snapshot directory", "✓".green().bold());
    println!("  Base: {}", store.base().display().to_string().cyan());
    println!("  Sources: {}", config.dirs.len());

    if let Some(root) = &config.workspace_root {
        if let Ok(relative) = store.base().strip_prefix(root) {
            if !relative.as_os_str().is_empty() {
                let entry = format!("{}/", relative.display());
                if snapback::gitignore::ensure_entries(&root.join(".gitignore"), &[entry.as_str()])? {
                    println!("  Added {} to .gitignore", entry.cyan());
                }
            }
        }
    }
    Ok(())
}

/// Rotate hours and back up every source into `hour-0`
fn cmd_hourly(config: &Config, dry_run: bool) -> Result<bool> {
    let store = config.store();
    let workspace = config.workspace();
    let backup = Backup::new(&store, &config.dirs, &workspace, config.syncer());

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Backing up {} directories...", config.dirs.len()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let result = backup.hourly(dry_run);
    pb.finish_and_clear();
    let report = result?;

    if dry_run {
        print_ops(&report.rotation);
    }
    let ok = print_summary(&report.sync, "Backed up");
    if ok {
        println!(
            "  Took {}",
            humantime::format_duration(Duration::from_millis(start.elapsed().as_millis() as u64))
                .to_string()
                .dimmed()
        );
    }
    Ok(ok)
}

/// Daily, weekly or monthly rotation
fn cmd_rotate(config: &Config, tier: Tier, dry_run: bool) -> Result<()> {
    let store = config.store();
    let ops = store.engine(config.workspace()).rotate(tier, dry_run)?;

    if dry_run {
        print_ops(&ops);
    } else {
        println!(
            "{} Rotated {} snapshots ({} steps)",
            "✓".green().bold(),
            tier.prefix(),
            ops.len()
        );
    }
    Ok(())
}

/// Recover or undelete from a snapshot
fn cmd_restore(config: &Config, snapshot: &str, undelete: bool, dry_run: bool) -> Result<bool> {
    let store = config.store();
    let workspace = config.workspace();
    let ops = RecoveryOps::new(&store, &config.dirs, &workspace, config.syncer());

    let summary = if undelete {
        ops.undelete(snapshot, dry_run)?
    } else {
        ops.recover(snapshot, dry_run)?
    };
    let verb = if undelete { "Undeleted into" } else { "Recovered" };
    Ok(print_summary(&summary, verb))
}

/// Tag a snapshot
fn cmd_tag(config: &Config, snapshot: &str, tag: &str, dry_run: bool) -> Result<()> {
    let store = config.store();
    let workspace = config.workspace();
    let ops = RecoveryOps::new(&store, &config.dirs, &workspace, config.syncer());

    let stats = ops.tag(snapshot, tag, dry_run)?;
    if dry_run {
        println!("Would tag {} as {}", snapshot.yellow(), tag.cyan());
    } else {
        println!(
            "{} Tagged {} as {} ({} files)",
            "✓".green().bold(),
            snapshot.yellow(),
            tag.cyan().bold(),
            stats.files()
        );
    }
    Ok(())
}

/// Delete a path from `hour-0`
fn cmd_delete(config: &Config, path: &Path, dry_run: bool) -> Result<()> {
    let store = config.store();
    let workspace = config.workspace();
    let ops = RecoveryOps::new(&store, &config.dirs, &workspace, config.syncer());

    match ops.delete_path(path, dry_run)? {
        DeleteOutcome::Deleted(mirrored) => {
            println!("{} Deleted {}", "✓".green().bold(), mirrored.display().to_string().cyan());
        }
        DeleteOutcome::WouldDelete(mirrored) => {
            println!("Would delete {}", mirrored.display().to_string().cyan());
        }
        DeleteOutcome::NotInSnapshot(mirrored) => {
            println!("{} {} is not in hour-0", "!".yellow().bold(), mirrored.display());
        }
        DeleteOutcome::NotInSource => {
            println!(
                "{} {} is not inside any backed-up directory",
                "!".yellow().bold(),
                path.display()
            );
        }
    }
    Ok(())
}

/// List snapshots, tags, or copies of one file
fn cmd_list(config: &Config, filename: Option<&str>, tags_only: bool, json: bool) -> Result<()> {
    let store = config.store();

    if let Some(filename) = filename {
        let versions = history::find_file(&store, &config.dirs, filename)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&versions)?);
        } else if versions.is_empty() {
            println!("{}", format!("No saved copies of {} found.", filename).yellow());
        } else {
            println!("{}", format!("Copies of {}:", filename).blue().bold());
            for line in format_listing(&versions) {
                println!("  {}", line);
            }
        }
        return Ok(());
    }

    let mut snapshots = store.snapshots_by_age()?;
    if tags_only {
        snapshots.retain(|s| s.is_tag);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }
    if snapshots.is_empty() {
        let what = if tags_only { "tags" } else { "snapshots" };
        println!("{}", format!("No {} found in {}.", what, store.base().display()).yellow());
        return Ok(());
    }

    let title = if tags_only { "Tags:" } else { "Snapshots:" };
    println!("{}", title.blue().bold());
    for snapshot in &snapshots {
        let modified = snapshot
            .modified
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let name = if snapshot.is_tag {
            snapshot.name.cyan().bold()
        } else {
            snapshot.name.yellow()
        };
        println!(
            "  {:<24} {:<24} {}",
            name,
            age_description(&snapshot.name),
            modified.dimmed()
        );
    }
    Ok(())
}

/// Delete a tag
fn cmd_untag(config: &Config, tag: &str, dry_run: bool) -> Result<()> {
    let store = config.store();
    let workspace = config.workspace();
    let ops = RecoveryOps::new(&store, &config.dirs, &workspace, config.syncer());

    ops.delete_tag(tag, dry_run)?;
    if dry_run {
        println!("Would delete tag {}", tag.cyan());
    } else {
        println!("{} Deleted tag {}", "✓".green().bold(), tag.cyan());
    }
    Ok(())
}

/// Compare a live file with an older copy
fn cmd_diff(
    config: &Config,
    file: &Path,
    periods: usize,
    tool: &str,
    text: bool,
    options: &DiffOptions,
) -> Result<()> {
    let store = config.store();
    let comparer = Comparer::new(&store, &config.dirs);

    if text {
        let diff = comparer.text_diff(file, periods, options)?;
        print_file_diff(&diff);
    } else {
        let version = comparer.launch_tool(tool, file, periods)?;
        println!(
            "Compared with {} ({})",
            version.snapshot.yellow(),
            age_description(&version.snapshot).dimmed()
        );
    }
    Ok(())
}

fn print_ops(ops: &[RotationOp]) {
    if ops.is_empty() {
        println!("{}", "Nothing to rotate.".dimmed());
    }
    for op in ops {
        println!("  would {}", op);
    }
}

fn print_file_diff(diff: &FileDiff) {
    if diff.is_identical() {
        println!("{}", "Files are identical.".green());
        return;
    }
    if diff.is_binary {
        print!("{}", diff);
        return;
    }

    println!("{}", format!("--- {}", diff.old_label).red().bold());
    println!("{}", format!("+++ {}", diff.new_label).green().bold());
    for hunk in &diff.hunks {
        println!(
            "{}",
            format!(
                "@@ -{},{} +{},{} @@",
                hunk.from_line, hunk.from_count, hunk.to_line, hunk.to_count
            )
            .cyan()
        );
        for change in &hunk.changes {
            match change {
                LineChange::Context(_, content) => println!(" {}", content),
                LineChange::Deleted(_, content) => println!("{}{}", "-".red(), content.red()),
                LineChange::Added(_, content) => println!("{}{}", "+".green(), content.green()),
            }
        }
    }
    println!(
        "\n{} insertions(+), {} deletions(-)",
        diff.lines_added.to_string().green(),
        diff.lines_deleted.to_string().red()
    );
}

/// Print per-source results; false when every attempted source failed
fn print_summary(summary: &SyncSummary, verb: &str) -> bool {
    for source in &summary.succeeded {
        println!("{} {} {}", "✓".green().bold(), verb, source.display().to_string().cyan());
    }
    for source in &summary.skipped {
        println!("{} Skipped {}", "-".yellow().bold(), source.display());
    }
    for (source, message) in &summary.failed {
        println!("{} {}: {}", "✗".red().bold(), source.display(), message);
    }

    if summary.attempted() == 0 {
        println!("{}", "No source directories were processed.".yellow());
    } else if !summary.is_clean() {
        println!(
            "{}",
            format!(
                "{} of {} sources failed",
                summary.failed.len(),
                summary.attempted()
            )
            .red()
        );
    }
    !summary.all_failed()
}
