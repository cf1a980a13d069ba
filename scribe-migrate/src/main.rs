//! Scribe Migration CLI Tool
//!
//! Command-line interface for moving the transcription database between
//! revisions. Supports interactive use and CI/CD pipelines (exit code 1 on
//! any failure).

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use scribe::migration::{
    Direction, MigrationStatus, Migrator, MigratorOptions, PostgresTarget, RunSummary,
    SchemaTarget, SqlScriptTarget,
};
use scribe::{connect, versions, PgExecutor, ScribeConfig};
use scribe_migrate::render::{format_revision, history_lines, script_header, show_lines};
use scribe_migrate::settings;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "scribe-migrate")]
#[command(about = "Schema revision management for the Scribe transcription store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Configuration file
    #[arg(long, global = true, default_value = scribe::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the Current Revision of the database
    Current,

    /// Show the head revision(s) of the chain
    Heads,

    /// List the revision chain, newest first
    History,

    /// Show details of one revision
    Show {
        /// Revision id or unique prefix
        revision: String,
    },

    /// Upgrade to a later revision
    Upgrade {
        /// Target revision: head, an id or prefix, label@head, +N
        #[arg(default_value = "head")]
        target: String,

        /// Print the SQL instead of executing it
        #[arg(long)]
        sql: bool,

        /// Revision the database is assumed to be at (with --sql)
        #[arg(long, requires = "sql")]
        from: Option<String>,
    },

    /// Downgrade to an earlier revision
    Downgrade {
        /// Target revision: base, an id or prefix, -N
        target: String,

        /// Run steps whose downgrade destroys data
        #[arg(long)]
        confirm_lossy: bool,

        /// Print the SQL instead of executing it
        #[arg(long)]
        sql: bool,

        /// Revision the database is assumed to be at (with --sql, default head)
        #[arg(long, requires = "sql")]
        from: Option<String>,
    },

    /// Set the Current Revision without running any migration
    Stamp {
        /// Target revision: head, base, an id or prefix
        target: String,
    },

    /// Replay every revision up and down on an in-memory catalog
    Check,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match run(cli) {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = ScribeConfig::load_from(&cli.config).context("Failed to load configuration")?;
    let chain = versions::chain().context("Invalid revision chain")?;
    let options = MigratorOptions::from(&config.migration);

    // Commands that never touch the database
    match &cli.command {
        Commands::Heads => return handle_heads(&Migrator::new(chain)),
        Commands::Show { revision } => return handle_show(&Migrator::new(chain), revision),
        Commands::Check => return handle_check(&Migrator::new(chain)),
        Commands::Upgrade {
            target,
            sql: true,
            from,
        } => {
            let migrator = Migrator::new(chain).with_options(options);
            return handle_offline(&migrator, Direction::Up, target, from.as_deref(), cli.quiet);
        }
        Commands::Downgrade {
            target,
            confirm_lossy,
            sql: true,
            from,
        } => {
            let migrator = Migrator::new(chain).with_options(MigratorOptions {
                allow_lossy: *confirm_lossy,
                ..options
            });
            return handle_offline(&migrator, Direction::Down, target, from.as_deref(), cli.quiet);
        }
        _ => {}
    }

    let database_url = settings::database_url(cli.database_url.clone(), &config).ok_or_else(|| {
        anyhow!(
            "Database URL not provided. \
             Use --database-url or set {} or DATABASE_URL environment variable.",
            settings::DATABASE_URL_ENV
        )
    })?;
    log::debug!(
        "Connecting to {}",
        scribe::connection::redact_connection_string(&database_url)
    );
    let client = connect(&database_url).context("Error connecting to database")?;
    let executor = PgExecutor::new(client);
    let target = PostgresTarget::new(&executor, config.migration.lock_key)
        .with_statement_timeout(settings::statement_timeout(&config));

    match cli.command {
        Commands::Current => {
            let migrator = Migrator::new(chain);
            handle_current(&migrator, &target)
        }
        Commands::History => {
            let migrator = Migrator::new(chain);
            let current = migrator.current(&target)?;
            handle_history(&migrator, current.as_deref())
        }
        Commands::Upgrade { target: spec, .. } => {
            let migrator = Migrator::new(chain).with_options(options);
            handle_upgrade(&migrator, &target, &spec, cli.quiet)
        }
        Commands::Downgrade {
            target: spec,
            confirm_lossy,
            ..
        } => {
            let migrator = Migrator::new(chain).with_options(MigratorOptions {
                allow_lossy: confirm_lossy,
                ..options
            });
            handle_downgrade(&migrator, &target, &spec, cli.quiet)
        }
        Commands::Stamp { target: spec } => {
            let migrator = Migrator::new(chain).with_options(options);
            handle_stamp(&migrator, &target, &spec)
        }
        Commands::Heads | Commands::Show { .. } | Commands::Check => Ok(()),
    }
}

fn handle_current(migrator: &Migrator, target: &dyn SchemaTarget) -> anyhow::Result<()> {
    let status = migrator.status(target)?;
    print_status(&status);
    Ok(())
}

fn print_status(status: &MigrationStatus) {
    let current = format_revision(status.current.as_deref());
    if status.is_head() {
        println!("📍 Current revision: {} {}", current.bold(), "(head)".green());
    } else {
        println!("📍 Current revision: {}", current.bold());
    }

    if !status.pending.is_empty() {
        println!("\n⏳ Pending Revisions ({}):", status.pending_count);
        for pending in &status.pending {
            println!("  ⏳ {} {}", pending.revision, pending.description);
        }
    }

    if let Some(last) = status.history.last() {
        let time_str = match last.execution_time_ms {
            Some(ms) => format!("{}ms", ms),
            None => "N/A".to_string(),
        };
        println!(
            "\n🕒 Last step: {} {} ({}, {})",
            last.direction,
            last.revision,
            last.applied_at.format("%Y-%m-%d %H:%M:%S UTC"),
            time_str
        );
    }
}

fn handle_heads(migrator: &Migrator) -> anyhow::Result<()> {
    for head in migrator.chain().heads() {
        let labels = migrator
            .chain()
            .get(head)
            .map(|m| m.branch_labels().join(", "))
            .unwrap_or_default();
        if labels.is_empty() {
            println!("{} (head)", head);
        } else {
            println!("{} ({}) (head)", head, labels);
        }
    }
    Ok(())
}

fn handle_history(migrator: &Migrator, current: Option<&str>) -> anyhow::Result<()> {
    for line in history_lines(migrator.chain(), current) {
        if line.contains("(current)") {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    Ok(())
}

fn handle_show(migrator: &Migrator, revision: &str) -> anyhow::Result<()> {
    let resolved = migrator
        .chain()
        .resolve_target(revision, None)?
        .ok_or_else(|| anyhow!("'{}' resolves to base, which is not a revision", revision))?;
    let migration = migrator
        .chain()
        .get(&resolved)
        .ok_or_else(|| anyhow!("Unknown revision: '{}'", resolved))?;

    println!("\n📋 Revision Information\n");
    for line in show_lines(migrator.chain(), migration) {
        println!("{}", line);
    }
    Ok(())
}

fn handle_upgrade(
    migrator: &Migrator,
    target: &dyn SchemaTarget,
    spec: &str,
    quiet: bool,
) -> anyhow::Result<()> {
    println!("Upgrading to {}...", spec);
    let summary = migrator.upgrade(target, spec)?;
    report_run(&summary, quiet);
    Ok(())
}

fn handle_downgrade(
    migrator: &Migrator,
    target: &dyn SchemaTarget,
    spec: &str,
    quiet: bool,
) -> anyhow::Result<()> {
    println!("Downgrading to {}...", spec);
    let summary = migrator.downgrade(target, spec)?;
    report_run(&summary, quiet);
    Ok(())
}

fn report_run(summary: &RunSummary, quiet: bool) {
    if quiet {
        return;
    }
    if summary.is_noop() {
        println!(
            "✅ Already at {}; no migrations to run",
            format_revision(summary.to.as_deref())
        );
        return;
    }
    for step in &summary.steps {
        println!(
            "  {} {} {} ({}ms)",
            "✓".green(),
            step.direction,
            step.revision,
            step.execution_time_ms
        );
    }
    println!(
        "✅ Successfully ran {} step(s): {} -> {}",
        summary.steps.len(),
        format_revision(summary.from.as_deref()),
        format_revision(summary.to.as_deref())
    );
}

fn handle_stamp(migrator: &Migrator, target: &dyn SchemaTarget, spec: &str) -> anyhow::Result<()> {
    let stamped = migrator.stamp(target, spec)?;
    println!("✅ Stamped {}", format_revision(stamped.as_deref()));
    Ok(())
}

fn handle_check(migrator: &Migrator) -> anyhow::Result<()> {
    println!("Replaying revisions on an in-memory catalog...");
    let report = migrator.verify_round_trips()?;

    for step in &report.steps {
        let mark = if step.reversible && step.repeatable {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {} (reversible: {}, repeatable: {})",
            mark, step.revision, step.reversible, step.repeatable
        );
    }

    if !report.returns_to_base {
        println!("  {} downgrade from head left schema objects behind", "✗".red());
    }
    if !report.is_ok() {
        bail!(
            "Round trip check failed for head {}",
            format_revision(report.head.as_deref())
        );
    }
    println!(
        "✅ {} revision(s) round-trip cleanly up to {}",
        report.steps.len(),
        format_revision(report.head.as_deref())
    );
    Ok(())
}

fn handle_offline(
    migrator: &Migrator,
    direction: Direction,
    spec: &str,
    from: Option<&str>,
    quiet: bool,
) -> anyhow::Result<()> {
    // An upgrade script starts from base, a downgrade script from head
    let start = match (from, direction) {
        (Some(from), _) => migrator.chain().resolve_target(from, None)?,
        (None, Direction::Up) => None,
        (None, Direction::Down) => migrator.chain().head()?.map(str::to_string),
    };

    let target = SqlScriptTarget::new(start.as_deref());
    let summary = match direction {
        Direction::Up => migrator.upgrade(&target, spec)?,
        Direction::Down => migrator.downgrade(&target, spec)?,
    };

    if !quiet {
        print!(
            "{}",
            script_header(direction, summary.from.as_deref(), summary.to.as_deref())
        );
    }
    print!("{}", target.script());
    Ok(())
}
