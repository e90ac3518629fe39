mod collect;
mod db;
mod fetch;
mod model;
mod output;
mod parser;
mod pipeline;
mod runlog;
mod settings;
mod sources;

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;

use parser::events::{DropReason, ExtractContext};
use pipeline::{Collected, PageInput};
use runlog::RunLog;
use settings::Settings;
use sources::Source;

#[derive(Parser)]
#[command(name = "tx_cyber_events", about = "Texas metro cybersecurity event monitor")]
struct Cli {
    /// Days ahead of today an event may start
    #[arg(long, global = true)]
    days_ahead: Option<u32>,
    /// Treat this date as today (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
    /// JSON file replacing the built-in source list
    #[arg(long, global = true)]
    sources: Option<PathBuf>,
    /// Skip the snapshot database
    #[arg(long, global = true)]
    no_snapshots: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all sources, extract events, write CSV, calendar and run log
    Run,
    /// Fetch all sources into the snapshot database only
    Fetch,
    /// Re-extract events from the latest run's snapshots
    Process,
    /// Extract events from one saved HTML page and print them as JSON
    Extract {
        #[arg(short, long)]
        file: PathBuf,
        /// URL the page was fetched from (relative links resolve against it)
        #[arg(short, long)]
        url: String,
        #[arg(long, default_value = "Local")]
        org: String,
        #[arg(long, default_value = "")]
        group: String,
    },
    /// List configured sources
    Sources,
    /// Show snapshot database statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(days) = cli.days_ahead {
        settings.days_ahead = days;
    }
    if let Some(path) = cli.sources.clone() {
        settings.sources_file = Some(path);
    }
    if cli.no_snapshots {
        settings.snapshots = false;
    }
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());
    let ctx = ExtractContext::new(today, settings.days_ahead);

    let result = match cli.command {
        Commands::Run => {
            let sources = sources::load_sources(settings.sources_file.as_deref())?;
            let conn = open_snapshots(&settings)?;
            let run_id = match &conn {
                Some(c) => Some(db::start_run(c, &today.to_string())?),
                None => None,
            };
            let mut log = RunLog::new(today, settings.days_ahead, sources.len());

            println!("Fetching {} sources...", sources.len());
            let fetcher = fetch::Fetcher::new(&settings)?;
            let snapshots = conn.as_ref().zip(run_id);
            let pages =
                pipeline::fetch_all(&fetcher, &sources, &settings, snapshots, &mut log).await?;

            let collected = pipeline::process_pages(&pages, &ctx, &mut log);
            pipeline::write_outputs(&collected.events, &settings, &log)?;
            if let Some((c, id)) = snapshots {
                pipeline::save_run_diagnostics(c, id, &log)?;
            }
            report(&settings, &log, &collected);
            Ok(())
        }
        Commands::Fetch => {
            let sources = sources::load_sources(settings.sources_file.as_deref())?;
            let Some(conn) = open_snapshots(&settings)? else {
                bail!("Snapshots are disabled; nothing to fetch into");
            };
            let run_id = db::start_run(&conn, &today.to_string())?;
            let mut log = RunLog::new(today, settings.days_ahead, sources.len());

            println!("Fetching {} sources into snapshot run {}...", sources.len(), run_id);
            let fetcher = fetch::Fetcher::new(&settings)?;
            let pages =
                pipeline::fetch_all(&fetcher, &sources, &settings, Some((&conn, run_id)), &mut log)
                    .await?;
            println!(
                "Done: {} fetched ({} ok, {} failed).",
                sources.len(),
                pages.len(),
                log.sources_failed.len()
            );
            Ok(())
        }
        Commands::Process => {
            let Some(conn) = open_snapshots(&settings)? else {
                bail!("Snapshots are disabled; nothing to process");
            };
            let Some(run_id) = db::latest_run_id(&conn)? else {
                println!("No snapshots stored. Run 'fetch' first.");
                return Ok(());
            };
            let today = pipeline::replay_today(&conn, run_id, cli.today, today)?;
            let ctx = ExtractContext::new(today, settings.days_ahead);
            let rows = db::fetch_snapshots(&conn, run_id)?;
            let mut log = RunLog::new(today, settings.days_ahead, rows.len());
            let pages = pipeline::pages_from_snapshots(rows, &mut log);
            println!(
                "Processing {} pages from snapshot run {} (today = {})...",
                pages.len(),
                run_id,
                today
            );

            let collected = pipeline::process_pages(&pages, &ctx, &mut log);
            pipeline::write_outputs(&collected.events, &settings, &log)?;
            pipeline::save_run_diagnostics(&conn, run_id, &log)?;
            report(&settings, &log, &collected);
            Ok(())
        }
        Commands::Extract { file, url, org, group } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let page = PageInput::from_html(Source::new(&org, &group, &url), html);
            let outcome = parser::process_page(&page.source, &page.html, &ctx);
            let json = serde_json::json!({
                "events": outcome.events,
                "diagnostics": outcome.diagnostics,
                "needs_manual_review": outcome.manual_review,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Commands::Sources => {
            let sources = sources::load_sources(settings.sources_file.as_deref())?;
            for (i, s) in sources.iter().enumerate() {
                let flag = if s.needs_js_rendering() { " [js]" } else { "" };
                println!(
                    "{:>3} | {:<12} | {:<40} | {}{}",
                    i + 1,
                    clip(&s.org, 12),
                    clip(&s.group, 40),
                    s.url,
                    flag
                );
            }
            println!("\n{} sources", sources.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:      {}", s.runs);
            println!("Snapshots: {}", s.snapshots);
            println!("Failed:    {}", s.failed);
            println!("Bytes:     {}", s.total_bytes);
            if let Some((id, started, events)) = s.last_run {
                let events = events.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
                println!("Last run:  #{} at {} ({} events)", id, started, events);
                let diags = db::fetch_diagnostics(&conn, id)?;
                if !diags.is_empty() {
                    println!(
                        "\n{:<60} | {:>5} | {:>5} | {:>6} | {:>4}",
                        "Source", "Cands", "Dated", "Window", "Kept"
                    );
                    println!("{}", "-".repeat(93));
                    for (url, d) in diags {
                        println!(
                            "{:<60} | {:>5} | {:>5} | {:>6} | {:>4}",
                            clip(&url, 60),
                            d.candidates_total,
                            d.dated_blocks,
                            d.drop_count(DropReason::OutOfWindow),
                            d.events_kept
                        );
                    }
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

fn open_snapshots(settings: &Settings) -> Result<Option<rusqlite::Connection>> {
    if !settings.snapshots {
        return Ok(None);
    }
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(Some(conn))
}

fn report(settings: &Settings, log: &RunLog, collected: &Collected) {
    info!(
        events = collected.events.len(),
        duplicates = collected.dedup.removed,
        failed = log.sources_failed.len(),
        review = log.needs_manual_review.len(),
        "Run complete"
    );
    println!(
        "Wrote {}, {}. Extracted events: {} ({} duplicates removed)",
        settings.output_csv.display(),
        settings.output_ics.display(),
        collected.events.len(),
        collected.dedup.removed
    );
    if !log.sources_failed.is_empty() {
        eprintln!(
            "Sources failed: {} (see {})",
            log.sources_failed.len(),
            settings.output_log.display()
        );
    }
    if !log.needs_manual_review.is_empty() {
        eprintln!(
            "Needs manual review: {} (see {})",
            log.needs_manual_review.len(),
            settings.output_log.display()
        );
    }
}

/// Shorten `s` to `max` chars for table columns.
fn clip(s: &str, max: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &s[..cut])),
        None => Cow::Borrowed(s),
    }
}

fn elapsed_label(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..=59 => format!("{:.1}s", d.as_secs_f64()),
        60..=3599 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}
