mod classify;
mod config;
mod db;
mod error;
mod hh;
mod keywords;
mod listing;
mod normalize;
mod pipeline;
mod prune;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use crate::config::{RunOptions, Settings};

#[derive(Parser)]
#[command(name = "hh_vacancies", about = "hh.ru vacancy ingestion into SQLite")]
struct Cli {
    /// SQLite database path (overrides HH_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every keyword, store, then label student-friendly rows
    Run {
        /// Directory holding keywords.txt or '<keyword>.csv' files
        #[arg(long, default_value = "hhData")]
        data_dir: PathBuf,
        /// Country code (UA, AZ, BY, GE, KZ, KG, UZ, RU, Other)
        #[arg(long, default_value = "KZ")]
        country: String,
        /// Results per page (max 100)
        #[arg(long, default_value_t = crate::config::MAX_PAGE_SIZE)]
        per_page: u32,
        /// Seconds to wait between page requests
        #[arg(long, default_value_t = 0.5)]
        sleep: f64,
        /// After labelling, delete every row that is not student-friendly
        #[arg(long)]
        student_only: bool,
    },
    /// Recompute the student-friendly label for every row
    Classify,
    /// Delete every row that is not student-friendly (irreversible)
    Prune {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Show store counts
    Stats,
    /// List stored vacancies, newest first
    List {
        /// Text to look for in title or requirements
        #[arg(short, long)]
        query: Option<String>,
        /// City (Latin spellings of Kazakh cities are understood)
        #[arg(short, long)]
        city: Option<String>,
        /// Only rows found under this search term
        #[arg(short, long)]
        keyword: Option<String>,
        /// Include rows not labelled student-friendly
        #[arg(long)]
        all: bool,
        #[arg(short, long, default_value = "1")]
        page: usize,
        /// Rows per page (max 100)
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::Run { data_dir, country, per_page, sleep, student_only } => {
            let opts = RunOptions {
                data_dir,
                country,
                per_page,
                delay: Duration::try_from_secs_f64(sleep.max(0.0)).unwrap_or(crate::config::MIN_PAGE_DELAY),
                student_only,
            };
            // Validate and find keywords before the store is opened
            let Some(plan) = pipeline::plan(&opts)? else {
                println!("No keywords found. Nothing to do.");
                return Ok(());
            };
            let mut conn = db::connect(&settings.db_path)?;
            let client = hh::HhClient::new(&settings)?;

            println!(
                "Found {} keywords. Writing to {}",
                plan.keywords.len(),
                settings.db_path.display()
            );
            let s = pipeline::execute(&mut conn, &client, &plan).await?;
            println!(
                "{} keywords: fetched {} pages, stored {} rows ({} items skipped, {} write failures).",
                s.keywords, s.pages, s.stored, s.skipped, s.write_failures
            );
            if let Some(c) = &s.classified {
                println!("Student-friendly: {}/{} rows.", c.friendly, c.total);
            }
            if let Some(p) = &s.pruned {
                println!("Pruned {} rows, {} remaining.", p.deleted, p.remaining);
            }
            Ok(())
        }
        Commands::Classify => {
            let mut conn = db::connect(&settings.db_path)?;
            let r = classify::apply(&mut conn)?;
            println!("Student-friendly: {}/{} rows.", r.friendly, r.total);
            Ok(())
        }
        Commands::Prune { yes } => {
            if !yes {
                println!("Prune deletes every non-student vacancy permanently. Re-run with --yes.");
                return Ok(());
            }
            let mut conn = db::connect(&settings.db_path)?;
            classify::apply(&mut conn)?;
            let r = prune::apply(&conn)?;
            println!("Pruned {} rows, {} remaining.", r.deleted, r.remaining);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            let s = db::get_stats(&conn)?;
            println!("Total:            {}", s.total);
            println!("Student-friendly: {}", s.student_friendly);
            println!("Keywords:         {}", s.keywords);
            Ok(())
        }
        Commands::List { query, city, keyword, all, page, limit } => {
            let conn = db::connect(&settings.db_path)?;
            let q = listing::ListQuery { text: query, city, keyword, include_all: all, page, limit };
            let l = listing::list(&conn, &q)?;
            if l.items.is_empty() {
                println!("No vacancies found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<32} | {:<20} | {:<14} | {:<18} | {:<10}",
                "#", "Title", "Employer", "City", "Salary", "Published"
            );
            println!("{}", "-".repeat(112));

            let offset = (l.page - 1) * l.limit;
            for (i, r) in l.items.iter().enumerate() {
                let published = r.publish_date.as_deref().unwrap_or("-");
                println!(
                    "{:>3} | {:<32} | {:<20} | {:<14} | {:<18} | {:<10}",
                    offset + i + 1,
                    truncate(r.title.as_deref().unwrap_or("-"), 32),
                    truncate(r.employer.as_deref().unwrap_or("-"), 20),
                    truncate(r.city.as_deref().unwrap_or("-"), 14),
                    truncate(r.salary.as_deref().unwrap_or("-"), 18),
                    published.get(..10).unwrap_or(published),
                );
            }

            println!("\nPage {}/{} | {} vacancies", l.page, l.total_pages, l.total);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
