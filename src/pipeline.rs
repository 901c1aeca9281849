use std::time::Duration;

use anyhow::Result;
use chrono::FixedOffset;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::classify::{self, ClassifyReport};
use crate::config::{self, RunOptions};
use crate::db::{self, VacancyRow};
use crate::hh::{PageRequest, PageSource};
use crate::keywords;
use crate::normalize;
use crate::prune::{self, PruneReport};

/// A validated run: everything checked before the first request.
#[derive(Debug, Clone)]
pub struct Plan {
    pub keywords: Vec<String>,
    pub area: u32,
    pub per_page: u32,
    pub delay: Duration,
    pub student_only: bool,
}

/// Validate options and discover keywords. `Ok(None)` means nothing to do.
pub fn plan(opts: &RunOptions) -> Result<Option<Plan>> {
    let area = config::area_code(&opts.country)?;
    let per_page = config::check_page_size(opts.per_page)?;
    let (delay, raised) = config::clamp_delay(opts.delay);
    if raised {
        warn!(
            requested_ms = opts.delay.as_millis() as u64,
            "Page delay below floor, using {}ms",
            delay.as_millis()
        );
    }

    let keywords = keywords::discover(&opts.data_dir)?;
    if keywords.is_empty() {
        error!(
            dir = %opts.data_dir.display(),
            "No keywords found. Put files like 'Data Analyst.csv' in the data dir or create {}",
            keywords::MASTER_LIST
        );
        return Ok(None);
    }

    Ok(Some(Plan {
        keywords,
        area,
        per_page,
        delay,
        student_only: opts.student_only,
    }))
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub keywords: usize,
    pub pages: usize,
    pub stored: usize,
    pub skipped: usize,
    pub write_failures: usize,
    pub classified: Option<ClassifyReport>,
    pub pruned: Option<PruneReport>,
}

/// One keyword at a time: paginate, store the batch, move on. Then label and
/// optionally prune.
pub async fn execute<S>(conn: &mut Connection, source: &S, plan: &Plan) -> Result<RunSummary>
where
    S: PageSource + ?Sized,
{
    info!("Found {} keywords", plan.keywords.len());
    let zone = normalize::reference_zone()?;
    let mut summary = RunSummary { keywords: plan.keywords.len(), ..Default::default() };

    for kw in &plan.keywords {
        info!(keyword = %kw, "Fetching");
        let batch = collect_keyword(source, kw, plan, &zone).await;
        summary.pages += batch.pages;
        summary.skipped += batch.skipped;

        if batch.rows.is_empty() {
            continue;
        }
        match db::upsert_vacancies(conn, &batch.rows) {
            Ok(out) => {
                summary.stored += out.written;
                summary.write_failures += out.failed;
                info!(keyword = %kw, path = ?out.path, "Inserted/updated {} rows", out.written);
            }
            Err(e) => {
                summary.write_failures += batch.rows.len();
                error!(keyword = %kw, "DB upsert failed: {:#}", e);
            }
        }
    }

    match classify::apply(conn) {
        Ok(report) => {
            summary.classified = Some(report);
            if plan.student_only {
                match prune::apply(conn) {
                    Ok(report) => summary.pruned = Some(report),
                    Err(e) => warn!("Could not prune non-student rows: {:#}", e),
                }
            }
        }
        Err(e) => warn!("Could not mark student-friendly rows: {:#}", e),
    }

    Ok(summary)
}

struct KeywordBatch {
    rows: Vec<VacancyRow>,
    pages: usize,
    skipped: usize,
}

/// Page through results for one keyword until the hint, a short page, an
/// empty page, or a failed fetch says stop.
async fn collect_keyword<S>(source: &S, keyword: &str, plan: &Plan, zone: &FixedOffset) -> KeywordBatch
where
    S: PageSource + ?Sized,
{
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }

    let mut batch = KeywordBatch { rows: Vec::new(), pages: 0, skipped: 0 };
    let mut page = 0u32;

    loop {
        if page > 0 {
            tokio::time::sleep(plan.delay).await;
        }
        pb.set_message(format!("{} page {} ({} rows)", keyword, page + 1, batch.rows.len()));

        let req = PageRequest { keyword, page, area: plan.area, per_page: plan.per_page };
        let Some(data) = source.fetch_page(&req).await else {
            break;
        };
        batch.pages += 1;
        if data.items.is_empty() {
            break;
        }

        let stamp = normalize::stamp_now(zone);
        for item in &data.items {
            match normalize::normalize(item, keyword, &stamp) {
                Ok(Some(row)) => batch.rows.push(row),
                Ok(None) => debug!(keyword, "Skipping item without url"),
                Err(e) => {
                    batch.skipped += 1;
                    warn!(keyword, page, "Failed to process item: {:#}", e);
                }
            }
        }

        page += 1;
        if data.pages.is_some_and(|total| page >= total) {
            break;
        }
        if data.items.len() < plan.per_page as usize {
            break;
        }
    }

    pb.finish_and_clear();
    batch
}
