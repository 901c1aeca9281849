use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

pub const KEYWORD_SEPARATOR: char = ';';

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    prepare(&conn)?;
    Ok(conn)
}

/// Register SQL helpers, create the schema and migrate older tables.
pub fn prepare(conn: &Connection) -> Result<()> {
    register_functions(conn)?;
    init_schema(conn)?;
    add_column_if_missing(conn, "student_friendly", "INTEGER NOT NULL DEFAULT 0")?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vacancies (
            id               INTEGER PRIMARY KEY,
            url              TEXT UNIQUE NOT NULL,
            title            TEXT,
            employer         TEXT,
            city             TEXT,
            publish_date     TEXT,
            salary           TEXT,
            requirements     TEXT,
            responsibilities TEXT,
            job_keyword      TEXT NOT NULL DEFAULT '',
            raw_json         TEXT NOT NULL,
            inserted_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_job_keyword ON vacancies(job_keyword);
        CREATE INDEX IF NOT EXISTS idx_publish_date ON vacancies(publish_date);
        ",
    )?;
    Ok(())
}

/// Add a column unless the table already has it. Returns whether it was added.
pub fn add_column_if_missing(conn: &Connection, name: &str, decl: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('vacancies')")?;
    let cols = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if cols.iter().any(|c| c == name) {
        return Ok(false);
    }
    conn.execute_batch(&format!("ALTER TABLE vacancies ADD COLUMN {} {};", name, decl))?;
    info!(column = name, "Added column to vacancies");
    Ok(true)
}

fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "merge_keywords",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let existing: Option<String> = ctx.get(0)?;
            let incoming: Option<String> = ctx.get(1)?;
            Ok(merge_keywords(
                existing.as_deref().unwrap_or(""),
                incoming.as_deref().unwrap_or(""),
            ))
        },
    )?;
    // SQLite's lower() folds ASCII only; city names and snippets are mostly Cyrillic.
    conn.create_scalar_function(
        "lower_utf8",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )?;
    Ok(())
}

// ── Rows ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VacancyRow {
    pub url: String,
    pub title: Option<String>,
    pub employer: Option<String>,
    pub city: Option<String>,
    pub publish_date: Option<String>,
    pub salary: Option<String>,
    pub requirements: Option<String>,
    pub responsibilities: Option<String>,
    /// `;`-joined search terms that have surfaced this URL.
    pub source_keywords: String,
    pub raw_payload: String,
    pub inserted_at: String,
    /// Written only by the classifier.
    pub student_friendly: bool,
}

const SELECT_COLUMNS: &str = "url, title, employer, city, publish_date, salary, requirements,
     responsibilities, job_keyword, raw_json, inserted_at, student_friendly";

fn read_row(row: &Row) -> rusqlite::Result<VacancyRow> {
    Ok(VacancyRow {
        url: row.get(0)?,
        title: row.get(1)?,
        employer: row.get(2)?,
        city: row.get(3)?,
        publish_date: row.get(4)?,
        salary: row.get(5)?,
        requirements: row.get(6)?,
        responsibilities: row.get(7)?,
        source_keywords: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        raw_payload: row.get(9)?,
        inserted_at: row.get(10)?,
        student_friendly: row.get(11)?,
    })
}

// ── Merge rules ──

/// Union of two keyword sets in order of first appearance.
///
/// Empty on either side yields the other side unchanged. Tokens already in
/// `existing` are not appended again, so re-ingesting under the same term is
/// a no-op for this field.
pub fn merge_keywords(existing: &str, incoming: &str) -> String {
    if existing.is_empty() {
        return incoming.to_string();
    }
    if incoming.is_empty() {
        return existing.to_string();
    }
    let mut merged = existing.to_string();
    for token in incoming.split(KEYWORD_SEPARATOR) {
        let present = merged.split(KEYWORD_SEPARATOR).any(|t| t == token);
        if !token.is_empty() && !present {
            merged.push(KEYWORD_SEPARATOR);
            merged.push_str(token);
        }
    }
    merged
}

/// Incoming fields win, except the keyword set (merged) and the URL and
/// label (kept from the stored row).
pub fn merge_record(existing: &VacancyRow, incoming: &VacancyRow) -> VacancyRow {
    VacancyRow {
        url: existing.url.clone(),
        source_keywords: merge_keywords(&existing.source_keywords, &incoming.source_keywords),
        student_friendly: existing.student_friendly,
        ..incoming.clone()
    }
}

// ── Upsert ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPath {
    Bulk,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub path: UpsertPath,
    pub written: usize,
    pub failed: usize,
}

/// Insert-or-merge a batch keyed by URL.
///
/// The bulk path is one transaction with `ON CONFLICT DO UPDATE`. If it errors
/// (older SQLite without upsert, or any write fault) it is rolled back and the
/// batch is replayed record by record.
pub fn upsert_vacancies(conn: &mut Connection, rows: &[VacancyRow]) -> Result<UpsertOutcome> {
    match upsert_bulk(conn, rows) {
        Ok(written) => Ok(UpsertOutcome { path: UpsertPath::Bulk, written, failed: 0 }),
        Err(e) => {
            warn!("Bulk upsert failed, falling back to per-record writes: {:#}", e);
            upsert_each(conn, rows)
        }
    }
}

pub fn upsert_bulk(conn: &mut Connection, rows: &[VacancyRow]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO vacancies
             (url, title, employer, city, publish_date, salary, requirements,
              responsibilities, job_keyword, raw_json, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(url) DO UPDATE SET
                title            = excluded.title,
                employer         = excluded.employer,
                city             = excluded.city,
                publish_date     = excluded.publish_date,
                salary           = excluded.salary,
                requirements     = excluded.requirements,
                responsibilities = excluded.responsibilities,
                job_keyword      = merge_keywords(vacancies.job_keyword, excluded.job_keyword),
                raw_json         = excluded.raw_json,
                inserted_at      = excluded.inserted_at",
        )?;
        for r in rows {
            count += stmt.execute(params![
                r.url, r.title, r.employer, r.city, r.publish_date, r.salary,
                r.requirements, r.responsibilities, r.source_keywords, r.raw_payload,
                r.inserted_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Per-record read-modify-write. A failing record is logged and skipped.
pub fn upsert_each(conn: &mut Connection, rows: &[VacancyRow]) -> Result<UpsertOutcome> {
    let mut outcome = UpsertOutcome { path: UpsertPath::Fallback, written: 0, failed: 0 };
    for r in rows {
        match upsert_one(conn, r) {
            Ok(()) => outcome.written += 1,
            Err(e) => {
                warn!(url = %r.url, "Fallback upsert failed: {:#}", e);
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}

fn upsert_one(conn: &mut Connection, incoming: &VacancyRow) -> Result<()> {
    let tx = conn.transaction()?;
    let existing = tx
        .query_row(
            &format!("SELECT {} FROM vacancies WHERE url = ?1", SELECT_COLUMNS),
            [&incoming.url],
            read_row,
        )
        .optional()?;

    match existing {
        None => {
            tx.execute(
                "INSERT INTO vacancies
                 (url, title, employer, city, publish_date, salary, requirements,
                  responsibilities, job_keyword, raw_json, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    incoming.url, incoming.title, incoming.employer, incoming.city,
                    incoming.publish_date, incoming.salary, incoming.requirements,
                    incoming.responsibilities, incoming.source_keywords,
                    incoming.raw_payload, incoming.inserted_at,
                ],
            )?;
        }
        Some(existing) => {
            let m = merge_record(&existing, incoming);
            tx.execute(
                "UPDATE vacancies SET
                    title = ?2, employer = ?3, city = ?4, publish_date = ?5, salary = ?6,
                    requirements = ?7, responsibilities = ?8, job_keyword = ?9,
                    raw_json = ?10, inserted_at = ?11
                 WHERE url = ?1",
                params![
                    m.url, m.title, m.employer, m.city, m.publish_date, m.salary,
                    m.requirements, m.responsibilities, m.source_keywords,
                    m.raw_payload, m.inserted_at,
                ],
            )?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Predicates ──

/// Row filters shared by query, count and delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    StudentFriendly(bool),
    /// One term inside the keyword set (exact token).
    Keyword(String),
    /// Case-insensitive substring of title or requirements.
    Text(String),
    /// Any of these substrings in the city name.
    CityAny(Vec<String>),
    And(Vec<Filter>),
}

impl Filter {
    fn to_sql(&self, params: &mut Vec<Box<dyn ToSql>>) -> String {
        match self {
            Filter::All => "1=1".to_string(),
            Filter::StudentFriendly(v) => {
                params.push(Box::new(*v));
                format!("student_friendly = ?{}", params.len())
            }
            Filter::Keyword(k) => {
                params.push(Box::new(format!("{0}{1}{0}", KEYWORD_SEPARATOR, k)));
                format!(
                    "instr('{0}' || job_keyword || '{0}', ?{1}) > 0",
                    KEYWORD_SEPARATOR,
                    params.len()
                )
            }
            Filter::Text(q) => {
                params.push(Box::new(q.to_lowercase()));
                let n = params.len();
                format!(
                    "(instr(lower_utf8(title), ?{n}) > 0 OR instr(lower_utf8(requirements), ?{n}) > 0)"
                )
            }
            Filter::CityAny(variants) => {
                if variants.is_empty() {
                    return "1=0".to_string();
                }
                let parts: Vec<String> = variants
                    .iter()
                    .map(|v| {
                        params.push(Box::new(v.to_lowercase()));
                        format!("instr(lower_utf8(city), ?{}) > 0", params.len())
                    })
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            Filter::And(filters) => {
                if filters.is_empty() {
                    return "1=1".to_string();
                }
                let parts: Vec<String> = filters.iter().map(|f| f.to_sql(params)).collect();
                format!("({})", parts.join(" AND "))
            }
        }
    }

    fn build(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut params = Vec::new();
        let clause = self.to_sql(&mut params);
        (clause, params)
    }
}

fn refs(params: &[Box<dyn ToSql>]) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

/// Rows matching `filter`, most recently published first.
pub fn query(conn: &Connection, filter: &Filter, limit: usize, offset: usize) -> Result<Vec<VacancyRow>> {
    let (clause, params) = filter.build();
    let sql = format!(
        "SELECT {} FROM vacancies WHERE {} ORDER BY publish_date DESC, id LIMIT {} OFFSET {}",
        SELECT_COLUMNS, clause, limit, offset
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(refs(&params).as_slice(), read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count(conn: &Connection, filter: &Filter) -> Result<usize> {
    let (clause, params) = filter.build();
    let sql = format!("SELECT COUNT(*) FROM vacancies WHERE {}", clause);
    let n: usize = conn.query_row(&sql, refs(&params).as_slice(), |r| r.get(0))?;
    Ok(n)
}

pub fn delete_where(conn: &Connection, filter: &Filter) -> Result<usize> {
    let (clause, params) = filter.build();
    let sql = format!("DELETE FROM vacancies WHERE {}", clause);
    Ok(conn.execute(&sql, refs(&params).as_slice())?)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub student_friendly: usize,
    pub keywords: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total = count(conn, &Filter::All)?;
    let student_friendly = count(conn, &Filter::StudentFriendly(true))?;
    let mut stmt = conn.prepare("SELECT job_keyword FROM vacancies")?;
    let mut distinct = std::collections::BTreeSet::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let joined: Option<String> = row.get(0)?;
        for token in joined.unwrap_or_default().split(KEYWORD_SEPARATOR) {
            if !token.is_empty() {
                distinct.insert(token.to_string());
            }
        }
    }
    Ok(Stats { total, student_friendly, keywords: distinct.len() })
}
