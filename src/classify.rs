use anyhow::Result;
use rusqlite::{params, Connection};
use tracing::info;

/// What a phrase does when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Candidate when found in requirements, title, keywords or employer.
    Include,
    /// Vetoes an `Include` when found in the title.
    Exclude,
    /// Forces the label when found in the title or keywords, past any veto.
    Override,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub phrase: &'static str,
    pub effect: Effect,
}

const fn rule(phrase: &'static str, effect: Effect) -> Rule {
    Rule { phrase, effect }
}

/// Bump when `RULES` changes; logged with every pass.
pub const RULES_VERSION: u32 = 1;

/// Matching is a case-insensitive substring test, not word-bounded: "sr "
/// and "lead" fire inside longer words too.
pub const RULES: &[Rule] = &[
    rule("no experience", Effect::Include),
    rule("no experience required", Effect::Include),
    rule("no experience needed", Effect::Include),
    rule("for students", Effect::Include),
    rule("для студентов", Effect::Include),
    rule("intern", Effect::Include),
    rule("internship", Effect::Include),
    rule("trainee", Effect::Include),
    rule("junior", Effect::Include),
    rule("junior developer", Effect::Include),
    rule("junior engineer", Effect::Include),
    rule("студент", Effect::Include),
    rule("стажировка", Effect::Include),
    rule("стажер", Effect::Include),
    rule("без опыта", Effect::Include),
    rule("стартап", Effect::Include),
    rule("startup", Effect::Include),
    rule("startups", Effect::Include),
    rule("senior", Effect::Exclude),
    rule("sr ", Effect::Exclude),
    rule(" sr.", Effect::Exclude),
    rule("middle", Effect::Exclude),
    rule("mid-level", Effect::Exclude),
    rule("lead", Effect::Exclude),
    rule("principal", Effect::Exclude),
    rule("manager", Effect::Exclude),
    rule("head of", Effect::Exclude),
    rule("experienced", Effect::Exclude),
    rule("senior-level", Effect::Exclude),
    rule("сеньор", Effect::Exclude),
    rule("мидл", Effect::Exclude),
    rule("junior", Effect::Override),
];

/// The fields the rules look at.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub title: Option<String>,
    pub requirements: Option<String>,
    pub source_keywords: String,
    pub employer: Option<String>,
}

fn contains(field: Option<&str>, phrase: &str) -> bool {
    field.is_some_and(|f| f.to_lowercase().contains(&phrase.to_lowercase()))
}

fn matches_any(rules: &[Rule], effect: Effect, fields: &[Option<&str>]) -> bool {
    rules
        .iter()
        .filter(|r| r.effect == effect)
        .any(|r| fields.iter().any(|f| contains(*f, r.phrase)))
}

/// Label for one record under `rules`.
pub fn is_student_friendly(c: &Candidate, rules: &[Rule]) -> bool {
    let title = c.title.as_deref();
    let keywords = Some(c.source_keywords.as_str());

    let included = matches_any(
        rules,
        Effect::Include,
        &[c.requirements.as_deref(), title, keywords, c.employer.as_deref()],
    );
    let excluded = matches_any(rules, Effect::Exclude, &[title]);
    let forced = matches_any(rules, Effect::Override, &[title, keywords]);

    (included && !excluded) || forced
}

#[derive(Debug)]
pub struct ClassifyReport {
    pub total: usize,
    pub friendly: usize,
}

/// Recompute the label for every row in one transaction: reset all, relabel.
pub fn apply(conn: &mut Connection) -> Result<ClassifyReport> {
    apply_rules(conn, RULES)
}

pub fn apply_rules(conn: &mut Connection, rules: &[Rule]) -> Result<ClassifyReport> {
    let tx = conn.transaction()?;
    tx.execute("UPDATE vacancies SET student_friendly = 0", [])?;

    let friendly_ids = {
        let mut stmt =
            tx.prepare("SELECT id, title, requirements, job_keyword, employer FROM vacancies")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    Candidate {
                        title: r.get(1)?,
                        requirements: r.get(2)?,
                        source_keywords: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        employer: r.get(4)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .filter(|(_, c)| is_student_friendly(c, rules))
            .map(|(id, _)| id)
            .collect::<Vec<_>>()
    };

    {
        let mut mark = tx.prepare("UPDATE vacancies SET student_friendly = 1 WHERE id = ?1")?;
        for id in &friendly_ids {
            mark.execute(params![id])?;
        }
    }

    let total: usize = tx.query_row("SELECT COUNT(*) FROM vacancies", [], |r| r.get(0))?;
    tx.commit()?;

    let report = ClassifyReport { total, friendly: friendly_ids.len() };
    info!(
        rules_version = RULES_VERSION,
        "Marked student_friendly: {}/{} rows", report.friendly, report.total
    );
    Ok(report)
}
