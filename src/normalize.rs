use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use serde::Deserialize;

use crate::db::VacancyRow;

const HIGHLIGHT_OPEN: &str = "<highlighttext>";
const HIGHLIGHT_CLOSE: &str = "</highlighttext>";
/// Almaty, UTC+06:00.
const STAMP_OFFSET_SECS: i32 = 6 * 3600;

// ── Upstream item shape (only the fields we keep) ──

#[derive(Debug, Deserialize)]
struct Item {
    alternate_url: Option<String>,
    name: Option<String>,
    employer: Option<Named>,
    area: Option<Named>,
    published_at: Option<String>,
    salary: Option<Salary>,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Salary {
    pub from: Option<serde_json::Number>,
    pub to: Option<serde_json::Number>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    requirement: Option<String>,
    responsibility: Option<String>,
}

/// The fixed zone every stored timestamp is written in (UTC+06:00).
pub fn reference_zone() -> Result<FixedOffset> {
    FixedOffset::east_opt(STAMP_OFFSET_SECS).context("Invalid reference UTC offset")
}

/// Current time in `tz`, RFC 3339.
pub fn stamp_now(tz: &FixedOffset) -> String {
    Utc::now().with_timezone(tz).to_rfc3339()
}

/// Map one upstream item to a row. `Ok(None)` means the item has no URL and
/// cannot be stored; `Err` means the item is malformed.
pub fn normalize(item: &serde_json::Value, keyword: &str, inserted_at: &str) -> Result<Option<VacancyRow>> {
    let parsed = Item::deserialize(item).context("Malformed vacancy item")?;

    let url = match parsed.alternate_url {
        Some(u) if !u.trim().is_empty() => u,
        _ => return Ok(None),
    };
    let (requirements, responsibilities) = match parsed.snippet {
        Some(s) => (s.requirement, s.responsibility),
        None => (None, None),
    };

    Ok(Some(VacancyRow {
        url,
        title: strip_highlights(parsed.name),
        employer: strip_highlights(parsed.employer.and_then(|e| e.name)),
        city: strip_highlights(parsed.area.and_then(|a| a.name)),
        publish_date: parsed.published_at,
        salary: parsed.salary.as_ref().and_then(format_salary),
        requirements: strip_highlights(requirements),
        responsibilities: strip_highlights(responsibilities),
        source_keywords: keyword.to_string(),
        raw_payload: serde_json::to_string(item)?,
        inserted_at: inserted_at.to_string(),
        student_friendly: false,
    }))
}

/// Literal removal of the search highlight tags. Other markup is left alone.
pub fn strip_highlights(text: Option<String>) -> Option<String> {
    text.map(|t| t.replace(HIGHLIGHT_OPEN, "").replace(HIGHLIGHT_CLOSE, ""))
}

/// `"{from} - {to} {cur}"`, `"{bound} {cur}"`, or nothing when no bound is set.
pub fn format_salary(salary: &Salary) -> Option<String> {
    let body = match (&salary.from, &salary.to) {
        (Some(from), Some(to)) => format!("{} - {}", from, to),
        (Some(bound), None) | (None, Some(bound)) => bound.to_string(),
        (None, None) => return None,
    };
    match salary.currency.as_deref() {
        Some(cur) if !cur.is_empty() => Some(format!("{} {}", body, cur)),
        _ => Some(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TS: &str = "2025-01-10T12:00:00+06:00";

    fn salary(v: serde_json::Value) -> Salary {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn salary_range() {
        let s = salary(json!({"from": 100, "to": 200, "currency": "USD"}));
        assert_eq!(format_salary(&s).as_deref(), Some("100 - 200 USD"));
    }

    #[test]
    fn salary_single_bound() {
        let s = salary(json!({"from": 100, "currency": "USD"}));
        assert_eq!(format_salary(&s).as_deref(), Some("100 USD"));
        let s = salary(json!({"from": null, "to": 350000, "currency": "KZT"}));
        assert_eq!(format_salary(&s).as_deref(), Some("350000 KZT"));
    }

    #[test]
    fn salary_zero_bound_is_kept() {
        // Zero is a present bound, only null counts as missing
        let s = salary(json!({"from": 0, "to": 200, "currency": "USD"}));
        assert_eq!(format_salary(&s).as_deref(), Some("0 - 200 USD"));
    }

    #[test]
    fn salary_absent() {
        assert_eq!(format_salary(&salary(json!({}))), None);
        assert_eq!(format_salary(&salary(json!({"currency": "USD"}))), None);
    }

    #[test]
    fn highlight_markers_removed() {
        let t = strip_highlights(Some("<highlighttext>Intern</highlighttext> Developer".into()));
        assert_eq!(t.as_deref(), Some("Intern Developer"));
        // Only the reserved pair; everything else stays
        let t = strip_highlights(Some("<b>Intern</b>".into()));
        assert_eq!(t.as_deref(), Some("<b>Intern</b>"));
        assert_eq!(strip_highlights(None), None);
    }

    #[test]
    fn full_item() {
        let item = json!({
            "id": "93",
            "name": "<highlighttext>Intern</highlighttext> Developer",
            "alternate_url": "https://hh.kz/vacancy/93",
            "employer": {"name": "Kaspi <highlighttext>Lab</highlighttext>"},
            "area": {"id": "160", "name": "Алматы"},
            "published_at": "2025-01-09T10:15:00+0300",
            "salary": {"from": 150000, "to": null, "currency": "KZT", "gross": false},
            "snippet": {
                "requirement": "Students of <highlighttext>IT</highlighttext> programs",
                "responsibility": null
            }
        });
        let row = normalize(&item, "Intern", TS).unwrap().unwrap();
        assert_eq!(row.url, "https://hh.kz/vacancy/93");
        assert_eq!(row.title.as_deref(), Some("Intern Developer"));
        assert_eq!(row.employer.as_deref(), Some("Kaspi Lab"));
        assert_eq!(row.city.as_deref(), Some("Алматы"));
        assert_eq!(row.publish_date.as_deref(), Some("2025-01-09T10:15:00+0300"));
        assert_eq!(row.salary.as_deref(), Some("150000 KZT"));
        assert_eq!(row.requirements.as_deref(), Some("Students of IT programs"));
        assert_eq!(row.responsibilities, None);
        assert_eq!(row.source_keywords, "Intern");
        assert_eq!(row.inserted_at, TS);
        assert!(!row.student_friendly);

        let raw: serde_json::Value = serde_json::from_str(&row.raw_payload).unwrap();
        assert_eq!(raw, item);
    }

    #[test]
    fn missing_url_is_dropped() {
        let item = json!({"name": "Intern"});
        assert!(normalize(&item, "Intern", TS).unwrap().is_none());
        let item = json!({"name": "Intern", "alternate_url": ""});
        assert!(normalize(&item, "Intern", TS).unwrap().is_none());
    }

    #[test]
    fn malformed_item_errors() {
        assert!(normalize(&json!("not an object"), "Intern", TS).is_err());
        let item = json!({"alternate_url": "https://hh.kz/vacancy/1", "name": 42});
        assert!(normalize(&item, "Intern", TS).is_err());
    }

    #[test]
    fn stamp_uses_fixed_offset() {
        let tz = reference_zone().unwrap();
        assert_eq!(tz.local_minus_utc(), 6 * 3600);
        assert!(stamp_now(&tz).ends_with("+06:00"));
    }
}
