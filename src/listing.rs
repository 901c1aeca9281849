use anyhow::Result;
use rusqlite::Connection;

use crate::db::{self, Filter, VacancyRow};

pub const MAX_LIMIT: usize = 100;

/// Latin spellings people type for Kazakh cities, mapped to stored names.
const CITY_ALIASES: &[(&str, &[&str])] = &[
    ("almaty", &["алматы"]),
    ("almaata", &["алматы"]),
    ("astana", &["астана", "нур-султан"]),
    ("nursultan", &["нур-султан"]),
    ("shymkent", &["шымкент"]),
    ("karaganda", &["караганда"]),
    ("karagandy", &["караганда"]),
    ("kostanay", &["костанай"]),
    ("kostanai", &["костанай"]),
    ("aktobe", &["актобе"]),
    ("kyzylorda", &["кызылорда"]),
    ("turkestan", &["туркестан"]),
    ("turkistan", &["туркестан"]),
    ("ekibastuz", &["экибастуз"]),
    ("kokshetau", &["кокшетау"]),
    ("pavlodar", &["павлодар"]),
    ("petropavlovsk", &["петропавловск"]),
    ("aktau", &["актау"]),
    ("semey", &["семей"]),
    ("semei", &["семей"]),
    ("zhezkazgan", &["жезказган"]),
];

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub text: Option<String>,
    pub city: Option<String>,
    pub keyword: Option<String>,
    pub include_all: bool,
    /// 1-based.
    pub page: usize,
    pub limit: usize,
}

pub struct Listing {
    pub items: Vec<VacancyRow>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
    pub limit: usize,
}

/// Spellings to try for a city filter: the input itself plus any aliases.
pub fn city_variants(input: &str) -> Vec<String> {
    let needle = input.trim().to_lowercase();
    let mut out = vec![needle.clone()];
    if let Some((_, aliases)) = CITY_ALIASES.iter().find(|(k, _)| *k == needle) {
        for a in aliases.iter() {
            if !out.iter().any(|v| v == a) {
                out.push(a.to_string());
            }
        }
    }
    out
}

pub fn build_filter(q: &ListQuery) -> Filter {
    let mut parts = Vec::new();
    if !q.include_all {
        parts.push(Filter::StudentFriendly(true));
    }
    if let Some(text) = q.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        parts.push(Filter::Text(text.to_string()));
    }
    if let Some(city) = q.city.as_deref().filter(|c| !c.trim().is_empty()) {
        parts.push(Filter::CityAny(city_variants(city)));
    }
    if let Some(kw) = q.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        parts.push(Filter::Keyword(kw.to_string()));
    }
    Filter::And(parts)
}

pub fn list(conn: &Connection, q: &ListQuery) -> Result<Listing> {
    let limit = q.limit.clamp(1, MAX_LIMIT);
    let page = q.page.max(1);
    let filter = build_filter(q);

    let total = db::count(conn, &filter)?;
    let items = db::query(conn, &filter, limit, (page - 1) * limit)?;
    let total_pages = total.div_ceil(limit).max(1);
    Ok(Listing { items, total, page, total_pages, limit })
}
