use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub const MASTER_LIST: &str = "keywords.txt";
/// Stem prefix of aggregated result files, which are never search terms.
const RESULTS_PREFIX: &str = "results_";

/// Search terms for a data directory: sorted, deduplicated.
///
/// `keywords.txt` wins when present (one term per non-blank line). Otherwise
/// every `*.csv` file contributes its stem. An empty result is not an error;
/// the caller decides what "nothing to do" means.
pub fn discover(data_dir: &Path) -> Result<Vec<String>> {
    let master = data_dir.join(MASTER_LIST);
    if master.is_file() {
        let text = std::fs::read_to_string(&master)
            .with_context(|| format!("Failed to read {}", master.display()))?;
        return Ok(from_lines(&text));
    }

    if !data_dir.is_dir() {
        warn!(dir = %data_dir.display(), "Data directory does not exist");
        return Ok(Vec::new());
    }

    let mut terms = BTreeSet::new();
    let entries = std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to list {}", data_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.to_lowercase().starts_with(RESULTS_PREFIX) {
            debug!(file = %path.display(), "Skipping aggregated results file");
            continue;
        }
        terms.insert(stem.to_string());
    }
    Ok(terms.into_iter().collect())
}

fn from_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        std::fs::write(dir.path().join(name), "").unwrap();
    }

    #[test]
    fn master_list_sorted_and_deduped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MASTER_LIST),
            "  Data Analyst \n\nIntern\nData Analyst\n   \nBackend Developer\n",
        )
        .unwrap();
        // Ignored while the master list exists
        touch(&dir, "Designer.csv");

        let kws = discover(dir.path()).unwrap();
        assert_eq!(kws, vec!["Backend Developer", "Data Analyst", "Intern"]);
    }

    #[test]
    fn csv_stems_without_results_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "Data Analyst.csv");
        touch(&dir, "Analyst Intern.CSV");
        touch(&dir, "results_all.csv");
        touch(&dir, "Results_2024.csv");
        touch(&dir, "notes.md");
        std::fs::create_dir(dir.path().join("Nested.csv")).unwrap();

        let kws = discover(dir.path()).unwrap();
        assert_eq!(kws, vec!["Analyst Intern", "Data Analyst"]);
    }

    #[test]
    fn empty_or_missing_dir_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
        assert!(discover(&dir.path().join("nope")).unwrap().is_empty());
    }
}
