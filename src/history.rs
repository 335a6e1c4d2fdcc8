use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    project: Option<String>,
    /// Milliseconds since the epoch
    timestamp: Option<i64>,
}

/// Location of the Claude prompt history log
pub fn default_history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".claude")
        .join("history.jsonl")
}

/// Latest prompt time per project directory. A missing or unreadable log is
/// an empty map; malformed lines are skipped.
pub async fn last_active_by_project(path: &Path) -> HashMap<String, DateTime<Utc>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => parse_history(&contents),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No prompt history");
            HashMap::new()
        }
    }
}

fn parse_history(contents: &str) -> HashMap<String, DateTime<Utc>> {
    let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();

    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(entry) = serde_json::from_str::<HistoryEntry>(line) else {
            continue;
        };
        let (Some(project), Some(ts)) = (entry.project, entry.timestamp) else {
            continue;
        };
        let Some(at) = DateTime::from_timestamp_millis(ts) else {
            continue;
        };
        latest
            .entry(project)
            .and_modify(|prev| *prev = (*prev).max(at))
            .or_insert(at);
    }

    latest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_keeps_latest_per_project() {
        let contents = r#"{"display":"fix it","timestamp":1700000000000,"project":"/work/api"}
{"display":"again","timestamp":1700000500000,"project":"/work/api"}
not json
{"display":"older","timestamp":1600000000000,"project":"/work/api"}
{"display":"no project","timestamp":1700000000000}
{"display":"web","timestamp":1700000100000,"project":"/work/web","pastedContents":{}}
"#;
        let latest = parse_history(contents);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["/work/api"].timestamp_millis(), 1700000500000);
        assert_eq!(latest["/work/web"].timestamp_millis(), 1700000100000);
    }

    #[tokio::test]
    async fn test_missing_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let latest = last_active_by_project(&dir.path().join("history.jsonl")).await;
        assert!(latest.is_empty());
    }
}
