use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::process::Command;
use tokio::task::JoinSet;

use crate::tmux::Pane;

/// Panes sharing one working directory
#[derive(Debug, Clone)]
pub struct Workspace {
    pub path: String,
    pub short_path: String,
    pub git_branch: String,
    pub panes: Vec<Pane>,
}

#[derive(Debug, Clone, Default)]
struct WorkspaceInfo {
    short_path: String,
    git_branch: String,
    git_dirty: bool,
}

/// Fills in per-workspace metadata. Dirty checks are cached per directory
/// and only rerun when `.git/index` changes.
#[derive(Debug, Clone, Default)]
pub struct Enricher {
    home: Option<PathBuf>,
    dirty_cache: Arc<Mutex<HashMap<PathBuf, (SystemTime, bool)>>>,
}

impl Enricher {
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir(),
            dirty_cache: Arc::default(),
        }
    }

    /// Populate short path, git branch and dirty flag on every pane.
    /// Metadata is computed once per unique path.
    pub async fn enrich(&self, panes: &mut [Pane]) {
        let mut unique: HashMap<String, WorkspaceInfo> = HashMap::new();
        for pane in panes.iter() {
            unique
                .entry(pane.path.clone())
                .or_insert_with(|| WorkspaceInfo {
                    short_path: short_path(&pane.path, self.home.as_deref()),
                    ..WorkspaceInfo::default()
                });
        }

        let mut tasks = JoinSet::new();
        for path in unique.keys().cloned() {
            let cache = Arc::clone(&self.dirty_cache);
            tasks.spawn(async move {
                let dir = PathBuf::from(&path);
                let branch = git_branch(&dir);
                let dirty = git_dirty(&dir, &cache).await;
                (path, branch, dirty)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((path, branch, dirty)) => {
                    if let Some(info) = unique.get_mut(&path) {
                        info.git_branch = branch;
                        info.git_dirty = dirty;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Workspace enrichment task failed"),
            }
        }

        for pane in panes.iter_mut() {
            if let Some(info) = unique.get(&pane.path) {
                pane.short_path = info.short_path.clone();
                pane.git_branch = info.git_branch.clone();
                pane.git_dirty = info.git_dirty;
            }
        }
    }
}

/// Display name for a working directory: its basename, or the whole path
/// with `~` for the home directory when there is no useful basename.
pub fn short_path(path: &str, home: Option<&Path>) -> String {
    let base = Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if !base.is_empty() && base != "." {
        return base;
    }

    if let Some(home) = home.and_then(|h| h.to_str()).filter(|h| !h.is_empty()) {
        if let Some(rest) = path.strip_prefix(home) {
            return format!("~{}", rest);
        }
    }
    path.to_string()
}

/// Current branch read straight from `.git/HEAD`. Detached heads show the
/// short sha; anything unreadable is an empty string.
pub fn git_branch(dir: &Path) -> String {
    let Ok(head) = std::fs::read_to_string(dir.join(".git").join("HEAD")) else {
        return String::new();
    };
    let head = head.trim();
    if let Some(branch) = head.strip_prefix("ref: refs/heads/") {
        return branch.to_string();
    }
    head.chars().take(8).collect()
}

async fn git_dirty(dir: &Path, cache: &Mutex<HashMap<PathBuf, (SystemTime, bool)>>) -> bool {
    let Ok(mtime) = std::fs::metadata(dir.join(".git").join("index")).and_then(|m| m.modified())
    else {
        return false;
    };

    if let Some(dirty) = cached_dirty(cache, dir, mtime) {
        return dirty;
    }

    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(dir)
        .output()
        .await;
    let dirty = match output {
        Ok(output) if output.status.success() => !output.stdout.trim_ascii().is_empty(),
        _ => return false,
    };

    if let Ok(mut cache) = cache.lock() {
        cache.insert(dir.to_path_buf(), (mtime, dirty));
    }
    dirty
}

fn cached_dirty(
    cache: &Mutex<HashMap<PathBuf, (SystemTime, bool)>>,
    dir: &Path,
    mtime: SystemTime,
) -> Option<bool> {
    let cache = cache.lock().ok()?;
    cache
        .get(dir)
        .filter(|(cached_mtime, _)| *cached_mtime == mtime)
        .map(|&(_, dirty)| dirty)
}

/// Group panes by working directory, sorted by path.
pub fn group_by_workspace(panes: &[Pane]) -> Vec<Workspace> {
    let mut groups: BTreeMap<&str, Vec<Pane>> = BTreeMap::new();
    for pane in panes {
        groups.entry(pane.path.as_str()).or_default().push(pane.clone());
    }

    groups
        .into_iter()
        .map(|(path, panes)| Workspace {
            path: path.to_string(),
            short_path: panes[0].short_path.clone(),
            git_branch: panes[0].git_branch.clone(),
            panes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pane(target: &str, path: &str) -> Pane {
        Pane {
            target: target.to_string(),
            path: path.to_string(),
            ..Pane::default()
        }
    }

    #[test]
    fn test_short_path() {
        let home = Path::new("/home/me");
        assert_eq!(short_path("/home/me/src/api", Some(home)), "api");
        assert_eq!(short_path("/", Some(home)), "/");
        assert_eq!(short_path(".", Some(home)), ".");
    }

    #[test]
    fn test_git_branch_from_head() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(git_branch(dir.path()), "");

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/feature/x\n").unwrap();
        assert_eq!(git_branch(dir.path()), "feature/x");

        std::fs::write(
            dir.path().join(".git/HEAD"),
            "3f2a9c0e1d5b7a8e9f0a1b2c3d4e5f6a7b8c9d0e\n",
        )
        .unwrap();
        assert_eq!(git_branch(dir.path()), "3f2a9c0e");
    }

    #[tokio::test]
    async fn test_enrich_fills_metadata_per_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        let path = dir.path().to_string_lossy().to_string();

        let mut panes = vec![pane("a:0.0", &path), pane("a:0.1", &path), pane("b:0.0", "/")];
        Enricher::new().enrich(&mut panes).await;

        assert_eq!(panes[0].git_branch, "main");
        assert_eq!(panes[1].git_branch, "main");
        assert!(!panes[0].git_dirty);
        assert_eq!(panes[2].short_path, "/");
        assert_eq!(panes[2].git_branch, "");
    }

    #[test]
    fn test_group_by_workspace_sorted() {
        let groups = group_by_workspace(&[
            pane("b:0.0", "/work/zeta"),
            pane("a:0.0", "/work/alpha"),
            pane("a:1.0", "/work/zeta"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].path, "/work/alpha");
        assert_eq!(groups[1].panes.len(), 2);
    }
}
