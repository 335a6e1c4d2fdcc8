use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::discovery::Discovery;
use crate::reconcile::Reconciler;
use crate::state::StateStore;
use crate::sync::persist_daemon_cycle;

/// Errors that can occur while taking the daemon lock
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive advisory lock held for the daemon's lifetime. The lock file
/// holds the daemon's pid so `restart` can find it. Released on drop.
#[derive(Debug)]
pub struct WatchLock {
    _file: File,
    path: PathBuf,
}

impl WatchLock {
    /// Try to take the lock without blocking. `Ok(None)` means another daemon
    /// already holds it.
    pub fn acquire(path: &Path) -> Result<Option<Self>, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(io_err(e)),
        }

        file.set_len(0).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        write!(file, "{}", std::process::id()).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        tracing::debug!(lock_path = %path.display(), "Acquired watch lock");
        Ok(Some(Self {
            _file: file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Pid recorded in the lock file, if any.
pub fn read_daemon_pid(lock_path: &Path) -> Option<i32> {
    std::fs::read_to_string(lock_path)
        .ok()?
        .trim()
        .parse()
        .ok()
        .filter(|&pid| pid > 0)
}

/// Run the watch loop until `cancel` fires. Returns immediately, successfully,
/// if another daemon is already running.
pub async fn run(config: &Config, discovery: Discovery, cancel: CancellationToken) -> Result<()> {
    let Some(lock) = WatchLock::acquire(&config.lock_path())? else {
        tracing::info!("Watch daemon already running");
        return Ok(());
    };
    tracing::info!(pid = std::process::id(), lock = %lock.path().display(), "Watch daemon started");

    let store = StateStore::new(config.state_path());
    let mut reconciler = Reconciler::new();
    if let Some(state) = store.load() {
        reconciler.seed_from_state(&state);
    }

    let mut cycle: u64 = 0;
    loop {
        let started = Instant::now();

        // Pick up overrides the viewer wrote since our last cycle
        if let Some(state) = store.load() {
            reconciler.merge_overrides(&state);
        }

        match discovery.discover().await {
            Ok(mut panes) => {
                reconciler.reconcile(&mut panes);
                persist_daemon_cycle(&store, &mut reconciler, &mut panes);
                tracing::debug!(cycle, panes = panes.len(), tracked = reconciler.tracked(), "Watch cycle");
            }
            Err(e) => tracing::warn!(error = %e, "Discovery failed, keeping previous state"),
        }

        let remaining = config
            .interval_for_cycle(cycle)
            .saturating_sub(started.elapsed());
        cycle += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(remaining) => {}
        }
    }

    tracing::info!(cycles = cycle, "Watch daemon stopped");
    drop(lock);
    Ok(())
}

/// How long `restart` waits for the old daemon to let go of the lock. The old
/// daemon only stops at its next sleep boundary.
const RESTART_TIMEOUT: Duration = Duration::from_secs(10);
const RESTART_POLL: Duration = Duration::from_millis(50);

/// Stop the running daemon, if any, and start a fresh one in the background
/// once the old one has released the lock.
pub async fn restart(config: &Config) -> Result<()> {
    let lock_path = config.lock_path();
    if let Some(pid) = read_daemon_pid(&lock_path) {
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            tracing::info!(pid, "Signalled watch daemon");
        } else {
            tracing::debug!(pid, error = %io::Error::last_os_error(), "No daemon to signal");
        }
    }

    let args = watch_args(config);
    replace_daemon(&lock_path, RESTART_TIMEOUT, || spawn_daemon(&args)).await
}

/// Arguments for a background `watch` carrying this process's settings.
fn watch_args(config: &Config) -> Vec<String> {
    vec![
        "watch".to_string(),
        "--interval-ms".to_string(),
        config.watch_interval.as_millis().to_string(),
    ]
}

fn spawn_daemon(args: &[String]) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    std::process::Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .context("Failed to spawn watch daemon")?;
    Ok(())
}

/// Wait for the lock to come free, then run `spawn`. Spawning while the old
/// daemon still holds the lock would leave the new one exiting immediately.
async fn replace_daemon<F>(lock_path: &Path, timeout: Duration, spawn: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if WatchLock::acquire(lock_path)?.is_some() {
            break;
        }
        if Instant::now() >= deadline {
            anyhow::bail!(
                "watch daemon still holds {} after {:?}",
                lock_path.display(),
                timeout
            );
        }
        tokio::time::sleep(RESTART_POLL).await;
    }
    spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_and_records_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("watch.lock");

        let lock = WatchLock::acquire(&path).unwrap().expect("first lock");
        assert_eq!(read_daemon_pid(&path), Some(std::process::id() as i32));

        assert!(WatchLock::acquire(&path).unwrap().is_none());

        drop(lock);
        assert!(WatchLock::acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_stale_pid_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.lock");
        std::fs::write(&path, "9999999999").unwrap();

        let _lock = WatchLock::acquire(&path).unwrap().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_read_daemon_pid_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.lock");
        assert_eq!(read_daemon_pid(&path), None);
        std::fs::write(&path, "not-a-pid").unwrap();
        assert_eq!(read_daemon_pid(&path), None);
        std::fs::write(&path, "0").unwrap();
        assert_eq!(read_daemon_pid(&path), None);
        std::fs::write(&path, " 4242\n").unwrap();
        assert_eq!(read_daemon_pid(&path), Some(4242));
    }

    #[tokio::test]
    async fn test_second_daemon_exits_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            state_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let _held = WatchLock::acquire(&config.lock_path()).unwrap().unwrap();

        let discovery = Discovery::new(
            crate::tmux::TmuxClient::with_path("/nonexistent/tmux"),
            crate::agents::AgentRegistry::new(config.agent_names()),
            &config,
        );
        run(&config, discovery, CancellationToken::new()).await.unwrap();
        assert!(!config.state_path().exists());
    }

    #[tokio::test]
    async fn test_daemon_survives_discovery_failure_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            state_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let discovery = Discovery::new(
            crate::tmux::TmuxClient::with_path("/nonexistent/tmux"),
            crate::agents::AgentRegistry::new(config.agent_names()),
            &config,
        );

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            stopper.cancel();
        });

        run(&config, discovery, cancel).await.unwrap();
        // The lock was released on shutdown
        assert!(WatchLock::acquire(&config.lock_path()).unwrap().is_some());
    }

    #[test]
    fn test_watch_args_carry_interval() {
        let config = Config {
            watch_interval: Duration::from_millis(1500),
            ..Config::default()
        };
        assert_eq!(watch_args(&config), vec!["watch", "--interval-ms", "1500"]);
    }

    #[tokio::test]
    async fn test_replace_daemon_waits_for_old_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.lock");

        let old = WatchLock::acquire(&path).unwrap().unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(old);
        });

        let mut replacement = None;
        replace_daemon(&path, Duration::from_secs(5), || {
            replacement = WatchLock::acquire(&path)?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(replacement.is_some());
        // Exactly one holder remains
        assert!(WatchLock::acquire(&path).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_daemon_gives_up_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.lock");
        let _stuck = WatchLock::acquire(&path).unwrap().unwrap();

        let mut spawned = false;
        let result = replace_daemon(&path, Duration::from_millis(150), || {
            spawned = true;
            Ok(())
        })
        .await;

        assert!(result.is_err());
        assert!(!spawned);
    }
}
