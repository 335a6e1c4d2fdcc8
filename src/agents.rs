use std::collections::{HashMap, HashSet};
use tokio::process::Command;

/// One row of the process snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub ppid: u32,
    /// Command name as reported by ps, possibly a full path
    pub comm: String,
    /// Full argument string
    pub args: String,
}

/// Snapshot of the system process tree taken with a single `ps` call, so
/// agent resolution is an in-memory lookup instead of one spawn per pane.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    processes: HashMap<u32, ProcessInfo>,
    children: HashMap<u32, Vec<u32>>,
}

impl ProcessTable {
    /// Parse `ps -eo pid,ppid,comm,args` output. Lines that do not start with
    /// two numbers and a command (including the header) are skipped.
    pub fn parse(output: &str) -> Self {
        let mut table = Self::default();

        for line in output.lines() {
            let mut fields = line.split_whitespace();
            let (Some(pid), Some(ppid), Some(comm)) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let (Ok(pid), Ok(ppid)) = (pid.parse::<u32>(), ppid.parse::<u32>()) else {
                continue;
            };
            let args = fields.collect::<Vec<_>>().join(" ");

            table.children.entry(ppid).or_default().push(pid);
            table.processes.insert(
                pid,
                ProcessInfo {
                    ppid,
                    comm: comm.to_string(),
                    args,
                },
            );
        }

        table
    }

    /// Snapshot the live process tree. A failed `ps` yields an empty table,
    /// which limits resolution to direct command-name matches.
    pub async fn load() -> Self {
        let output = Command::new("ps")
            .args(["-eo", "pid,ppid,comm,args"])
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let table = Self::parse(&String::from_utf8_lossy(&output.stdout));
                if table.is_empty() {
                    tracing::warn!("ps listed no processes");
                }
                table
            }
            Ok(output) => {
                tracing::warn!(status = %output.status, "ps exited unsuccessfully");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to run ps");
                Self::default()
            }
        }
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessInfo> {
        self.processes.get(&pid)
    }

    pub fn children(&self, pid: u32) -> &[u32] {
        self.children.get(&pid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Set of command names that identify an AI coding agent
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    names: HashSet<String>,
}

impl AgentRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_agent(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Resolve the agent running in a pane. The foreground command is tried
    /// first, then each direct child of the pane process: its command
    /// basename, then every token of its argument string. This catches agents
    /// that run under a generic interpreter such as `node`.
    pub fn resolve(&self, command: &str, pane_pid: u32, table: &ProcessTable) -> Option<String> {
        if self.is_agent(command) {
            return Some(command.to_string());
        }

        for &child in table.children(pane_pid) {
            let Some(info) = table.get(child) else {
                continue;
            };
            let comm = basename(&info.comm);
            if self.is_agent(comm) {
                return Some(comm.to_string());
            }
            if let Some(arg) = info
                .args
                .split_whitespace()
                .map(basename)
                .find(|arg| self.is_agent(arg))
            {
                return Some(arg.to_string());
            }
        }

        None
    }
}

fn basename(s: &str) -> &str {
    s.rsplit('/').next().unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS_OUTPUT: &str = "  PID  PPID COMM             ARGS
    1     0 /sbin/launchd    /sbin/launchd
  100     1 zsh              -zsh
  101   100 node             node /usr/local/bin/gemini --flag
  200     1 zsh              -zsh
  201   200 /usr/bin/python3 python3 -m http.server
  300     1 zsh              -zsh
  301   300 /opt/bin/codex   /opt/bin/codex --full-auto
garbage line
  x     1 broken           broken
";

    fn registry() -> AgentRegistry {
        AgentRegistry::new(["claude", "codex", "gemini"])
    }

    #[test]
    fn test_parse_skips_header_and_garbage() {
        let table = ProcessTable::parse(PS_OUTPUT);
        assert_eq!(table.len(), 7);
        assert_eq!(table.children(100), &[101]);
        let node = table.get(101).unwrap();
        assert_eq!(node.ppid, 100);
        assert_eq!(node.comm, "node");
        assert_eq!(node.args, "node /usr/local/bin/gemini --flag");
    }

    #[test]
    fn test_direct_command_match() {
        let table = ProcessTable::default();
        assert_eq!(registry().resolve("claude", 42, &table), Some("claude".to_string()));
    }

    #[test]
    fn test_resolves_agent_from_child_args() {
        let table = ProcessTable::parse(PS_OUTPUT);
        assert_eq!(registry().resolve("node", 100, &table), Some("gemini".to_string()));
    }

    #[test]
    fn test_resolves_agent_from_child_comm_basename() {
        let table = ProcessTable::parse(PS_OUTPUT);
        assert_eq!(registry().resolve("zsh", 300, &table), Some("codex".to_string()));
    }

    #[test]
    fn test_unrelated_pane_is_filtered() {
        let table = ProcessTable::parse(PS_OUTPUT);
        assert_eq!(registry().resolve("zsh", 200, &table), None);
    }

    #[test]
    fn test_empty_table_degrades_to_direct_match() {
        let table = ProcessTable::parse("");
        assert!(table.is_empty());
        assert_eq!(registry().resolve("node", 100, &table), None);
    }

    #[test]
    fn test_registries_are_independent() {
        let table = ProcessTable::parse(PS_OUTPUT);
        let other = AgentRegistry::new(["aider"]);
        assert_eq!(other.resolve("node", 100, &table), None);
        assert_eq!(registry().resolve("node", 100, &table), Some("gemini".to_string()));
        assert!(!registry().is_agent("aider"));
    }
}
