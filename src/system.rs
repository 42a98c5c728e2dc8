use serde::{Deserialize, Serialize};

use crate::spool::is_spool_file;

/// Which commands a peer is allowed to execute on our system.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum CommandPolicy {
    All,
    List(Vec<String>),
}

impl Default for CommandPolicy {
    fn default() -> Self {
        CommandPolicy::List(Vec::new())
    }
}

impl CommandPolicy {
    pub fn permits(&self, cmd: &str) -> bool {
        match self {
            CommandPolicy::All => true,
            CommandPolicy::List(v) => v.iter().any(|c| c == cmd),
        }
    }
}

/// Immutable per-peer attributes, looked up by `SystemRegistry`/`Config`.
/// Corresponds to `spec.md` §3's `SystemInfo`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SystemInfo {
    pub name: String,
    #[serde(default)]
    pub local_alias: Option<String>,
    #[serde(default)]
    pub commands: CommandPolicy,
    #[serde(default)]
    pub search_path: Vec<String>,
    #[serde(default)]
    pub public_dir: Option<String>,
    /// Paths this peer may read from when we send files to them.
    #[serde(default)]
    pub local_send: Vec<String>,
    /// Paths this peer may write into when delivering files / output to us.
    #[serde(default)]
    pub remote_receive: Vec<String>,
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
}

impl SystemInfo {
    /// A minimal registry entry naming only a peer, useful in tests and for
    /// "unknown but permitted" fallbacks.
    pub fn bare(name: &str) -> Self {
        SystemInfo {
            name: name.to_string(),
            local_alias: None,
            commands: CommandPolicy::List(Vec::new()),
            search_path: Vec::new(),
            public_dir: None,
            local_send: Vec::new(),
            remote_receive: Vec::new(),
            forbidden_paths: Vec::new(),
        }
    }

    fn path_allowed(allow_list: &[String], forbidden: &[String], path: &str) -> bool {
        if forbidden.iter().any(|f| path.starts_with(f.as_str())) {
            return false;
        }
        allow_list.iter().any(|a| path.starts_with(a.as_str()))
    }

    /// `fin_directory_list` against `local_send`: may we read `path` off
    /// local disk to hand it to this peer?
    pub fn permits_send(&self, path: &str) -> bool {
        Self::path_allowed(&self.local_send, &self.forbidden_paths, path)
    }

    /// `fin_directory_list` against `remote_receive`: may this peer write
    /// `path` (e.g. Executor stdout redirection) on our system?
    pub fn permits_receive(&self, path: &str) -> bool {
        if is_spool_file(path.rsplit('/').next().unwrap_or(path)) {
            // spec.md §9 open question: spool-form output names are blanket rejected.
            return false;
        }
        Self::path_allowed(&self.remote_receive, &self.forbidden_paths, path)
    }

    pub fn resolve_command(&self, argv0: &str) -> Option<&str> {
        if !self.commands.permits(argv0) {
            return None;
        }
        if self.search_path.is_empty() {
            return which::which(argv0).ok().map(|_| argv0);
        }
        for dir in &self.search_path {
            let candidate = std::path::Path::new(dir).join(argv0);
            if candidate.is_file() {
                return Some(argv0);
            }
        }
        None
    }
}
