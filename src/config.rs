use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::UucpError;
use crate::system::SystemInfo;

/// Process-wide configuration: where the spool and lock directories live,
/// who we are to our peers, and the small system registry used when no
/// standalone `-I systems.json` is given.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub spool_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub log_dir: PathBuf,
    pub local_name: String,
    pub local_alias: String,
    pub default_grade: char,
    pub admin_address: String,
    pub transport_command: String,
    #[serde(default)]
    pub systems: Vec<SystemInfo>,
    #[serde(default)]
    pub traditional_status_strings: bool,
    /// Whether the Executor processes X-files from a peer with no
    /// `SystemInfo` entry (Taylor UUCP's `unknown` system stanza). Defaults
    /// to `false`: an unrecognized peer's requests are left pending rather
    /// than run under implicit permissions.
    #[serde(default)]
    pub allow_unknown_systems: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spool_dir: PathBuf::from("spool"),
            lock_dir: PathBuf::from("spool/locks"),
            log_dir: PathBuf::from("logs"),
            local_name: "localhost".to_string(),
            local_alias: "localhost".to_string(),
            default_grade: 'N',
            admin_address: "root".to_string(),
            transport_command: "uucico".to_string(),
            systems: Vec::new(),
            traditional_status_strings: false,
            allow_unknown_systems: false,
        }
    }
}

impl Config {
    /// Directory holding `config.json` and `logs/`. Mirrors the teacher's
    /// "ensure the per-app directory under the platform config dir" pattern,
    /// generalized from `$HOME/.hostpilot` to `dirs::config_dir()/uucp-xqt`.
    pub fn config_dir() -> Result<PathBuf, UucpError> {
        dirs::config_dir()
            .map(|d| d.join("uucp-xqt"))
            .ok_or_else(|| UucpError::ConfigError { message: "cannot locate a config directory for this platform".into() })
    }

    /// Load `config.json` from the config directory, creating it with
    /// defaults (and the spool/lock/log directories alongside it) on first
    /// run. `override_path` supports `-I cfgfile`, matching `uux`/`uuxqt`/
    /// `uustat`'s shared `-I` flag.
    pub fn load(override_path: Option<&Path>) -> Result<Self, UucpError> {
        let config_dir = Self::config_dir()?;
        let path = match override_path {
            Some(p) => p.to_path_buf(),
            None => config_dir.join("config.json"),
        };

        if !path.exists() {
            std::fs::create_dir_all(&config_dir)
                .map_err(|e| UucpError::spool_io_path("creating config directory", config_dir.clone(), &e))?;
            let mut cfg = Config::default();
            cfg.spool_dir = config_dir.join("spool");
            cfg.lock_dir = config_dir.join("spool").join("locks");
            cfg.log_dir = config_dir.join("logs");
            cfg.write_to(&path)?;
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| UucpError::spool_io_path("reading config", path.clone(), &e))?;
        let cfg: Config = serde_json::from_str(&contents)
            .map_err(|e| UucpError::ConfigError { message: format!("{}: {}", path.display(), e) })?;

        std::fs::create_dir_all(&cfg.spool_dir)
            .map_err(|e| UucpError::spool_io_path("creating spool dir", cfg.spool_dir.clone(), &e))?;
        std::fs::create_dir_all(&cfg.lock_dir)
            .map_err(|e| UucpError::spool_io_path("creating lock dir", cfg.lock_dir.clone(), &e))?;
        std::fs::create_dir_all(&cfg.log_dir)
            .map_err(|e| UucpError::spool_io_path("creating log dir", cfg.log_dir.clone(), &e))?;

        Ok(cfg)
    }

    fn write_to(&self, path: &Path) -> Result<(), UucpError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| UucpError::ConfigError { message: e.to_string() })?;
        std::fs::write(path, json).map_err(|e| UucpError::spool_io_path("writing config", path.to_path_buf(), &e))
    }

    pub fn find_system(&self, name: &str) -> Option<&SystemInfo> {
        self.systems.iter().find(|s| s.name == name || s.local_alias.as_deref() == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_grade_and_transport() {
        let cfg = Config::default();
        assert_eq!(cfg.default_grade, 'N');
        assert_eq!(cfg.transport_command, "uucico");
    }

    #[test]
    fn find_system_matches_by_name_or_alias() {
        let mut cfg = Config::default();
        cfg.systems.push(SystemInfo::bare("peerA"));
        assert!(cfg.find_system("peerA").is_some());
        assert!(cfg.find_system("peerB").is_none());
    }
}
