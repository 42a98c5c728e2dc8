use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::UucpError;

/// Default status strings, index matching `StatusType`'s discriminant
/// (spec.md §6).
const DEFAULT_STRINGS: [&str; 7] = [
    "Conversation complete",
    "Port unavailable",
    "Login failed",
    "Handshake failed",
    "Call failed",
    "Talking",
    "Wrong time to call",
];

/// The alternate "traditional" set, ported from `original_source/lib/status.c`.
const TRADITIONAL_STRINGS: [&str; 7] =
    ["SUCCESSFUL", "DEVICE FAILED", "LOGIN FAILED", "STARTUP FAILED", "CONVERSATION FAILED", "TALKING", "WRONG TIME TO CALL"];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusType {
    Complete = 0,
    PortUnavailable = 1,
    LoginFailed = 2,
    HandshakeFailed = 3,
    CallFailed = 4,
    Talking = 5,
    WrongTime = 6,
}

impl StatusType {
    pub fn as_str(self, traditional: bool) -> &'static str {
        let table = if traditional { &TRADITIONAL_STRINGS } else { &DEFAULT_STRINGS };
        table[self as usize]
    }
}

/// Per-peer call status, shared between the (external) transport layer and
/// `uustat` (spec.md §3).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoolStatus {
    pub last_attempt_epoch: u64,
    pub ttype: StatusType,
    pub retries: u32,
    pub wait_seconds: u64,
}

impl SpoolStatus {
    pub fn last_attempt_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.last_attempt_epoch)
    }

    /// Earliest time the transport should call again, given the current
    /// backoff.
    pub fn next_call_time(&self) -> SystemTime {
        self.last_attempt_time() + Duration::from_secs(self.wait_seconds)
    }
}

/// Flat-file status store: one small JSON record per peer under
/// `<spool_dir>/status/`. The teacher's `serde_json`-on-disk pattern
/// (`config.rs`), scoped down to one record per key instead of one
/// document for the whole app.
pub struct StatusStore {
    dir: PathBuf,
    traditional: bool,
}

impl StatusStore {
    pub fn open(config: &Config) -> Result<StatusStore, UucpError> {
        let dir = config.spool_dir.join("status");
        std::fs::create_dir_all(&dir).map_err(|e| UucpError::spool_io_path("opening status store", dir.clone(), &e))?;
        Ok(StatusStore { dir, traditional: config.traditional_status_strings })
    }

    fn path_for(&self, peer: &str) -> PathBuf {
        self.dir.join(format!("{peer}.json"))
    }

    pub fn get(&self, peer: &str) -> Option<SpoolStatus> {
        let path = self.path_for(peer);
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn set(&self, peer: &str, status: &SpoolStatus) -> Result<(), UucpError> {
        let path = self.path_for(peer);
        let json = serde_json::to_string_pretty(status).map_err(|e| UucpError::ConfigError { message: e.to_string() })?;
        std::fs::write(&path, json).map_err(|e| UucpError::spool_io_path("writing status", path, &e))
    }

    pub fn all(&self) -> Vec<(String, SpoolStatus)> {
        let mut out = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.dir) else { return out };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(peer) = name.strip_suffix(".json") {
                if let Some(status) = self.get(peer) {
                    out.push((peer.to_string(), status));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn status_string(&self, ttype: StatusType) -> &'static str {
        ttype.as_str(self.traditional)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.spool_dir = dir.path().join("spool");
        (dir, cfg)
    }

    #[test]
    fn default_status_strings_match_spec_table() {
        assert_eq!(StatusType::Complete.as_str(false), "Conversation complete");
        assert_eq!(StatusType::WrongTime.as_str(false), "Wrong time to call");
    }

    #[test]
    fn traditional_status_strings_match_original_source() {
        assert_eq!(StatusType::Complete.as_str(true), "SUCCESSFUL");
        assert_eq!(StatusType::HandshakeFailed.as_str(true), "STARTUP FAILED");
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, cfg) = test_config();
        let store = StatusStore::open(&cfg).unwrap();
        let status = SpoolStatus { last_attempt_epoch: 1000, ttype: StatusType::Talking, retries: 2, wait_seconds: 300 };
        store.set("peerA", &status).unwrap();
        let reread = store.get("peerA").unwrap();
        assert_eq!(reread.retries, 2);
        assert_eq!(reread.ttype, StatusType::Talking);
    }

    #[test]
    fn all_lists_every_known_peer_sorted() {
        let (_dir, cfg) = test_config();
        let store = StatusStore::open(&cfg).unwrap();
        let status = SpoolStatus { last_attempt_epoch: 0, ttype: StatusType::Complete, retries: 0, wait_seconds: 0 };
        store.set("zeta", &status).unwrap();
        store.set("alpha", &status).unwrap();
        let all = store.all();
        assert_eq!(all[0].0, "alpha");
        assert_eq!(all[1].0, "zeta");
    }
}
