use std::fmt;

use crate::error::UucpError;

/// `""` as a whole token means "no value" for `ztemp`/`znotify` (spec.md §6).
const NONE_TOKEN: &str = "\"\"";

fn opt_token(s: &str) -> Option<String> {
    if s == NONE_TOKEN { None } else { Some(s.to_string()) }
}

fn opt_token_or_empty(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or(NONE_TOKEN)
}

/// `cbytes == -1` means "unknown" (spec.md §6).
fn parse_cbytes(s: &str) -> Result<Option<u64>, UucpError> {
    let n: i64 = s.parse().map_err(|_| UucpError::syntax(format!("bad byte count {s}")))?;
    Ok(if n < 0 { None } else { Some(n as u64) })
}

fn fmt_cbytes(v: Option<u64>) -> String {
    match v {
        Some(n) => n.to_string(),
        None => "-1".to_string(),
    }
}

/// A single line from a work (`C.`) file. One of `S`/`R`/`X`/`E`/`H`, per
/// spec.md §3. `grade` itself is not a field here — it lives in the
/// enclosing work file's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkCommand {
    /// Send a file.
    S {
        zfrom: String,
        zto: String,
        zuser: String,
        options: String,
        ztemp: Option<String>,
        mode: String,
        notify: Option<String>,
        cbytes: Option<u64>,
    },
    /// Request a remote file.
    R { zfrom: String, zto: String, zuser: String, options: String, mode: String, cbytes: Option<u64> },
    /// Remote copy (file already present on both ends by name).
    X { zfrom: String, zto: String, zuser: String, options: String },
    /// Send with execution requested on the receiving peer.
    E {
        zfrom: String,
        zto: String,
        zuser: String,
        options: String,
        ztemp: Option<String>,
        mode: String,
        notify: Option<String>,
    },
    /// End-of-list sentinel.
    H,
}

impl WorkCommand {
    pub fn parse(line: &str) -> Result<WorkCommand, UucpError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return Err(UucpError::syntax("empty work file line"));
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens[0] {
            "H" if tokens.len() == 1 => Ok(WorkCommand::H),
            "S" if tokens.len() == 8 || tokens.len() == 9 => Ok(WorkCommand::S {
                zfrom: tokens[1].to_string(),
                zto: tokens[2].to_string(),
                zuser: tokens[3].to_string(),
                options: tokens[4].to_string(),
                ztemp: opt_token(tokens[5]),
                mode: tokens[6].to_string(),
                notify: opt_token(tokens[7]),
                cbytes: if tokens.len() == 9 { parse_cbytes(tokens[8])? } else { None },
            }),
            "R" if tokens.len() == 7 => Ok(WorkCommand::R {
                zfrom: tokens[1].to_string(),
                zto: tokens[2].to_string(),
                zuser: tokens[3].to_string(),
                options: tokens[4].to_string(),
                mode: tokens[5].to_string(),
                cbytes: parse_cbytes(tokens[6])?,
            }),
            "X" if tokens.len() == 5 => Ok(WorkCommand::X {
                zfrom: tokens[1].to_string(),
                zto: tokens[2].to_string(),
                zuser: tokens[3].to_string(),
                options: tokens[4].to_string(),
            }),
            "E" if tokens.len() == 8 => Ok(WorkCommand::E {
                zfrom: tokens[1].to_string(),
                zto: tokens[2].to_string(),
                zuser: tokens[3].to_string(),
                options: tokens[4].to_string(),
                ztemp: opt_token(tokens[5]),
                mode: tokens[6].to_string(),
                notify: opt_token(tokens[7]),
            }),
            other => Err(UucpError::syntax(format!("unrecognized work command line: {other:?} ({line})"))),
        }
    }

    /// True for the variants that actually move bytes (used by the
    /// execution-request detection in `uustat`: spec.md §4.6).
    pub fn zfrom(&self) -> Option<&str> {
        match self {
            WorkCommand::S { zfrom, .. } => Some(zfrom),
            WorkCommand::R { zfrom, .. } => Some(zfrom),
            WorkCommand::X { zfrom, .. } => Some(zfrom),
            WorkCommand::E { zfrom, .. } => Some(zfrom),
            WorkCommand::H => None,
        }
    }

    pub fn zto(&self) -> Option<&str> {
        match self {
            WorkCommand::S { zto, .. } => Some(zto),
            WorkCommand::R { zto, .. } => Some(zto),
            WorkCommand::X { zto, .. } => Some(zto),
            WorkCommand::E { zto, .. } => Some(zto),
            WorkCommand::H => None,
        }
    }
}

impl fmt::Display for WorkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkCommand::S { zfrom, zto, zuser, options, ztemp, mode, notify, cbytes } => {
                write!(
                    f,
                    "S {zfrom} {zto} {zuser} {options} {} {mode} {}",
                    opt_token_or_empty(ztemp),
                    opt_token_or_empty(notify)
                )?;
                if let Some(n) = cbytes {
                    write!(f, " {n}")
                } else {
                    Ok(())
                }
            }
            WorkCommand::R { zfrom, zto, zuser, options, mode, cbytes } => {
                write!(f, "R {zfrom} {zto} {zuser} {options} {mode} {}", fmt_cbytes(*cbytes))
            }
            WorkCommand::X { zfrom, zto, zuser, options } => write!(f, "X {zfrom} {zto} {zuser} {options}"),
            WorkCommand::E { zfrom, zto, zuser, options, ztemp, mode, notify } => write!(
                f,
                "E {zfrom} {zto} {zuser} {options} {} {mode} {}",
                opt_token_or_empty(ztemp),
                opt_token_or_empty(notify)
            ),
            WorkCommand::H => write!(f, "H"),
        }
    }
}
