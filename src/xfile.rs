use std::fmt::Write as _;

use crate::error::UucpError;

/// A required (`F`) input: must exist in the spool before the command runs,
/// optionally renamed into the execute directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequirement {
    pub name: String,
    pub rename: Option<String>,
}

/// A parsed X-file: spec.md §3's `ExecuteFile`. Parsing is a pure function
/// over the file's bytes — no global mutable parser state (spec.md §9
/// REDESIGN FLAG: "replace with a per-call parsed-record value").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XqtRecord {
    pub argv: Vec<String>,
    pub input: Option<String>,
    pub output: Option<(String, Option<String>)>,
    pub files: Vec<FileRequirement>,
    pub requestor: Option<String>,
    pub user: String,
    pub system: String,
    /// `Z` — mail only on failure.
    pub mail_on_failure: bool,
    /// `N` — never mail.
    pub never_mail: bool,
    /// `n` — mail only on success.
    pub mail_on_success: bool,
    /// `B` — return stdin on error.
    pub return_stdin_on_error: bool,
    /// `e` — execute via shell.
    pub use_shell: bool,
    /// `E` — execute without a shell.
    pub no_shell: bool,
    pub status_file: Option<String>,
}

impl XqtRecord {
    pub fn parse(contents: &str) -> Result<XqtRecord, UucpError> {
        let mut rec = XqtRecord::default();
        let mut have_cmd = false;

        for line in contents.lines() {
            if line.is_empty() {
                continue;
            }
            let (letter, rest) = line.split_at(1);
            let rest = rest.trim_start();
            match letter {
                "#" => continue,
                "C" => {
                    if have_cmd {
                        return Err(UucpError::syntax("duplicate C line in execute file"));
                    }
                    rec.argv = rest.split_whitespace().map(str::to_string).collect();
                    have_cmd = true;
                }
                "I" => {
                    if rec.input.is_some() {
                        return Err(UucpError::syntax("duplicate I line in execute file"));
                    }
                    rec.input = Some(rest.to_string());
                }
                "O" => {
                    if rec.output.is_some() {
                        return Err(UucpError::syntax("duplicate O line in execute file"));
                    }
                    let mut parts = rest.split_whitespace();
                    let name = parts.next().unwrap_or("").to_string();
                    let peer = parts.next().map(str::to_string);
                    rec.output = Some((name, peer));
                }
                "F" => {
                    let mut parts = rest.split_whitespace();
                    let name = parts.next().unwrap_or("").to_string();
                    let rename = parts.next().map(str::to_string);
                    rec.files.push(FileRequirement { name, rename });
                }
                "R" => {
                    if rec.requestor.is_some() {
                        return Err(UucpError::syntax("duplicate R line in execute file"));
                    }
                    rec.requestor = Some(rest.to_string());
                }
                "U" => {
                    let mut parts = rest.split_whitespace();
                    rec.user = parts.next().unwrap_or("").to_string();
                    rec.system = parts.next().unwrap_or("").to_string();
                }
                "Z" => rec.mail_on_failure = true,
                "N" => rec.never_mail = true,
                "n" => rec.mail_on_success = true,
                "B" => rec.return_stdin_on_error = true,
                "e" => rec.use_shell = true,
                "E" => rec.no_shell = true,
                "M" => {
                    if rec.status_file.is_some() {
                        return Err(UucpError::syntax("duplicate M line in execute file"));
                    }
                    rec.status_file = Some(rest.to_string());
                }
                // Unknown lines are ignored, per spec.md §3.
                _ => continue,
            }
        }

        if !have_cmd {
            return Err(UucpError::syntax("execute file has no C line"));
        }
        Ok(rec)
    }

    /// Serializes back to the X-file line grammar. Comments and unknown
    /// lines from the source are not preserved (spec.md §8 explicitly
    /// excludes them from the round-trip property).
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "C {}", self.argv.join(" "));
        if let Some(i) = &self.input {
            let _ = writeln!(out, "I {i}");
        }
        if let Some((name, peer)) = &self.output {
            match peer {
                Some(p) => {
                    let _ = writeln!(out, "O {name} {p}");
                }
                None => {
                    let _ = writeln!(out, "O {name}");
                }
            }
        }
        for f in &self.files {
            match &f.rename {
                Some(r) => {
                    let _ = writeln!(out, "F {} {}", f.name, r);
                }
                None => {
                    let _ = writeln!(out, "F {}", f.name);
                }
            }
        }
        if let Some(r) = &self.requestor {
            let _ = writeln!(out, "R {r}");
        }
        let _ = writeln!(out, "U {} {}", self.user, self.system);
        if self.mail_on_failure {
            out.push_str("Z\n");
        }
        if self.never_mail {
            out.push_str("N\n");
        }
        if self.mail_on_success {
            out.push_str("n\n");
        }
        if self.return_stdin_on_error {
            out.push_str("B\n");
        }
        if self.use_shell {
            out.push_str("e\n");
        }
        if self.no_shell {
            out.push_str("E\n");
        }
        if let Some(m) = &self.status_file {
            let _ = writeln!(out, "M {m}");
        }
        out
    }

    pub fn command_name(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// `Z` beats `N` on failure (spec.md §3): mail unless both are unset, or
    /// `N` alone is set.
    pub fn should_mail_on_failure(&self) -> bool {
        if self.mail_on_failure {
            return true;
        }
        !self.never_mail
    }

    pub fn should_mail_on_success(&self) -> bool {
        self.mail_on_success && !self.never_mail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XqtRecord {
        XqtRecord {
            argv: vec!["rmail".to_string(), "user@host".to_string()],
            input: Some("D.peerAN0001".to_string()),
            output: None,
            files: vec![FileRequirement { name: "D.peerAN0002".to_string(), rename: None }],
            requestor: None,
            user: "alice".to_string(),
            system: "localhost".to_string(),
            mail_on_failure: false,
            never_mail: false,
            mail_on_success: false,
            return_stdin_on_error: false,
            use_shell: false,
            no_shell: false,
            status_file: None,
        }
    }

    #[test]
    fn parse_requires_a_c_line() {
        assert!(XqtRecord::parse("U alice localhost\n").is_err());
    }

    #[test]
    fn serialize_then_parse_round_trips_structurally() {
        let rec = sample();
        let text = rec.serialize();
        let reparsed = XqtRecord::parse(&text).unwrap();
        assert_eq!(rec, reparsed);
    }

    #[test]
    fn unknown_lines_are_ignored() {
        let text = "C wc /tmp/x\nQ this is unknown\nU bob host\n";
        let rec = XqtRecord::parse(text).unwrap();
        assert_eq!(rec.argv, vec!["wc".to_string(), "/tmp/x".to_string()]);
        assert_eq!(rec.user, "bob");
    }

    #[test]
    fn z_beats_n_on_failure() {
        let mut rec = sample();
        rec.mail_on_failure = true;
        rec.never_mail = true;
        assert!(rec.should_mail_on_failure());
    }

    #[test]
    fn n_alone_suppresses_failure_mail() {
        let mut rec = sample();
        rec.never_mail = true;
        assert!(!rec.should_mail_on_failure());
    }

    #[test]
    fn duplicate_c_line_is_rejected() {
        assert!(XqtRecord::parse("C a\nC b\nU u s\n").is_err());
    }
}
