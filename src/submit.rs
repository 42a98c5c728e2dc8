use std::collections::HashMap;
use std::io::Write as _;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::UucpError;
use crate::spool::Spool;
use crate::transport::{ExternalTransport, Transport, TransportTarget};
use crate::workfile::WorkCommand;
use crate::xfile::{FileRequirement, XqtRecord};

/// Characters that force `e` (shell execution) if present in any raw
/// argument, ported verbatim from `original_source/uux.c`'s `ZSHELLCHARS`.
const SHELL_CHARS: &str = "\"'`*?[;&()|<>\\$";

/// Full separator class used to find the command name and to split the
/// remaining arguments apart, ported from `original_source/uux.c`'s
/// `ZSHELLSEPS`.
const SHELL_SEPS: &str = ";&*|<> \t";

/// Separator class used once `<`/`>` have been pulled out on their own,
/// ported from `original_source/uux.c`'s `ZSHELLNONREDIRSEPS`.
const SHELL_NONREDIR_SEPS: &str = ";&*| \t";

/// Rejoins the CLI's already-tokenized `cmdline` into a single string and
/// resplits it the way `uux.c` does: the command name is the leading run of
/// characters outside `SHELL_SEPS`, and everything after it is split into
/// alternating runs of non-separator characters and separator characters,
/// with `<`/`>` always broken out into their own one-character token so
/// redirections are easy to spot downstream (spec.md §4.4).
fn tokenize_command_line(raw_args: &[String]) -> (String, Vec<String>) {
    let mut joined = String::new();
    for a in raw_args {
        joined.push_str(a);
        joined.push(' ');
    }

    let cmd_end = joined.find(|c: char| SHELL_SEPS.contains(c)).unwrap_or(joined.len());
    let cmd = joined[..cmd_end].to_string();
    let rest = &joined[cmd_end..];

    let mut tokens = Vec::new();
    for word in rest.split(|c: char| c == ' ' || c == '\t').filter(|w| !w.is_empty()) {
        let mut w = word;
        while !w.is_empty() {
            let non_sep_len = w.find(|c: char| SHELL_SEPS.contains(c)).unwrap_or(w.len());
            if non_sep_len > 0 {
                tokens.push(w[..non_sep_len].to_string());
                w = &w[non_sep_len..];
            }
            if !w.is_empty() {
                let sep_len = w.find(|c: char| !SHELL_NONREDIR_SEPS.contains(c)).unwrap_or(w.len());
                let sep_len = if sep_len == 0 { 1 } else { sep_len };
                tokens.push(w[..sep_len].to_string());
                w = &w[sep_len..];
            }
        }
    }

    (cmd, tokens)
}

/// CLI switches that shape a submission, collected once by the `uux`
/// binary and handed to `Submitter::submit`.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub grade: Option<char>,
    /// `-C`: force copy into spool even if a link would work.
    pub force_copy: bool,
    /// `-c`: never copy; reference the original path in place.
    pub no_copy: bool,
    /// `-l`: try a hard link into spool before falling back to copy.
    pub try_link: bool,
    /// `-n`: mail the submitter on success.
    pub notify_on_success: bool,
    /// `-z`: mail the submitter only on failure.
    pub mail_on_failure_only: bool,
    /// `-b`: return stdin to the submitter on error.
    pub return_stdin_on_error: bool,
    /// `-j`: print the allocated jobid instead of just returning it.
    pub print_jobid: bool,
    /// `-r`: queue the job without poking the transport afterward.
    pub no_transport: bool,
    /// `-a addr`: explicit requestor mail address (`R` line).
    pub requestor: Option<String>,
    /// `-s file`: copy final status to this file on the requesting host (`M` line).
    pub status_file: Option<String>,
    /// `-p`/`-`: read the command's stdin from our own stdin and spool it.
    pub read_stdin: bool,
}

pub struct SubmitReport {
    pub jobid: Option<String>,
    pub contacted: Option<String>,
}

/// Tracks every spool artifact created during one submission so a fatal
/// error can unwind them all (spec.md §9 REDESIGN FLAG: recast
/// `uxrecord_file`/`uxabort` as a scoped transaction with `Drop` semantics).
struct AbortList {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl AbortList {
    fn new() -> Self {
        AbortList { paths: Vec::new(), committed: false }
    }

    fn record(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for AbortList {
    fn drop(&mut self) {
        if !self.committed {
            for path in &self.paths {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// `peer!path` splitting. An empty or self-aliased peer means "local".
fn split_peer_path<'a>(token: &'a str, local_alias: &str) -> (Option<&'a str>, &'a str) {
    match token.split_once('!') {
        Some((peer, path)) if peer.is_empty() || peer == local_alias => (None, path),
        Some((peer, path)) => (Some(peer), path),
        None => (None, token),
    }
}

/// Builds a job from a user command line, splitting per-system
/// responsibility (spec.md §4.4, the `uux` core).
pub struct Submitter<'a> {
    config: &'a Config,
    spool: Spool,
}

impl<'a> Submitter<'a> {
    pub fn new(config: &'a Config, spool: Spool) -> Self {
        Submitter { config, spool }
    }

    pub fn submit(&mut self, raw_args: &[String], opts: &SubmitOptions) -> Result<SubmitReport, UucpError> {
        let mut abort = AbortList::new();
        let result = self.submit_inner(raw_args, opts, &mut abort);
        if result.is_ok() {
            abort.commit();
        }
        result
    }

    fn submit_inner(&mut self, raw_args: &[String], opts: &SubmitOptions, abort: &mut AbortList) -> Result<SubmitReport, UucpError> {
        if raw_args.is_empty() {
            return Err(UucpError::syntax("uux requires a command line"));
        }
        let grade = opts.grade.unwrap_or(self.config.default_grade);

        let (cmd_text, tokens) = tokenize_command_line(raw_args);
        if cmd_text.is_empty() {
            return Err(UucpError::syntax("uux requires a command line"));
        }

        let (exec_peer, cmd_name) = split_peer_path(&cmd_text, &self.config.local_alias);
        let exec_peer = exec_peer.map(str::to_string);
        if let Some(peer) = &exec_peer {
            if self.config.find_system(peer).is_none() {
                return Err(UucpError::not_found(format!("system {peer}")));
            }
        }

        let force_shell = cmd_text.chars().any(|c| SHELL_CHARS.contains(c))
            || tokens.iter().any(|a| a.chars().any(|c| SHELL_CHARS.contains(c)));

        let mut argv: Vec<String> = vec![cmd_name.to_string()];
        let mut input_line: Option<String> = None;
        let mut output_line: Option<(String, Option<String>)> = None;
        let mut files: Vec<FileRequirement> = Vec::new();
        // Per-destination-peer accumulated work-file lines.
        let mut work_lines: HashMap<String, Vec<String>> = HashMap::new();

        if opts.read_stdin {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).map_err(|e| UucpError::spool_io("reading stdin", &e))?;
            let alloc = self.spool.new_data_name(exec_peer.as_deref().unwrap_or(&self.config.local_name), grade)?;
            abort.record(alloc.tname.clone());
            std::fs::write(&alloc.tname, &buf).map_err(|e| UucpError::spool_io_path("spooling stdin", alloc.tname.clone(), &e))?;
            input_line = Some(alloc.dname.clone());
            if let Some(peer) = &exec_peer {
                work_lines.entry(peer.clone()).or_default().push(
                    WorkCommand::S {
                        zfrom: file_name(&alloc.tname),
                        zto: alloc.dname.clone(),
                        zuser: self.local_user(),
                        options: "C".to_string(),
                        ztemp: None,
                        mode: "0666".to_string(),
                        notify: None,
                        cbytes: None,
                    }
                    .to_string(),
                );
            }
        }

        // Walk the resplit tokens the way `uux.c` walks `pzargs`: a lone `<`
        // or `>` token only counts as a redirection when a following token
        // supplies its path, per that source's `i + 1 < cargs` guard.
        let mut i = 0;
        while i < tokens.len() {
            let tok = tokens[i].as_str();
            if (tok == "<" || tok == ">") && i + 1 < tokens.len() {
                let path = tokens[i + 1].clone();
                if tok == "<" {
                    let resolved = self.resolve_file_reference(&path, &exec_peer, grade, opts, abort, &mut work_lines, &mut files)?;
                    input_line = Some(resolved);
                } else {
                    output_line = Some(self.resolve_output_redirect(&path, &exec_peer)?);
                }
                i += 2;
                continue;
            }

            if let Some(inner) = tok.strip_prefix('(') {
                let inner = inner.strip_suffix(')').unwrap_or(inner);
                argv.push(inner.to_string());
            } else if tok.contains('!') || tok.starts_with('/') || tok.starts_with("./") {
                let resolved = self.resolve_file_reference(tok, &exec_peer, grade, opts, abort, &mut work_lines, &mut files)?;
                argv.push(resolved);
            } else {
                argv.push(tok.to_string());
            }
            i += 1;
        }

        let record = XqtRecord {
            argv,
            input: input_line,
            output: output_line,
            files,
            requestor: opts.requestor.clone(),
            user: self.local_user(),
            system: self.config.local_alias.clone(),
            mail_on_failure: opts.mail_on_failure_only,
            never_mail: false,
            mail_on_success: opts.notify_on_success,
            return_stdin_on_error: opts.return_stdin_on_error,
            use_shell: force_shell,
            no_shell: !force_shell,
            status_file: opts.status_file.clone(),
        };

        let jobid;
        match &exec_peer {
            None => {
                let xfile_path = self.spool.xqt_name(&self.config.local_name, grade);
                abort.record(xfile_path.clone());
                std::fs::write(&xfile_path, record.serialize())
                    .map_err(|e| UucpError::spool_io_path("writing execute file", xfile_path.clone(), &e))?;
                jobid = file_name(&xfile_path);
            }
            Some(peer) => {
                let alloc = self.spool.new_data_name(peer, grade)?;
                abort.record(alloc.tname.clone());
                std::fs::write(&alloc.tname, record.serialize())
                    .map_err(|e| UucpError::spool_io_path("writing execute file", alloc.tname.clone(), &e))?;
                work_lines.entry(peer.clone()).or_default().push(
                    WorkCommand::S {
                        zfrom: file_name(&alloc.tname),
                        zto: alloc.xname.clone(),
                        zuser: self.local_user(),
                        options: "C".to_string(),
                        ztemp: None,
                        mode: "0666".to_string(),
                        notify: None,
                        cbytes: None,
                    }
                    .to_string(),
                );
                jobid = self.spool.jobid_for(peer, grade, &alloc.seq);
            }
        }

        let mut committed_peer_files: Vec<(String, PathBuf)> = Vec::new();
        for (peer, lines) in &work_lines {
            let (tmp, seq) = self.spool.new_work_tmp(peer, grade)?;
            abort.record(tmp.clone());
            let mut content = String::new();
            for line in lines {
                content.push_str(line);
                content.push('\n');
            }
            content.push_str("H\n");
            std::fs::write(&tmp, &content).map_err(|e| UucpError::spool_io_path("writing work file", tmp.clone(), &e))?;
            let final_path = self.spool.commit_work_file(&tmp, peer, grade, &seq)?;
            committed_peer_files.push((peer.clone(), final_path));
        }

        let mut contacted = None;
        if !opts.no_transport {
            let transport = ExternalTransport::new(self.config);
            match &exec_peer {
                Some(peer) if !committed_peer_files.is_empty() => {
                    transport.spawn(TransportTarget::Peer(peer))?;
                    contacted = Some(peer.clone());
                }
                _ => {
                    if let Some((peer, _)) = committed_peer_files.first() {
                        transport.spawn(TransportTarget::Peer(peer))?;
                        contacted = Some(peer.clone());
                    }
                }
            }
        }

        Ok(SubmitReport { jobid: Some(jobid), contacted })
    }

    fn local_user(&self) -> String {
        std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
    }

    /// Resolves one file-bearing argument into its substituted argv/line
    /// text, applying cases L1-L4 from spec.md §4.4.
    #[allow(clippy::too_many_arguments)]
    fn resolve_file_reference(
        &mut self,
        token: &str,
        exec_peer: &Option<String>,
        grade: char,
        opts: &SubmitOptions,
        abort: &mut AbortList,
        work_lines: &mut HashMap<String, Vec<String>>,
        files: &mut Vec<FileRequirement>,
    ) -> Result<String, UucpError> {
        let (file_peer, path) = split_peer_path(token, &self.config.local_alias);
        let file_peer = file_peer.map(str::to_string);

        match (&file_peer, exec_peer) {
            // L1: file local, execution local.
            (None, None) => {
                if opts.force_copy || opts.try_link {
                    let alloc = self.spool.new_data_name(&self.config.local_name, grade)?;
                    abort.record(alloc.tname.clone());
                    self.materialize(path, &alloc.tname, opts)?;
                    Ok(alloc.dname)
                } else {
                    if let Some(local_sys) = self.config.find_system(&self.config.local_alias) {
                        if !local_sys.local_send.is_empty() && !local_sys.permits_send(path) {
                            return Err(UucpError::permission(format!("not permitted to send {path}")));
                        }
                    }
                    Ok(path.to_string())
                }
            }
            // L2: file local, execution remote.
            (None, Some(peer)) => {
                let alloc = self.spool.new_data_name(peer, grade)?;
                abort.record(alloc.tname.clone());
                self.materialize(path, &alloc.tname, opts)?;
                let zto = if opts.no_copy { "D.0".to_string() } else { alloc.dname.clone() };
                work_lines.entry(peer.clone()).or_default().push(
                    WorkCommand::S {
                        zfrom: file_name(&alloc.tname),
                        zto: zto.clone(),
                        zuser: self.local_user(),
                        options: if opts.no_copy { "c".to_string() } else { "C".to_string() },
                        ztemp: None,
                        mode: "0666".to_string(),
                        notify: None,
                        cbytes: None,
                    }
                    .to_string(),
                );
                files.push(FileRequirement { name: alloc.dname.clone(), rename: base_name(path) });
                Ok(alloc.dname)
            }
            // L3: file remote, same system as execution.
            (Some(fp), Some(ep)) if fp == ep => Ok(path.to_string()),
            // L4: file on a third system (forwarding), or file remote with local execution.
            (Some(fp), exec) => {
                match exec {
                    Some(_) => Err(UucpError::syntax("uux forwarding does not yet work")),
                    None => {
                        let alloc = self.spool.new_data_name(fp, grade)?;
                        abort.record(alloc.tname.clone());
                        work_lines.entry(fp.clone()).or_default().push(
                            WorkCommand::R {
                                zfrom: path.to_string(),
                                zto: alloc.dname.clone(),
                                zuser: self.local_user(),
                                options: "9".to_string(),
                                mode: "0666".to_string(),
                                cbytes: None,
                            }
                            .to_string(),
                        );
                        files.push(FileRequirement { name: alloc.dname.clone(), rename: base_name(path) });
                        Ok(alloc.dname)
                    }
                }
            }
        }
    }

    /// Resolves a `>path` redirection into an X-file `O` line. Unlike an
    /// ordinary file reference or `<path` stdin, this never materializes
    /// anything into the spool: `uux.c`'s `foutput` branch strips the
    /// argument, checks the *executing* peer's `remote_receive` allow-list
    /// (not our own), and emits `O zfile` (no peer, when the file already
    /// lives on the executing system) or `O zfile <peer>` (routing the
    /// executed command's output back there) — no upload, no `F`/`S` line.
    fn resolve_output_redirect(&self, token: &str, exec_peer: &Option<String>) -> Result<(String, Option<String>), UucpError> {
        let (file_peer, path) = split_peer_path(token, &self.config.local_alias);
        let is_local = file_peer.is_none();
        let target_system = file_peer.unwrap_or(&self.config.local_alias);

        if is_local {
            let checking_sys = exec_peer.as_deref().unwrap_or(&self.config.local_alias);
            if let Some(sys) = self.config.find_system(checking_sys) {
                if !sys.remote_receive.is_empty() && !sys.permits_receive(path) {
                    return Err(UucpError::permission(format!("not permitted to create {path}")));
                }
            }
        }

        let exec_sys_name = exec_peer.as_deref().unwrap_or(&self.config.local_alias);
        let peer_for_o = if target_system == exec_sys_name {
            None
        } else if is_local {
            Some(self.config.local_alias.clone())
        } else {
            Some(target_system.to_string())
        };

        Ok((path.to_string(), peer_for_o))
    }

    /// `new_data_name` already reserved `dest` as an empty placeholder file
    /// (for collision-free allocation); a hard link requires the
    /// destination not to exist, so we remove the placeholder right before
    /// attempting one and recreate it on fallback.
    fn materialize(&self, source: &str, dest: &std::path::Path, opts: &SubmitOptions) -> Result<(), UucpError> {
        if opts.try_link && !opts.force_copy {
            let _ = std::fs::remove_file(dest);
            if std::fs::hard_link(source, dest).is_ok() {
                return Ok(());
            }
        }
        let mut out = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(dest)
            .map_err(|e| UucpError::spool_io_path("opening spool destination", dest.to_path_buf(), &e))?;
        let bytes = std::fs::read(source).map_err(|e| UucpError::spool_io(format!("reading {source}"), &e))?;
        out.write_all(&bytes).map_err(|e| UucpError::spool_io_path("writing spool destination", dest.to_path_buf(), &e))?;
        Ok(())
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

fn base_name(path: &str) -> Option<String> {
    path.rsplit('/').next().map(str::to_string)
}

use std::io::Read as _;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config_and_spool() -> (tempfile::TempDir, Config, Spool) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.spool_dir = dir.path().join("spool");
        cfg.local_name = "localhost".to_string();
        cfg.local_alias = "localhost".to_string();
        cfg.systems.push(crate::system::SystemInfo::bare("peerA"));
        let spool = Spool::open(&cfg).unwrap();
        (dir, cfg, spool)
    }

    #[test]
    fn split_peer_path_treats_self_alias_as_local() {
        assert_eq!(split_peer_path("peerA!foo", "localhost"), (Some("peerA"), "foo"));
        assert_eq!(split_peer_path("localhost!foo", "localhost"), (None, "foo"));
        assert_eq!(split_peer_path("!foo", "localhost"), (None, "foo"));
        assert_eq!(split_peer_path("foo", "localhost"), (None, "foo"));
    }

    #[test]
    fn shell_chars_force_shell_execution() {
        let raw = vec!["peerA!wc".to_string(), "file*.txt".to_string()];
        let force = raw.iter().any(|a| a.chars().any(|c| SHELL_CHARS.contains(c)));
        assert!(force);
    }

    #[test]
    fn tokenizer_resplits_a_single_captured_argument_on_shell_separators() {
        let (cmd, tokens) = tokenize_command_line(&["peerA!wc".to_string(), "a.txt;rm -rf /".to_string()]);
        assert_eq!(cmd, "peerA!wc");
        assert_eq!(tokens, vec!["a.txt", ";", "rm", "-rf", "/"]);
    }

    #[test]
    fn tokenizer_splits_adjacent_redirections_into_their_own_tokens() {
        let (cmd, tokens) = tokenize_command_line(&["peerA!wc".to_string(), "<in>out".to_string()]);
        assert_eq!(cmd, "peerA!wc");
        assert_eq!(tokens, vec!["<", "in", ">", "out"]);
    }

    #[test]
    fn tokenizer_finds_command_name_before_first_separator_even_without_spaces() {
        let (cmd, tokens) = tokenize_command_line(&["peerA!wc<in".to_string()]);
        assert_eq!(cmd, "peerA!wc");
        assert_eq!(tokens, vec!["<", "in"]);
    }

    #[test]
    fn remote_execution_same_system_file_needs_no_transfer() {
        let (_dir, cfg, spool) = test_config_and_spool();
        let mut sub = Submitter::new(&cfg, spool);
        let report = sub.submit(&["peerA!wc".to_string(), "peerA!/tmp/x".to_string()], &SubmitOptions::default()).unwrap();
        assert!(report.jobid.is_some());
    }

    #[test]
    fn third_system_forwarding_is_rejected_when_exec_is_remote() {
        let (_dir, cfg, spool) = test_config_and_spool();
        let mut cfg2 = cfg.clone();
        cfg2.systems.push(crate::system::SystemInfo::bare("peerB"));
        let mut sub = Submitter::new(&cfg2, spool);
        let err = sub.submit(&["peerA!wc".to_string(), "peerB!/tmp/x".to_string()], &SubmitOptions::default()).unwrap_err();
        assert!(matches!(err, UucpError::Syntax { .. }));
    }

    #[test]
    fn output_redirect_to_local_file_with_remote_exec_names_local_alias_as_peer() {
        let (_dir, cfg, spool) = test_config_and_spool();
        let sub = Submitter::new(&cfg, spool);
        let (name, peer) = sub.resolve_output_redirect("results.txt", &Some("peerA".to_string())).unwrap();
        assert_eq!(name, "results.txt");
        assert_eq!(peer, Some("localhost".to_string()));
    }

    #[test]
    fn output_redirect_targeting_the_executing_system_itself_needs_no_peer() {
        let (_dir, cfg, spool) = test_config_and_spool();
        let sub = Submitter::new(&cfg, spool);
        let (name, peer) = sub.resolve_output_redirect("peerA!results.txt", &Some("peerA".to_string())).unwrap();
        assert_eq!(name, "results.txt");
        assert_eq!(peer, None);
    }

    #[test]
    fn output_redirect_never_materializes_a_spool_data_file() {
        let (dir, cfg, spool) = test_config_and_spool();
        let mut sub = Submitter::new(&cfg, spool);
        let mut opts = SubmitOptions::default();
        opts.no_transport = true;
        sub.submit(&["peerA!wc".to_string(), format!(">{}", dir.path().join("out.txt").display())], &opts).unwrap();
        let entries: Vec<_> = std::fs::read_dir(&cfg.spool_dir).unwrap().flatten().collect();
        assert!(!entries.iter().any(|e| e.file_name().to_string_lossy().starts_with("D.")), "output redirection must not upload a data file");
    }

    #[test]
    fn local_queue_and_send_creates_data_and_execute_files() {
        let (dir, cfg, spool) = test_config_and_spool();
        let body = dir.path().join("body.txt");
        std::fs::write(&body, b"hello").unwrap();
        let mut sub = Submitter::new(&cfg, spool);
        let mut opts = SubmitOptions::default();
        opts.force_copy = true;
        opts.no_transport = true;
        let report = sub.submit(&["peerA!rmail".to_string(), "user@host".to_string(), format!("<{}", body.display())], &opts).unwrap();
        assert!(report.jobid.is_some());
        let entries: Vec<_> = std::fs::read_dir(&cfg.spool_dir).unwrap().flatten().collect();
        assert!(entries.iter().any(|e| e.file_name().to_string_lossy().starts_with("C.peerA")));
    }
}
