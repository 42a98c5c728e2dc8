use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::error::UucpError;
use crate::lock::LockGuard;
use crate::mailer::Mailer;
use crate::spool::Spool;
use crate::workfile::WorkCommand;
use crate::xfile::XqtRecord;

const XQT_LOCK_RETRIES: u32 = 5;
const XQT_LOCK_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// `-c cmd`: only process X-files whose command matches.
    pub only_command: Option<String>,
    /// `-s system`: only process X-files received from this peer.
    pub only_system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XqtOutcome {
    Succeeded,
    Failed,
    Rejected,
    Skipped,
    AwaitingInputs,
}

#[derive(Debug, Default)]
pub struct ExecutorReport {
    pub processed: Vec<(String, XqtOutcome)>,
}

impl ExecutorReport {
    fn record(&mut self, xfile: String, outcome: XqtOutcome) {
        self.processed.push((xfile, outcome));
    }
}

/// Which cleanup steps an in-progress X-file's processing has earned so
/// far. Consumed once at every exit path, replacing the C source's manual
/// `REMOVE_FILE`/`REMOVE_NEEDED`/`FREE_QINPUT` flag threading (spec.md §4.5).
#[derive(Default)]
struct CleanupPlan {
    remove_xfile: bool,
    remove_required_inputs: bool,
    remove_output_on_failure: Option<PathBuf>,
}

/// Runs an X-file subject to policy and routes its output (spec.md §4.5,
/// the `uuxqt` core).
pub struct Executor<'a> {
    config: &'a Config,
    spool: Spool,
    mailer: Mailer,
}

impl<'a> Executor<'a> {
    pub fn new(config: &'a Config, spool: Spool) -> Result<Self, UucpError> {
        let mailer = Mailer::open(config)?;
        Ok(Executor { config, spool, mailer })
    }

    pub fn run(&mut self, opts: &ExecutorOptions) -> Result<ExecutorReport, UucpError> {
        let mut report = ExecutorReport::default();
        for (path, peer) in self.spool.list_xfiles() {
            if let Some(sys) = &opts.only_system {
                if &peer != sys {
                    continue;
                }
            }
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            match self.process_one(&path, &peer, opts) {
                Ok(outcome) => report.record(name, outcome),
                Err(e) => {
                    tracing::warn!(xfile = %name, error = %e, "X-file processing failed");
                    report.record(name, XqtOutcome::Failed);
                }
            }
        }
        Ok(report)
    }

    fn process_one(&mut self, path: &PathBuf, peer: &str, opts: &ExecutorOptions) -> Result<XqtOutcome, UucpError> {
        let xfile_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Ok(XqtOutcome::Skipped),
        };
        let record = match XqtRecord::parse(&contents) {
            Ok(r) => r,
            Err(_) => {
                // No C line / malformed: delete as specified (step 4).
                let _ = std::fs::remove_file(path);
                return Ok(XqtOutcome::Rejected);
            }
        };
        let argv0 = record.command_name().unwrap_or("").to_string();

        if let Some(only) = &opts.only_command {
            if &argv0 != only {
                return Ok(XqtOutcome::Skipped);
            }
        }

        let cmd_lock_name = format!("LCK.XQT.{argv0}");
        let Some(_cmd_guard) = LockGuard::try_acquire(&self.config.lock_dir, &cmd_lock_name)? else {
            return Ok(XqtOutcome::Skipped);
        };

        let file_lock_name = format!("LCK.X.{xfile_name}");
        let Some(_file_guard) = LockGuard::try_acquire(&self.config.lock_dir, &file_lock_name)? else {
            return Ok(XqtOutcome::Skipped);
        };

        let mut plan = CleanupPlan::default();

        // Step 8: every required file must already be in the spool.
        let mut spool_paths = Vec::new();
        for f in &record.files {
            let p = self.spool.dir().join(&f.name);
            if !p.exists() {
                return Ok(XqtOutcome::AwaitingInputs);
            }
            spool_paths.push(p);
        }

        // Step 9: exec-dir lock only if some F has a rename target.
        let needs_exec_dir = record.files.iter().any(|f| f.rename.is_some());
        let _dir_guard = if needs_exec_dir {
            match LockGuard::acquire_with_retry(&self.config.lock_dir, "LCK.XQT", XQT_LOCK_RETRIES, XQT_LOCK_RETRY_DELAY)? {
                Some(g) => Some(g),
                None => {
                    tracing::warn!(xfile = %xfile_name, "could not acquire execute directory lock after retries");
                    return Ok(XqtOutcome::AwaitingInputs);
                }
            }
        } else {
            None
        };

        let requestor = record
            .requestor
            .clone()
            .unwrap_or_else(|| format!("{}@{}", record.user, record.system));

        // Step 3: a peer with no SystemInfo entry at all is left pending
        // rather than run under implicit permissions, unless unknown systems
        // are explicitly allowed — distinct from step 10's known-peer,
        // forbidden-command rejection below.
        let system_info = self.config.find_system(peer);
        if system_info.is_none() && !self.config.allow_unknown_systems {
            return Ok(XqtOutcome::Skipped);
        }

        // Step 10: resolve the command against the peer's allow-list and search path.
        let resolved = system_info.and_then(|s| s.resolve_command(&argv0));
        if resolved.is_none() {
            plan.remove_xfile = true;
            if record.should_mail_on_failure() {
                self.mailer.send(
                    &requestor,
                    "Execution request failed",
                    &vec![format!("Your execution request failed because you are not permitted to execute {argv0}")],
                )?;
            }
            self.cleanup(path, &record, &plan);
            return Ok(XqtOutcome::Rejected);
        }

        // Step 11: resolve stdin.
        let stdin_path: Option<PathBuf> = match &record.input {
            Some(name) if crate::spool::is_spool_file(name) => Some(self.spool.dir().join(name)),
            Some(name) => {
                if let Some(s) = system_info {
                    if !s.permits_send(name) {
                        plan.remove_xfile = true;
                        self.mailer.send(&requestor, "Execution request failed", &vec!["standard input not accessible".to_string()])?;
                        self.cleanup(path, &record, &plan);
                        return Ok(XqtOutcome::Rejected);
                    }
                }
                Some(PathBuf::from(name.as_str()))
            }
            None => None,
        };

        // Step 12: resolve stdout.
        // (peer, tname, dname, grade) for the spool data file allocated to
        // catch a foreign peer's output, kept together so the work command
        // queued after a successful run names the file `Spool` actually
        // allocated instead of a fabricated one.
        let mut foreign_output: Option<(String, PathBuf, String, char)> = None;
        let stdout_path: Option<PathBuf> = match &record.output {
            None => None,
            Some((name, peer_opt)) => {
                // A peer field naming the X-file's own owning system is still a
                // foreign destination: `uuxqt.c`'s "destined for some other
                // system" branch triggers whenever the O line's system differs
                // from the executing system, even when it equals the
                // requesting peer — it just reuses that peer's already-loaded
                // system record instead of a fresh lookup. Only an absent
                // field or an explicit match on our own local alias writes
                // directly to local disk.
                let targets_local = match peer_opt.as_deref() {
                    None => true,
                    Some(p) => p == self.config.local_alias.as_str(),
                };
                if targets_local {
                    if crate::spool::is_spool_file(name) {
                        plan.remove_xfile = true;
                        self.mailer.send(&requestor, "Execution request failed", &vec!["output file name forbidden".to_string()])?;
                        self.cleanup(path, &record, &plan);
                        return Ok(XqtOutcome::Rejected);
                    }
                    if let Some(s) = system_info {
                        if !s.permits_receive(name) {
                            plan.remove_xfile = true;
                            self.mailer.send(&requestor, "Execution request failed", &vec!["output path not permitted".to_string()])?;
                            self.cleanup(path, &record, &plan);
                            return Ok(XqtOutcome::Rejected);
                        }
                    }
                    Some(PathBuf::from(name.as_str()))
                } else {
                    let grade = self.config.default_grade;
                    let alloc = self.spool.new_data_name(peer_opt.as_deref().unwrap(), grade)?;
                    foreign_output = Some((peer_opt.clone().unwrap(), alloc.tname.clone(), alloc.dname.clone(), grade));
                    Some(alloc.tname)
                }
            }
        };

        // Step 13: move renamed F files into the execute directory.
        let xqt_dir = self.spool.dir().join("xqtdir");
        std::fs::create_dir_all(&xqt_dir).map_err(|e| UucpError::spool_io_path("creating execute dir", xqt_dir.clone(), &e))?;
        let mut final_stdin = stdin_path.clone();
        for (f, p) in record.files.iter().zip(spool_paths.iter()) {
            if let Some(rename) = &f.rename {
                let dest = xqt_dir.join(rename);
                std::fs::rename(p, &dest).map_err(|e| UucpError::spool_io_path("moving required file", dest.clone(), &e))?;
                if stdin_path.as_deref() == Some(p.as_path()) {
                    final_stdin = Some(dest);
                }
            }
        }
        plan.remove_required_inputs = true;

        // Step 14: dispatch.
        let stderr_path = self.spool.dir().join(format!("XQT.err.{}", std::process::id()));
        let status_and_stderr = self.dispatch(&record, final_stdin.as_deref(), stdout_path.as_deref(), &stderr_path);

        match status_and_stderr {
            Ok(true) => {
                if record.should_mail_on_success() {
                    self.mailer.send(&requestor, "Execution request succeeded", &vec![record.argv.join(" ")])?;
                }
                if let Some((peer_name, data_path, dname, grade)) = &foreign_output {
                    let options = if record.should_mail_on_success() { "Cn" } else { "C" };
                    let line = WorkCommand::S {
                        zfrom: data_path.file_name().unwrap().to_string_lossy().to_string(),
                        zto: dname.clone(),
                        zuser: record.user.clone(),
                        options: options.to_string(),
                        ztemp: None,
                        mode: "0666".to_string(),
                        notify: None,
                        cbytes: None,
                    };
                    let (tmp, seq) = self.spool.new_work_tmp(peer_name, *grade)?;
                    std::fs::write(&tmp, format!("{line}\nH\n"))
                        .map_err(|e| UucpError::spool_io_path("writing output work file", tmp.clone(), &e))?;
                    self.spool.commit_work_file(&tmp, peer_name, *grade, &seq)?;
                }
                plan.remove_xfile = true;
                self.cleanup(path, &record, &plan);
                let _ = std::fs::remove_file(&stderr_path);
                Ok(XqtOutcome::Succeeded)
            }
            Ok(false) => {
                let stderr_tail = std::fs::read_to_string(&stderr_path).unwrap_or_default();
                if record.should_mail_on_failure() {
                    let mut body = vec![format!("Execution failed: {}", record.argv.join(" "))];
                    body.extend(stderr_tail.lines().map(str::to_string));
                    self.mailer.send(&requestor, "Execution request failed", &body)?;
                }
                if let Some((_, data_path, _, _)) = &foreign_output {
                    plan.remove_output_on_failure = Some(data_path.clone());
                }
                plan.remove_xfile = true;
                self.cleanup(path, &record, &plan);
                let _ = std::fs::remove_file(&stderr_path);
                Ok(XqtOutcome::Failed)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&stderr_path);
                Err(e)
            }
        }
    }

    fn dispatch(
        &self,
        record: &XqtRecord,
        stdin_path: Option<&std::path::Path>,
        stdout_path: Option<&std::path::Path>,
        stderr_path: &std::path::Path,
    ) -> Result<bool, UucpError> {
        use std::process::Stdio;

        let stderr_file = std::fs::File::create(stderr_path)
            .map_err(|e| UucpError::spool_io_path("creating stderr capture", stderr_path.to_path_buf(), &e))?;

        let mut command = if record.use_shell {
            let mut c = std::process::Command::new("sh");
            c.arg("-c").arg(record.argv.join(" "));
            c
        } else {
            let mut c = std::process::Command::new(&record.argv[0]);
            c.args(&record.argv[1..]);
            c
        };

        command.stderr(Stdio::from(stderr_file));
        match stdin_path {
            Some(p) => {
                let f = std::fs::File::open(p).map_err(|e| UucpError::spool_io_path("opening stdin", p.to_path_buf(), &e))?;
                command.stdin(Stdio::from(f));
            }
            None => {
                command.stdin(Stdio::null());
            }
        }
        match stdout_path {
            Some(p) => {
                let f = std::fs::File::create(p).map_err(|e| UucpError::spool_io_path("opening stdout", p.to_path_buf(), &e))?;
                command.stdout(Stdio::from(f));
            }
            None => {
                command.stdout(Stdio::null());
            }
        }

        let status = command.status().map_err(|e| UucpError::RemoteFailure { message: e.to_string() })?;
        Ok(status.success())
    }

    fn cleanup(&self, xfile: &std::path::Path, record: &XqtRecord, plan: &CleanupPlan) {
        if plan.remove_required_inputs {
            for f in &record.files {
                let _ = std::fs::remove_file(self.spool.dir().join(&f.name));
            }
        }
        if let Some(out) = &plan.remove_output_on_failure {
            let _ = std::fs::remove_file(out);
        }
        if plan.remove_xfile {
            let _ = std::fs::remove_file(xfile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{CommandPolicy, SystemInfo};

    fn test_config_and_spool() -> (tempfile::TempDir, Config, Spool) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.spool_dir = dir.path().join("spool");
        cfg.lock_dir = cfg.spool_dir.join("locks");
        let spool = Spool::open(&cfg).unwrap();
        std::fs::create_dir_all(&cfg.lock_dir).unwrap();
        (dir, cfg, spool)
    }

    #[test]
    fn malformed_xfile_without_c_line_is_deleted() {
        let (_dir, mut cfg, mut spool) = test_config_and_spool();
        let path = spool.xqt_name("peerA", 'N');
        std::fs::write(&path, "U alice localhost\n").unwrap();
        cfg.systems.push(SystemInfo::bare("peerA"));
        let mut exec = Executor::new(&cfg, spool).unwrap();
        let outcome = exec.process_one(&path, "peerA", &ExecutorOptions::default()).unwrap();
        assert_eq!(outcome, XqtOutcome::Rejected);
        assert!(!path.exists());
    }

    #[test]
    fn forbidden_command_is_rejected_and_mailed() {
        let (_dir, mut cfg, mut spool) = test_config_and_spool();
        let mut sys = SystemInfo::bare("peerA");
        sys.commands = CommandPolicy::List(vec!["rmail".to_string(), "rnews".to_string()]);
        let path = spool.xqt_name("peerA", 'N');
        std::fs::write(&path, "C forbidden\nU alice localhost\n").unwrap();
        cfg.systems.push(sys);
        let mut exec = Executor::new(&cfg, spool).unwrap();
        let outcome = exec.process_one(&path, "peerA", &ExecutorOptions::default()).unwrap();
        assert_eq!(outcome, XqtOutcome::Rejected);
        assert!(!path.exists());
        let mbox = cfg.spool_dir.join("mail").join("alice@localhost.mbox");
        let contents = std::fs::read_to_string(mbox).unwrap();
        assert!(contents.contains("not permitted to execute forbidden"));
    }

    #[test]
    fn missing_required_file_leaves_job_pending() {
        let (_dir, mut cfg, mut spool) = test_config_and_spool();
        let mut sys = SystemInfo::bare("peerA");
        sys.commands = CommandPolicy::All;
        let path = spool.xqt_name("peerA", 'N');
        std::fs::write(&path, "C rmail user@host\nF D.peerAN9999\nU alice localhost\n").unwrap();
        cfg.systems.push(sys);
        let mut exec = Executor::new(&cfg, spool).unwrap();
        let outcome = exec.process_one(&path, "peerA", &ExecutorOptions::default()).unwrap();
        assert_eq!(outcome, XqtOutcome::AwaitingInputs);
        assert!(path.exists(), "X-file must not be deleted while inputs are pending");
    }

    #[test]
    fn foreign_output_data_files_for_two_xfiles_get_distinct_names() {
        let (_dir, mut cfg, mut spool) = test_config_and_spool();
        let mut sys = SystemInfo::bare("peerA");
        sys.commands = CommandPolicy::All;
        cfg.systems.push(sys);

        let path1 = spool.xqt_name("peerA", 'N');
        std::fs::write(&path1, "C true\nO result peerB\nU alice localhost\n").unwrap();
        let path2 = spool.xqt_name("peerA", 'N');
        std::fs::write(&path2, "C true\nO result peerB\nU alice localhost\n").unwrap();

        let mut exec = Executor::new(&cfg, spool).unwrap();
        let report = exec.run(&ExecutorOptions::default()).unwrap();
        assert_eq!(report.processed.iter().filter(|(_, o)| *o == XqtOutcome::Succeeded).count(), 2);

        let data_files: Vec<_> = std::fs::read_dir(&cfg.spool_dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("D.peerB"))
            .collect();
        assert_eq!(data_files.len(), 2, "two X-files routing output to the same peer must get distinct data files");
    }

    #[test]
    fn unknown_system_is_left_pending_by_default() {
        let (_dir, cfg, mut spool) = test_config_and_spool();
        let path = spool.xqt_name("peerA", 'N');
        std::fs::write(&path, "C rmail user@host\nU alice localhost\n").unwrap();
        let mut exec = Executor::new(&cfg, spool).unwrap();
        let outcome = exec.process_one(&path, "peerA", &ExecutorOptions::default()).unwrap();
        assert_eq!(outcome, XqtOutcome::Skipped);
        assert!(path.exists(), "an unrecognized peer's request must not be deleted");
    }

    #[test]
    fn unknown_system_is_processed_when_explicitly_allowed() {
        let (_dir, mut cfg, mut spool) = test_config_and_spool();
        cfg.allow_unknown_systems = true;
        let path = spool.xqt_name("peerA", 'N');
        std::fs::write(&path, "C forbidden\nU alice localhost\n").unwrap();
        let mut exec = Executor::new(&cfg, spool).unwrap();
        let outcome = exec.process_one(&path, "peerA", &ExecutorOptions::default()).unwrap();
        // No SystemInfo means no allow-list to satisfy, so command
        // resolution still fails and the request is rejected rather than
        // left pending forever.
        assert_eq!(outcome, XqtOutcome::Rejected);
        assert!(!path.exists());
    }

    #[test]
    fn only_command_filter_skips_non_matching_files() {
        let (_dir, mut cfg, mut spool) = test_config_and_spool();
        cfg.systems.push(SystemInfo::bare("peerA"));
        let path = spool.xqt_name("peerA", 'N');
        std::fs::write(&path, "C wc /tmp/x\nU alice localhost\n").unwrap();
        let mut exec = Executor::new(&cfg, spool).unwrap();
        let opts = ExecutorOptions { only_command: Some("rmail".to_string()), only_system: None };
        let outcome = exec.process_one(&path, "peerA", &opts).unwrap();
        assert_eq!(outcome, XqtOutcome::Skipped);
        assert!(path.exists());
    }
}
