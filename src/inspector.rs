use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::config::Config;
use crate::error::UucpError;
use crate::mailer::Mailer;
use crate::spool::Spool;
use crate::status::StatusStore;
use crate::workfile::WorkCommand;
use crate::xfile::XqtRecord;

/// One logical job: every line from a single `C.` file, grouped by the
/// jobid recovered from that file's own name (spec.md §4.6, §4.1).
#[derive(Debug, Clone)]
pub struct Job {
    pub jobid: String,
    pub peer: String,
    pub grade: char,
    pub path: PathBuf,
    pub commands: Vec<WorkCommand>,
}

impl Job {
    /// The submitting user, taken from the first command that carries one.
    pub fn user(&self) -> Option<&str> {
        self.commands.iter().find_map(|c| match c {
            WorkCommand::S { zuser, .. } => Some(zuser.as_str()),
            WorkCommand::R { zuser, .. } => Some(zuser.as_str()),
            WorkCommand::X { zuser, .. } => Some(zuser.as_str()),
            WorkCommand::E { zuser, .. } => Some(zuser.as_str()),
            WorkCommand::H => None,
        })
    }

    /// Ported from `uustat.c`'s `fsworkfile_show`: a job is an execution
    /// request iff it contains an `S` whose destination is an X-file name
    /// and whose source is already spool-resident.
    pub fn execution_request(&self) -> Option<&WorkCommand> {
        self.commands.iter().find(|c| match c {
            WorkCommand::S { zfrom, zto, .. } => zto.starts_with("X.") && crate::spool::is_spool_file(zfrom),
            _ => false,
        })
    }
}

/// Filters compose as AND across classes, OR-by-negation within a class
/// (spec.md §4.6).
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub system: Option<String>,
    pub not_system: Option<String>,
    pub user: Option<String>,
    pub not_user: Option<String>,
    pub command: Option<String>,
    pub not_command: Option<String>,
    pub older_than: Option<Duration>,
    pub younger_than: Option<Duration>,
    pub executing_only: bool,
}

/// One rendered line for display: either a plain job summary or, for
/// execution requests, `Executing <cmd> (sending N bytes)`.
#[derive(Debug, Clone)]
pub struct JobView {
    pub job: Job,
    pub age: Duration,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct SystemSummary {
    pub peer: String,
    pub command_count: usize,
    pub command_age: Duration,
    pub xqt_count: usize,
    pub xqt_age: Duration,
    pub last_call: Option<SystemTime>,
    pub status_text: &'static str,
}

/// Picks the largest applicable unit (day > hour > min > sec), matching
/// `uustat.c`'s `usunits_show` (spec.md §4.6). `0 secs` covers the empty
/// case explicitly required by spec.md §4.6.
pub fn format_age(d: Duration) -> String {
    let secs = d.as_secs();
    let (value, unit) = if secs >= 86400 {
        (secs / 86400, "day")
    } else if secs >= 3600 {
        (secs / 3600, "hour")
    } else if secs >= 60 {
        (secs / 60, "min")
    } else {
        (secs, "sec")
    };
    if value == 1 { format!("1 {unit}") } else { format!("{value} {unit}s") }
}

/// Read-mostly peer over the same spool the transport writes to: lists,
/// filters, kills, and rejuvenates queued jobs, and computes per-system
/// queue statistics (spec.md §4.6, the `uustat` core).
pub struct Inspector<'a> {
    config: &'a Config,
    spool: Spool,
    mailer: Mailer,
    status: StatusStore,
}

impl<'a> Inspector<'a> {
    pub fn new(config: &'a Config, spool: Spool) -> Result<Self, UucpError> {
        let mailer = Mailer::open(config)?;
        let status = StatusStore::open(config)?;
        Ok(Inspector { config, spool, mailer, status })
    }

    fn all_jobs(&self) -> Result<Vec<Job>, UucpError> {
        let mut jobs = Vec::new();
        for (path, peer, grade, seq) in self.spool.list_command_files() {
            let contents = std::fs::read_to_string(&path).map_err(|e| UucpError::spool_io_path("reading work file", path.clone(), &e))?;
            let mut commands = Vec::new();
            for line in contents.lines() {
                let cmd = WorkCommand::parse(line)?;
                let stop = matches!(cmd, WorkCommand::H);
                if !stop {
                    commands.push(cmd);
                }
                if stop {
                    break;
                }
            }
            let jobid = self.spool.jobid_for(&peer, grade, &seq);
            jobs.push(Job { jobid, peer, grade, path, commands });
        }
        Ok(jobs)
    }

    fn describe(&self, job: &Job) -> String {
        if let Some(WorkCommand::S { zfrom, .. }) = job.execution_request() {
            let xpath = self.spool.dir().join(zfrom);
            if let Ok(contents) = std::fs::read_to_string(&xpath) {
                if let Ok(record) = XqtRecord::parse(&contents) {
                    let bytes = self.spool.size(&xpath).unwrap_or(0);
                    return format!("Executing {} (sending {} bytes)", record.argv.join(" "), bytes);
                }
            }
            return "Executing (execute file not yet available)".to_string();
        }
        format!("{} command(s) queued for {}", job.commands.len(), job.peer)
    }

    /// Lists jobs matching `filter`, newest-filename order within each peer
    /// (matching `Spool::list_command_files`' stable ordering).
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobView>, UucpError> {
        let now = SystemTime::now();
        let mut out = Vec::new();
        for job in self.all_jobs()? {
            if let Some(sys) = &filter.system {
                if &job.peer != sys {
                    continue;
                }
            }
            if let Some(sys) = &filter.not_system {
                if &job.peer == sys {
                    continue;
                }
            }
            if let Some(user) = &filter.user {
                if job.user() != Some(user.as_str()) {
                    continue;
                }
            }
            if let Some(user) = &filter.not_user {
                if job.user() == Some(user.as_str()) {
                    continue;
                }
            }
            let exec_cmd = job.execution_request();
            if filter.executing_only && exec_cmd.is_none() {
                continue;
            }
            if let Some(cmd) = &filter.command {
                if !self.job_runs_command(&job, cmd) {
                    continue;
                }
            }
            if let Some(cmd) = &filter.not_command {
                if self.job_runs_command(&job, cmd) {
                    continue;
                }
            }
            let mtime = self.spool.file_time(&job.path)?;
            let age = now.duration_since(mtime).unwrap_or_default();
            if let Some(min_age) = filter.older_than {
                if age < min_age {
                    continue;
                }
            }
            if let Some(max_age) = filter.younger_than {
                if age > max_age {
                    continue;
                }
            }
            let description = self.describe(&job);
            out.push(JobView { job, age, description });
        }
        Ok(out)
    }

    fn job_runs_command(&self, job: &Job, cmd: &str) -> bool {
        let Some(WorkCommand::S { zfrom, .. }) = job.execution_request() else { return false };
        let xpath = self.spool.dir().join(zfrom);
        std::fs::read_to_string(&xpath).ok().and_then(|c| XqtRecord::parse(&c).ok()).and_then(|r| r.command_name().map(str::to_string)).as_deref()
            == Some(cmd)
    }

    /// Kills `jobid`. Non-administrator users may only kill jobs they own
    /// (spec.md §4.6, scenario 5).
    pub fn kill(&self, jobid: &str, requesting_user: &str, is_admin: bool) -> Result<(), UucpError> {
        let jobs = self.all_jobs()?;
        let job = jobs.iter().find(|j| j.jobid == jobid).ok_or_else(|| UucpError::not_found(format!("job {jobid}")))?;
        if !is_admin && job.user() != Some(requesting_user) {
            return Err(UucpError::permission("Not submitted by you"));
        }
        self.spool.remove_job(jobid)
    }

    pub fn rejuvenate(&self, jobid: &str, requesting_user: &str, is_admin: bool) -> Result<(), UucpError> {
        let jobs = self.all_jobs()?;
        let job = jobs.iter().find(|j| j.jobid == jobid).ok_or_else(|| UucpError::not_found(format!("job {jobid}")))?;
        if !is_admin && job.user() != Some(requesting_user) {
            return Err(UucpError::permission("Not submitted by you"));
        }
        self.spool.touch_job(jobid)
    }

    /// Mails a kill/query notification, optionally including the first
    /// `stdin_lines` lines of the job's stdin if it is spool-resident (and
    /// thus accessible).
    pub fn notify(&self, job: &Job, to_admin: bool, to_requestor: bool, comment: Option<&str>, stdin_lines: Option<usize>) -> Result<(), UucpError> {
        let mut body = Vec::new();
        if let Some(c) = comment {
            body.push(c.to_string());
        }
        body.push(format!("job {} for system {}", job.jobid, job.peer));
        if let Some(n) = stdin_lines {
            if let Some(WorkCommand::S { zfrom, .. }) = job.execution_request() {
                if let Ok(contents) = std::fs::read_to_string(self.spool.dir().join(zfrom)) {
                    if let Ok(record) = XqtRecord::parse(&contents) {
                        if let Some(input) = &record.input {
                            if let Ok(data) = std::fs::read_to_string(self.spool.dir().join(input)) {
                                body.extend(data.lines().take(n).map(str::to_string));
                            }
                        }
                    }
                }
            }
        }
        if to_admin {
            self.mailer.send(&self.config.admin_address, "uustat notification", &body)?;
        }
        if to_requestor {
            if let Some(user) = job.user() {
                self.mailer.send(user, "uustat notification", &body)?;
            }
        }
        Ok(())
    }

    /// Per-system summary: `<nC> (<age>) <xC> (<age>) <last-call-time>
    /// <status-text>` (spec.md §4.6 and scenario 6).
    pub fn queue_summary(&self) -> Result<Vec<SystemSummary>, UucpError> {
        let now = SystemTime::now();
        let mut peers: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        let command_files = self.spool.list_command_files();
        for (_, peer, _, _) in &command_files {
            peers.insert(peer.clone());
        }
        for (_, peer) in self.spool.list_xfiles() {
            peers.insert(peer);
        }

        let mut out = Vec::new();
        for peer in peers {
            let c_files: Vec<_> = command_files.iter().filter(|(_, p, _, _)| p == &peer).collect();
            let command_count = c_files.len();
            let command_age = c_files
                .iter()
                .filter_map(|(path, ..)| self.spool.file_time(path).ok())
                .filter_map(|t| now.duration_since(t).ok())
                .max()
                .unwrap_or_default();

            let x_files: Vec<_> = self.spool.list_xfiles().into_iter().filter(|(_, p)| p == &peer).collect();
            let xqt_count = x_files.len();
            let xqt_age = x_files
                .iter()
                .filter_map(|(path, _)| self.spool.file_time(path).ok())
                .filter_map(|t| now.duration_since(t).ok())
                .max()
                .unwrap_or_default();

            let status = self.status.get(&peer);
            let (last_call, status_text) = match &status {
                Some(s) => (Some(s.last_attempt_time()), self.status.status_string(s.ttype)),
                None => (None, "Never called"),
            };

            out.push(SystemSummary { peer, command_count, command_age, xqt_count, xqt_age, last_call, status_text });
        }
        Ok(out)
    }
}

impl SystemSummary {
    /// Renders the one-line form from spec.md scenario 6:
    /// `peerA 1C (1 hour) 1X (50 secs) <time> <status-text>`. The trailing
    /// timestamp/status fields are omitted entirely when there is no
    /// recorded `SpoolStatus` for the peer, matching `fsquery_show`'s
    /// `if (flocal || fnostatus) { printf ("\n"); return TRUE; }` guard,
    /// which finishes the line right after the C/X counts instead of
    /// printing a placeholder time and status.
    pub fn render(&self) -> String {
        let counts = format!(
            "{} {}C ({}) {}X ({})",
            self.peer,
            self.command_count,
            format_age(self.command_age),
            self.xqt_count,
            format_age(self.xqt_age),
        );
        match self.last_call {
            None => counts,
            Some(t) => {
                let epoch = t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
                let stamp = chrono::DateTime::from_timestamp(epoch as i64, 0).map(|dt| dt.format("%m/%d-%H:%M").to_string()).unwrap_or_default();
                format!("{counts} {stamp} {}", self.status_text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{SpoolStatus, StatusType};

    fn test_config_and_spool() -> (tempfile::TempDir, Config, Spool) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.spool_dir = dir.path().join("spool");
        let spool = Spool::open(&cfg).unwrap();
        (dir, cfg, spool)
    }

    #[test]
    fn format_age_picks_largest_unit() {
        assert_eq!(format_age(Duration::from_secs(0)), "0 secs");
        assert_eq!(format_age(Duration::from_secs(50)), "50 secs");
        assert_eq!(format_age(Duration::from_secs(3700)), "1 hour");
        assert_eq!(format_age(Duration::from_secs(7200)), "2 hours");
        assert_eq!(format_age(Duration::from_secs(90000)), "1 day");
    }

    #[test]
    fn list_jobs_groups_lines_by_work_file() {
        let (_dir, cfg, mut spool) = test_config_and_spool();
        let alloc = spool.new_data_name("peerA", 'N').unwrap();
        spool.commit_work_file(&alloc.tname, "peerA", 'N', &alloc.seq).unwrap();
        let path = cfg.spool_dir.join(format!("C.peerAN{}", alloc.seq));
        std::fs::write(&path, "S a b alice C \"\" 0666 \"\"\nH\n").unwrap();

        let inspector = Inspector::new(&cfg, spool).unwrap();
        let jobs = inspector.list_jobs(&JobFilter::default()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.user(), Some("alice"));
    }

    #[test]
    fn kill_by_non_owner_is_rejected() {
        let (_dir, cfg, mut spool) = test_config_and_spool();
        let alloc = spool.new_data_name("peerA", 'N').unwrap();
        spool.commit_work_file(&alloc.tname, "peerA", 'N', &alloc.seq).unwrap();
        let path = cfg.spool_dir.join(format!("C.peerAN{}", alloc.seq));
        std::fs::write(&path, "S a b alice C \"\" 0666 \"\"\nH\n").unwrap();
        let jobid = format!("peerA.N{}", alloc.seq);

        let inspector = Inspector::new(&cfg, spool).unwrap();
        let err = inspector.kill(&jobid, "bob", false).unwrap_err();
        assert!(matches!(err, UucpError::Permission { .. }));
        assert!(path.exists());
    }

    #[test]
    fn kill_by_owner_removes_job_files() {
        let (_dir, cfg, mut spool) = test_config_and_spool();
        let alloc = spool.new_data_name("peerA", 'N').unwrap();
        spool.commit_work_file(&alloc.tname, "peerA", 'N', &alloc.seq).unwrap();
        let path = cfg.spool_dir.join(format!("C.peerAN{}", alloc.seq));
        std::fs::write(&path, "S a b alice C \"\" 0666 \"\"\nH\n").unwrap();
        let jobid = format!("peerA.N{}", alloc.seq);

        let inspector = Inspector::new(&cfg, spool).unwrap();
        inspector.kill(&jobid, "alice", false).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn queue_summary_omits_timestamp_and_status_for_a_never_called_peer() {
        let (_dir, cfg, mut spool) = test_config_and_spool();
        let alloc = spool.new_data_name("peerA", 'N').unwrap();
        spool.commit_work_file(&alloc.tname, "peerA", 'N', &alloc.seq).unwrap();
        std::fs::write(cfg.spool_dir.join(format!("C.peerAN{}", alloc.seq)), "H\n").unwrap();

        let inspector = Inspector::new(&cfg, spool).unwrap();
        let summary = inspector.queue_summary().unwrap();
        assert_eq!(summary.len(), 1);
        assert!(summary[0].last_call.is_none());
        let line = summary[0].render();
        assert_eq!(line, "peerA 1C (0 secs) 0X (0 secs)", "a peer with no recorded status must have its trailing timestamp/status fields omitted, not a placeholder");
        assert!(!line.contains("Never called"));
    }

    #[test]
    fn queue_summary_reflects_recorded_status() {
        let (_dir, cfg, spool) = test_config_and_spool();
        let status_store = StatusStore::open(&cfg).unwrap();
        status_store.set("peerB", &SpoolStatus { last_attempt_epoch: 1000, ttype: StatusType::Talking, retries: 1, wait_seconds: 60 }).unwrap();

        let inspector = Inspector::new(&cfg, spool).unwrap();
        let summary = inspector.queue_summary().unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].status_text, "Talking");
    }
}
