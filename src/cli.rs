use std::path::PathBuf;

use clap::Parser;

/// `uux` CLI surface (spec.md §6). `cmdline` is deliberately `Vec<String>`
/// with `trailing_var_arg`: the remainder of the command line, including any
/// leading `peer!cmd`, is handed to `Submitter::submit` untouched so it can
/// apply its own separator/redirection tokenizer rather than clap's.
#[derive(Parser, Debug)]
#[command(name = "uux", about = "Submit a command for remote execution")]
pub struct UuxArgs {
    /// `-a addr`: requestor mail address.
    #[arg(short = 'a')]
    pub requestor: Option<String>,
    /// `-b`: return stdin to the submitter on error.
    #[arg(short = 'b')]
    pub return_stdin_on_error: bool,
    /// `-c`: never copy; reference the original path in place.
    #[arg(short = 'c')]
    pub no_copy: bool,
    /// `-C`: force copy into the spool even if a link would work.
    #[arg(short = 'C')]
    pub force_copy: bool,
    /// `-g grade`: priority grade for this job.
    #[arg(short = 'g')]
    pub grade: Option<char>,
    /// `-I cfg`: alternate config file.
    #[arg(short = 'I')]
    pub config: Option<PathBuf>,
    /// `-j`: print the allocated jobid.
    #[arg(short = 'j')]
    pub print_jobid: bool,
    /// `-l`: try a hard link into the spool before falling back to copy.
    #[arg(short = 'l')]
    pub try_link: bool,
    /// `-n`: mail the submitter on success.
    #[arg(short = 'n')]
    pub notify_on_success: bool,
    /// `-p` / `-`: read the command's stdin from our own stdin.
    #[arg(short = 'p')]
    pub read_stdin: bool,
    /// `-r`: queue the job without invoking the transport.
    #[arg(short = 'r')]
    pub no_transport: bool,
    /// `-s file`: copy final status to this file on the requesting host.
    #[arg(short = 's')]
    pub status_file: Option<String>,
    /// `-W`: accepted, no effect (ported `baud-range` stub, spec.md §9).
    #[arg(short = 'W')]
    pub baud_range: bool,
    /// `-x debug`: enable debug logging.
    #[arg(short = 'x')]
    pub debug: bool,
    /// `-z`: mail the submitter only on failure.
    #[arg(short = 'z')]
    pub mail_on_failure_only: bool,
    /// The command line itself: `[peer!]cmd arg...`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub cmdline: Vec<String>,
}

/// `uuxqt` CLI surface (spec.md §6).
#[derive(Parser, Debug)]
#[command(name = "uuxqt", about = "Run queued execute files")]
pub struct UuxqtArgs {
    /// `-c cmd`: only process X-files whose command matches.
    #[arg(short = 'c')]
    pub only_command: Option<String>,
    /// `-I cfg`: alternate config file.
    #[arg(short = 'I')]
    pub config: Option<PathBuf>,
    /// `-s system`: only process X-files received from this peer.
    #[arg(short = 's')]
    pub only_system: Option<String>,
    /// `-x debug`: enable debug logging.
    #[arg(short = 'x')]
    pub debug: bool,
}

/// `uustat` CLI surface (spec.md §6).
#[derive(Parser, Debug, Default)]
#[command(name = "uustat", about = "Inspect and control the spool queue")]
pub struct UustatArgs {
    /// `-a`: list every queued job.
    #[arg(short = 'a')]
    pub all: bool,
    /// `-B lines`: number of stdin lines to include in kill/query notifications.
    #[arg(short = 'B')]
    pub stdin_lines: Option<usize>,
    /// `-c cmd`: restrict to jobs running this command (positive filter).
    #[arg(short = 'c')]
    pub command: Option<String>,
    /// `-C cmd`: exclude jobs running this command (negative filter).
    #[arg(short = 'C')]
    pub not_command: Option<String>,
    /// `-e`: list execute-file requests only.
    #[arg(short = 'e')]
    pub executing_only: bool,
    /// `-i`: prompt interactively per matched job before kill.
    #[arg(short = 'i')]
    pub interactive: bool,
    /// `-I cfg`: alternate config file.
    #[arg(short = 'I')]
    pub config: Option<PathBuf>,
    /// `-k jobid`: kill exactly this job.
    #[arg(short = 'k')]
    pub kill: Option<String>,
    /// `-K`: kill all jobs matched by the other filters.
    #[arg(short = 'K')]
    pub kill_all_matching: bool,
    /// `-m`: print per-system status summary (machine list).
    #[arg(short = 'm')]
    pub machine_status: bool,
    /// `-M`: mail notifications to the UUCP administrator.
    #[arg(short = 'M')]
    pub mail_admin: bool,
    /// `-N`: mail notifications to the job's requestor.
    #[arg(short = 'N')]
    pub mail_requestor: bool,
    /// `-o hours`: only list jobs older than this many hours.
    #[arg(short = 'o')]
    pub older_than_hours: Option<u64>,
    /// `-p`: show which systems are currently being talked to (lock info).
    #[arg(short = 'p')]
    pub show_locks: bool,
    /// `-q`: print per-system queue-length summary.
    #[arg(short = 'q')]
    pub queue_summary: bool,
    /// `-Q`: same as `-q` but suppress the header (quiet form).
    #[arg(short = 'Q')]
    pub queue_summary_quiet: bool,
    /// `-r jobid`: rejuvenate exactly this job.
    #[arg(short = 'r')]
    pub rejuvenate: Option<String>,
    /// `-s sys`: restrict to jobs destined for this system (positive filter).
    #[arg(short = 's')]
    pub system: Option<String>,
    /// `-S sys`: exclude jobs destined for this system (negative filter).
    #[arg(short = 'S')]
    pub not_system: Option<String>,
    /// `-u usr`: restrict to jobs submitted by this user (positive filter).
    #[arg(short = 'u')]
    pub user: Option<String>,
    /// `-U usr`: exclude jobs submitted by this user (negative filter).
    #[arg(short = 'U')]
    pub not_user: Option<String>,
    /// `-W comment`: free-text comment attached to kill/mail notifications.
    #[arg(short = 'W')]
    pub comment: Option<String>,
    /// `-x debug`: enable debug logging.
    #[arg(short = 'x')]
    pub debug: bool,
    /// `-y hours`: only list jobs younger than this many hours.
    #[arg(short = 'y')]
    pub younger_than_hours: Option<u64>,
}

impl UustatArgs {
    /// Enforces the "at most one of {-a, -k/-r, -m, -p, -q, listing}" rule
    /// from spec.md §6 by counting how many mutually exclusive groups were
    /// requested.
    pub fn option_group_count(&self) -> usize {
        let mut count = 0;
        if self.all {
            count += 1;
        }
        if self.kill.is_some() || self.rejuvenate.is_some() {
            count += 1;
        }
        if self.machine_status {
            count += 1;
        }
        if self.show_locks {
            count += 1;
        }
        if self.queue_summary || self.queue_summary_quiet {
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_group_count_flags_mutually_exclusive_combination() {
        let args = UustatArgs { all: true, machine_status: true, ..Default::default() };
        assert_eq!(args.option_group_count(), 2);
    }

    #[test]
    fn option_group_count_is_zero_for_plain_listing() {
        let args = UustatArgs::default();
        assert_eq!(args.option_group_count(), 0);
    }
}
