use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use uucp_xqt::cli::UustatArgs;
use uucp_xqt::config::Config;
use uucp_xqt::inspector::{Inspector, JobFilter};
use uucp_xqt::spool::Spool;

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

/// The spec leaves "administrator" undefined beyond "non-administrator
/// users may only kill jobs they own" (spec.md §4.6); we treat the process
/// owner matching `root` as the administrator, the same notion the teacher
/// uses for privileged local operations.
fn is_admin(user: &str) -> bool {
    user == "root"
}

fn build_filter(args: &UustatArgs) -> JobFilter {
    JobFilter {
        system: args.system.clone(),
        not_system: args.not_system.clone(),
        user: args.user.clone(),
        not_user: args.not_user.clone(),
        command: args.command.clone(),
        not_command: args.not_command.clone(),
        older_than: args.older_than_hours.map(|h| Duration::from_secs(h * 3600)),
        younger_than: args.younger_than_hours.map(|h| Duration::from_secs(h * 3600)),
        executing_only: args.executing_only,
    }
}

fn confirm(prompt: &str) -> bool {
    use std::io::Write as _;
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

fn main() -> Result<()> {
    let args = UustatArgs::parse();

    if args.option_group_count() > 1 {
        eprintln!("uustat: Too many options");
        std::process::exit(1);
    }

    let config = Config::load(args.config.as_deref())?;
    uucp_xqt::logging::init_tracing(&config, "uustat", args.debug);

    let spool = Spool::open(&config)?;
    let inspector = Inspector::new(&config, spool)?;

    let user = current_user();
    let admin = is_admin(&user);
    let mut exit_code = 0;

    if let Some(jobid) = &args.kill {
        match inspector.kill(jobid, &user, admin) {
            Ok(()) => {}
            Err(e) => {
                eprintln!("uustat: {e}");
                exit_code = 1;
            }
        }
    } else if let Some(jobid) = &args.rejuvenate {
        match inspector.rejuvenate(jobid, &user, admin) {
            Ok(()) => {}
            Err(e) => {
                eprintln!("uustat: {e}");
                exit_code = 1;
            }
        }
    } else if args.kill_all_matching {
        let filter = build_filter(&args);
        match inspector.list_jobs(&filter) {
            Ok(jobs) => {
                for view in jobs {
                    if args.interactive && !confirm(&format!("Kill job {}?", view.job.jobid)) {
                        continue;
                    }
                    if let Err(e) = inspector.kill(&view.job.jobid, &user, admin) {
                        eprintln!("uustat: {e}");
                        exit_code = 1;
                        continue;
                    }
                    if args.mail_admin || args.mail_requestor {
                        let _ = inspector.notify(&view.job, args.mail_admin, args.mail_requestor, args.comment.as_deref(), args.stdin_lines);
                    }
                }
            }
            Err(e) => {
                eprintln!("uustat: {e}");
                exit_code = 1;
            }
        }
    } else if args.machine_status || args.queue_summary || args.queue_summary_quiet {
        match inspector.queue_summary() {
            Ok(summaries) => {
                if !args.queue_summary_quiet {
                    println!("system    C (age)           X (age)           last call         status");
                }
                for s in summaries {
                    println!("{}", s.render());
                }
            }
            Err(e) => {
                eprintln!("uustat: {e}");
                exit_code = 1;
            }
        }
    } else if args.show_locks {
        match std::fs::read_dir(&config.lock_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if let Some(peer) = name.strip_prefix("LCK.") {
                        println!("{peer}: locked");
                    }
                }
            }
            Err(e) => {
                eprintln!("uustat: {e}");
                exit_code = 1;
            }
        }
    } else {
        // Default listing form, also covers `-a`.
        let filter = build_filter(&args);
        match inspector.list_jobs(&filter) {
            Ok(jobs) => {
                for view in jobs {
                    println!("{} {} {}", view.job.jobid, uucp_xqt::inspector::format_age(view.age), view.description);
                }
            }
            Err(e) => {
                eprintln!("uustat: {e}");
                exit_code = 1;
            }
        }
    }

    std::process::exit(exit_code);
}
