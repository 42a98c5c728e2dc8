use anyhow::Result;
use clap::Parser;
use uucp_xqt::cli::UuxArgs;
use uucp_xqt::config::Config;
use uucp_xqt::spool::Spool;
use uucp_xqt::submit::{SubmitOptions, Submitter};

fn main() -> Result<()> {
    let args = UuxArgs::parse();

    let config = Config::load(args.config.as_deref())?;
    uucp_xqt::logging::init_tracing(&config, "uux", args.debug);

    let mut cmdline = args.cmdline.clone();
    let read_stdin = args.read_stdin || cmdline.first().map(|s| s == "-").unwrap_or(false);
    if cmdline.first().map(|s| s == "-").unwrap_or(false) {
        cmdline.remove(0);
    }

    let opts = SubmitOptions {
        grade: args.grade,
        force_copy: args.force_copy,
        no_copy: args.no_copy,
        try_link: args.try_link,
        notify_on_success: args.notify_on_success,
        mail_on_failure_only: args.mail_on_failure_only,
        return_stdin_on_error: args.return_stdin_on_error,
        print_jobid: args.print_jobid,
        no_transport: args.no_transport,
        requestor: args.requestor.clone(),
        status_file: args.status_file.clone(),
        read_stdin,
    };

    let spool = Spool::open(&config)?;
    let mut submitter = Submitter::new(&config, spool);
    match submitter.submit(&cmdline, &opts) {
        Ok(report) => {
            if args.print_jobid {
                if let Some(jobid) = &report.jobid {
                    println!("{jobid}");
                }
            }
            Ok(())
        }
        Err(e) => {
            // spec.md §7: submission errors are fatal and already unwound
            // the abort list; report and exit nonzero without a backtrace.
            eprintln!("uux: {e}");
            std::process::exit(1);
        }
    }
}
