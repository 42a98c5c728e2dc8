use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::UucpError;

/// Delivers a multi-line notification to a local user or to `peer!user`.
/// Real mail transport is an OS primitive out of scope for this crate
/// (spec.md §1); a local mailbox file under the config directory stands in
/// for `/usr/bin/mail`, and addresses qualified with a peer are appended to
/// an outgoing log instead of actually being carried across the network.
pub struct Mailer {
    mail_dir: PathBuf,
}

impl Mailer {
    pub fn open(config: &Config) -> Result<Mailer, UucpError> {
        let mail_dir = config.spool_dir.join("mail");
        std::fs::create_dir_all(&mail_dir).map_err(|e| UucpError::spool_io_path("opening mail dir", mail_dir.clone(), &e))?;
        Ok(Mailer { mail_dir })
    }

    pub fn send(&self, address: &str, subject: &str, body: &[String]) -> Result<(), UucpError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();

        if let Some((peer, user)) = address.split_once('!') {
            tracing::info!(peer, user, subject, "queuing remote mail notification");
            let path = self.mail_dir.join("outgoing.log");
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| UucpError::spool_io_path("opening outgoing mail log", path.clone(), &e))?;
            writeln!(f, "--- {now} to {peer}!{user}: {subject} ---").map_err(|e| UucpError::spool_io(format!("writing {}", path.display()), &e))?;
            for line in body {
                writeln!(f, "{line}").map_err(|e| UucpError::spool_io(format!("writing {}", path.display()), &e))?;
            }
            return Ok(());
        }

        let path = self.mail_dir.join(format!("{address}.mbox"));
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| UucpError::spool_io_path("opening mailbox", path.clone(), &e))?;
        writeln!(f, "From uucp {now}\nSubject: {subject}").map_err(|e| UucpError::spool_io(format!("writing {}", path.display()), &e))?;
        for line in body {
            writeln!(f, "{line}").map_err(|e| UucpError::spool_io(format!("writing {}", path.display()), &e))?;
        }
        writeln!(f).map_err(|e| UucpError::spool_io(format!("writing {}", path.display()), &e))?;
        tracing::debug!(address, subject, "wrote local mail notification");
        Ok(())
    }
}
