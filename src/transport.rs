use crate::config::Config;
use crate::error::UucpError;

/// A single target for a transport invocation: a specific peer, or "any
/// system with ready work" (spec.md §6's `-r1`).
pub enum TransportTarget<'a> {
    Peer(&'a str),
    AnyReady,
}

/// Capability-typed handle the Submitter calls once a job is ready to move.
/// The actual connection/protocol layer is out of scope (spec.md §1); this
/// trait is the seam spec.md §9's REDESIGN FLAG describes replacing the
/// port function-table dispatch with — the Submitter only ever needs
/// `spawn-transport(peer or any)`.
pub trait Transport {
    fn spawn(&self, target: TransportTarget<'_>) -> Result<(), UucpError>;
}

/// Default implementation: shells out to the configured transport program
/// (normally `uucico`), the same "invoke an external binary with
/// `std::process::Command`" pattern the teacher uses for its SSH client.
pub struct ExternalTransport<'a> {
    config: &'a Config,
}

impl<'a> ExternalTransport<'a> {
    pub fn new(config: &'a Config) -> Self {
        ExternalTransport { config }
    }
}

impl Transport for ExternalTransport<'_> {
    fn spawn(&self, target: TransportTarget<'_>) -> Result<(), UucpError> {
        let mut cmd = std::process::Command::new(&self.config.transport_command);
        match target {
            TransportTarget::Peer(peer) => {
                cmd.args(["-s", peer]);
            }
            TransportTarget::AnyReady => {
                cmd.arg("-r1");
            }
        }
        tracing::info!(command = %self.config.transport_command, "invoking transport");
        match cmd.status() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(UucpError::TransportIo {
                message: format!("transport exited with status {status}"),
                path: None,
            }),
            Err(e) => Err(UucpError::TransportIo { message: e.to_string(), path: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingTransport {
        calls: RefCell<Vec<String>>,
    }

    impl Transport for RecordingTransport {
        fn spawn(&self, target: TransportTarget<'_>) -> Result<(), UucpError> {
            let label = match target {
                TransportTarget::Peer(p) => format!("peer:{p}"),
                TransportTarget::AnyReady => "any".to_string(),
            };
            self.calls.borrow_mut().push(label);
            Ok(())
        }
    }

    #[test]
    fn recording_transport_distinguishes_targets() {
        let t = RecordingTransport { calls: RefCell::new(Vec::new()) };
        t.spawn(TransportTarget::Peer("peerA")).unwrap();
        t.spawn(TransportTarget::AnyReady).unwrap();
        assert_eq!(t.calls.borrow().as_slice(), ["peer:peerA".to_string(), "any".to_string()]);
    }
}
