// End-to-end coverage of spec.md §8 scenario 1: a local file queued for a
// remote `rmail`, with transport disabled so the spool can be inspected
// afterward instead of actually shelling out to `uucico`.

use uucp_xqt::config::Config;
use uucp_xqt::spool::Spool;
use uucp_xqt::submit::{SubmitOptions, Submitter};
use uucp_xqt::system::SystemInfo;

fn test_config(dir: &std::path::Path) -> Config {
    let mut cfg = Config::default();
    cfg.spool_dir = dir.join("spool");
    cfg.lock_dir = cfg.spool_dir.join("locks");
    cfg.local_name = "localhost".to_string();
    cfg.local_alias = "localhost".to_string();
    cfg.systems.push(SystemInfo::bare("peerA"));
    cfg
}

#[test]
fn local_queue_and_send_produces_data_and_execute_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let spool = Spool::open(&cfg).unwrap();

    let body = dir.path().join("body.txt");
    std::fs::write(&body, b"hello world\n").unwrap();

    let mut submitter = Submitter::new(&cfg, spool);
    let mut opts = SubmitOptions::default();
    opts.force_copy = true;
    opts.no_transport = true;

    let report = submitter
        .submit(
            &["peerA!rmail".to_string(), "user@host".to_string(), format!("<{}", body.display())],
            &opts,
        )
        .unwrap();
    assert!(report.jobid.is_some());

    let entries: Vec<String> = std::fs::read_dir(&cfg.spool_dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();

    assert!(entries.iter().any(|n| n.starts_with("D.peerA")), "expected a spooled data file, got {entries:?}");
    assert!(entries.iter().any(|n| n.starts_with("X.peerA")), "expected a spooled execute file, got {entries:?}");
    assert!(entries.iter().any(|n| n.starts_with("C.peerA")), "expected a committed work file, got {entries:?}");

    let work_file = entries.iter().find(|n| n.starts_with("C.peerA")).unwrap();
    let contents = std::fs::read_to_string(cfg.spool_dir.join(work_file)).unwrap();
    assert!(contents.ends_with("H\n"), "work file must end with the H sentinel, got {contents:?}");
    assert_eq!(contents.lines().filter(|l| l.starts_with('S')).count(), 2, "expected one S for the data file and one S for the X-file");
}

#[test]
fn zero_file_bearing_command_produces_no_s_or_f_lines() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let spool = Spool::open(&cfg).unwrap();

    let mut submitter = Submitter::new(&cfg, spool);
    let mut opts = SubmitOptions::default();
    opts.no_transport = true;

    submitter.submit(&["peerA!wc".to_string(), "peerA!/tmp/x".to_string()], &opts).unwrap();

    let entries: Vec<String> =
        std::fs::read_dir(&cfg.spool_dir).unwrap().flatten().map(|e| e.file_name().to_string_lossy().to_string()).collect();
    let work_file = entries.iter().find(|n| n.starts_with("C.peerA")).unwrap();
    let contents = std::fs::read_to_string(cfg.spool_dir.join(work_file)).unwrap();
    assert_eq!(contents.lines().filter(|l| l.starts_with('S')).count(), 1, "only the X-file send command should appear");
    assert!(!entries.iter().any(|n| n.starts_with("D.")), "no data file should be materialized when no argument is file-bearing");
}
