// End-to-end coverage of spec.md §8 scenario 5: killing a job you own
// succeeds and removes it from later listings; killing someone else's job
// is rejected and leaves the spool untouched.

use uucp_xqt::config::Config;
use uucp_xqt::inspector::{Inspector, JobFilter};
use uucp_xqt::spool::Spool;
use uucp_xqt::UucpError;

fn test_config(dir: &std::path::Path) -> Config {
    let mut cfg = Config::default();
    cfg.spool_dir = dir.join("spool");
    cfg.lock_dir = cfg.spool_dir.join("locks");
    cfg
}

fn queue_one_job(cfg: &Config, spool: &mut Spool, owner: &str) -> String {
    let alloc = spool.new_data_name("peerA", 'N').unwrap();
    let final_path = spool.commit_work_file(&alloc.tname, "peerA", 'N', &alloc.seq).unwrap();
    std::fs::write(&final_path, format!("S a b {owner} C \"\" 0666 \"\"\nH\n")).unwrap();
    let _ = cfg;
    spool.jobid_for("peerA", 'N', &alloc.seq)
}

#[test]
fn owner_can_kill_their_own_job() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let mut spool = Spool::open(&cfg).unwrap();
    let jobid = queue_one_job(&cfg, &mut spool, "alice");

    let inspector = Inspector::new(&cfg, spool).unwrap();
    assert_eq!(inspector.list_jobs(&JobFilter::default()).unwrap().len(), 1);

    inspector.kill(&jobid, "alice", false).unwrap();
    assert!(inspector.list_jobs(&JobFilter::default()).unwrap().is_empty());
}

#[test]
fn non_owner_kill_is_rejected_and_job_survives() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let mut spool = Spool::open(&cfg).unwrap();
    let jobid = queue_one_job(&cfg, &mut spool, "alice");

    let inspector = Inspector::new(&cfg, spool).unwrap();
    let err = inspector.kill(&jobid, "bob", false).unwrap_err();
    assert!(matches!(err, UucpError::Permission { .. }));
    assert_eq!(inspector.list_jobs(&JobFilter::default()).unwrap().len(), 1, "job must remain queued after a rejected kill");
}

#[test]
fn administrator_can_kill_jobs_they_do_not_own() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let mut spool = Spool::open(&cfg).unwrap();
    let jobid = queue_one_job(&cfg, &mut spool, "alice");

    let inspector = Inspector::new(&cfg, spool).unwrap();
    inspector.kill(&jobid, "root", true).unwrap();
    assert!(inspector.list_jobs(&JobFilter::default()).unwrap().is_empty());
}
