use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::UucpError;
use crate::workfile::WorkCommand;

/// `is_spool_file` — matches the two-character prefix grammar from
/// spec.md §6, independent of how the rest of the name is shaped.
pub fn is_spool_file(name: &str) -> bool {
    static PREFIX: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"^[CDX]\.").unwrap()).is_match(name)
}

const SEQ_LEN: usize = 4;
const SEQ_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One allocated `(tname, dname, xname)` triplet, per spec.md §4.1.
#[derive(Debug, Clone)]
pub struct AllocatedNames {
    /// Path to write bytes to while the submission is in progress.
    pub tname: PathBuf,
    /// The name the peer will see this content under, once sent as `D.`.
    pub dname: String,
    /// The name this same slot would carry if sent instead as an X-file.
    pub xname: String,
    pub seq: String,
}

/// Converts between `(peer, job)` tuples and files on disk. The sole
/// mutator of spool state; every other component reaches the filesystem
/// through a `Spool`.
pub struct Spool {
    dir: PathBuf,
    counter: u64,
}

impl Spool {
    pub fn open(config: &Config) -> Result<Spool, UucpError> {
        std::fs::create_dir_all(&config.spool_dir)
            .map_err(|e| UucpError::spool_io_path("opening spool", config.spool_dir.clone(), &e))?;
        Ok(Spool { dir: config.spool_dir.clone(), counter: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_seq(&mut self) -> String {
        self.counter += 1;
        let mut n = self.counter;
        let mut buf = [0u8; SEQ_LEN];
        for slot in buf.iter_mut().rev() {
            *slot = SEQ_ALPHABET[(n % SEQ_ALPHABET.len() as u64) as usize];
            n /= SEQ_ALPHABET.len() as u64;
        }
        String::from_utf8(buf.to_vec()).unwrap()
    }

    /// Allocates a unique `(tname, dname, xname)` triplet for `peer` at
    /// `grade`. Uniqueness is guaranteed by `create_new` on `tname`, not by
    /// the in-process counter alone (spec.md §4.1: "collision-free against
    /// concurrent submitters via file-create-exclusive").
    pub fn new_data_name(&mut self, peer: &str, grade: char) -> Result<AllocatedNames, UucpError> {
        loop {
            let seq = self.next_seq();
            let dname = format!("D.{peer}{grade}{seq}");
            let xname = format!("X.{peer}{grade}{seq}");
            let tname = self.dir.join(format!("TM.{peer}{grade}{seq}"));
            match OpenOptions::new().write(true).create_new(true).open(&tname) {
                Ok(_) => return Ok(AllocatedNames { tname, dname, xname, seq }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(UucpError::spool_io_path("allocating data file", tname, &e)),
            }
        }
    }

    /// Allocates a unique temp path to accumulate one peer's work-file
    /// lines into before `commit_work_file` renames it into place.
    pub fn new_work_tmp(&mut self, peer: &str, grade: char) -> Result<(PathBuf, String), UucpError> {
        loop {
            let seq = self.next_seq();
            let tname = self.dir.join(format!("TW.{peer}{grade}{seq}"));
            match OpenOptions::new().write(true).create_new(true).open(&tname) {
                Ok(_) => return Ok((tname, seq)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(UucpError::spool_io_path("allocating work file", tname, &e)),
            }
        }
    }

    /// Allocates a path for a locally-executable X-file, named
    /// `X.<localname><seq>` per spec.md §4.1.
    pub fn xqt_name(&mut self, local_name: &str, grade: char) -> PathBuf {
        let seq = self.next_seq();
        self.dir.join(format!("X.{local_name}{grade}{seq}"))
    }

    /// Renames a temp work file into its final `C.<peer><grade><seq>` name,
    /// atomically (spec.md §4.2).
    pub fn commit_work_file(&self, tmp_path: &Path, peer: &str, grade: char, seq: &str) -> Result<PathBuf, UucpError> {
        let final_path = self.dir.join(format!("C.{peer}{grade}{seq}"));
        std::fs::rename(tmp_path, &final_path)
            .map_err(|e| UucpError::spool_io_path("committing work file", final_path.clone(), &e))?;
        Ok(final_path)
    }

    /// Finite, non-restartable iterator over all X-files currently in the
    /// spool, each paired with the peer encoded in its name.
    pub fn list_xfiles(&self) -> Vec<(PathBuf, String)> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1).into_iter().flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(rest) = name.strip_prefix("X.") {
                if rest.len() > SEQ_LEN {
                    let peer = rest[..rest.len() - SEQ_LEN - 1].to_string();
                    out.push((entry.path().to_path_buf(), peer));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Streams all `WorkCommand`s from all `peer`'s work files with grade
    /// `<=  min_grade`, in filename order, each file's lines followed by a
    /// sentinel `H`. Lines sharing a job-id appear contiguously because they
    /// originate from the same work file.
    pub fn list_work(&self, peer: &str, min_grade: char) -> Result<Vec<WorkCommand>, UucpError> {
        let mut files: Vec<(char, String, PathBuf)> = Vec::new();
        let prefix = format!("C.{peer}");
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1).into_iter().flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(rest) = name.strip_prefix(&prefix) {
                if rest.len() >= SEQ_LEN + 1 {
                    let grade = rest.chars().next().unwrap();
                    if grade <= min_grade {
                        files.push((grade, name.clone(), entry.path().to_path_buf()));
                    }
                }
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut out = Vec::new();
        for (_, _, path) in files {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| UucpError::spool_io_path("reading work file", path.clone(), &e))?;
            for line in contents.lines() {
                let cmd = WorkCommand::parse(line)?;
                let is_sentinel = matches!(cmd, WorkCommand::H);
                out.push(cmd);
                if is_sentinel {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Job id recovered from a work/execute file's own name: peer plus the
    /// grade+sequence tail (spec.md §9: "the only back-reference is the
    /// jobid string recovered from filenames").
    pub fn jobid_for(&self, peer: &str, grade: char, seq: &str) -> String {
        format!("{peer}.{grade}{seq}")
    }

    pub fn locate(&self, jobid: &str) -> Result<(String, Vec<PathBuf>), UucpError> {
        let (peer, tail) = jobid
            .split_once('.')
            .ok_or_else(|| UucpError::not_found(format!("malformed jobid {jobid}")))?;
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1).into_iter().flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.len() >= 2 && is_spool_file(&name) {
                let body = &name[2..];
                if let Some(rest) = body.strip_prefix(peer) {
                    if rest == tail {
                        files.push(entry.path().to_path_buf());
                    }
                }
            }
        }
        if files.is_empty() {
            return Err(UucpError::not_found(format!("jobid {jobid}")));
        }
        Ok((peer.to_string(), files))
    }

    pub fn remove_job(&self, jobid: &str) -> Result<(), UucpError> {
        let (_, files) = self.locate(jobid)?;
        for f in files {
            std::fs::remove_file(&f).map_err(|e| UucpError::spool_io_path("removing job file", f, &e))?;
        }
        Ok(())
    }

    /// Rejuvenates a job by resetting every constituent file's mtime to
    /// now. `std` exposes no portable mtime setter, so we approximate by
    /// rewriting each file's bytes in place, which updates mtime as a side
    /// effect.
    pub fn touch_job(&self, jobid: &str) -> Result<(), UucpError> {
        let (_, files) = self.locate(jobid)?;
        for f in files {
            let contents = std::fs::read(&f).map_err(|e| UucpError::spool_io_path("touching job file", f.clone(), &e))?;
            let mut file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&f)
                .map_err(|e| UucpError::spool_io_path("touching job file", f.clone(), &e))?;
            file.write_all(&contents).map_err(|e| UucpError::spool_io_path("touching job file", f, &e))?;
        }
        Ok(())
    }

    /// Finite listing of every work (`C.`) file in the spool, decomposed
    /// into `(path, peer, grade, seq)`. One `C.` file is one job (spec.md
    /// §4.1: "the jobid is derived from the source filename"), so this is
    /// the enumeration `Inspector` groups into jobs.
    pub fn list_command_files(&self) -> Vec<(PathBuf, String, char, String)> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1).into_iter().flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(rest) = name.strip_prefix("C.") {
                if rest.len() > SEQ_LEN {
                    let split = rest.len() - SEQ_LEN;
                    let peer = rest[..split - 1].to_string();
                    let grade = rest[split - 1..split].chars().next().unwrap();
                    let seq = rest[split..].to_string();
                    out.push((entry.path().to_path_buf(), peer, grade, seq));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn file_time(&self, path: &Path) -> Result<SystemTime, UucpError> {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| UucpError::spool_io_path("reading mtime", path.to_path_buf(), &e))
    }

    pub fn size(&self, path: &Path) -> Result<u64, UucpError> {
        std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| UucpError::spool_io_path("reading size", path.to_path_buf(), &e))
    }
}
