//! Launcher bootstrap
//!
//! A launched bundle verifies itself and stages a per-executable cache
//! before handing off to the payload: self-locate, read the footer, verify
//! the signature with the embedded key, stage the working environment, and
//! dispatch. Staging is one-shot per unique binary: the `.complete`
//! sentinel holds the SHA-256 of the executable that staged the cache.

pub mod dispatch;
pub mod staging;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::constants::CACHE_PRODUCT_DIR;
use super::crypto::sha256_file;
use crate::exceptions::{PspfError, Result};
use crate::logger::Logbowl;
use crate::utils::user_cache_dir;

/// Sentinel holding the SHA-256 of the executable that staged the cache
pub(crate) const COMPLETE_FILE: &str = ".complete";

/// Advisory lock taken around staging; holds the staging process PID
pub(crate) const LOCK_FILE: &str = ".lock";

pub(crate) const METADATA_DIR: &str = "metadata_extracted";
pub(crate) const PAYLOAD_DIR: &str = "payload_extracted";
pub(crate) const RUNTIME_DIR: &str = "runtime";
pub(crate) const VENV_DIR: &str = ".venv";

/// How long a launcher waits on another process's staging lock
const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the full launch flow for `exe_path` (normally the current
/// executable). Returns the payload's exit code.
pub fn launch(exe_path: &Path, log: &Logbowl) -> Result<i32> {
    let work_dir = work_dir_for(exe_path)?;
    fs::create_dir_all(&work_dir)?;

    let current_hash = sha256_file(exe_path)?;
    let complete_path = work_dir.join(COMPLETE_FILE);

    if cache_is_valid(&complete_path, &current_hash) {
        log.info(
            "env",
            "validate",
            "ok",
            "Cache is valid, reusing existing environment",
            &[],
        );
    } else {
        log.info(
            "env",
            "init",
            "progress",
            "Cache invalid or not found. Starting one-time environment setup",
            &[("workdir", work_dir.display().to_string())],
        );

        let _lock = StagingLock::acquire(&work_dir, log)?;

        // Another launcher may have finished staging while we waited on
        // the lock.
        if cache_is_valid(&complete_path, &current_hash) {
            log.info(
                "env",
                "validate",
                "ok",
                "Environment staged by another process",
                &[],
            );
        } else {
            staging::setup_environment(exe_path, &work_dir, log)?;
            fs::write(&complete_path, current_hash.as_bytes())?;
            log.info(
                "env",
                "finish",
                "ok",
                "One-time environment setup complete",
                &[],
            );
        }
    }

    dispatch::execute_payload(&work_dir, log)
}

/// Per-executable staging cache: `<user_cache>/<product>/providers/<exe>`
pub fn work_dir_for(exe_path: &Path) -> Result<PathBuf> {
    let exe_name = exe_path
        .file_name()
        .ok_or_else(|| PspfError::Generic(format!("invalid executable path: {}", exe_path.display())))?;
    Ok(user_cache_dir()
        .join(CACHE_PRODUCT_DIR)
        .join("providers")
        .join(exe_name))
}

fn cache_is_valid(complete_path: &Path, current_hash: &str) -> bool {
    match fs::read_to_string(complete_path) {
        Ok(cached) => cached == current_hash,
        Err(_) => false,
    }
}

/// PID-file advisory lock over the staging steps. A lock owned by a dead
/// process is treated as stale and removed.
#[derive(Debug)]
struct StagingLock {
    path: PathBuf,
}

impl StagingLock {
    fn acquire(work_dir: &Path, log: &Logbowl) -> Result<Self> {
        let path = work_dir.join(LOCK_FILE);
        let pid = std::process::id();
        let started = Instant::now();

        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{pid}")?;
                    return Ok(StagingLock { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if remove_if_stale(&path, log)? {
                        continue;
                    }
                    if started.elapsed() > LOCK_WAIT_TIMEOUT {
                        return Err(PspfError::Generic(
                            "timeout waiting for staging lock held by another process".to_string(),
                        ));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Remove the lock file if its owner is gone. Returns true when removed.
fn remove_if_stale(lock_path: &Path, log: &Logbowl) -> Result<bool> {
    let contents = match fs::read_to_string(lock_path) {
        Ok(contents) => contents,
        // Raced with the holder's release
        Err(_) => return Ok(true),
    };

    match contents.trim().parse::<u32>() {
        Ok(owner_pid) if is_process_running(owner_pid) => Ok(false),
        Ok(owner_pid) => {
            log.info(
                "env",
                "clean",
                "ok",
                "Removing stale staging lock from dead process",
                &[("pid", owner_pid.to_string())],
            );
            let _ = fs::remove_file(lock_path);
            Ok(true)
        }
        Err(_) => {
            log.warn(
                "env",
                "clean",
                "warning",
                "Removing unreadable staging lock",
                &[],
            );
            let _ = fs::remove_file(lock_path);
            Ok(true)
        }
    }
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet_log() -> Logbowl {
        Logbowl::create("test-launcher")
    }

    #[test]
    fn work_dir_is_keyed_by_executable_name() {
        let dir = work_dir_for(Path::new("/opt/bin/my-provider")).unwrap();
        assert!(dir.ends_with("pyvider/providers/my-provider"));
    }

    #[test]
    fn sentinel_must_match_exactly() {
        let dir = TempDir::new().unwrap();
        let complete = dir.path().join(COMPLETE_FILE);

        assert!(!cache_is_valid(&complete, "abc123"));
        fs::write(&complete, "abc123").unwrap();
        assert!(cache_is_valid(&complete, "abc123"));
        assert!(!cache_is_valid(&complete, "abc124"));
        // A trailing newline invalidates the sentinel
        fs::write(&complete, "abc123\n").unwrap();
        assert!(!cache_is_valid(&complete, "abc123"));
    }

    #[test]
    fn lock_acquire_release_roundtrip() {
        let dir = TempDir::new().unwrap();
        let log = quiet_log();

        let lock = StagingLock::acquire(dir.path(), &log).unwrap();
        assert!(dir.path().join(LOCK_FILE).exists());
        drop(lock);
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let log = quiet_log();

        // PID 0 never names a live peer process.
        fs::write(dir.path().join(LOCK_FILE), "0\n").unwrap();
        let lock = StagingLock::acquire(dir.path(), &log).unwrap();
        drop(lock);

        fs::write(dir.path().join(LOCK_FILE), "not a pid").unwrap();
        let lock = StagingLock::acquire(dir.path(), &log).unwrap();
        drop(lock);
    }
}
