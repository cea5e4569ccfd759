//! Bookkeeping for background processes.

use crate::command::ExitCode;
use crate::error::ShellError;
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt;

/// A child launched with `&`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundJob {
    /// Job number shown to the user, starting at 1.
    pub id: usize,
    pub pid: Pid,
    /// The argument vector the process was launched with.
    pub argv: Vec<String>,
}

impl fmt::Display for BackgroundJob {
    /// The launch notice, e.g. `[1] 4242`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.pid)
    }
}

/// A background job whose process has terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub job: BackgroundJob,
    pub status: WaitStatus,
}

impl Completion {
    pub fn exit_code(&self) -> ExitCode {
        exit_code(self.status)
    }
}

impl fmt::Display for Completion {
    /// The completion notice, e.g. `[1]  Done  sleep 1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.status {
            WaitStatus::Exited(_, 0) => "Done".to_string(),
            WaitStatus::Exited(_, code) => format!("Exit {code}"),
            WaitStatus::Signaled(_, signal, _) => format!("Killed ({signal})"),
            _ => "Done".to_string(),
        };
        write!(f, "[{}]  {}  {}", self.job.id, state, self.job.argv.join(" "))
    }
}

/// Convert a wait status into a shell exit code.
pub fn exit_code(status: WaitStatus) -> ExitCode {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
        _ => 0,
    }
}

/// The live background jobs plus the job-number counter.
///
/// Numbering restarts from 1 whenever the registry becomes empty.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Vec<BackgroundJob>,
    next_id: usize,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pid: Pid, argv: Vec<String>) -> &BackgroundJob {
        self.next_id += 1;
        let job = BackgroundJob {
            id: self.next_id,
            pid,
            argv,
        };
        tracing::debug!(id = job.id, pid = %pid, "background job registered");
        self.jobs.push(job);
        &self.jobs[self.jobs.len() - 1]
    }

    /// Remove a job by number; returns `None` if there is no such job.
    pub fn remove(&mut self, id: usize) -> Option<BackgroundJob> {
        let index = self.jobs.iter().position(|job| job.id == id)?;
        let job = self.jobs.remove(index);
        if self.jobs.is_empty() {
            self.next_id = 0;
        }
        Some(job)
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&BackgroundJob> {
        self.jobs.iter().find(|job| job.pid == pid)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Reap every child that has terminated, without blocking.
    ///
    /// Each reaped pid is looked up and its job removed and returned. A reaped
    /// pid that is not a registered job is logged and dropped.
    pub fn poll(&mut self) -> Result<Vec<Completion>, ShellError> {
        let mut completed = Vec::new();
        loop {
            let status = match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(ShellError::Wait(e)),
                Ok(status) => status,
            };
            if !matches!(status, WaitStatus::Exited(..) | WaitStatus::Signaled(..)) {
                continue;
            }
            let Some(pid) = status.pid() else { continue };
            match self.find_by_pid(pid).map(|job| job.id) {
                Some(id) => {
                    if let Some(job) = self.remove(id) {
                        tracing::debug!(id, pid = %pid, ?status, "background job finished");
                        completed.push(Completion { job, status });
                    }
                }
                None => {
                    tracing::error!(pid = %pid, ?status, "reaped a child that is not a background job");
                }
            }
        }
        Ok(completed)
    }
}
