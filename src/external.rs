//! Launching external commands: fork, wire descriptors, exec.

use crate::SHELL_NAME;
use crate::command::{ExitCode, IoPlan, PipeSlot, PipelineSegment, Sink, Source, WriteMode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::jobs;
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::{CStr, CString};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

const STDIN_FILENO: RawFd = 0;
const STDOUT_FILENO: RawFd = 1;

/// Exit status of a child whose program could not be executed.
const EXEC_FAILED: i32 = 126;
/// Exit status of a child whose redirections could not be set up.
const REDIRECT_FAILED: i32 = 1;

#[derive(Debug)]
struct Pipe {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

/// The two alternating pipes of a pipeline, as seen from the shell.
///
/// Descriptors are owned: whatever is dropped here is closed, in the shell
/// and, after a fork, in the child.
#[derive(Debug, Default)]
pub struct PipeSlots {
    slots: [Option<Pipe>; 2],
}

impl PipeSlots {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh pipe in `slot`, closing whatever was left there.
    pub fn open(&mut self, slot: PipeSlot) -> Result<(), ShellError> {
        let (read, write) = unistd::pipe().map_err(ShellError::Pipe)?;
        self.slots[slot.index()] = Some(Pipe {
            read: Some(read),
            write: Some(write),
        });
        Ok(())
    }

    fn read_fd(&self, slot: PipeSlot) -> Option<RawFd> {
        self.slots[slot.index()]
            .as_ref()
            .and_then(|pipe| pipe.read.as_ref())
            .map(AsRawFd::as_raw_fd)
    }

    fn write_fd(&self, slot: PipeSlot) -> Option<RawFd> {
        self.slots[slot.index()]
            .as_ref()
            .and_then(|pipe| pipe.write.as_ref())
            .map(AsRawFd::as_raw_fd)
    }

    /// Whether no pipe descriptor is open any more.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Close every pipe descriptor.
    pub fn close_all(&mut self) {
        self.slots = [None, None];
    }

    /// Parent side after a launch: the pipe the segment read from is done
    /// with entirely, and only the read end of its output pipe is kept, for
    /// the next segment.
    fn release(&mut self, io: &IoPlan) {
        if let Source::Pipe(slot) = io.stdin {
            self.slots[slot.index()] = None;
        }
        if let Sink::Pipe(slot) = io.stdout {
            if let Some(pipe) = self.slots[slot.index()].as_mut() {
                pipe.write = None;
            }
        }
    }
}

/// Everything the child needs, converted before forking so the child does not
/// allocate.
struct Prepared {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    stdin_file: Option<CString>,
    stdout_file: Option<(CString, WriteMode)>,
}

impl Prepared {
    fn new(segment: &PipelineSegment, env: &Environment) -> Result<Self, ShellError> {
        let nul = |_| ShellError::NulByte(segment.name().to_string());
        let argv = segment
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(nul)?;
        let stdin_file = match &segment.io.stdin {
            Source::File(path) => Some(path_to_cstring(path).map_err(nul)?),
            _ => None,
        };
        let stdout_file = match &segment.io.stdout {
            Sink::File { path, mode } => Some((path_to_cstring(path).map_err(nul)?, *mode)),
            _ => None,
        };
        Ok(Self {
            path: path_to_cstring(&segment.path).map_err(nul)?,
            argv,
            envp: env.to_envp().map_err(nul)?,
            stdin_file,
            stdout_file,
        })
    }
}

fn path_to_cstring(path: &Path) -> Result<CString, std::ffi::NulError> {
    CString::new(path.as_os_str().as_bytes())
}

/// Launch one segment and return the child's pid without waiting for it.
///
/// If the segment writes to a pipe, the pipe is created here. On return the
/// shell holds no descriptor the segment uses except the read end of its
/// output pipe, which the next segment will take.
///
/// A failed fork is [`ShellError::Fork`]; a program that cannot be executed
/// only makes the child exit with status 126.
pub fn launch(
    segment: &PipelineSegment,
    env: &Environment,
    pipes: &mut PipeSlots,
) -> Result<Pid, ShellError> {
    let prepared = Prepared::new(segment, env)?;
    if let Sink::Pipe(slot) = segment.io.stdout {
        pipes.open(slot)?;
    }

    // SAFETY: the child only calls async-signal-safe functions (dup2, open,
    // close, execve, write, _exit) on data prepared before the fork, and it
    // never returns into shell code.
    match unsafe { unistd::fork() } {
        Ok(ForkResult::Parent { child }) => {
            tracing::debug!(pid = %child, argv = ?segment.argv, io = ?segment.io, "launched");
            pipes.release(&segment.io);
            Ok(child)
        }
        Ok(ForkResult::Child) => exec_child(&prepared, &segment.io, pipes),
        Err(e) => Err(ShellError::Fork(e)),
    }
}

fn exec_child(prepared: &Prepared, io: &IoPlan, pipes: &mut PipeSlots) -> ! {
    let name = prepared
        .argv
        .first()
        .map(CString::as_c_str)
        .unwrap_or(prepared.path.as_c_str());

    if let Err(e) = wire_descriptors(prepared, io, pipes) {
        child_fail(name, e, REDIRECT_FAILED);
    }
    // Every pipe descriptor has been duplicated where it is needed; close
    // the originals so readers see end-of-file when their writers exit.
    pipes.close_all();

    let Err(e) = unistd::execve(&prepared.path, &prepared.argv, &prepared.envp);
    child_fail(name, e, EXEC_FAILED)
}

fn wire_descriptors(prepared: &Prepared, io: &IoPlan, pipes: &PipeSlots) -> Result<(), Errno> {
    match io.stdin {
        Source::Inherit => {}
        Source::Pipe(slot) => {
            let fd = pipes.read_fd(slot).ok_or(Errno::EBADF)?;
            unistd::dup2(fd, STDIN_FILENO)?;
        }
        Source::File(_) => {
            if let Some(path) = &prepared.stdin_file {
                redirect_file(path, OFlag::O_RDONLY, STDIN_FILENO)?;
            }
        }
    }
    match io.stdout {
        Sink::Inherit => {}
        Sink::Pipe(slot) => {
            let fd = pipes.write_fd(slot).ok_or(Errno::EBADF)?;
            unistd::dup2(fd, STDOUT_FILENO)?;
        }
        Sink::File { .. } => {
            if let Some((path, mode)) = &prepared.stdout_file {
                let flags = match mode {
                    WriteMode::Overwrite => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                    WriteMode::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                };
                redirect_file(path, flags, STDOUT_FILENO)?;
            }
        }
    }
    Ok(())
}

fn redirect_file(path: &CStr, flags: OFlag, target: RawFd) -> Result<(), Errno> {
    let fd = open(path, flags, Mode::from_bits_truncate(0o644))?;
    unistd::dup2(fd, target)?;
    unistd::close(fd)
}

/// Report a launch failure from inside the child and exit without running
/// any of the shell's cleanup.
fn child_fail(name: &CStr, errno: Errno, status: i32) -> ! {
    let stderr = std::io::stderr();
    for part in [
        SHELL_NAME.as_bytes(),
        b": ",
        name.to_bytes(),
        b": ",
        errno.desc().as_bytes(),
        b"\n",
    ] {
        let _ = unistd::write(&stderr, part);
    }
    // SAFETY: _exit ends the process at once, without running the parent's
    // atexit handlers or flushing buffers copied across the fork.
    unsafe { nix::libc::_exit(status) }
}

/// Block until `pid` terminates.
///
/// Returns `None` if the child was already reaped elsewhere.
pub fn wait_for(pid: Pid) -> Result<Option<WaitStatus>, ShellError> {
    loop {
        match waitpid(pid, None) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                return Ok(Some(status));
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return Ok(None),
            Err(e) => return Err(ShellError::Wait(e)),
        }
    }
}

/// Exit code of a finished foreground child.
pub fn status_code(status: Option<WaitStatus>) -> ExitCode {
    status.map(jobs::exit_code).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExecMode;
    use crate::test_support::process_lock;
    use std::fs;
    use std::path::PathBuf;

    fn sh(script: &str, io: IoPlan) -> PipelineSegment {
        PipelineSegment {
            path: PathBuf::from("/bin/sh"),
            argv: vec!["sh".into(), "-c".into(), script.into()],
            io,
            mode: ExecMode::Foreground,
        }
    }

    fn to_file(path: &Path, mode: WriteMode) -> Sink {
        Sink::File {
            path: path.to_path_buf(),
            mode,
        }
    }

    #[test]
    fn exit_status_is_reported() {
        let _lock = process_lock();
        let env = Environment::new();
        let mut pipes = PipeSlots::new();

        let pid = launch(&sh("exit 3", IoPlan::inherit()), &env, &mut pipes).unwrap();
        assert_eq!(status_code(wait_for(pid).unwrap()), 3);
    }

    #[test]
    fn output_redirect_overwrites_then_appends() {
        let _lock = process_lock();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "stale contents\n").unwrap();
        let env = Environment::new();
        let mut pipes = PipeSlots::new();

        let io = IoPlan {
            stdin: Source::Inherit,
            stdout: to_file(&out, WriteMode::Overwrite),
        };
        let pid = launch(&sh("echo one", io), &env, &mut pipes).unwrap();
        wait_for(pid).unwrap();

        let io = IoPlan {
            stdin: Source::Inherit,
            stdout: to_file(&out, WriteMode::Append),
        };
        let pid = launch(&sh("echo two", io), &env, &mut pipes).unwrap();
        wait_for(pid).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn two_segments_share_a_pipe() {
        let _lock = process_lock();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let env = Environment::new();
        let mut pipes = PipeSlots::new();

        let writer = sh(
            "printf 'alpha\\nbeta\\n'",
            IoPlan {
                stdin: Source::Inherit,
                stdout: Sink::Pipe(PipeSlot::A),
            },
        );
        let reader = sh(
            "cat",
            IoPlan {
                stdin: Source::Pipe(PipeSlot::A),
                stdout: to_file(&out, WriteMode::Overwrite),
            },
        );

        let first = launch(&writer, &env, &mut pipes).unwrap();
        assert!(pipes.write_fd(PipeSlot::A).is_none());
        assert!(pipes.read_fd(PipeSlot::A).is_some());

        let second = launch(&reader, &env, &mut pipes).unwrap();
        assert!(pipes.is_empty());

        assert_eq!(status_code(wait_for(first).unwrap()), 0);
        assert_eq!(status_code(wait_for(second).unwrap()), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "alpha\nbeta\n");
    }

    #[test]
    fn input_redirect_reads_a_file() {
        let _lock = process_lock();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        fs::write(&input, "from a file\n").unwrap();
        let env = Environment::new();
        let mut pipes = PipeSlots::new();

        let io = IoPlan {
            stdin: Source::File(input),
            stdout: to_file(&out, WriteMode::Overwrite),
        };
        let pid = launch(&sh("cat", io), &env, &mut pipes).unwrap();
        wait_for(pid).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "from a file\n");
    }

    #[test]
    fn missing_input_file_fails_in_the_child() {
        let _lock = process_lock();
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::new();
        let mut pipes = PipeSlots::new();

        let io = IoPlan {
            stdin: Source::File(dir.path().join("missing")),
            stdout: Sink::Inherit,
        };
        let pid = launch(&sh("cat", io), &env, &mut pipes).unwrap();
        assert_eq!(status_code(wait_for(pid).unwrap()), REDIRECT_FAILED);
    }

    #[test]
    fn non_executable_file_fails_in_the_child() {
        let _lock = process_lock();
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        fs::write(&plain, "not a program").unwrap();
        let env = Environment::new();
        let mut pipes = PipeSlots::new();

        let segment = PipelineSegment {
            path: plain,
            argv: vec!["plain".into()],
            io: IoPlan::inherit(),
            mode: ExecMode::Foreground,
        };
        let pid = launch(&segment, &env, &mut pipes).unwrap();
        assert_eq!(status_code(wait_for(pid).unwrap()), EXEC_FAILED);
    }

    #[test]
    fn environment_is_passed_to_the_child() {
        let _lock = process_lock();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut env = Environment::new();
        env.set_var("QUYSH_TEST_VALUE", "42");
        let mut pipes = PipeSlots::new();

        let io = IoPlan {
            stdin: Source::Inherit,
            stdout: to_file(&out, WriteMode::Overwrite),
        };
        let pid = launch(&sh("echo $QUYSH_TEST_VALUE", io), &env, &mut pipes).unwrap();
        wait_for(pid).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "42\n");
    }

    #[test]
    fn nul_bytes_are_rejected_before_forking() {
        let env = Environment::new();
        let mut pipes = PipeSlots::new();
        let err = launch(&sh("echo \0", IoPlan::inherit()), &env, &mut pipes).unwrap_err();
        assert!(matches!(err, ShellError::NulByte(name) if name == "sh"));
    }
}
