use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Children killed by a signal are reported as `128 + signal`, as POSIX
/// shells do.
pub type ExitCode = i32;

/// What the interactive loop should do after a command line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// `exit` was run: the session is over.
    Exit,
}

/// One of the two pipe positions a pipeline alternates between.
///
/// Segment N writes the slot that segment N+1 reads, and that slot is never
/// the one segment N reads itself, so two fixed slots are enough for a chain
/// of any length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeSlot {
    A,
    B,
}

impl PipeSlot {
    pub fn other(self) -> Self {
        match self {
            PipeSlot::A => PipeSlot::B,
            PipeSlot::B => PipeSlot::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            PipeSlot::A => 0,
            PipeSlot::B => 1,
        }
    }
}

/// Where a segment's standard input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The shell's own standard input.
    Inherit,
    /// The read end of the pipe in the given slot.
    Pipe(PipeSlot),
    /// A file opened read-only (`< file`).
    File(PathBuf),
}

/// How an output file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `>`: truncate.
    Overwrite,
    /// `>>`: append.
    Append,
}

/// Where a segment's standard output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// The shell's own standard output.
    Inherit,
    /// The write end of the pipe in the given slot.
    Pipe(PipeSlot),
    /// A file, created if missing.
    File { path: PathBuf, mode: WriteMode },
}

/// The descriptor wiring of one segment.
///
/// The launcher's only rule is: wire what is named here, close every other
/// pipe descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoPlan {
    pub stdin: Source,
    pub stdout: Sink,
}

impl IoPlan {
    pub fn inherit() -> Self {
        Self {
            stdin: Source::Inherit,
            stdout: Sink::Inherit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Foreground,
    Background,
}

/// One external command of a pipeline, resolved and ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSegment {
    /// Executable found on the search path.
    pub path: PathBuf,
    /// Argument vector; `argv[0]` is the command name as typed.
    pub argv: Vec<String>,
    pub io: IoPlan,
    pub mode: ExecMode,
}

impl PipelineSegment {
    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Whether this is the last segment of its pipeline, i.e. its output
    /// does not feed another segment.
    pub fn ends_pipeline(&self) -> bool {
        !matches!(self.io.stdout, Sink::Pipe(_))
    }
}
