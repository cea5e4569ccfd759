use crate::SHELL_NAME;
use crate::command::{ExecMode, Flow, PipelineSegment};
use crate::config::Config;
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::{self, PipeSlots};
use crate::jobs::JobRegistry;
use crate::lexer;
use crate::parser::{Parser, Stage};
use crate::search::SearchPath;
use nix::unistd::Pid;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;

/// The interactive shell.
///
/// Owns the environment, the search path (built once) and the background job
/// registry, and threads them through parsing and launching.
///
/// Example
/// ```no_run
/// use quysh::{Config, Interpreter};
/// let mut sh = Interpreter::new(Config::default());
/// sh.repl().unwrap();
/// ```
pub struct Interpreter {
    env: Environment,
    search_path: SearchPath,
    jobs: JobRegistry,
    config: Config,
}

/// Launched but not yet waited for: the foreground segments of the pipeline
/// being built, plus the pipes connecting them.
#[derive(Default)]
struct PipelineRun {
    pipes: PipeSlots,
    pending: Vec<(Pid, Vec<String>)>,
}

impl Interpreter {
    /// Create an interpreter from the current process environment.
    pub fn new(config: Config) -> Self {
        let env = Environment::new();
        let search_path = SearchPath::from_env(&env);
        Self::with_parts(env, search_path, config)
    }

    pub fn with_parts(env: Environment, search_path: SearchPath, config: Config) -> Self {
        Self {
            env,
            search_path,
            jobs: JobRegistry::new(),
            config,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// The read-eval loop: report finished jobs, prompt, run the line.
    ///
    /// Returns on `exit` or end of input. Errors are fatal ones only; every
    /// user error has already been reported.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;
        let mut stdout = std::io::stdout();

        loop {
            self.report_completions(&mut stdout)?;
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    if self.process_line(&line, &mut stdout)? == Flow::Exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    tracing::debug!("end of input");
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    /// Run a single command line without prompting, as for `quysh -c`.
    pub fn run_once(&mut self, line: &str) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout();
        self.process_line(line, &mut stdout)?;
        self.report_completions(&mut stdout)?;
        Ok(())
    }

    pub fn prompt(&self) -> String {
        let user = self.env.get_var("USER").unwrap_or_else(|| "user".to_string());
        format!(
            "{}@{}:{} > ",
            user,
            SHELL_NAME,
            self.env.current_dir.display()
        )
    }

    /// Print a notice for every background job that has finished.
    pub fn report_completions(&mut self, out: &mut dyn Write) -> Result<(), ShellError> {
        match self.jobs.poll() {
            Ok(completed) => {
                for completion in completed {
                    writeln!(out, "{completion}")?;
                }
            }
            Err(e) => report(out, &e)?,
        }
        out.flush()?;
        Ok(())
    }

    /// Tokenize, parse and run one command line.
    ///
    /// User errors are written to `out` and the line is abandoned at that
    /// point. `Err` is returned only for fatal errors.
    pub fn process_line(&mut self, line: &str, out: &mut dyn Write) -> Result<Flow, ShellError> {
        let tokens = match lexer::split_into_tokens(line) {
            Ok(tokens) => tokens,
            Err(e) => {
                report(out, &e.into())?;
                return Ok(Flow::Continue);
            }
        };

        let mut run = PipelineRun::default();
        let result = self.run_stages(&tokens, &mut run, out);

        // Whatever stopped the line, nothing may be left half-connected.
        run.pipes.close_all();
        let drained = self.wait_pending(&mut run, out);

        let flow = match result {
            Ok(flow) => flow,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                report(out, &e)?;
                Flow::Continue
            }
        };
        if let Err(e) = drained {
            if e.is_fatal() {
                return Err(e);
            }
            report(out, &e)?;
        }
        out.flush()?;
        Ok(flow)
    }

    fn run_stages(
        &mut self,
        tokens: &[lexer::Token],
        run: &mut PipelineRun,
        out: &mut dyn Write,
    ) -> Result<Flow, ShellError> {
        let mut parser = Parser::new(tokens);
        while let Some(stage) = parser.next_stage(&self.env, &self.search_path) {
            match stage? {
                Stage::Builtin(builtin) => {
                    let name = builtin.name().to_string();
                    match builtin.run(out, &mut self.env) {
                        Ok(Flow::Exit) => return Ok(Flow::Exit),
                        Ok(Flow::Continue) => {}
                        Err(e) => writeln!(out, "{SHELL_NAME}: {name}: {e:#}")?,
                    }
                }
                Stage::Segment(segment) => self.run_segment(segment, run, out)?,
            }
        }
        Ok(Flow::Continue)
    }

    fn run_segment(
        &mut self,
        segment: PipelineSegment,
        run: &mut PipelineRun,
        out: &mut dyn Write,
    ) -> Result<(), ShellError> {
        // Anything still buffered would otherwise show up after the child's output.
        out.flush()?;
        let pid = external::launch(&segment, &self.env, &mut run.pipes)?;

        match segment.mode {
            ExecMode::Background => {
                // Upstream segments of a background pipeline are not waited
                // for either; track them so they are reaped and reported.
                for (pid, argv) in run.pending.drain(..) {
                    writeln!(out, "{}", self.jobs.add(pid, argv))?;
                }
                writeln!(out, "{}", self.jobs.add(pid, segment.argv))?;
            }
            ExecMode::Foreground => {
                let ends_pipeline = segment.ends_pipeline();
                run.pending.push((pid, segment.argv));
                if ends_pipeline {
                    self.wait_pending(run, out)?;
                }
            }
        }
        Ok(())
    }

    /// Wait for every launched foreground segment, in launch order.
    fn wait_pending(&mut self, run: &mut PipelineRun, out: &mut dyn Write) -> Result<(), ShellError> {
        for (pid, argv) in run.pending.drain(..) {
            let status = external::wait_for(pid)?;
            let code = external::status_code(status);
            tracing::debug!(pid = %pid, code, "foreground command finished");
            if self.config.verbose {
                let name = argv.first().map(String::as_str).unwrap_or_default();
                writeln!(out, "{SHELL_NAME}: [{pid}] {name} exited with status {code}")?;
            }
        }
        Ok(())
    }
}

fn report(out: &mut dyn Write, err: &ShellError) -> Result<(), ShellError> {
    tracing::debug!(error = %err, "command line failed");
    writeln!(out, "{SHELL_NAME}: {err}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> Interpreter {
        Interpreter::with_parts(
            Environment::empty("/"),
            SearchPath::default(),
            Config::default(),
        )
    }

    fn run(sh: &mut Interpreter, line: &str) -> (Flow, String) {
        let mut out = Vec::new();
        let flow = sh.process_line(line, &mut out).unwrap();
        (flow, String::from_utf8(out).unwrap())
    }

    #[test]
    fn blank_lines_are_a_no_op() {
        let mut sh = interpreter();
        assert_eq!(run(&mut sh, ""), (Flow::Continue, String::new()));
        assert_eq!(run(&mut sh, " \t "), (Flow::Continue, String::new()));
    }

    #[test]
    fn exit_ends_the_session_and_skips_the_rest() {
        let mut sh = interpreter();
        let (flow, out) = run(&mut sh, "exit ; print");
        assert_eq!(flow, Flow::Exit);
        assert!(out.is_empty());
    }

    #[test]
    fn set_then_expand() {
        let mut sh = interpreter();
        let (_, out) = run(&mut sh, "set COLOR blue ; print COLOR ; set ALIAS $COLOR ; print ALIAS");
        assert_eq!(out, "blue\nblue\n");
    }

    #[test]
    fn builtin_errors_are_prefixed() {
        let mut sh = interpreter();
        let (flow, out) = run(&mut sh, "set ONLY");
        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, "quysh: set: usage: set <name> <value>\n");
    }

    #[test]
    fn user_errors_are_reported() {
        let mut sh = interpreter();
        assert_eq!(run(&mut sh, "nosuchcmd").1, "quysh: nosuchcmd: command not found\n");
        assert_eq!(
            run(&mut sh, "| print").1,
            "quysh: syntax error near unexpected token `|'\n"
        );
        assert_eq!(run(&mut sh, "print \"oops").1, "quysh: syntax error: unterminated quote\n");
    }

    #[test]
    fn prompt_shows_user_and_directory() {
        let mut env = Environment::empty("/srv");
        env.set_var("USER", "quy");
        let sh = Interpreter::with_parts(env, SearchPath::default(), Config::default());
        assert_eq!(sh.prompt(), "quy@quysh:/srv > ");
    }
}
