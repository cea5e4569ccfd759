use crate::command::Flow;
use crate::env::Environment;
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;

/// Names the shell interprets itself. They win over any executable of the
/// same name on the search path.
pub const BUILTIN_NAMES: &[&str] = &[Cd::NAME, Set::NAME, Exit::NAME, Print::NAME];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "set" or "cd".
    const NAME: &'static str;

    /// Executes the command against the shell environment.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<Flow>;
}

/// A parsed built-in invocation.
#[derive(Debug, PartialEq)]
pub enum Builtin {
    Cd(Cd),
    Set(Set),
    Exit(Exit),
    Print(Print),
    /// argh stopped early: `--help`, or arguments it could not parse.
    EarlyExit {
        name: String,
        output: String,
        is_error: bool,
    },
}

impl Builtin {
    /// Parse `name args...`; `None` if `name` is not a built-in.
    pub fn parse(name: &str, args: &[String]) -> Option<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let builtin = match name {
            Cd::NAME => parse_with(name, &args, Builtin::Cd),
            Set::NAME => parse_with(name, &args, Builtin::Set),
            Exit::NAME => parse_with(name, &args, Builtin::Exit),
            Print::NAME => parse_with(name, &args, Builtin::Print),
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(&self) -> &str {
        match self {
            Builtin::Cd(_) => Cd::NAME,
            Builtin::Set(_) => Set::NAME,
            Builtin::Exit(_) => Exit::NAME,
            Builtin::Print(_) => Print::NAME,
            Builtin::EarlyExit { name, .. } => name,
        }
    }

    /// Run the built-in. Errors are user errors: the caller reports them and
    /// keeps going.
    pub fn run(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<Flow> {
        match self {
            Builtin::Cd(cmd) => cmd.execute(stdout, env),
            Builtin::Set(cmd) => cmd.execute(stdout, env),
            Builtin::Exit(cmd) => cmd.execute(stdout, env),
            Builtin::Print(cmd) => cmd.execute(stdout, env),
            Builtin::EarlyExit {
                output, is_error, ..
            } => {
                if is_error {
                    return Err(anyhow!("{}", output.trim_end()));
                }
                writeln!(stdout, "{}", output.trim_end())?;
                Ok(Flow::Continue)
            }
        }
    }
}

fn parse_with<T: BuiltinCommand>(name: &str, args: &[&str], wrap: fn(T) -> Builtin) -> Builtin {
    match T::from_args(&[name], args) {
        Ok(cmd) => wrap(cmd),
        Err(EarlyExit { output, status }) => Builtin::EarlyExit {
            name: name.to_string(),
            output,
            is_error: status.is_err(),
        },
    }
}

#[derive(FromArgs, Debug, PartialEq)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub dirs: Vec<String>,
}

impl BuiltinCommand for Cd {
    const NAME: &'static str = "cd";

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<Flow> {
        let target = match self.dirs.as_slice() {
            [] => env.home().ok_or_else(|| anyhow!("HOME not set"))?,
            [dir] => dir.clone(),
            _ => bail!("too many arguments"),
        };

        let new_dir = env.current_dir.join(&target);
        let canonical = fs::canonicalize(&new_dir)
            .map_err(|_| anyhow!("{target}: No such file or directory"))?;
        if !canonical.is_dir() {
            bail!("{target}: Not a directory");
        }

        env::set_current_dir(&canonical)
            .with_context(|| format!("{target}: can't change directory"))?;
        tracing::debug!(dir = %canonical.display(), "changed directory");
        env.set_var("PWD", canonical.to_string_lossy());
        env.current_dir = canonical;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs, Debug, PartialEq)]
/// Set a shell variable. It is passed to every command launched afterwards.
pub struct Set {
    #[argh(positional, greedy)]
    /// variable name followed by its value.
    pub args: Vec<String>,
}

impl BuiltinCommand for Set {
    const NAME: &'static str = "set";

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<Flow> {
        match <[String; 2]>::try_from(self.args) {
            Ok([name, value]) if !name.is_empty() => {
                env.set_var(name, value);
                Ok(Flow::Continue)
            }
            _ => bail!("usage: set <name> <value>"),
        }
    }
}

#[derive(FromArgs, Debug, PartialEq)]
/// Exit the shell.
pub struct Exit {}

impl BuiltinCommand for Exit {
    const NAME: &'static str = "exit";

    fn execute(self, _stdout: &mut dyn Write, _env: &mut Environment) -> Result<Flow> {
        Ok(Flow::Exit)
    }
}

#[derive(FromArgs, Debug, PartialEq)]
/// Print shell variables: all of them as NAME=value, or the value of one.
pub struct Print {
    #[argh(positional)]
    /// variable to print; prints an empty line when it is unset.
    pub name: Option<String>,
}

impl BuiltinCommand for Print {
    const NAME: &'static str = "print";

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<Flow> {
        match self.name {
            Some(name) => writeln!(stdout, "{}", env.get_var(&name).unwrap_or_default())?,
            None => {
                for (k, v) in env.sorted_vars() {
                    writeln!(stdout, "{k}={v}")?;
                }
            }
        }
        Ok(Flow::Continue)
    }
}
