//! Command-line options and the settings derived from them.

use argh::FromArgs;

/// quysh: a small interactive shell.
#[derive(FromArgs, Debug, Default, PartialEq)]
pub struct Args {
    /// report the exit status of every foreground command
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    /// run a single command line and exit
    #[argh(option, short = 'c')]
    pub command: Option<String>,
}

/// Settings that change how the interpreter behaves at run time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub verbose: bool,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            verbose: args.verbose,
        }
    }
}
