//! Jsh builtins
//!
//! This module includes the implementations of the job-control builtins and
//! the few commands that must run inside the shell process. Where possible
//! the commands conform to their standard Bash counterparts.

use std::iter;

use docopt::Docopt;
use serde::de::DeserializeOwned;

use self::prelude::*;

use self::cd::Cd;
use self::exit::Exit;
use self::jobs::{Bg, Fg, Jobs};

pub mod prelude {
    pub use std::io::Write;
    pub use std::process::ExitStatus;

    pub use failure::ResultExt;

    pub use super::parse_args;
    pub use crate::errors::{Error, ErrorKind, Result};
    pub use crate::shell::shell::Shell;
    pub use crate::util::JshExitStatusExt;
}

mod cd;
mod exit;
mod jobs;

const BG_NAME: &str = "bg";
const CD_NAME: &str = "cd";
const EXIT_NAME: &str = "exit";
const FG_NAME: &str = "fg";
const JOBS_NAME: &str = "jobs";

/// Exit status for a builtin called with bad arguments.
const USAGE_EXIT_STATUS: i32 = 2;

/// Represents a Jsh builtin command such as cd or jobs.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user.
    const HELP: &'static str;
    /// Runs the command with the given arguments in the `shell` environment.
    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    [BG_NAME, CD_NAME, EXIT_NAME, FG_NAME, JOBS_NAME].contains(&program.as_ref())
}

/// precondition: command is a builtin.
/// Returns (`exit_status_code`, `builtin_result`)
pub fn run<S1, S2>(
    shell: &mut Shell,
    program: S1,
    args: &[S2],
    stdout: &mut dyn Write,
) -> (ExitStatus, Result<()>)
where
    S1: AsRef<str>,
    S2: AsRef<str>,
{
    debug_assert!(is_builtin(&program));

    let result = match program.as_ref() {
        BG_NAME => Bg::run(shell, args, stdout),
        CD_NAME => Cd::run(shell, args, stdout),
        EXIT_NAME => Exit::run(shell, args, stdout),
        FG_NAME => Fg::run(shell, args, stdout),
        JOBS_NAME => Jobs::run(shell, args, stdout),
        _ => unreachable!(),
    };

    let exit_status = get_builtin_exit_status(&result);
    (exit_status, result)
}

fn get_builtin_exit_status(result: &Result<()>) -> ExitStatus {
    let status = if let Err(ref e) = *result {
        match *e.kind() {
            ErrorKind::BuiltinCommand { code, .. } => code,
            _ => 1,
        }
    } else {
        0
    };

    ExitStatus::from_status(status)
}

/// Parses `args` against the docopt `usage` of `program`. A mismatch is
/// reported as `<program>: usage: ...`.
pub fn parse_args<D, S, I>(usage: &str, program: S, args: I) -> Result<D>
where
    D: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let name = program.as_ref().to_string();
    let argv = iter::once(program)
        .chain(args)
        .map(|arg| arg.as_ref().to_string());
    Docopt::new(usage)
        .and_then(|d| d.argv(argv).help(false).deserialize())
        .map_err(|e| {
            debug!("{}: {}", name, e);
            Error::builtin_command(
                format!("{}: {}", name, usage_line(usage)),
                USAGE_EXIT_STATUS,
            )
        })
}

/// The first line of a docopt `Usage:` section.
fn usage_line(usage: &str) -> String {
    usage
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Usage:"))
        .nth(1)
        .map(|line| format!("usage: {}", line.trim()))
        .unwrap_or_else(|| "invalid arguments".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const USAGE: &str = "
Usage:
    demo [-q] <name>
";

    #[derive(Debug, Deserialize)]
    struct DemoArgs {
        arg_name: String,
        flag_q: bool,
    }

    #[test]
    fn test_is_builtin() {
        for name in &["bg", "cd", "exit", "fg", "jobs"] {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("ls"));
        assert!(!is_builtin("kill"));
    }

    #[test]
    fn test_parse_args() {
        let args: DemoArgs = parse_args(USAGE, "demo", vec!["-q", "x"]).unwrap();
        assert_eq!(args.arg_name, "x");
        assert!(args.flag_q);
    }

    #[test]
    fn test_parse_args_usage_error() {
        let err = parse_args::<DemoArgs, _, _>(USAGE, "demo", Vec::<&str>::new()).unwrap_err();
        assert_eq!(err.to_string(), "demo: usage: demo [-q] <name>");
        assert_eq!(
            get_builtin_exit_status(&Err(err)).code(),
            Some(USAGE_EXIT_STATUS)
        );
    }
}
