use crate::shell::builtins::{self, prelude::*};

pub struct Exit;

impl builtins::BuiltinCommand for Exit {
    const NAME: &'static str = builtins::EXIT_NAME;

    const HELP: &'static str = "\
exit: exit [n]
    Exit the shell with a status of N. If N is omitted, the exit status
    is 0. Background and stopped jobs are left running.";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let code = match parse_status(args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("jsh: {}", e);
                builtins::USAGE_EXIT_STATUS
            }
        };
        shell.exit(code);
    }
}

/// Parses the optional status operand of `exit`.
fn parse_status<T: AsRef<str>>(args: &[T]) -> Result<i32> {
    match args.first().map(AsRef::as_ref) {
        None => Ok(0),
        Some(arg) => arg.parse::<i64>().map(|n| n.rem_euclid(256) as i32).map_err(|_| {
            Error::builtin_command(
                format!("exit: {}: numeric argument required", arg),
                builtins::USAGE_EXIT_STATUS,
            )
        }),
    }
}
