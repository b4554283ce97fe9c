#[macro_use]
extern crate log;

use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use docopt::Docopt;
use jsh_rs::errors::*;
use jsh_rs::{JshExitStatusExt, Shell, ShellConfig};
use nix::unistd::Pid;
use serde::Deserialize;

const COMMAND_HISTORY_CAPACITY: usize = 10;
const LOG_FILE_NAME: &str = ".jsh_log";

const USAGE: &str = "
jsh.

Usage:
    jsh [options]
    jsh [options] -c <command>
    jsh [options] <file>
    jsh (-h | --help)
    jsh --version

Options:
    -h --help       Show this screen.
    --version       Show version.
    -c              If the -c option is present, then commands are read from the first non-option
                        argument command_string.
    --log=<path>    File to write log to, defaults to ~/.jsh_log
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    init_logger(&args.flag_log);
    debug!("{:?}", args);

    if args.flag_version {
        println!("jsh version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c || args.arg_file.is_some() {
        execute_from_command_string_or_file(&args);
    } else {
        execute_from_stdin();
    }
}

/// Logging is best effort: the shell runs without a log if the file cannot
/// be opened.
fn init_logger(path: &Option<String>) {
    let log_path = match path.clone().map(PathBuf::from).or_else(default_log_path) {
        Some(log_path) => log_path,
        None => return,
    };

    let log_file = match fern::log_file(&log_path) {
        Ok(log_file) => log_file,
        Err(e) => {
            eprintln!("jsh: {}: {}", log_path.display(), e);
            return;
        }
    };

    let pid = Pid::this();
    let result = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Trace)
        .chain(log_file)
        .apply();
    if let Err(e) = result {
        eprintln!("jsh: failed to initialize logging: {}", e);
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn execute_from_command_string_or_file(args: &Args) -> ! {
    let shell_config = ShellConfig::noninteractive();
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    if let Some(ref command) = args.arg_command {
        shell.run_line(command);
    } else if let Some(ref file_path) = args.arg_file {
        if let Err(e) = shell.execute_commands_from_file(Path::new(file_path)) {
            eprintln!("jsh: {}: {}", file_path, e);
            shell.exit(exit_code(ExitStatus::from_failure()));
        }
    }

    shell.exit(0)
}

fn execute_from_stdin() -> ! {
    let shell_config = ShellConfig::interactive(COMMAND_HISTORY_CAPACITY);
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));
    shell.execute_from_stdin()
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("failed to create shell: {}", error);
    eprintln!("jsh: {}", error);
    process::exit(exit_code(ExitStatus::from_failure()));
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
