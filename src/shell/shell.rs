//! Jsh - Shell Module
//!
//! The Shell reads command lines, dispatches builtins, and hands everything
//! else to the `JobManager`. It also owns the editor of previous commands.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use atty::{self, Stream};
use failure::ResultExt;

use crate::core::pipeline::Pipeline;
use crate::errors::{Error, ErrorKind, Result};
use crate::shell::{
    builtins,
    editor::Editor,
    job_control::{self, JobManager},
    prompt, signals, ShellConfig, HISTORY_FILE_NAME,
};
use crate::util;

/// Jsh Shell
pub struct Shell {
    /// Responsible for readline and history.
    editor: Editor,
    history_file: Option<PathBuf>,
    job_manager: JobManager,
    config: ShellConfig,
    /// Is `false` if stdin is not a terminal, the shell runs a script, or
    /// initializing job control fails.
    is_interactive: bool,
}

impl Shell {
    /// Constructs a new Shell to manage running jobs and command history.
    pub fn new(config: ShellConfig) -> Result<Self> {
        let mut is_interactive = config.enable_job_control && atty::is(Stream::Stdin);
        if is_interactive {
            if let Err(e) = job_control::initialize_job_control() {
                error!(
                    "failed to initialize shell for job control despite isatty: {}",
                    e
                );
                is_interactive = false;
            }
        }
        signals::install()?;

        let mut shell = Self {
            editor: Editor::with_capacity(config.command_history_capacity),
            history_file: None,
            job_manager: JobManager::new(
                is_interactive,
                is_interactive && config.display_messages,
            ),
            config,
            is_interactive,
        };

        if shell.history_enabled() {
            let temp_result = shell.load_history();
            log_if_err!(temp_result, "failed to load history");
        }

        info!("jsh started up (interactive: {})", is_interactive);
        Ok(shell)
    }

    pub fn job_manager_mut(&mut self) -> &mut JobManager {
        &mut self.job_manager
    }

    /// Parses and runs one line. Builtins run in the shell process; other
    /// commands are launched as a job.
    pub fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let input = input.trim();
        // skip if empty
        if input.is_empty() {
            return Ok(());
        }

        if self.history_enabled() {
            self.editor.add_history_entry(input);
        }

        let pipeline = match Pipeline::parse(input)? {
            Some(pipeline) => pipeline,
            None => return Ok(()),
        };

        if pipeline.is_simple() {
            let stage = &pipeline.stages()[0];
            if builtins::is_builtin(stage.program()) {
                return self.run_builtin(stage.program(), stage.args());
            }
        }

        let status = self.job_manager.launch(&pipeline)?;
        debug!("`{}` returned {:?}", pipeline.input(), status);
        Ok(())
    }

    /// Runs each line of the script at `path`. Errors are reported and the
    /// script carries on with the next line.
    pub fn execute_commands_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path).context(ErrorKind::Io)?;
        for line in contents.lines() {
            self.run_line(line);
        }

        Ok(())
    }

    /// The command loop. Reads lines until end of input, then exits with
    /// status 0.
    pub fn execute_from_stdin(&mut self) -> ! {
        loop {
            // Check the status of background jobs, removing exited ones.
            self.job_manager.do_job_notification();

            match self.prompt() {
                Ok(Some(line)) => self.run_line(&line),
                Ok(None) => break,
                Err(e) => {
                    report_error(&e);
                    break;
                }
            }
        }

        self.exit(0)
    }

    /// Runs `line`, reporting rather than returning any error.
    pub fn run_line(&mut self, line: &str) {
        if let Err(e) = self.execute_command_string(line) {
            report_error(&e);
        }
    }

    /// Exits the shell without touching outstanding jobs.
    pub fn exit(&mut self, code: i32) -> ! {
        if self.config.display_messages && self.is_interactive {
            println!("exit");
        }

        if self.history_enabled() {
            if let Some(ref history_file) = self.history_file {
                if let Err(e) = self.editor.save_history(&history_file) {
                    error!(
                        "error: failed to save history to file during shutdown: {}",
                        e
                    );
                }
            }
        }

        info!("jsh has shut down");
        process::exit(util::exit_code_like_u8(code));
    }

    fn history_enabled(&self) -> bool {
        self.is_interactive && self.config.enable_command_history
    }

    fn load_history(&mut self) -> Result<()> {
        self.history_file = dirs::home_dir().map(|p| p.join(HISTORY_FILE_NAME));
        match self.history_file {
            Some(ref history_file) => self.editor.load_history(history_file)?,
            None => warn!("unable to get home directory"),
        }

        Ok(())
    }

    /// Custom prompt to output to the user.
    /// Returns `None` when end of file is reached.
    fn prompt(&mut self) -> Result<Option<String>> {
        if self.is_interactive {
            self.editor.readline(&prompt::render(true))
        } else {
            util::read_line_unbuffered(util::get_terminal())
        }
    }

    fn run_builtin(&mut self, program: &str, args: &[String]) -> Result<()> {
        let mut stdout = io::stdout();
        let (status, result) = builtins::run(self, program, args, &mut stdout);
        debug!("builtin {} returned {:?}", program, status);
        result.map_err(|e| match *e.kind() {
            ErrorKind::BuiltinCommand { .. } => e,
            _ => Error::builtin_command(format!("{}: {}", program, e), 1),
        })
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}\n{:?}", self.job_manager, self.editor)
    }
}

fn report_error(error: &Error) {
    warn!("{}", error);
    eprintln!("jsh: {}", error);
}
