pub use self::shell::Shell;

pub mod builtins;
pub mod editor;
pub mod execute_command;
pub mod job_control;
pub mod prompt;
pub mod shell;
pub mod signals;

const HISTORY_FILE_NAME: &str = ".jsh_history";

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Determines if new command entries will be added to the shell's command history.
    enable_command_history: bool,

    /// Number of entries to store in the shell's command history
    command_history_capacity: usize,

    /// Determines if foreground jobs are given control of the terminal.
    enable_job_control: bool,

    /// Determines if some messages (e.g. "exit", job notifications) should be displayed.
    display_messages: bool,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, job control
    ///
    /// # Complete List
    /// - Command History is enabled
    /// - Foreground jobs get the terminal
    /// - Job launch and status messages are displayed
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            enable_command_history: true,
            command_history_capacity,
            enable_job_control: true,
            display_messages: true,
        }
    }

    /// Creates a noninteractive shell, e.g. no command history, no terminal handoff
    ///
    /// # Complete List
    /// - Command History is disabled
    /// - Foreground jobs never get the terminal. `fg` and `bg` still work.
    /// - Fewer messages are displayed
    pub fn noninteractive() -> Self {
        Default::default()
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable_command_history: false,
            command_history_capacity: 0,
            enable_job_control: false,
            display_messages: false,
        }
    }
}
