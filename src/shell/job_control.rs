use std::fmt;
use std::fs::File;
use std::process::ExitStatus;

use failure::ResultExt;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::termios::{self, Termios};
use nix::unistd::{self, Pid};

use crate::core::job::{ChildEvent, Job, JobId, JobState, JobTable};
use crate::core::pipeline::Pipeline;
use crate::errors::{Error, ErrorKind, Result};
use crate::shell::execute_command;
use crate::shell::signals::{self, BlockChildSignals, ForegroundGroup};
use crate::util;

const NULL_DEVICE: &str = "/dev/null";

/// Makes the shell the foreground process group of its terminal.
///
/// Waits (by stopping itself with `SIGTTIN`) until it is started in the
/// foreground, ignores the job-control signals that would otherwise stop an
/// interactive shell, then moves into its own process group and grabs the
/// terminal.
pub fn initialize_job_control() -> Result<()> {
    let shell_terminal = util::get_terminal();

    // Loop until the shell is in the foreground
    loop {
        let shell_pgid = unistd::getpgrp();
        if unistd::tcgetpgrp(shell_terminal).context(ErrorKind::Nix)? == shell_pgid {
            break;
        }
        signal::killpg(shell_pgid, Signal::SIGTTIN).context(ErrorKind::Nix)?;
    }

    // SIGINT and SIGTSTP get forwarding handlers in `signals::install`
    for &sig in &[Signal::SIGQUIT, Signal::SIGTTIN, Signal::SIGTTOU] {
        unsafe { signal::signal(sig, SigHandler::SigIgn) }.context(ErrorKind::Nix)?;
    }

    // Put ourselves in our own process group
    let shell_pid = Pid::this();
    if unistd::getpgrp() != shell_pid {
        unistd::setpgid(shell_pid, shell_pid).context(ErrorKind::Nix)?;
    }
    signals::set_shell_pgid(shell_pid);

    // Grab control of the terminal
    let temp_result = unistd::tcsetpgrp(shell_terminal, shell_pid);
    log_if_err!(temp_result, "failed to grab control of terminal");

    info!("job control initialized (pgid {})", shell_pid);
    Ok(())
}

/// Launches pipelines and keeps the `JobTable` in step with the state of
/// their processes.
pub struct JobManager {
    table: JobTable,
    terminal_control: bool,
    notify: bool,
}

impl JobManager {
    /// `terminal_control` hands the terminal to foreground jobs; `notify`
    /// prints job launch and status messages.
    pub fn new(terminal_control: bool, notify: bool) -> Self {
        Self {
            table: JobTable::default(),
            terminal_control,
            notify,
        }
    }

    pub fn table(&self) -> &JobTable {
        &self.table
    }

    /// Applies every pending child state change to the job table, without
    /// blocking.
    pub fn refresh(&mut self) -> Result<()> {
        for event in signals::collect_child_events()? {
            self.apply_event(&event);
        }
        Ok(())
    }

    /// Notifies the user about stopped or terminated jobs and removes
    /// terminated jobs from the table.
    pub fn do_job_notification(&mut self) {
        let temp_result = self.refresh();
        log_if_err!(temp_result, "do_job_notification");

        if self.notify {
            for job in self.table.iter_mut() {
                if job.is_completed() {
                    println!("{}", job);
                } else if job.is_stopped() && !job.notified_stopped_job() {
                    println!("{}", job);
                    job.set_notified_stopped_job(true);
                }
            }
        }

        for job in self.table.reap() {
            debug!("reaped job {:?}", job);
        }
    }

    /// Runs `pipeline`. Background pipelines are registered and left running;
    /// foreground pipelines are waited on until they finish or stop.
    ///
    /// Returns the status of the foreground job's last finished stage.
    pub fn launch(&mut self, pipeline: &Pipeline) -> Result<Option<ExitStatus>> {
        let _blocked = BlockChildSignals::new()?;
        let terminal = if self.terminal_control && !pipeline.is_background() {
            Some(util::get_terminal())
        } else {
            None
        };
        // Background jobs never read the input the shell reads commands from
        let stdin = if !self.terminal_control && pipeline.is_background() {
            Some(File::open(NULL_DEVICE).context(ErrorKind::Io)?)
        } else {
            None
        };
        let job = execute_command::spawn_pipeline(pipeline, stdin.as_ref(), terminal)?;

        if pipeline.is_background() {
            let pid = job.representative_pid();
            let job_id = self.table.register(job);
            if self.notify {
                println!("[{}] {}", job_id, pid);
            }
            Ok(None)
        } else {
            self.wait_in_foreground(job, false)
        }
    }

    /// Continues a stopped or background job in the foreground and waits for
    /// it to finish or stop again.
    pub fn put_job_in_foreground(&mut self, job_id: JobId) -> Result<Option<ExitStatus>> {
        let _blocked = BlockChildSignals::new()?;
        self.refresh()?;
        let job = match self.table.take(job_id) {
            Some(job) if !job.is_completed() => job,
            Some(job) => {
                self.table.reinstate(job);
                return Err(Error::no_such_job(job_id.to_string()));
            }
            None => return Err(Error::no_such_job(job_id.to_string())),
        };
        debug!("putting job [{}] in foreground", job_id);

        if self.notify {
            println!("{}", job.command());
        }
        self.wait_in_foreground(job, true)
    }

    /// Continues a job in the background.
    pub fn put_job_in_background(&mut self, job_id: JobId) -> Result<()> {
        let _blocked = BlockChildSignals::new()?;
        self.refresh()?;
        let job = self
            .table
            .find_mut(job_id)
            .filter(|job| !job.is_completed())
            .ok_or_else(|| Error::no_such_job(job_id.to_string()))?;
        debug!("putting job [{}] in background", job_id);

        signal::killpg(job.pgid(), Signal::SIGCONT).context(ErrorKind::Nix)?;
        job.mark_continued();
        if self.notify {
            println!("[{}] {}", job_id, job.command());
        }
        Ok(())
    }

    /// The caller must hold a `BlockChildSignals`.
    fn wait_in_foreground(&mut self, mut job: Job, cont: bool) -> Result<Option<ExitStatus>> {
        let result = {
            let _terminal_state = if self.terminal_control {
                Some(TerminalState::new(job.pgid()))
            } else {
                None
            };
            let _foreground = ForegroundGroup::new(job.pgid());

            let result = self.resume_and_wait(&mut job, cont);
            if self.terminal_control && job.is_stopped() {
                job.set_tmodes(termios::tcgetattr(util::get_terminal()).ok());
            }
            result
        };

        let last_status_code = job.last_status_code();
        match job.state() {
            JobState::Done => debug!("foreground job finished: {:?}", job),
            JobState::Stopped => {
                job.set_notified_stopped_job(true);
                let job_id = self.table.reinstate(job);
                if self.notify {
                    if let Some(job) = self.table.find(job_id) {
                        println!();
                        println!("{}", job);
                    }
                }
            }
            JobState::Running => {
                // only reachable when waiting failed
                let job_id = self.table.reinstate(job);
                warn!("lost track of foreground job [{}]", job_id);
            }
        }

        result.map(|_| last_status_code)
    }

    fn resume_and_wait(&mut self, job: &mut Job, cont: bool) -> Result<()> {
        if cont {
            if let (true, Some(tmodes)) = (self.terminal_control, job.tmodes()) {
                let temp_result =
                    termios::tcsetattr(util::get_terminal(), termios::SetArg::TCSADRAIN, tmodes);
                log_if_err!(temp_result, "error setting terminal configuration for job");
            }
            signal::killpg(job.pgid(), Signal::SIGCONT).context(ErrorKind::Nix)?;
            job.mark_continued();
        }
        self.wait_for_job(job)
    }

    /// Waits for job to stop or complete.
    ///
    /// Status changes of other jobs' processes seen along the way are applied
    /// to the table.
    fn wait_for_job(&mut self, job: &mut Job) -> Result<()> {
        for event in signals::collect_child_events()? {
            if !job.mark(&event) {
                self.apply_event(&event);
            }
        }

        while job.state() == JobState::Running {
            match signals::wait_for_child()? {
                Some(event) => {
                    if !job.mark(&event) {
                        self.apply_event(&event);
                    }
                }
                None => {
                    warn!("no children left while waiting for {:?}", job);
                    job.mark_lost();
                }
            }
        }

        Ok(())
    }

    fn apply_event(&mut self, event: &ChildEvent) {
        if self.table.update_state(event).is_none() {
            debug!("no job for pid {} ({:?})", event.pid, event.change);
        }
    }
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "terminal_control: {}\tnotify: {}",
            self.terminal_control, self.notify
        )?;
        write!(f, "{:?}", self.table)
    }
}

/// RAII struct to encapsulate manipulating terminal state.
struct TerminalState {
    prev_pgid: Pid,
    prev_tmodes: Option<Termios>,
}

impl TerminalState {
    fn new(new_pgid: Pid) -> TerminalState {
        debug!("setting terminal process group to job's process group");
        let shell_terminal = util::get_terminal();
        let prev_tmodes = termios::tcgetattr(shell_terminal).ok();
        let temp_result = unistd::tcsetpgrp(shell_terminal, new_pgid);
        log_if_err!(temp_result, "failed to give terminal to pgid ({})", new_pgid);
        TerminalState {
            prev_pgid: unistd::getpgrp(),
            prev_tmodes,
        }
    }
}

impl Drop for TerminalState {
    fn drop(&mut self) {
        debug!("putting shell back into foreground and restoring shell's terminal modes");
        let shell_terminal = util::get_terminal();
        let temp_result = unistd::tcsetpgrp(shell_terminal, self.prev_pgid);
        log_if_err!(temp_result, "failed to take back control of terminal");
        if let Some(ref prev_tmodes) = self.prev_tmodes {
            let temp_result =
                termios::tcsetattr(shell_terminal, termios::SetArg::TCSADRAIN, prev_tmodes);
            log_if_err!(
                temp_result,
                "error restoring terminal configuration for shell"
            );
        }
    }
}

