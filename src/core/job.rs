use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::process::ExitStatus;

use nix::sys::{signal::Signal, termios::Termios};
use nix::unistd::Pid;

use crate::util::JshExitStatusExt;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobState::Running => write!(f, "Running"),
            JobState::Stopped => write!(f, "Stopped"),
            JobState::Done => write!(f, "Done"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessStatus {
    Running,
    Stopped,
    Completed,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ProcessStatus::Running => write!(f, "Running"),
            ProcessStatus::Stopped => write!(f, "Stopped"),
            ProcessStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// A change in a child's state as reported by `waitpid(2)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateChange {
    Exited(i32),
    /// Terminated by the given signal number.
    Signaled(i32),
    /// Stopped by the given signal number.
    Stopped(i32),
    Continued,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChildEvent {
    pub pid: Pid,
    pub change: StateChange,
}

impl ChildEvent {
    pub fn new(pid: Pid, change: StateChange) -> Self {
        Self { pid, change }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Process {
    pid: Pid,
    argv: String,
    status: ProcessStatus,
    status_code: Option<ExitStatus>,
}

impl Process {
    pub fn new<S: Into<String>>(pid: Pid, argv: S) -> Self {
        Self {
            pid,
            argv: argv.into(),
            status: ProcessStatus::Running,
            status_code: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn argv(&self) -> &str {
        &self.argv
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    fn apply(&mut self, change: StateChange) {
        match change {
            StateChange::Exited(code) => {
                self.status = ProcessStatus::Completed;
                self.status_code = Some(ExitStatus::from_status(code));
            }
            StateChange::Signaled(signo) => {
                self.status = ProcessStatus::Completed;
                self.status_code = Some(get_status_code_for_signal(signo));
            }
            StateChange::Stopped(_) => {
                if self.status != ProcessStatus::Completed {
                    self.status = ProcessStatus::Stopped;
                }
            }
            StateChange::Continued => {
                if self.status == ProcessStatus::Stopped {
                    self.status = ProcessStatus::Running;
                }
            }
        }
    }
}

/// A launched pipeline that has not been fully reaped.
///
/// A job built for a foreground pipeline has no id until it stops and is
/// registered with the `JobTable`.
#[derive(Clone)]
pub struct Job {
    id: Option<JobId>,
    command: String,
    pgid: Pid,
    processes: Vec<Process>,
    last_status_code: Option<ExitStatus>,
    notified_stopped_job: bool,
    tmodes: Option<Termios>,
}

impl Job {
    /// # Panics
    /// Panics if `processes` is empty.
    pub fn new<S: Into<String>>(command: S, pgid: Pid, processes: Vec<Process>) -> Self {
        assert!(!processes.is_empty(), "a job needs at least one process");
        Self {
            id: None,
            command: command.into(),
            pgid,
            processes,
            last_status_code: None,
            notified_stopped_job: false,
            tmodes: None,
        }
    }

    pub fn id(&self) -> Option<JobId> {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// The process group containing every stage.
    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    /// The last stage's pid, used where a single process stands for the job.
    pub fn representative_pid(&self) -> Pid {
        self.processes[self.processes.len() - 1].pid
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// `Done` once every process has exited, `Stopped` once every remaining
    /// process is stopped, `Running` otherwise.
    pub fn state(&self) -> JobState {
        let mut live = self
            .processes
            .iter()
            .filter(|p| p.status != ProcessStatus::Completed)
            .peekable();
        if live.peek().is_none() {
            JobState::Done
        } else if live.all(|p| p.status == ProcessStatus::Stopped) {
            JobState::Stopped
        } else {
            JobState::Running
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == JobState::Stopped
    }

    pub fn is_completed(&self) -> bool {
        self.state() == JobState::Done
    }

    /// Exit status of the most recently finished stage.
    pub fn last_status_code(&self) -> Option<ExitStatus> {
        self.last_status_code
    }

    pub fn has_process(&self, pid: Pid) -> bool {
        self.processes.iter().any(|p| p.pid == pid)
    }

    /// Applies `event` if it concerns one of this job's processes.
    /// Returns `false` otherwise.
    pub fn mark(&mut self, event: &ChildEvent) -> bool {
        let process = match self.processes.iter_mut().find(|p| p.pid == event.pid) {
            Some(process) => process,
            None => return false,
        };

        process.apply(event.change);
        if let Some(status_code) = process.status_code {
            self.last_status_code = Some(status_code);
        }
        if event.change == StateChange::Continued {
            self.notified_stopped_job = false;
        }
        true
    }

    /// Records that `SIGCONT` was sent to the job's group.
    pub fn mark_continued(&mut self) {
        for process in &mut self.processes {
            process.apply(StateChange::Continued);
        }
        self.notified_stopped_job = false;
    }

    /// Marks every unfinished process as completed. Used when the kernel no
    /// longer knows about the job's processes.
    pub fn mark_lost(&mut self) {
        for process in &mut self.processes {
            if process.status != ProcessStatus::Completed {
                process.status = ProcessStatus::Completed;
            }
        }
    }

    pub fn notified_stopped_job(&self) -> bool {
        self.notified_stopped_job
    }

    pub fn set_notified_stopped_job(&mut self, notified_stopped_job: bool) {
        self.notified_stopped_job = notified_stopped_job;
    }

    /// Terminal modes saved when the job last stopped.
    pub fn tmodes(&self) -> Option<&Termios> {
        self.tmodes.as_ref()
    }

    pub fn set_tmodes(&mut self, tmodes: Option<Termios>) {
        self.tmodes = tmodes;
    }

    /// Human readable completion status, e.g. `Done` or `Exit 3`.
    pub fn describe_status(&self) -> String {
        match self.state() {
            JobState::Done => match self.last_status_code.and_then(|s| s.code()) {
                Some(0) | None => "Done".to_string(),
                Some(code) if code > 128 => Signal::try_from(code - 128)
                    .map(|signal| format!("Terminated ({})", signal.as_str()))
                    .unwrap_or_else(|_| format!("Exit {}", code)),
                Some(code) => format!("Exit {}", code),
            },
            state => state.to_string(),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {:?}\tpgid: {}\tstate: {}\tinput: {}",
            self.id,
            self.pgid,
            self.state(),
            self.command
        )
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "[{}] {}\t{}", id, self.describe_status(), self.command),
            None => write!(f, "{}\t{}", self.describe_status(), self.command),
        }
    }
}

/// Background and stopped jobs, keyed by job id.
///
/// A new job gets an id one greater than the largest id in use, so ids stay
/// sequential and become reusable once the jobs holding them are removed.
#[derive(Default)]
pub struct JobTable {
    jobs: BTreeMap<JobId, Job>,
}

impl JobTable {
    pub fn register(&mut self, mut job: Job) -> JobId {
        let job_id = self.next_job_id();
        job.id = Some(job_id);
        debug!("registering job [{}] (pgid {})", job_id, job.pgid);
        self.jobs.insert(job_id, job);
        job_id
    }

    /// Puts back a job previously removed with `take`, keeping its id when
    /// that id is still free.
    pub fn reinstate(&mut self, mut job: Job) -> JobId {
        match job.id {
            Some(job_id) if !self.jobs.contains_key(&job_id) => {
                job.id = Some(job_id);
                self.jobs.insert(job_id, job);
                job_id
            }
            _ => self.register(job),
        }
    }

    pub fn list(&self) -> Vec<&Job> {
        self.jobs.values().collect()
    }

    pub fn find(&self, job_id: JobId) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn find_mut(&mut self, job_id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&job_id)
    }

    /// Removes a job regardless of its state, e.g. to wait on it in the
    /// foreground.
    pub fn take(&mut self, job_id: JobId) -> Option<Job> {
        self.jobs.remove(&job_id)
    }

    /// Applies `event` to the job owning its pid and returns that job's id.
    pub fn update_state(&mut self, event: &ChildEvent) -> Option<JobId> {
        self.jobs
            .values_mut()
            .find(|job| job.has_process(event.pid))
            .and_then(|job| {
                job.mark(event);
                debug!("job [{:?}] is now {}", job.id, job.state());
                job.id
            })
    }

    /// Removes the job if it is `Done`.
    pub fn remove(&mut self, job_id: JobId) -> Option<Job> {
        match self.jobs.get(&job_id) {
            Some(job) if job.is_completed() => self.jobs.remove(&job_id),
            _ => None,
        }
    }

    /// Removes and returns every `Done` job.
    pub fn reap(&mut self) -> Vec<Job> {
        let done: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.is_completed())
            .filter_map(|job| job.id)
            .collect();
        done.into_iter()
            .filter_map(|job_id| self.jobs.remove(&job_id))
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.values_mut()
    }

    fn next_job_id(&self) -> JobId {
        JobId(self.jobs.keys().next_back().map_or(1, |id| id.0 + 1))
    }
}

impl fmt::Debug for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} jobs", self.jobs.len())?;
        for job in self.jobs.values() {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}

fn get_status_code_for_signal(signo: i32) -> ExitStatus {
    ExitStatus::from_status(128 + signo)
}
