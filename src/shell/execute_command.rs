//! Launches a `Pipeline` as a group of child processes.

use std::ffi::CString;
use std::fs::File;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use failure::ResultExt;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::sys::wait;
use nix::unistd::{self, ForkResult, Pid};

use crate::core::job::{Job, Process};
use crate::core::pipeline::{Pipeline, Stage};
use crate::errors::{ErrorKind, Result};
use crate::shell::signals;

const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;
const COMMAND_NOT_EXECUTABLE_EXIT_STATUS: i32 = 126;

/// Descriptors a stage's child wires up before exec.
#[derive(Debug, Default)]
struct StageIo {
    /// Read end of the pipe from the previous stage.
    stdin: Option<RawFd>,
    /// Write end of the pipe to the next stage.
    stdout: Option<RawFd>,
    /// Read end of the pipe to the next stage, which only the next stage uses.
    unused: Option<RawFd>,
}

/// Spawns every stage of `pipeline` in one new process group.
///
/// Stage *i*'s stdout is connected to stage *i+1*'s stdin. The first stage
/// reads `stdin` if given and the shell's own stdin otherwise; the last stage
/// writes the shell's stdout. When `terminal` is given, each child hands that
/// terminal to the new group before exec.
///
/// The caller must hold a `signals::BlockChildSignals`, so that neither the
/// children nor a failed launch's cleanup are reaped by the `SIGCHLD`
/// handler behind its back. If any stage cannot be started, the stages
/// already running are killed and reaped before the error is returned.
pub fn spawn_pipeline(
    pipeline: &Pipeline,
    stdin: Option<&File>,
    terminal: Option<RawFd>,
) -> Result<Job> {
    let argvs = pipeline
        .stages()
        .iter()
        .map(to_cstrings)
        .collect::<Result<Vec<_>>>()?;

    let mut group = SpawnedGroup::default();
    let mut upstream: Option<File> = None;
    let last = argvs.len() - 1;

    for (i, (stage, argv)) in pipeline.stages().iter().zip(&argvs).enumerate() {
        let (downstream, pipe_write) = if i < last {
            let (read_end, write_end) = create_pipe()?;
            (Some(read_end), Some(write_end))
        } else {
            (None, None)
        };

        let io = StageIo {
            stdin: upstream.as_ref().or(stdin).map(AsRawFd::as_raw_fd),
            stdout: pipe_write.as_ref().map(AsRawFd::as_raw_fd),
            unused: downstream.as_ref().map(AsRawFd::as_raw_fd),
        };
        let pid = fork_stage(argv, &io, group.pgid, terminal)?;
        debug!("spawned {} ({}) in group {:?}", pid, stage, group.pgid);
        group.push(pid, stage);

        // The write end now belongs to the child and the old read end has
        // been handed to this stage; dropping closes the parent's copies.
        drop(pipe_write);
        upstream = downstream;
    }

    Ok(group.into_job(pipeline.input()))
}

fn to_cstrings(stage: &Stage) -> Result<Vec<CString>> {
    stage
        .argv()
        .iter()
        .map(|arg| CString::new(arg.as_bytes()).context(ErrorKind::Io))
        .collect::<::std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

fn fork_stage(
    argv: &[CString],
    io: &StageIo,
    pgid: Option<Pid>,
    terminal: Option<RawFd>,
) -> Result<Pid> {
    match unsafe { unistd::fork() }.context(ErrorKind::Nix)? {
        ForkResult::Child => exec_stage(argv, io, pgid, terminal),
        ForkResult::Parent { child } => {
            // Set the group in both parent and child so it is in place no
            // matter which one runs first.
            let pgid = pgid.unwrap_or(child);
            let temp_result = unistd::setpgid(child, pgid);
            if let Err(Errno::EACCES) = temp_result {
                // the child already exec'd, after joining the group itself
            } else {
                log_if_err!(temp_result, "failed to set pgid ({}) for pid ({})", pgid, child);
            }
            Ok(child)
        }
    }
}

/// Runs in the forked child. Never returns.
fn exec_stage(argv: &[CString], io: &StageIo, pgid: Option<Pid>, terminal: Option<RawFd>) -> ! {
    let pid = unistd::getpid();
    let pgid = pgid.unwrap_or(pid);
    let _ = unistd::setpgid(pid, pgid);

    // The shell ignores SIGTTOU while interactive, so this happens before
    // the default dispositions come back.
    if let Some(terminal) = terminal {
        let _ = unistd::tcsetpgrp(terminal, pgid);
    }
    signals::reset_for_child();

    if let Some(fd) = io.stdin {
        let _ = unistd::dup2(fd, libc::STDIN_FILENO);
    }
    if let Some(fd) = io.stdout {
        let _ = unistd::dup2(fd, libc::STDOUT_FILENO);
    }
    for &fd in [io.stdin, io.stdout, io.unused].iter().flatten() {
        if fd > libc::STDERR_FILENO {
            let _ = unistd::close(fd);
        }
    }

    let err = match unistd::execvp(&argv[0], argv) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    eprintln!("jsh: {}: {}", argv[0].to_string_lossy(), err.desc());
    let code = if err == Errno::ENOENT {
        COMMAND_NOT_FOUND_EXIT_STATUS
    } else {
        COMMAND_NOT_EXECUTABLE_EXIT_STATUS
    };
    unsafe { libc::_exit(code) }
}

/// Wraps `unistd::pipe()` to return RAII structs instead of raw, owning file descriptors
/// Returns (`read_end_pipe`, `write_end_pipe`)
fn create_pipe() -> Result<(File, File)> {
    // IMPORTANT: immediately pass the RawFds returned by unistd::pipe()
    // into RAII structs (File). If the function returns before they are moved
    // into RAII structs, the fds could be leaked.
    let (read_end_pipe, write_end_pipe) = unistd::pipe().context(ErrorKind::Nix)?;
    unsafe {
        Ok((
            File::from_raw_fd(read_end_pipe),
            File::from_raw_fd(write_end_pipe),
        ))
    }
}

/// Processes started so far for one pipeline.
///
/// Until `into_job` is called, dropping the group kills and reaps every
/// process in it, so a failed launch leaves no stray process group behind.
#[derive(Debug, Default)]
struct SpawnedGroup {
    pgid: Option<Pid>,
    processes: Vec<Process>,
}

impl SpawnedGroup {
    fn push(&mut self, pid: Pid, stage: &Stage) {
        self.pgid.get_or_insert(pid);
        self.processes.push(Process::new(pid, stage.to_string()));
    }

    fn into_job(mut self, command: &str) -> Job {
        let processes = mem::take(&mut self.processes);
        let pgid = processes[0].pid();
        Job::new(command, pgid, processes)
    }
}

impl Drop for SpawnedGroup {
    fn drop(&mut self) {
        let pgid = match self.pgid {
            Some(pgid) if !self.processes.is_empty() => pgid,
            _ => return,
        };

        warn!("abandoning partially launched pipeline (pgid {})", pgid);
        let temp_result = signal::killpg(pgid, Signal::SIGKILL);
        log_if_err!(temp_result, "failed to kill process group ({})", pgid);
        for process in &self.processes {
            let temp_result = wait::waitpid(process.pid(), None);
            log_if_err!(temp_result, "failed to reap pid ({})", process.pid());
        }
    }
}
