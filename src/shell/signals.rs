//! Job control signal handling.
//!
//! The handlers in this module only use async-signal-safe operations: they
//! read and write atomics, call `waitpid(2)` without blocking and send
//! signals. In particular they never touch the `JobTable`. `SIGCHLD`
//! collects raw state changes into a fixed-capacity ring that the command
//! loop drains with `collect_child_events`, where the events are attributed
//! to jobs.
//!
//! While the shell waits for a foreground job it blocks `SIGCHLD` (see
//! `BlockChildSignals`) and reaps synchronously with `wait_for_child`, so the
//! handler and the foreground wait never race for the same exit status.

use std::convert::TryFrom;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use failure::{Fail, ResultExt};
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use crate::core::job::{ChildEvent, StateChange};
use crate::errors::{ErrorKind, Result};

const QUEUE_CAPACITY: usize = 128;

const KIND_EXITED: i32 = 1;
const KIND_SIGNALED: i32 = 2;
const KIND_STOPPED: i32 = 3;
const KIND_CONTINUED: i32 = 4;

/// Signals the shell forwards to the foreground process group.
const FORWARDED_SIGNALS: [Signal; 2] = [Signal::SIGTSTP, Signal::SIGINT];

/// Signals a child must see with their default disposition.
const JOB_CONTROL_SIGNALS: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGCHLD,
];

struct EventSlot {
    pid: AtomicI32,
    kind: AtomicI32,
    value: AtomicI32,
}

impl EventSlot {
    const fn new() -> Self {
        Self {
            pid: AtomicI32::new(0),
            kind: AtomicI32::new(0),
            value: AtomicI32::new(0),
        }
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: EventSlot = EventSlot::new();

/// Single producer (the `SIGCHLD` handler), single consumer (the command
/// loop). `HEAD` and `TAIL` count events ever popped and pushed.
static EVENTS: [EventSlot; QUEUE_CAPACITY] = [EMPTY_SLOT; QUEUE_CAPACITY];
static HEAD: AtomicUsize = AtomicUsize::new(0);
static TAIL: AtomicUsize = AtomicUsize::new(0);

/// Process group of the foreground job, 0 when the shell is idle.
static FOREGROUND_PGID: AtomicI32 = AtomicI32::new(0);
static SHELL_PGID: AtomicI32 = AtomicI32::new(0);

/// Installs the shell's handlers for `SIGCHLD`, `SIGTSTP` and `SIGINT`.
pub fn install() -> Result<()> {
    SHELL_PGID.store(unistd::getpgrp().as_raw(), Ordering::SeqCst);

    let child_action = SigAction::new(
        SigHandler::Handler(handle_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let forward_action = SigAction::new(
        SigHandler::Handler(forward_to_foreground),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    unsafe {
        signal::sigaction(Signal::SIGCHLD, &child_action).context(ErrorKind::Nix)?;
        for &sig in &FORWARDED_SIGNALS {
            signal::sigaction(sig, &forward_action).context(ErrorKind::Nix)?;
        }
    }

    debug!("installed job control signal handlers");
    Ok(())
}

/// Refreshes the shell's own process group after it moved into a new one.
pub fn set_shell_pgid(pgid: Pid) {
    SHELL_PGID.store(pgid.as_raw(), Ordering::SeqCst);
}

/// Restores default signal handling in a freshly forked child and clears
/// the signal mask inherited from the shell.
///
/// Only called between `fork` and `exec`; errors cannot be reported there.
pub fn reset_for_child() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe {
        for &sig in &JOB_CONTROL_SIGNALS {
            let _ = signal::sigaction(sig, &default);
        }
    }
    let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);
}

/// The foreground process group, if a foreground job is running.
pub fn foreground_group() -> Option<Pid> {
    match FOREGROUND_PGID.load(Ordering::SeqCst) {
        0 => None,
        pgid => Some(Pid::from_raw(pgid)),
    }
}

/// Marks a process group as the foreground job for as long as the value
/// lives.
#[derive(Debug)]
pub struct ForegroundGroup {
    previous: i32,
}

impl ForegroundGroup {
    pub fn new(pgid: Pid) -> Self {
        let previous = FOREGROUND_PGID.swap(pgid.as_raw(), Ordering::SeqCst);
        Self { previous }
    }
}

impl Drop for ForegroundGroup {
    fn drop(&mut self) {
        FOREGROUND_PGID.store(self.previous, Ordering::SeqCst);
    }
}

/// Blocks `SIGCHLD` for as long as the value lives.
///
/// Held while the command loop launches processes, waits for a foreground
/// job, or sweeps for state changes itself.
#[derive(Debug)]
pub struct BlockChildSignals {
    previous: SigSet,
}

impl BlockChildSignals {
    pub fn new() -> Result<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        let mut previous = SigSet::empty();
        signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))
            .context(ErrorKind::Nix)?;
        Ok(Self { previous })
    }
}

impl Drop for BlockChildSignals {
    fn drop(&mut self) {
        let temp_result = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
        log_if_err!(temp_result, "failed to restore signal mask");
    }
}

/// Returns every pending child state change.
///
/// Drains the events queued by the `SIGCHLD` handler, then collects any
/// changes the handler left behind (e.g. because the queue was full).
pub fn collect_child_events() -> Result<Vec<ChildEvent>> {
    let _blocked = BlockChildSignals::new()?;
    let mut events = Vec::new();
    while let Some(event) = pop_event() {
        events.push(event);
    }

    loop {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        match wait::waitpid(None, Some(flags)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
            Ok(status) => events.extend(decode_wait_status(status)),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        }
    }

    Ok(events)
}

/// Blocks until some child exits or stops. Returns `None` if the shell has
/// no children left.
///
/// The caller must hold a `BlockChildSignals`.
pub fn wait_for_child() -> Result<Option<ChildEvent>> {
    loop {
        match wait::waitpid(None, Some(WaitPidFlag::WUNTRACED)) {
            Ok(status) => {
                if let Some(event) = decode_wait_status(status) {
                    return Ok(Some(event));
                }
            }
            Err(Errno::ECHILD) => return Ok(None),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        }
    }
}

fn decode_wait_status(status: WaitStatus) -> Option<ChildEvent> {
    let (pid, change) = match status {
        WaitStatus::Exited(pid, code) => (pid, StateChange::Exited(code)),
        WaitStatus::Signaled(pid, signal, _) => (pid, StateChange::Signaled(signal as i32)),
        WaitStatus::Stopped(pid, signal) => (pid, StateChange::Stopped(signal as i32)),
        WaitStatus::Continued(pid) => (pid, StateChange::Continued),
        _ => return None,
    };
    Some(ChildEvent::new(pid, change))
}

fn encode(change: StateChange) -> (i32, i32) {
    match change {
        StateChange::Exited(code) => (KIND_EXITED, code),
        StateChange::Signaled(signo) => (KIND_SIGNALED, signo),
        StateChange::Stopped(signo) => (KIND_STOPPED, signo),
        StateChange::Continued => (KIND_CONTINUED, 0),
    }
}

fn decode(kind: i32, value: i32) -> Option<StateChange> {
    match kind {
        KIND_EXITED => Some(StateChange::Exited(value)),
        KIND_SIGNALED => Some(StateChange::Signaled(value)),
        KIND_STOPPED => Some(StateChange::Stopped(value)),
        KIND_CONTINUED => Some(StateChange::Continued),
        _ => None,
    }
}

fn queue_is_full() -> bool {
    let tail = TAIL.load(Ordering::Relaxed);
    let head = HEAD.load(Ordering::Acquire);
    tail.wrapping_sub(head) >= QUEUE_CAPACITY
}

/// Producer side. Callers check `queue_is_full` first.
fn push_event(event: ChildEvent) {
    let tail = TAIL.load(Ordering::Relaxed);
    let slot = &EVENTS[tail % QUEUE_CAPACITY];
    let (kind, value) = encode(event.change);
    slot.pid.store(event.pid.as_raw(), Ordering::Relaxed);
    slot.kind.store(kind, Ordering::Relaxed);
    slot.value.store(value, Ordering::Relaxed);
    TAIL.store(tail.wrapping_add(1), Ordering::Release);
}

/// Consumer side.
fn pop_event() -> Option<ChildEvent> {
    loop {
        let head = HEAD.load(Ordering::Relaxed);
        if head == TAIL.load(Ordering::Acquire) {
            return None;
        }

        let slot = &EVENTS[head % QUEUE_CAPACITY];
        let pid = slot.pid.load(Ordering::Relaxed);
        let kind = slot.kind.load(Ordering::Relaxed);
        let value = slot.value.load(Ordering::Relaxed);
        HEAD.store(head.wrapping_add(1), Ordering::Release);

        if let Some(change) = decode(kind, value) {
            return Some(ChildEvent::new(Pid::from_raw(pid), change));
        }
    }
}

extern "C" fn handle_sigchld(_: libc::c_int) {
    let _errno = SavedErrno::new();
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;

    // Leave remaining children unreaped when the queue is full;
    // collect_child_events picks them up.
    while !queue_is_full() {
        match wait::waitpid(None, Some(flags)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => {
                if let Some(event) = decode_wait_status(status) {
                    push_event(event);
                }
            }
        }
    }
}

extern "C" fn forward_to_foreground(signo: libc::c_int) {
    let _errno = SavedErrno::new();
    let pgid = FOREGROUND_PGID.load(Ordering::SeqCst);
    if pgid <= 0 || pgid == SHELL_PGID.load(Ordering::SeqCst) {
        return;
    }

    if let Ok(signal) = Signal::try_from(signo) {
        let _ = signal::killpg(Pid::from_raw(pgid), signal);
    }
}

/// Preserves `errno` across a signal handler.
struct SavedErrno(libc::c_int);

impl SavedErrno {
    fn new() -> Self {
        SavedErrno(unsafe { *errno_location() })
    }
}

impl Drop for SavedErrno {
    fn drop(&mut self) {
        unsafe {
            *errno_location() = self.0;
        }
    }
}

#[cfg(target_os = "linux")]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}
