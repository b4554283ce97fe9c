#![allow(dead_code)]

use std::ffi::OsStr;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{self, Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tempdir::TempDir;

/// WorkDir represents a scratch directory in which a test runs the shell.
///
/// The shell's `HOME` points at the scratch directory, so history and log
/// files never touch the real home directory.
#[derive(Debug)]
pub struct WorkDir {
    /// Removed when the WorkDir is dropped.
    home: TempDir,
    /// The directory in which the test will run.
    dir: PathBuf,
}

impl WorkDir {
    /// Creates a fresh home directory with a `work` directory inside it.
    pub fn new(name: &str) -> WorkDir {
        let home = TempDir::new(&format!("jsh-{}", name)).unwrap();
        let dir = home.path().join("work");
        fs::create_dir_all(&dir).unwrap();
        WorkDir { home, dir }
    }

    pub fn home(&self) -> &Path {
        self.home.path()
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Creates a file relative to the working directory.
    pub fn create<P: AsRef<Path>>(&self, name: P, contents: &str) -> PathBuf {
        let path = self.dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// Builds a new command to run in this working directory.
    pub fn command<I, S>(&self, args: I) -> process::Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(self.bin());
        cmd.current_dir(&self.dir)
            .env("HOME", self.home())
            .arg(format!("--log={}", self.home().join("jsh.log").display()))
            .args(args);
        cmd
    }

    /// Returns path to executable.
    fn bin(&self) -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_jsh"))
    }

    /// Runs the shell with `input` on its stdin and collects its output.
    pub fn run_stdin(&self, input: &str) -> process::Output {
        let mut child = self
            .command(Vec::<&str>::new())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(input.as_bytes())
            .unwrap();
        child.wait_with_output().unwrap()
    }

    /// Starts the shell without input, so a test can feed it lines and signal
    /// it while it runs.
    pub fn spawn(&self) -> RunningShell {
        let mut child = self
            .command(Vec::<&str>::new())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let stdin = child.stdin.take();
        let stdout = BufReader::new(child.stdout.take().unwrap());
        RunningShell {
            child,
            stdin,
            stdout,
        }
    }

    /// Runs the shell on `input` and returns its stdout.
    ///
    /// Panics if the shell fails.
    pub fn stdout(&self, input: &str) -> String {
        let o = self.run_stdin(input);
        check_success(&o, input);
        String::from_utf8_lossy(&o.stdout).into_owned()
    }

    /// Executes the command and collects its output.
    ///
    /// Panic if the command fails.
    pub fn output(&self, cmd: &mut process::Command) -> process::Output {
        let o = cmd.output().unwrap();
        check_success(&o, &format!("{:?}", cmd));
        o
    }
}

/// A shell started by `WorkDir::spawn`.
#[derive(Debug)]
pub struct RunningShell {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl RunningShell {
    pub fn write(&mut self, input: &str) {
        let stdin = self.stdin.as_mut().unwrap();
        stdin.write_all(input.as_bytes()).unwrap();
        stdin.flush().unwrap();
    }

    /// Blocks until the shell writes a full line to stdout.
    pub fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.stdout.read_line(&mut line).unwrap();
        line
    }

    /// Sends `sig` to the shell process only, not to its process group.
    pub fn signal(&self, sig: Signal) {
        signal::kill(Pid::from_raw(self.child.id() as i32), sig).unwrap();
    }

    /// Closes the shell's stdin and returns its exit status with the rest of
    /// its stdout.
    pub fn finish(mut self) -> (ExitStatus, String) {
        drop(self.stdin.take());
        let mut rest = String::new();
        self.stdout.read_to_string(&mut rest).unwrap();
        (self.child.wait().unwrap(), rest)
    }
}

fn check_success(o: &process::Output, input: &str) {
    if !o.status.success() {
        panic!(
            "\n\n==========\n\
             command failed but expected success!\
             \n\ninput: {}\
             \n\nstatus: {}\
             \n\nstdout: {}\
             \n\nstderr: {}\
             \n\n==========\n",
            input,
            o.status,
            String::from_utf8_lossy(&o.stdout),
            String::from_utf8_lossy(&o.stderr)
        );
    }
}
