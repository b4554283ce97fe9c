//! Integration Tests
//!
//! Each test runs the `jsh` binary with a script on its stdin. Stdin is a
//! pipe, so the shell runs without a prompt, history or terminal handoff.

mod workdir;

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use workdir::{RunningShell, WorkDir};

struct ScriptData<'a> {
    pub input: &'a str,
    pub stdout: &'a str,
    pub exit_status: i32,
}

const SCRIPTS: &[ScriptData<'static>] = &[
    ScriptData {
        input: "echo test\n",
        stdout: "test\n",
        exit_status: 0,
    },
    ScriptData {
        input: "echo \"a  b\" 'c|d' '&'\n",
        stdout: "a  b c|d &\n",
        exit_status: 0,
    },
    ScriptData {
        input: "exit 85\necho unreachable\n",
        stdout: "",
        exit_status: 85,
    },
    ScriptData {
        input: "exit 500\n",
        stdout: "",
        exit_status: 244,
    },
    ScriptData {
        input: "exit -244\n",
        stdout: "",
        exit_status: 12,
    },
    ScriptData {
        input: "exit\n",
        stdout: "",
        exit_status: 0,
    },
    ScriptData {
        input: "false\n",
        stdout: "",
        exit_status: 0,
    },
];

fn lines(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::to_string)
        .collect()
}

fn canonical(path: &Path) -> String {
    fs::canonicalize(path).unwrap().display().to_string()
}

#[test]
fn test_simple_scripts() {
    let wd = WorkDir::new("scripts");
    for script in SCRIPTS {
        let o = wd.run_stdin(script.input);
        assert_eq!(
            String::from_utf8_lossy(&o.stdout),
            script.stdout,
            "input: {:?}",
            script.input
        );
        assert_eq!(
            o.status.code(),
            Some(script.exit_status),
            "input: {:?}",
            script.input
        );
    }
}

#[test]
fn test_pipelines_of_every_length() {
    let wd = WorkDir::new("pipelines");
    assert_eq!(wd.stdout("echo hello\n"), "hello\n");
    assert_eq!(wd.stdout("printf \"b\\na\\n\" | sort\n"), "a\nb\n");
    assert_eq!(
        wd.stdout("printf \"b\\na\\nb\\n\" | sort | uniq\n"),
        "a\nb\n"
    );
    assert_eq!(
        wd.stdout("printf \"b\\na\\nb\\n\" | sort | uniq | tr a-z A-Z\n"),
        "A\nB\n"
    );
    assert_eq!(
        wd.stdout("printf \"c\\nb\\na\\nb\\n\" | sort | uniq | tr a-z A-Z | head -n 2\n"),
        "A\nB\n"
    );
}

#[test]
fn test_pipeline_end_of_file_propagates() {
    let wd = WorkDir::new("eof");
    // `cat` only exits if every write end of its input pipe is closed
    assert_eq!(wd.stdout("echo done | cat | cat | wc -l\n").trim(), "1");
}

#[test]
fn test_background_job_is_listed() {
    let wd = WorkDir::new("background");
    let stdout = wd.stdout("sleep 1 &\njobs\n");
    let jobs = lines(stdout.as_bytes());
    assert_eq!(jobs.len(), 1, "jobs: {:?}", jobs);
    assert!(jobs[0].starts_with("[1] "), "jobs: {:?}", jobs);
    assert!(jobs[0].contains("Running"), "jobs: {:?}", jobs);
    assert!(jobs[0].ends_with("sleep 1 &"), "jobs: {:?}", jobs);
}

#[test]
fn test_background_job_ids_are_sequential() {
    let wd = WorkDir::new("sequential");
    let stdout = wd.stdout("sleep 1 &\nsleep 1&\njobs -p\njobs\n");
    let jobs = lines(stdout.as_bytes());
    assert_eq!(jobs.len(), 4, "jobs: {:?}", jobs);
    assert!(jobs[2].starts_with("[1] "), "jobs: {:?}", jobs);
    assert!(jobs[3].starts_with("[2] "), "jobs: {:?}", jobs);
    assert!(jobs[3].ends_with("sleep 1&"), "jobs: {:?}", jobs);
}

#[test]
fn test_stopped_job_can_be_resumed_in_foreground() {
    let wd = WorkDir::new("stopped");
    let stdout = wd.stdout("sh -c 'kill -STOP $$; echo resumed'\njobs\nfg %1\njobs\n");
    let out = lines(stdout.as_bytes());
    assert_eq!(out.len(), 2, "stdout: {:?}", out);
    assert!(out[0].starts_with("[1] "), "stdout: {:?}", out);
    assert!(out[0].contains("Stopped"), "stdout: {:?}", out);
    assert!(
        out[0].ends_with("sh -c 'kill -STOP $$; echo resumed'"),
        "stdout: {:?}",
        out
    );
    assert_eq!(out[1], "resumed");
}

#[test]
fn test_stopped_job_can_be_resumed_in_background() {
    let wd = WorkDir::new("bg");
    let stdout = wd.stdout("sh -c 'kill -STOP $$; echo resumed'\nbg 1\nsleep 0.5\njobs\n");
    assert_eq!(stdout, "resumed\n");
}

#[test]
fn test_finished_background_job_is_removed() {
    let wd = WorkDir::new("finished");
    let o = wd.run_stdin("true &\nsleep 0.3\njobs\nfg 1\nbg 1\n");
    assert!(o.status.success());
    assert_eq!(String::from_utf8_lossy(&o.stdout), "");
    let stderr = lines(&o.stderr);
    assert_eq!(
        stderr,
        vec!["jsh: fg: 1: no such job", "jsh: bg: 1: no such job"]
    );
}

#[test]
fn test_job_control_argument_errors() {
    let wd = WorkDir::new("jobspec");
    let o = wd.run_stdin("fg\nfg x\nbg %0\njobs -x\n");
    assert!(o.status.success());
    let stderr = lines(&o.stderr);
    assert_eq!(
        stderr,
        vec![
            "jsh: fg: usage: fg <jobspec>",
            "jsh: fg: x: no such job",
            "jsh: bg: %0: no such job",
            "jsh: jobs: usage: jobs [-l | -p]",
        ]
    );
}

#[test]
fn test_cd() {
    let wd = WorkDir::new("cd");
    let o = wd.run_stdin("cd /nonexistent\npwd\ncd\npwd\ncd work\npwd\n");
    assert!(o.status.success());
    assert_eq!(
        lines(&o.stdout),
        vec![
            canonical(wd.path()),
            canonical(wd.home()),
            canonical(wd.path())
        ]
    );
    let stderr = lines(&o.stderr);
    assert_eq!(stderr.len(), 1);
    assert!(
        stderr[0].starts_with("jsh: cd: /nonexistent: "),
        "stderr: {:?}",
        stderr
    );
}

#[test]
fn test_syntax_errors() {
    let wd = WorkDir::new("syntax");
    let o = wd.run_stdin("   \n|\nls |\n| ls\n&\necho \"open\n");
    assert!(o.status.success());
    assert_eq!(String::from_utf8_lossy(&o.stdout), "");
    assert_eq!(
        lines(&o.stderr),
        vec![
            "jsh: syntax error near unexpected token `|'",
            "jsh: syntax error near unexpected token `|'",
            "jsh: syntax error near unexpected token `|'",
            "jsh: syntax error near unexpected token `&'",
            "jsh: syntax error: unterminated quote `\"'",
        ]
    );
}

#[test]
fn test_too_many_arguments() {
    let wd = WorkDir::new("args");
    let words = vec!["x"; 64].join(" ");
    let o = wd.run_stdin(&format!("echo {}\necho ok\n", words));
    assert_eq!(lines(&o.stdout), vec!["ok"]);
    assert_eq!(
        lines(&o.stderr),
        vec!["jsh: syntax error: more than 64 arguments"]
    );
}

#[test]
fn test_exec_failure_leaves_shell_running() {
    let wd = WorkDir::new("exec");
    let o = wd.run_stdin("jsh-no-such-program arg\necho still here\n");
    assert!(o.status.success());
    assert_eq!(String::from_utf8_lossy(&o.stdout), "still here\n");
    let stderr = String::from_utf8_lossy(&o.stderr);
    assert!(
        stderr.starts_with("jsh: jsh-no-such-program: "),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_children_do_not_consume_script() {
    let wd = WorkDir::new("stdin");
    // `head -c` reads no further than the bytes it prints
    assert_eq!(
        wd.stdout("head -c 11\nfrom stdin\necho after\n"),
        "from stdin\nafter\n"
    );
}

#[test]
fn test_background_job_does_not_read_script() {
    let wd = WorkDir::new("background-stdin");
    assert_eq!(wd.stdout("cat &\nsleep 0.3\necho after\n"), "after\n");
}

/// Starts `command` in the foreground and returns once it has had time to
/// begin running.
fn start_foreground(wd: &WorkDir, command: &str) -> RunningShell {
    let mut shell = wd.spawn();
    shell.write(&format!("echo ready\n{}\n", command));
    assert_eq!(shell.read_line(), "ready\n");
    thread::sleep(Duration::from_millis(300));
    shell
}

#[test]
fn test_terminal_stop_is_forwarded_to_foreground_job() {
    let wd = WorkDir::new("tstp");
    let mut shell = start_foreground(&wd, "sleep 2");
    shell.signal(Signal::SIGTSTP);
    shell.write("jobs\nfg 1\necho after\n");
    let (status, stdout) = shell.finish();
    assert!(status.success());
    let out = lines(stdout.as_bytes());
    assert_eq!(out.len(), 2, "stdout: {:?}", out);
    assert!(out[0].starts_with("[1] "), "stdout: {:?}", out);
    assert!(out[0].ends_with("\tStopped\tsleep 2"), "stdout: {:?}", out);
    assert_eq!(out[1], "after");
}

#[test]
fn test_terminal_stop_reaches_every_stage() {
    let wd = WorkDir::new("tstp-pipeline");
    let mut shell = start_foreground(&wd, "sleep 1 | cat");
    shell.signal(Signal::SIGTSTP);
    shell.write("jobs\nfg 1\necho after\n");
    let (status, stdout) = shell.finish();
    assert!(status.success());
    let out = lines(stdout.as_bytes());
    assert_eq!(out.len(), 2, "stdout: {:?}", out);
    assert!(
        out[0].ends_with("\tStopped\tsleep 1 | cat"),
        "stdout: {:?}",
        out
    );
    assert_eq!(out[1], "after");
}

#[test]
fn test_interrupt_ends_foreground_job_only() {
    let wd = WorkDir::new("sigint");
    let mut shell = start_foreground(&wd, "sleep 5");
    let start = Instant::now();
    shell.signal(Signal::SIGINT);
    shell.write("echo alive\n");
    assert_eq!(shell.read_line(), "alive\n");
    assert!(start.elapsed() < Duration::from_secs(3));
    let (status, stdout) = shell.finish();
    assert!(status.success());
    assert_eq!(stdout, "");
}

#[test]
fn test_idle_shell_ignores_stop_and_interrupt() {
    let wd = WorkDir::new("idle");
    let mut shell = wd.spawn();
    shell.write("echo ready\n");
    assert_eq!(shell.read_line(), "ready\n");
    thread::sleep(Duration::from_millis(200));
    shell.signal(Signal::SIGTSTP);
    shell.signal(Signal::SIGINT);
    shell.write("echo after\n");
    let (status, stdout) = shell.finish();
    assert!(status.success());
    assert_eq!(stdout, "after\n");
}

#[test]
fn test_command_string() {
    let wd = WorkDir::new("command");
    let o = wd.output(&mut wd.command(vec!["-c", "echo hi | tr a-z A-Z"]));
    assert_eq!(String::from_utf8_lossy(&o.stdout), "HI\n");
}

#[test]
fn test_script_file() {
    let wd = WorkDir::new("file");
    let script = wd.create("script.jsh", "echo one\n|\necho two\n");
    let o = wd.output(&mut wd.command(vec![script]));
    assert_eq!(String::from_utf8_lossy(&o.stdout), "one\ntwo\n");
    assert_eq!(
        lines(&o.stderr),
        vec!["jsh: syntax error near unexpected token `|'"]
    );
}

#[test]
fn test_version() {
    let wd = WorkDir::new("version");
    let o = wd.output(&mut wd.command(vec!["--version"]));
    assert_eq!(
        String::from_utf8_lossy(&o.stdout),
        format!("jsh version {}\n", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn test_log_file_is_written() {
    let wd = WorkDir::new("log");
    wd.stdout("echo logged\n");
    let log = fs::read_to_string(wd.home().join("jsh.log")).unwrap();
    assert!(log.contains("jsh started up"), "log: {}", log);
    assert!(log.contains("jsh has shut down"), "log: {}", log);
}
