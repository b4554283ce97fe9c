use serde::Deserialize;

use crate::core::job::{Job, JobId};
use crate::shell::builtins::{self, prelude::*};

pub struct Jobs;

#[derive(Debug, Default, Deserialize)]
struct JobsArgs {
    flag_l: bool,
    flag_p: bool,
}

impl builtins::BuiltinCommand for Jobs {
    const NAME: &'static str = builtins::JOBS_NAME;

    const HELP: &'static str = "\
jobs: jobs [-l | -p]
    Display status of jobs.

    Lists the active jobs, ordered by job id. Finished jobs are not listed.

Usage:
    jobs [-l | -p]

Options:
    -l      lists process IDs in addition to the normal information
    -p      lists process group IDs only";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let args: JobsArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;
        debug!("{:?}", args);

        let job_manager = shell.job_manager_mut();
        job_manager.refresh()?;
        for job in job_manager.table().list() {
            if !job.is_completed() {
                write_job(stdout, job, &args)?;
            }
        }

        Ok(())
    }
}

fn write_job(stdout: &mut dyn Write, job: &Job, args: &JobsArgs) -> Result<()> {
    let job_id = job.id().map_or_else(|| "?".to_string(), |id| id.to_string());
    if args.flag_l {
        let processes = job.processes();
        if let Some(first) = processes.first() {
            writeln!(
                stdout,
                "[{}] {}\t{}\t{}",
                job_id,
                first.pid(),
                first.status(),
                first.argv()
            )
            .context(ErrorKind::Io)?;
        }
        for process in processes.iter().skip(1) {
            writeln!(
                stdout,
                "    {}\t{}\t| {}",
                process.pid(),
                process.status(),
                process.argv()
            )
            .context(ErrorKind::Io)?;
        }
    } else if args.flag_p {
        writeln!(stdout, "{}", job.pgid()).context(ErrorKind::Io)?;
    } else {
        writeln!(
            stdout,
            "[{}] {}\t{}\t{}",
            job_id,
            job.representative_pid(),
            job.state(),
            job.command()
        )
        .context(ErrorKind::Io)?;
    }

    Ok(())
}

/// Parses a job spec, `N` or `%N`.
fn parse_job_id(spec: &str) -> Result<JobId> {
    let digits = spec.strip_prefix('%').unwrap_or(spec);
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Ok(JobId(n)),
        _ => Err(Error::no_such_job(spec)),
    }
}

#[derive(Debug, Deserialize)]
struct JobSpecArgs {
    arg_jobspec: String,
}

pub struct Fg;

impl builtins::BuiltinCommand for Fg {
    const NAME: &'static str = builtins::FG_NAME;

    const HELP: &'static str = "\
fg: fg <jobspec>
    Move job to the foreground.

    Place the job identified by JOBSPEC (N or %N) in the foreground,
    continuing it if it is stopped, and wait for it to finish or stop.

Usage:
    fg <jobspec>";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let args: JobSpecArgs =
            parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;
        let job_id = parse_job_id(&args.arg_jobspec)?;
        let status = shell.job_manager_mut().put_job_in_foreground(job_id)?;
        debug!("job [{}] returned {:?}", job_id, status);
        Ok(())
    }
}

pub struct Bg;

impl builtins::BuiltinCommand for Bg {
    const NAME: &'static str = builtins::BG_NAME;

    const HELP: &'static str = "\
bg: bg <jobspec>
    Move job to the background.

    Continue the job identified by JOBSPEC (N or %N) in the background, as
    if it had been started with `&'.

Usage:
    bg <jobspec>";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let args: JobSpecArgs =
            parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;
        let job_id = parse_job_id(&args.arg_jobspec)?;
        shell.job_manager_mut().put_job_in_background(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::Process;
    use crate::shell::builtins::BuiltinCommand;
    use nix::unistd::Pid;

    fn pipeline_job() -> Job {
        let processes = vec![
            Process::new(Pid::from_raw(100), "sleep 5"),
            Process::new(Pid::from_raw(101), "cat"),
        ];
        Job::new("sleep 5 | cat &", Pid::from_raw(100), processes)
    }

    fn render(job: &Job, args: &JobsArgs) -> String {
        let mut out = Vec::new();
        write_job(&mut out, job, args).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_job_id() {
        assert_eq!(parse_job_id("1").unwrap(), JobId(1));
        assert_eq!(parse_job_id("%12").unwrap(), JobId(12));
        assert_eq!(
            parse_job_id("0").unwrap_err().kind(),
            &ErrorKind::NoSuchJob("0".to_string())
        );
        assert!(parse_job_id("%").is_err());
        assert!(parse_job_id("-1").is_err());
        assert!(parse_job_id("one").is_err());
    }

    #[test]
    fn test_jobs_args() {
        let args: JobsArgs = parse_args(Jobs::HELP, Jobs::NAME, vec!["-l"]).unwrap();
        assert!(args.flag_l);
        assert!(!args.flag_p);
        assert!(parse_args::<JobsArgs, _, _>(Jobs::HELP, Jobs::NAME, vec!["-l", "-p"]).is_err());
        assert!(parse_args::<JobsArgs, _, _>(Jobs::HELP, Jobs::NAME, vec!["-x"]).is_err());
    }

    #[test]
    fn test_fg_requires_jobspec() {
        let err =
            parse_args::<JobSpecArgs, _, _>(Fg::HELP, Fg::NAME, Vec::<&str>::new()).unwrap_err();
        assert_eq!(err.to_string(), "fg: usage: fg <jobspec>");
        let args: JobSpecArgs = parse_args(Bg::HELP, Bg::NAME, vec!["%2"]).unwrap();
        assert_eq!(args.arg_jobspec, "%2");
    }

    #[test]
    fn test_write_job() {
        let job = pipeline_job();
        assert_eq!(
            render(&job, &JobsArgs::default()),
            "[?] 101\tRunning\tsleep 5 | cat &\n"
        );
        assert_eq!(
            render(
                &job,
                &JobsArgs {
                    flag_l: true,
                    flag_p: false
                }
            ),
            "[?] 100\tRunning\tsleep 5\n    101\tRunning\t| cat\n"
        );
        assert_eq!(
            render(
                &job,
                &JobsArgs {
                    flag_l: false,
                    flag_p: true
                }
            ),
            "100\n"
        );
    }
}
