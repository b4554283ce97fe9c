use std::env;
use std::path::PathBuf;

use nix::unistd;

use crate::shell::builtins::{self, prelude::*};

pub struct Cd;

impl builtins::BuiltinCommand for Cd {
    const NAME: &'static str = builtins::CD_NAME;

    const HELP: &'static str = "\
cd: cd [dir]
    Change the current directory to DIR. The home directory is the default
    DIR. On failure the current directory is left unchanged.";

    fn run<T: AsRef<str>>(_shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        if args.len() > 1 {
            return Err(Error::builtin_command("cd: too many arguments", 1));
        }

        let dir = match args.first().map(AsRef::as_ref) {
            Some("~") | None => home_dir()?,
            Some(dir) => PathBuf::from(dir),
        };

        // chdir(2) leaves the directory as it was when it fails
        unistd::chdir(dir.as_path()).map_err(|e| {
            Error::builtin_command(format!("cd: {}: {}", dir.display(), e.desc()), 1)
        })?;
        debug!("changed directory to {:?}", env::current_dir());
        Ok(())
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| Error::builtin_command("cd: HOME not set", 1))
}
