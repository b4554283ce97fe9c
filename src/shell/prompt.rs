//! Renders the interactive prompt, `[user] on [host] >> cwd $ `.

use std::env;
use std::path::{Path, PathBuf};

use nix::unistd::{self, User};

const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[95m";
const RESET: &str = "\x1b[0m";

/// Builds the prompt, with ANSI colours when `colored` is set.
pub fn render(colored: bool) -> String {
    let user = username().unwrap_or_else(|| "?".to_string());
    let host = hostname().unwrap_or_else(|| "?".to_string());
    let cwd = current_dir_display();

    if colored {
        format!(
            "{green}[{}]{reset} on {yellow}[{}]{reset} >> {magenta}{}{reset} {green}${reset} ",
            user,
            host,
            cwd,
            green = GREEN,
            yellow = YELLOW,
            magenta = MAGENTA,
            reset = RESET
        )
    } else {
        format!("[{}] on [{}] >> {} $ ", user, host, cwd)
    }
}

fn username() -> Option<String> {
    match User::from_uid(unistd::getuid()) {
        Ok(Some(user)) => Some(user.name),
        Ok(None) => env::var("USER").ok(),
        Err(e) => {
            warn!("failed to look up current user: {}", e);
            env::var("USER").ok()
        }
    }
}

fn hostname() -> Option<String> {
    let temp_result = unistd::gethostname();
    log_if_err!(temp_result, "failed to get hostname");
    temp_result
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
}

fn current_dir_display() -> String {
    match env::current_dir() {
        Ok(cwd) => abbreviate_home(&cwd, dirs::home_dir().as_deref())
            .display()
            .to_string(),
        Err(e) => {
            warn!("failed to get current directory: {}", e);
            "?".to_string()
        }
    }
}

/// Replaces a leading home directory with `~`.
fn abbreviate_home(cwd: &Path, home: Option<&Path>) -> PathBuf {
    match home.and_then(|home| cwd.strip_prefix(home).ok()) {
        Some(rel) if rel.as_os_str().is_empty() => PathBuf::from("~"),
        Some(rel) => Path::new("~").join(rel),
        None => cwd.to_path_buf(),
    }
}
