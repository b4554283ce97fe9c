use std::io;
use std::os::unix::prelude::*;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use failure::Fail;
use nix::errno::Errno;
use nix::unistd;

use crate::errors::{ErrorKind, Result};

/// JSH Utility Extensions for `ExitStatus`
pub trait JshExitStatusExt {
    /// Create an ExitStatus to indicate *successful* program execution.
    fn from_success() -> Self;

    /// Create an ExitStatus to indicate *unsuccessful* program execution.
    fn from_failure() -> Self;

    /// Create an ExitStatus from a status code
    fn from_status(code: i32) -> Self;
}

impl JshExitStatusExt for ExitStatus {
    /// # Examples
    /// ```rust
    /// use jsh_rs::JshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_success().success());
    /// ```
    fn from_success() -> Self {
        ExitStatus::from_status(0)
    }

    /// # Examples
    /// ```rust
    /// use jsh_rs::JshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(!ExitStatus::from_failure().success());
    /// ```
    fn from_failure() -> Self {
        ExitStatus::from_status(1)
    }

    /// # Examples
    /// ```rust
    /// use jsh_rs::JshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_status(0).success());
    /// assert_eq!(ExitStatus::from_status(3).code(), Some(3));
    /// ```
    fn from_status(code: i32) -> Self {
        ExitStatus::from_raw((code & 0xff) << 8)
    }
}

pub fn get_terminal() -> RawFd {
    io::stdin().as_raw_fd()
}

/// Reads one line from `fd` a byte at a time, so input past the newline is
/// left for child processes sharing the descriptor. The newline is not
/// included. Returns `None` at end of input.
pub fn read_line_unbuffered(fd: RawFd) -> Result<Option<String>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match unistd::read(fd, &mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => {
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            Ok(_) => line.push(byte[0]),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        }
    }

    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

/// Wraps an exit code the way `exit(3)` truncates it: positive n becomes
/// n % 256 and negative n becomes (256 + n) % 256.
pub fn exit_code_like_u8(code: i32) -> i32 {
    code.rem_euclid(256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_like_u8() {
        assert_eq!(exit_code_like_u8(0), 0);
        assert_eq!(exit_code_like_u8(85), 85);
        assert_eq!(exit_code_like_u8(500), 244);
        assert_eq!(exit_code_like_u8(-244), 12);
    }

    #[test]
    fn test_read_line_unbuffered() {
        let (read_end, write_end) = unistd::pipe().unwrap();
        unistd::write(write_end, b"echo a\n\nlast").unwrap();
        unistd::close(write_end).unwrap();

        assert_eq!(read_line_unbuffered(read_end).unwrap(), Some("echo a".to_string()));
        assert_eq!(read_line_unbuffered(read_end).unwrap(), Some(String::new()));
        assert_eq!(read_line_unbuffered(read_end).unwrap(), Some("last".to_string()));
        assert_eq!(read_line_unbuffered(read_end).unwrap(), None);
        unistd::close(read_end).unwrap();
    }

    #[test]
    fn test_from_status_round_trips_code() {
        assert_eq!(ExitStatus::from_status(127).code(), Some(127));
        assert!(!ExitStatus::from_failure().success());
    }
}
