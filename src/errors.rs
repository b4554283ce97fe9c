//! Error module. See the [failure](https://crates.io/crates/failure) crate for details.

use std::fmt;
use std::result;

use failure::{Backtrace, Context, Fail};

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    ctx: Context<ErrorKind>,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.ctx.get_context()
    }

    /// Returns `true` if the error was produced while parsing an input line.
    pub fn is_syntax(&self) -> bool {
        match *self.kind() {
            ErrorKind::UnterminatedQuote(_)
            | ErrorKind::TooManyArguments(_)
            | ErrorKind::EmptyPipelineStage
            | ErrorKind::MissingCommand => true,
            _ => false,
        }
    }

    pub(crate) fn unterminated_quote(quote: char) -> Error {
        Error::from(ErrorKind::UnterminatedQuote(quote))
    }

    pub(crate) fn too_many_arguments(limit: usize) -> Error {
        Error::from(ErrorKind::TooManyArguments(limit))
    }

    pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
        Error::from(ErrorKind::BuiltinCommand {
            message: message.as_ref().to_string(),
            code,
        })
    }

    pub(crate) fn no_such_job<T: AsRef<str>>(job: T) -> Error {
        Error::from(ErrorKind::NoSuchJob(job.as_ref().to_string()))
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.ctx.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.ctx.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.ctx, f)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    UnterminatedQuote(char),
    TooManyArguments(usize),
    EmptyPipelineStage,
    MissingCommand,
    BuiltinCommand { message: String, code: i32 },
    NoSuchJob(String),
    Docopt,
    Io,
    Nix,
    Readline,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorKind::UnterminatedQuote(quote) => {
                write!(f, "syntax error: unterminated quote `{}'", quote)
            }
            ErrorKind::TooManyArguments(limit) => {
                write!(f, "syntax error: more than {} arguments", limit)
            }
            ErrorKind::EmptyPipelineStage => write!(f, "syntax error near unexpected token `|'"),
            ErrorKind::MissingCommand => write!(f, "syntax error near unexpected token `&'"),
            ErrorKind::BuiltinCommand { ref message, .. } => write!(f, "{}", message),
            ErrorKind::NoSuchJob(ref job) => write!(f, "{}: no such job", job),
            ErrorKind::Docopt => write!(f, "Docopt error occurred"),
            ErrorKind::Io => write!(f, "I/O error occurred"),
            ErrorKind::Nix => write!(f, "Nix error occurred"),
            ErrorKind::Readline => write!(f, "Readline error occurred"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::from(Context::new(kind))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(ctx: Context<ErrorKind>) -> Error {
        Error { ctx }
    }
}
