//! Groups tokens into the stages of a pipeline.

use std::fmt;
use std::mem;

use crate::core::tokenizer::{self, TokenizedLine};
use crate::errors::{Error, ErrorKind, Result};

const PIPE: &str = "|";

/// One command of a pipeline: the program name followed by its arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Stage {
    argv: Vec<String>,
}

impl Stage {
    /// # Panics
    /// Panics if `argv` is empty.
    pub fn new(argv: Vec<String>) -> Self {
        assert!(!argv.is_empty(), "a stage needs a program name");
        Self { argv }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pipeline {
    input: String,
    stages: Vec<Stage>,
    background: bool,
}

impl Pipeline {
    /// Parses an input line. Returns `None` if the line holds no command.
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let line = tokenizer::tokenize(input)?;
        let result = Self::from_tokens(input, line);
        debug!("parsed Pipeline: {:?}", result);
        result
    }

    /// Splits the tokens on unquoted `|`. Empty stages are rejected.
    pub fn from_tokens(input: &str, line: TokenizedLine) -> Result<Option<Self>> {
        if line.tokens.is_empty() {
            return if line.background {
                Err(Error::from(ErrorKind::MissingCommand))
            } else {
                Ok(None)
            };
        }

        let mut stages = Vec::new();
        let mut current = Vec::new();
        for token in line.tokens {
            if token.is_operator(PIPE) {
                if current.is_empty() {
                    return Err(Error::from(ErrorKind::EmptyPipelineStage));
                }
                stages.push(Stage::new(mem::replace(&mut current, Vec::new())));
            } else {
                current.push(token.into_string());
            }
        }

        if current.is_empty() {
            return Err(Error::from(ErrorKind::EmptyPipelineStage));
        }
        stages.push(Stage::new(current));

        Ok(Some(Self {
            input: input.trim().to_string(),
            stages,
            background: line.background,
        }))
    }

    /// The original line, retained for display.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    /// A single-stage pipeline is run as a simple command, which makes it
    /// eligible for builtin dispatch.
    pub fn is_simple(&self) -> bool {
        self.stages.len() == 1
    }
}
