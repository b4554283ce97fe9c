//! Shell-independent building blocks: turning an input line into a
//! `Pipeline` and tracking launched pipelines as `Job`s.

pub mod job;
pub mod pipeline;
pub mod tokenizer;
