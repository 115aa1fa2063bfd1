//! ish: a small interactive shell.
//!
//! A line goes through [`tokenizer`] and [`parser`] into a
//! [`types::Pipeline`], which [`eval`] launches. Foreground jobs are waited
//! on in place ([`job`]); background jobs are handed to the [`reaper`].

pub mod types;
pub mod tokenizer;
pub mod parser;
pub mod search;
pub mod job;
pub mod reaper;
pub mod global;
pub mod eval;
