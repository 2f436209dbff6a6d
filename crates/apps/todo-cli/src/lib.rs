//! Line-oriented front end for the todo cache.
//!
//! [`Shell`] reads one [`Command`] per line, drives a
//! [`MutationController`](todo_sync::MutationController) and prints the
//! filtered list through [`Output`].

pub mod command;
pub mod output;
pub mod shell;

pub use command::{Command, CommandError, FilterStep};
pub use output::Output;
pub use shell::{Flow, Shell};
