use std::str::FromStr;

use todo_store::{Priority, StoreOp, TodoId};
use todo_sync::Filter;
use todo_sync::view::ParseFilterError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("{0}")]
    Invalid(String),
}

/// Target of a `filter` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterStep {
    To(Filter),
    Next,
    Prev,
}

impl FromStr for FilterStep {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next" | ">" => Ok(Self::Next),
            "prev" | "previous" | "<" => Ok(Self::Prev),
            other => other.parse().map(Self::To),
        }
    }
}

/// One line of shell input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    List,
    Add { priority: Priority, title: String },
    Edit { id: TodoId },
    Priority(Priority),
    Save { title: String },
    Cancel,
    Toggle { id: TodoId },
    Remove { id: TodoId },
    Filter(FilterStep),
    Search(String),
    Refresh,
    Fail(StoreOp),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  list                      show the filtered list
  add <priority> <title>    create a todo (high|medium|low)
  edit <id>                 start editing a todo
  prio <priority>           change the priority of the todo being edited
  save <title>              save the todo being edited
  cancel                    leave edit mode
  toggle <id>               flip completed
  rm <id>                   delete a todo
  filter all|active|completed|next|prev
  search [text]             filter by title; no text clears
  refresh                   reload from the store
  fail <op>                 make the next list|create|update|toggle|delete fail
  quit";

impl Command {
    /// Parse a line; blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "list" | "ls" => Self::List,
            "add" => {
                let (priority, title) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(CommandError::Usage("add <priority> <title>"))?;
                Self::Add {
                    priority: parse_arg(priority)?,
                    title: title.trim().to_string(),
                }
            }
            "edit" => Self::Edit {
                id: required(rest, "edit <id>")?,
            },
            "prio" | "priority" => Self::Priority(required(rest, "prio <priority>")?),
            "save" => Self::Save {
                title: rest.to_string(),
            },
            "cancel" => Self::Cancel,
            "toggle" => Self::Toggle {
                id: required(rest, "toggle <id>")?,
            },
            "rm" | "delete" => Self::Remove {
                id: required(rest, "rm <id>")?,
            },
            "filter" => Self::Filter(required(rest, "filter all|active|completed|next|prev")?),
            "search" => Self::Search(rest.to_string()),
            "refresh" => Self::Refresh,
            "fail" => Self::Fail(required(rest, "fail <op>")?),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn required<T>(arg: &str, usage: &'static str) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if arg.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    parse_arg(arg)
}

fn parse_arg<T>(arg: &str) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    arg.parse()
        .map_err(|err: T::Err| CommandError::Invalid(err.to_string()))
}
