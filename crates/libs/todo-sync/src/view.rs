//! Read-side helpers for presenting the cache: status filter, title search,
//! newest-first ordering, and the single-record edit session.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use todo_store::{Priority, Todo, TodoId};

use crate::cache::Records;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter {0:?} (expected all, active or completed)")]
pub struct ParseFilterError(String);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub const ALL: [Filter; 3] = [Filter::All, Filter::Active, Filter::Completed];

    pub fn matches(self, todo: &Todo) -> bool {
        match self {
            Self::All => true,
            Self::Active => !todo.completed,
            Self::Completed => todo.completed,
        }
    }

    /// Next filter, wrapping around.
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    /// Previous filter, wrapping around.
    pub fn prev(self) -> Self {
        let index = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(index + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filter {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(ParseFilterError(other.to_string())),
        }
    }
}

/// Filter and search applied to the cache for display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListView {
    pub filter: Filter,
    pub search: String,
}

impl ListView {
    pub fn matches(&self, todo: &Todo) -> bool {
        if !self.filter.matches(todo) {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        needle.is_empty() || todo.title.to_lowercase().contains(&needle)
    }

    /// Matching records, newest first.
    pub fn visible(&self, records: &Records) -> Vec<Todo> {
        records
            .iter()
            .rev()
            .filter(|todo| self.matches(todo))
            .cloned()
            .collect()
    }

    /// Placeholder text for when nothing matches.
    pub fn empty_message(&self) -> String {
        let search = self.search.trim();
        if !search.is_empty() {
            return format!("No results found for \"{search}\"");
        }
        match self.filter {
            Filter::All => "Your task list is empty. Start by adding one!".to_string(),
            Filter::Active => "All caught up! No pending tasks found.".to_string(),
            Filter::Completed => "No completed tasks yet. Keep going!".to_string(),
        }
    }
}

/// Working copy of a record being edited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditDraft {
    pub id: TodoId,
    pub title: String,
    pub priority: Priority,
}

/// At most one record is in edit mode at a time.
///
/// Opened by the view; closed by the view on cancel, or by the mutation
/// controller once an update of the same id settles successfully.
#[derive(Debug, Default)]
pub struct EditSession {
    draft: Mutex<Option<EditDraft>>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter edit mode for `todo`, replacing any open draft.
    pub fn begin(&self, todo: &Todo) {
        self.with(|draft| {
            *draft = Some(EditDraft {
                id: todo.id,
                title: todo.title.clone(),
                priority: todo.priority,
            })
        });
    }

    pub fn current(&self) -> Option<EditDraft> {
        self.with(|draft| draft.clone())
    }

    pub fn editing(&self) -> Option<TodoId> {
        self.with(|draft| draft.as_ref().map(|d| d.id))
    }

    pub fn set_title(&self, title: impl Into<String>) -> bool {
        let title = title.into();
        self.with(|draft| match draft {
            Some(d) => {
                d.title = title;
                true
            }
            None => false,
        })
    }

    pub fn set_priority(&self, priority: Priority) -> bool {
        self.with(|draft| match draft {
            Some(d) => {
                d.priority = priority;
                true
            }
            None => false,
        })
    }

    /// Leave edit mode regardless of which record was open.
    pub fn cancel(&self) -> Option<EditDraft> {
        self.with(Option::take)
    }

    /// Leave edit mode only if `id` is the record being edited.
    pub fn close(&self, id: TodoId) -> bool {
        self.with(|draft| {
            if draft.as_ref().is_some_and(|d| d.id == id) {
                *draft = None;
                true
            } else {
                false
            }
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut Option<EditDraft>) -> R) -> R {
        let mut guard = match self.draft.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}
