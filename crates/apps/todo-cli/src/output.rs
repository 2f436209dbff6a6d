use std::io::{self, Write};

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;
use serde_json::json;
use time::macros::format_description;
use todo_store::{StoreError, Todo, TodoId};

/// Writes shell results either as tables and plain lines or as one JSON
/// document per line.
pub struct Output<W> {
    out: W,
    json: bool,
}

#[derive(Serialize)]
struct ListDocument<'a> {
    filter: &'a str,
    search: &'a str,
    editing: Option<TodoId>,
    todos: &'a [Todo],
}

impl<W: Write> Output<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn emit_list(
        &mut self,
        todos: &[Todo],
        filter: &str,
        search: &str,
        editing: Option<TodoId>,
        empty_message: &str,
    ) -> io::Result<()> {
        if self.json {
            let doc = ListDocument {
                filter,
                search,
                editing,
                todos,
            };
            return self.write_json(&doc);
        }
        if todos.is_empty() {
            return writeln!(self.out, "{empty_message}");
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["id", "done", "priority", "title", "created"]);
        for todo in todos {
            let id = if editing == Some(todo.id) {
                format!("{}*", todo.id)
            } else {
                todo.id.to_string()
            };
            let created = todo
                .created_at
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
                .unwrap_or_else(|_| "-".into());
            table.add_row(vec![
                Cell::new(id),
                Cell::new(if todo.completed { "x" } else { "" }),
                Cell::new(todo.priority),
                Cell::new(&todo.title),
                Cell::new(created),
            ]);
        }
        writeln!(self.out, "{table}")
    }

    pub fn emit_todo(&mut self, action: &str, todo: &Todo) -> io::Result<()> {
        if self.json {
            return self.write_json(&json!({ "ok": action, "todo": todo }));
        }
        let state = if todo.completed { "done" } else { "open" };
        writeln!(
            self.out,
            "{action} {} [{}] {} ({state})",
            todo.id, todo.priority, todo.title
        )
    }

    pub fn emit_message(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        if self.json {
            return self.write_json(&json!({ "message": message.as_ref() }));
        }
        writeln!(self.out, "{}", message.as_ref())
    }

    pub fn emit_store_error(&mut self, action: &str, err: &StoreError) -> io::Result<()> {
        if self.json {
            return self.write_json(&json!({
                "error": action,
                "message": err.to_string(),
                "retryable": err.is_retryable(),
            }));
        }
        writeln!(self.out, "error: {action} failed: {err}")
    }

    pub fn emit_error(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        if self.json {
            return self.write_json(&json!({ "error": message.as_ref() }));
        }
        writeln!(self.out, "error: {}", message.as_ref())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, value)?;
        writeln!(self.out)
    }
}
