use std::io::{self, Write};
use std::sync::Arc;

use todo_store::{FaultyStore, StoreError, StoreOp, TodoId};
use todo_sync::{EditSession, ListView, MutationController, RefreshOutcome};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::command::{Command, FilterStep, HELP};
use crate::output::Output;

/// Whether the shell should keep reading input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

type Injector = Box<dyn Fn(StoreOp) + Send + Sync>;

/// Interprets [`Command`]s against one cache.
///
/// Store failures are reported and the shell carries on; only output errors
/// end a session.
pub struct Shell<W> {
    controller: MutationController,
    edit: Arc<EditSession>,
    view: ListView,
    inject: Option<Injector>,
    output: Output<W>,
}

impl<W: Write> Shell<W> {
    /// `edit` should be the session the controller was built with so a
    /// successful save closes it.
    pub fn new(controller: MutationController, edit: Arc<EditSession>, output: Output<W>) -> Self {
        Self {
            controller,
            edit,
            view: ListView::default(),
            inject: None,
            output,
        }
    }

    /// Enable `fail <op>` by queueing transport failures on `faults`.
    pub fn with_faults<S>(mut self, faults: Arc<FaultyStore<S>>) -> Self
    where
        S: Send + Sync + 'static,
    {
        self.inject = Some(Box::new(move |op| {
            faults.fail_next(op, StoreError::transport("injected failure"))
        }));
        self
    }

    pub fn view(&self) -> &ListView {
        &self.view
    }

    pub fn output_mut(&mut self) -> &mut Output<W> {
        &mut self.output
    }

    /// Read commands until `quit` or end of input.
    pub async fn run<R>(&mut self, input: R) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if self.execute_line(&line).await? == Flow::Quit {
                break;
            }
        }
        self.output.flush()
    }

    pub async fn execute_line(&mut self, line: &str) -> io::Result<Flow> {
        match Command::parse(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => Ok(Flow::Continue),
            Err(err) => {
                self.output.emit_error(err.to_string())?;
                Ok(Flow::Continue)
            }
        }
    }

    pub async fn execute(&mut self, command: Command) -> io::Result<Flow> {
        log::debug!("shell command: {command:?}");
        match command {
            Command::List => self.show()?,
            Command::Add { priority, title } => {
                match self.controller.create(title, priority).await {
                    Ok(todo) => self.output.emit_todo("created", &todo)?,
                    Err(err) => self.output.emit_store_error("create", &err)?,
                }
            }
            Command::Edit { id } => match self.controller.cache().find(id) {
                Some(todo) => {
                    self.edit.begin(&todo);
                    self.output
                        .emit_message(format!("editing {id}: {} [{}]", todo.title, todo.priority))?;
                }
                None => self.output.emit_error(format!("no todo {id}"))?,
            },
            Command::Priority(priority) => {
                if self.edit.set_priority(priority) {
                    self.output.emit_message(format!("priority set to {priority}"))?;
                } else {
                    self.not_editing()?;
                }
            }
            Command::Save { title } => self.save(title).await?,
            Command::Cancel => match self.edit.cancel() {
                Some(draft) => self.output.emit_message(format!("stopped editing {}", draft.id))?,
                None => self.not_editing()?,
            },
            Command::Toggle { id } => match self.controller.toggle(id).await {
                Ok(todo) => self.output.emit_todo("toggled", &todo)?,
                Err(err) => self.output.emit_store_error("toggle", &err)?,
            },
            Command::Remove { id } => self.remove(id).await?,
            Command::Filter(step) => {
                self.view.filter = match step {
                    FilterStep::To(filter) => filter,
                    FilterStep::Next => self.view.filter.next(),
                    FilterStep::Prev => self.view.filter.prev(),
                };
                self.show()?;
            }
            Command::Search(text) => {
                self.view.search = text;
                self.show()?;
            }
            Command::Refresh => match self.controller.refresh().await {
                Ok(RefreshOutcome::Applied(count)) => {
                    self.output.emit_message(format!("loaded {count} todo(s)"))?;
                    self.show()?;
                }
                Ok(RefreshOutcome::Discarded) => self
                    .output
                    .emit_message("refresh discarded, a change started while it was loading")?,
                Err(err) => self.output.emit_store_error("refresh", &err)?,
            },
            Command::Fail(op) => match &self.inject {
                Some(inject) => {
                    inject(op);
                    self.output.emit_message(format!("next {op} will fail"))?;
                }
                None => self
                    .output
                    .emit_error("fail is only available with --embedded")?,
            },
            Command::Help => self.output.emit_message(HELP)?,
            Command::Quit => {
                self.output.flush()?;
                return Ok(Flow::Quit);
            }
        }
        self.output.flush()?;
        Ok(Flow::Continue)
    }

    async fn save(&mut self, title: String) -> io::Result<()> {
        let Some(draft) = self.edit.current() else {
            return self.not_editing();
        };
        let title = if title.trim().is_empty() {
            draft.title
        } else {
            title
        };
        match self.controller.update(draft.id, title, draft.priority).await {
            Ok(todo) => self.output.emit_todo("updated", &todo),
            Err(err) => self.output.emit_store_error("update", &err),
        }
    }

    async fn remove(&mut self, id: TodoId) -> io::Result<()> {
        match self.controller.delete(id).await {
            Ok(()) => {
                if self.edit.editing() == Some(id) {
                    self.edit.cancel();
                }
                self.output.emit_message(format!("deleted {id}"))
            }
            Err(err) => self.output.emit_store_error("delete", &err),
        }
    }

    fn show(&mut self) -> io::Result<()> {
        let records = self.controller.cache().get();
        let todos = self.view.visible(&records);
        self.output.emit_list(
            &todos,
            self.view.filter.as_str(),
            &self.view.search,
            self.edit.editing(),
            &self.view.empty_message(),
        )
    }

    fn not_editing(&mut self) -> io::Result<()> {
        self.output
            .emit_error("not editing anything; use `edit <id>` first")
    }
}
