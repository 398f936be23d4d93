//! State and operations behind the todo list screen.

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::NaiveDate;
use entities::{assignable_users, email_for, DueStatus, NewTodo, Todo, User};
use serde::{Deserialize, Serialize};
use todo_store::{
    Backend, NotificationStore, StoreResult, TodoFilter, TodoRepository, UserDirectory,
};
use tracing::{debug, info, warn};

use crate::{
    reconcile::{reconcile_todos, TodoEvent},
    AssignmentSaga, Clock, NotifyOutcome,
};

/// Filter selected in the list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Every todo.
    #[default]
    All,
    /// Todos assigned to the current user.
    Assigned,
    /// Todos created by the current user.
    Created,
    /// Assigned todos due before today.
    Overdue,
    /// Assigned todos due today.
    Today,
}

impl FilterKind {
    /// Every filter, in display order.
    pub const ALL: [FilterKind; 5] = [
        Self::All,
        Self::Assigned,
        Self::Created,
        Self::Overdue,
        Self::Today,
    ];

    /// Binds the filter to a user and a calendar day.
    pub fn resolve(self, user_id: &str, today: NaiveDate) -> TodoFilter {
        let user_id = user_id.to_string();
        match self {
            Self::All => TodoFilter::All,
            Self::Assigned => TodoFilter::AssignedTo(user_id),
            Self::Created => TodoFilter::CreatedBy(user_id),
            Self::Overdue => TodoFilter::Overdue { user_id, today },
            Self::Today => TodoFilter::DueToday { user_id, today },
        }
    }

    /// Lowercase name, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Assigned => "assigned",
            Self::Created => "created",
            Self::Overdue => "overdue",
            Self::Today => "today",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown filter: {}", s))
    }
}

/// The new-todo form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    /// Task text as typed.
    pub task: String,
    /// Selected assignee, if any.
    pub assignee_id: Option<String>,
    /// Selected due date, if any.
    pub due_date: Option<NaiveDate>,
}

/// Result of [`TodoListController::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    /// The created todo, now appended to the list.
    pub todo: Todo,
    /// Whether the todo satisfies the active filter. The todo is shown
    /// either way until the next reload.
    pub matches_filter: bool,
    /// Result of notifying the assignee.
    pub notification: NotifyOutcome,
}

#[derive(Debug, Default)]
struct ControllerState {
    filter: FilterKind,
    /// Filter the current list was loaded with.
    loaded: Option<TodoFilter>,
    generation: u64,
    todos: Vec<Todo>,
    users: Vec<User>,
    draft: Draft,
    error_text: Option<String>,
    warning: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Todo list for one signed-in user.
///
/// Remote results only reach the list through [`reconcile_todos`] or a full
/// replacement by the current filter's listing. The state lock is never
/// held across a remote call.
pub struct TodoListController {
    user_id: String,
    clock: Arc<dyn Clock>,
    users: UserDirectory,
    todos: TodoRepository,
    saga: AssignmentSaga,
    state: Mutex<ControllerState>,
}

impl TodoListController {
    /// Creates a controller for `user_id` with the `All` filter selected.
    pub fn new(backend: Arc<dyn Backend>, user_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let todos = TodoRepository::new(backend.clone());
        let saga = AssignmentSaga::new(todos.clone(), NotificationStore::new(backend.clone()));
        Self {
            user_id: user_id.into(),
            clock,
            users: UserDirectory::new(backend),
            todos,
            saga,
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Loads the user directory and the current filter's todos.
    ///
    /// Failures are kept in [`warning`](Self::warning); the view stays usable.
    pub async fn mount(&self) {
        let _ = self.load_users().await;
        let _ = self.refresh().await;
    }

    /// Reloads the user directory. On failure the previous list is kept.
    pub async fn load_users(&self) -> StoreResult<()> {
        match self.users.list_users().await {
            Ok(users) => {
                lock(&self.state).users = users;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load users");
                lock(&self.state).warning = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Reloads the todos for the current filter.
    pub async fn refresh(&self) -> StoreResult<()> {
        let filter = lock(&self.state).filter;
        self.set_filter(filter).await
    }

    /// Selects `kind` and replaces the list with its todos.
    ///
    /// A response that arrives after a newer filter was selected is dropped.
    /// On failure the list is cleared and the warning set.
    pub async fn set_filter(&self, kind: FilterKind) -> StoreResult<()> {
        let filter = kind.resolve(&self.user_id, self.clock.today());
        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.filter = kind;
            state.generation
        };

        let result = self.todos.list_todos(&filter).await;

        let mut state = lock(&self.state);
        if state.generation != generation {
            debug!(filter = %kind, "Discarding stale todo listing");
            return Ok(());
        }
        match result {
            Ok(todos) => {
                debug!(filter = %kind, count = todos.len(), "Todo list replaced");
                state.todos = todos;
                state.loaded = Some(filter);
                Ok(())
            }
            Err(e) => {
                warn!(filter = %kind, error = %e, "Failed to list todos");
                state.todos.clear();
                state.loaded = None;
                state.warning = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Updates the draft task text and clears the error message.
    pub fn edit_task(&self, task: impl Into<String>) {
        let mut state = lock(&self.state);
        state.draft.task = task.into();
        state.error_text = None;
    }

    /// Updates the draft assignee. An empty id clears it.
    pub fn set_assignee(&self, assignee_id: Option<String>) {
        lock(&self.state).draft.assignee_id = assignee_id.filter(|id| !id.is_empty());
    }

    /// Updates the draft due date.
    pub fn set_due_date(&self, due_date: Option<NaiveDate>) {
        lock(&self.state).draft.due_date = due_date;
    }

    /// Creates a todo from the draft and notifies its assignee.
    ///
    /// A task shorter than the minimum is rejected locally. On success the
    /// todo is appended, the draft reset and any notification failure kept
    /// in the warning. On failure the draft is kept and the error shown.
    pub async fn submit(&self) -> StoreResult<CreateOutcome> {
        let draft = lock(&self.state).draft.clone();
        let new_todo = NewTodo {
            task: draft.task.clone(),
            creator_id: self.user_id.clone(),
            assignee_id: draft.assignee_id.clone(),
            due_date: draft.due_date,
        };

        let outcome = match self.saga.run(new_todo).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if !e.is_validation() {
                    warn!(error = %e, "Failed to create todo");
                }
                lock(&self.state).error_text = Some(e.to_string());
                return Err(e);
            }
        };

        let mut state = lock(&self.state);
        state.todos = reconcile_todos(&state.todos, TodoEvent::Created(outcome.todo.clone()));
        // Edits made while the create was in flight belong to the next todo.
        if state.draft == draft {
            state.draft = Draft::default();
        }
        state.error_text = None;
        if let Some(message) = outcome.notification.failure() {
            state.warning = Some(format!(
                "Todo created, but the assignee was not notified: {}",
                message
            ));
        }
        let matches_filter = state
            .loaded
            .as_ref()
            .map_or(true, |filter| filter.matches(&outcome.todo));
        if !matches_filter {
            info!(todo_id = outcome.todo.id, filter = %state.filter, "Created todo is outside the active filter");
        }

        Ok(CreateOutcome {
            todo: outcome.todo,
            matches_filter,
            notification: outcome.notification,
        })
    }

    /// Flips completion on the server and replaces the local copy with the
    /// returned row.
    pub async fn toggle(&self, id: i64) -> StoreResult<Todo> {
        match self.todos.toggle_complete(id).await {
            Ok(todo) => {
                let mut state = lock(&self.state);
                state.todos = reconcile_todos(&state.todos, TodoEvent::Updated(todo.clone()));
                Ok(todo)
            }
            Err(e) => {
                warn!(todo_id = id, error = %e, "Failed to toggle todo");
                lock(&self.state).error_text = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Deletes a todo. The local list changes only if the server confirmed.
    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        match self.todos.delete_todo(id).await {
            Ok(()) => {
                let mut state = lock(&self.state);
                state.todos = reconcile_todos(&state.todos, TodoEvent::Removed(id));
                Ok(())
            }
            Err(e) => {
                warn!(todo_id = id, error = %e, "Failed to delete todo");
                lock(&self.state).error_text = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Ids of listed todos that do not satisfy the filter the list was
    /// loaded with.
    pub fn off_filter_ids(&self) -> Vec<i64> {
        let state = lock(&self.state);
        let Some(filter) = &state.loaded else {
            return Vec::new();
        };
        state
            .todos
            .iter()
            .filter(|todo| !filter.matches(todo))
            .map(|todo| todo.id)
            .collect()
    }

    /// ID of the signed-in user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Active filter.
    pub fn filter(&self) -> FilterKind {
        lock(&self.state).filter
    }

    /// Todos currently listed.
    pub fn todos(&self) -> Vec<Todo> {
        lock(&self.state).todos.clone()
    }

    /// Every known user.
    pub fn users(&self) -> Vec<User> {
        lock(&self.state).users.clone()
    }

    /// Users the current user can assign todos to.
    pub fn assignable_users(&self) -> Vec<User> {
        let state = lock(&self.state);
        assignable_users(&state.users, &self.user_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Email of the todo's assignee, if known.
    pub fn assignee_email(&self, todo: &Todo) -> Option<String> {
        let assignee = todo.assignee_id.as_deref()?;
        email_for(&lock(&self.state).users, assignee).map(str::to_string)
    }

    /// Due status of `todo` relative to the clock's today.
    pub fn due_status(&self, todo: &Todo) -> Option<DueStatus> {
        todo.due_status(self.clock.today())
    }

    /// Current new-todo form.
    pub fn draft(&self) -> Draft {
        lock(&self.state).draft.clone()
    }

    /// Error from the last failed user action.
    pub fn error_text(&self) -> Option<String> {
        lock(&self.state).error_text.clone()
    }

    /// The last non-fatal failure, if any.
    pub fn warning(&self) -> Option<String> {
        lock(&self.state).warning.clone()
    }

    /// Clears the warning.
    pub fn dismiss_warning(&self) {
        lock(&self.state).warning = None;
    }
}
