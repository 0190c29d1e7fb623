//! Task-action protocol.
//!
//! Testsuite tasks are named server-side jobs driven through the
//! `task_run`, `task_spawn`, `task_stop` and `tasks_list` actions.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::response::Response;

pub const ACTION_TASK_RUN: &str = "task_run";
pub const ACTION_TASK_SPAWN: &str = "task_spawn";
pub const ACTION_TASK_STOP: &str = "task_stop";
pub const ACTION_TASKS_LIST: &str = "tasks_list";

/// Body of `task_run` / `task_spawn`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskNameRequest<'a> {
    pub name: &'a str,
}

/// Body of `task_stop`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStopRequest<'a> {
    pub task_id: &'a str,
}

/// Response of any task action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskResponse {
    /// `false` means the task ran and failed.
    #[serde(default)]
    pub status: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub tasks: Option<Vec<String>>,
}

impl TaskResponse {
    pub fn succeeded(&self) -> bool {
        self.status.unwrap_or(true)
    }
}

/// Map a task action response to its outcome.
///
/// `name` identifies the task (or spawned task id) in error messages.
pub fn check_task_response(name: &str, response: &Response) -> Result<TaskResponse> {
    match response.status() {
        StatusCode::NOT_FOUND => {
            return Err(Error::TaskNotFound {
                name: name.to_string(),
            })
        }
        StatusCode::CONFLICT => {
            return Err(Error::TaskConflict {
                name: name.to_string(),
            })
        }
        StatusCode::OK => {}
        _ => return Err(response.http_error()),
    }

    let data: TaskResponse = response.json()?;
    if !data.succeeded() {
        return Err(Error::TaskFailed {
            name: name.to_string(),
            reason: data.reason.clone().unwrap_or_default(),
        });
    }
    Ok(data)
}
