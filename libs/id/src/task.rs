//! Task identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::IdError;

const SEPARATOR: &str = "__";

/// Identifier of one launch of a named task: `{task_name}__{ulid}`.
///
/// Every relaunch of the same task gets a new ID with the same name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId {
    name: String,
    ulid: Ulid,
}

impl TaskId {
    /// Generates a fresh ID for a launch of `task_name`.
    pub fn new(task_name: impl Into<String>) -> Result<Self, IdError> {
        let name = task_name.into();
        if name.is_empty() {
            return Err(IdError::EmptyTaskName);
        }
        Ok(Self {
            name,
            ulid: Ulid::new(),
        })
    }

    /// The task name this ID was launched for.
    pub fn task_name(&self) -> &str {
        &self.name
    }

    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let (name, raw) = s
            .rsplit_once(SEPARATOR)
            .ok_or(IdError::MissingSeparator(SEPARATOR))?;
        if name.is_empty() {
            return Err(IdError::EmptyTaskName);
        }
        let ulid = raw
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            ulid,
        })
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, SEPARATOR, self.ulid)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}
