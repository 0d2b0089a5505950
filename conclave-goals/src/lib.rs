//! Conclave Goals - Engineering Goal Tracking
//!
//! An ordered collection of goals, each with an ordered checklist of tasks.
//! Pure CRUD, no concurrency beyond a coarse lock. Goals and tasks are
//! addressed by insertion index; no delete operation exists, so indices are
//! stable for the process lifetime (a documented limitation: a future delete
//! would shift them).

use conclave_core::{ConclaveResult, NotFoundError};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ============================================================================
// DATA TYPES
// ============================================================================

/// A checklist item belonging to a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Short title describing the task
    pub title: String,
    /// Detailed description of the task
    pub description: String,
    /// Whether the task has been completed
    pub completed: bool,
}

impl Task {
    /// Create an uncompleted task.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            completed: false,
        }
    }
}

/// A user-tracked engineering objective with its checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// Short title describing the goal
    pub title: String,
    /// Detailed description of the goal
    pub description: String,
    /// Tasks associated with this goal, in insertion order
    pub tasks: Vec<Task>,
}

impl Goal {
    /// Create a goal with no tasks.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            tasks: Vec::new(),
        }
    }
}

// ============================================================================
// SELECTION SUM TYPE
// ============================================================================

/// A selection pointing at either a goal or one of its tasks. Replaces
/// type-tag row payloads in list widgets; match it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerSelection {
    Goal { goal: usize },
    Task { goal: usize, task: usize },
}

/// What a [`TrackerSelection`] resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerItem {
    Goal(Goal),
    Task(Task),
}

// ============================================================================
// GOAL TRACKER
// ============================================================================

/// Ordered goal collection with index-addressed CRUD. All reads hand out
/// clones, so callers can never mutate tracker state through a snapshot.
pub struct GoalTracker {
    goals: Mutex<Vec<Goal>>,
}

impl GoalTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            goals: Mutex::new(Vec::new()),
        }
    }

    /// Create a new goal.
    ///
    /// # Returns
    /// The created goal and its insertion index.
    pub fn create_goal(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> (Goal, usize) {
        let goal = Goal::new(title, description);
        let mut goals = self.inner();
        goals.push(goal.clone());
        (goal, goals.len() - 1)
    }

    /// Get a goal by index. Out-of-range is absence, never an error.
    pub fn get_goal(&self, index: usize) -> Option<Goal> {
        self.inner().get(index).cloned()
    }

    /// Ordered snapshot of all goals.
    pub fn goals(&self) -> Vec<Goal> {
        self.inner().clone()
    }

    /// Number of goals.
    pub fn len(&self) -> usize {
        self.inner().len()
    }

    /// Whether no goal exists yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a task to a goal.
    ///
    /// # Returns
    /// * `Ok((Task, usize))` - The created task and its index within the goal
    /// * `Err(ConclaveError::NotFound)` - If the goal index is invalid
    pub fn add_task(
        &self,
        goal_index: usize,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> ConclaveResult<(Task, usize)> {
        let mut goals = self.inner();
        let goal = goals
            .get_mut(goal_index)
            .ok_or(NotFoundError::Goal { index: goal_index })?;

        let task = Task::new(title, description);
        goal.tasks.push(task.clone());
        Ok((task, goal.tasks.len() - 1))
    }

    /// Set the completed flag of a task.
    ///
    /// # Returns
    /// `true` if the task was updated, `false` if either index is invalid.
    /// Never errors; an invalid index leaves every task unchanged.
    pub fn set_task_completed(&self, goal_index: usize, task_index: usize, completed: bool) -> bool {
        let mut goals = self.inner();
        match goals
            .get_mut(goal_index)
            .and_then(|goal| goal.tasks.get_mut(task_index))
        {
            Some(task) => {
                task.completed = completed;
                true
            }
            None => false,
        }
    }

    /// Resolve a selection to the goal or task it points at.
    pub fn resolve(&self, selection: TrackerSelection) -> Option<TrackerItem> {
        let goals = self.inner();
        match selection {
            TrackerSelection::Goal { goal } => goals.get(goal).cloned().map(TrackerItem::Goal),
            TrackerSelection::Task { goal, task } => goals
                .get(goal)
                .and_then(|g| g.tasks.get(task))
                .cloned()
                .map(TrackerItem::Task),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Vec<Goal>> {
        self.goals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for GoalTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GoalTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoalTracker")
            .field("goals", &self.len())
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
