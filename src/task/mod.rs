//! Task state store.
//!
//! The task document is a markdown checklist owned by the agent. Relayr only
//! observes it: counting criteria and deciding whether the task is finished.

mod checklist;
mod store;

pub use checklist::{CriterionState, is_complete, parse_completion, parse_criterion};
pub use store::{TaskProgress, TaskStore};
