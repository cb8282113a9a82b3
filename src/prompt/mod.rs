//! Prompt System - the standard agent prompt
//!
//! Every iteration hands the agent the same instructions, parameterized by
//! the iteration number and the workspace layout. State lives on disk, so
//! the prompt never carries conversation history.

mod render;

pub use render::{PromptContext, PromptRenderer, STANDARD_TEMPLATE};
