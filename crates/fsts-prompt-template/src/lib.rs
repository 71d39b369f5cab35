//! Prompt definitions for fsts stages.
//!
//! Each stage that calls the model has one [`PromptDefinition`]: a system
//! prompt, a user prompt template with `{name}` placeholders, and the list of
//! parameters the template may reference. A [`PromptStore`] resolves a stage to
//! a validated [`ResolvedPrompt`], which is then bound against the pipeline
//! state through [`ParameterSource`].

mod catalog;
mod definition;
mod template;

pub use catalog::{PromptCatalog, PromptStore, ResolvedPrompt, bind};
pub use definition::{PromptDefinition, TaskBrief};
pub use template::{ParameterOverlay, ParameterSource, placeholders};
