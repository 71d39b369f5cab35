//! Prompt definitions as stored on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stage's prompt definition.
///
/// ```yaml
/// system_prompt: |-
///   You are ...
/// user_prompt: |-
///   Analyze {code_input} ...
/// parameters:
///   - code_input
/// ```
///
/// `parameters` may also be written as a mapping (`code_input: "{code_input}"`);
/// only the keys matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDefinition {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default, deserialize_with = "parameter_names")]
    pub parameters: Vec<String>,
    /// Named task briefs; the manager uses `consolidation` and `revision`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub briefs: BTreeMap<String, TaskBrief>,
}

/// A task description paired with the output it should produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBrief {
    pub description: String,
    pub expected_output: String,
}

impl PromptDefinition {
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            parameters: Vec::new(),
            briefs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_brief(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        self.briefs.insert(
            name.into(),
            TaskBrief {
                description: description.into(),
                expected_output: expected_output.into(),
            },
        );
        self
    }

    /// BLAKE3 digest over everything that shapes the rendered prompt.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [&self.system_prompt, &self.user_prompt] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        for name in &self.parameters {
            hasher.update(b"\0p");
            hasher.update(name.as_bytes());
        }
        for (name, brief) in &self.briefs {
            hasher.update(b"\0b");
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
            hasher.update(brief.description.as_bytes());
            hasher.update(b"\0");
            hasher.update(brief.expected_output.as_bytes());
        }
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParameterList {
    Names(Vec<String>),
    Mapping(BTreeMap<String, serde_yaml::Value>),
}

fn parameter_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<ParameterList>::deserialize(deserializer)? {
        Some(ParameterList::Names(names)) => names,
        Some(ParameterList::Mapping(map)) => map.into_keys().collect(),
        None => Vec::new(),
    })
}
