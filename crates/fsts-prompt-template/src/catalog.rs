//! Prompt lookup by stage and binding against pipeline state.

use fsts_utils::error::{ConfigError, FstsError, PipelineError};
use fsts_utils::types::StageId;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use crate::definition::{PromptDefinition, TaskBrief};
use crate::template::{self, ParameterSource, Segment};

/// Key-value store of prompt definitions keyed by stage.
pub trait PromptStore: Send + Sync {
    fn definition(&self, stage: StageId) -> Option<&PromptDefinition>;

    /// Resolve and validate the prompt for `stage`.
    ///
    /// Pure: the same definition always yields an equal [`ResolvedPrompt`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] when no definition exists for
    /// the stage, when either prompt is blank, when the user prompt does not
    /// parse, or when it references a placeholder the definition does not
    /// declare in `parameters`.
    fn resolve(&self, stage: StageId) -> Result<ResolvedPrompt, PipelineError> {
        let definition = self
            .definition(stage)
            .ok_or_else(|| configuration(stage, "no prompt definition exists for this stage"))?;
        ResolvedPrompt::from_definition(stage, definition)
    }
}

fn configuration(stage: StageId, reason: impl Into<String>) -> PipelineError {
    PipelineError::Configuration {
        stage,
        reason: reason.into(),
    }
}

/// A validated prompt ready for binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub stage: StageId,
    pub system_prompt: String,
    pub user_prompt_template: String,
    /// Placeholders referenced by the template, in first-occurrence order.
    pub parameter_names: Vec<String>,
    pub briefs: BTreeMap<String, TaskBrief>,
    pub fingerprint: String,
}

impl ResolvedPrompt {
    fn from_definition(stage: StageId, def: &PromptDefinition) -> Result<Self, PipelineError> {
        if def.system_prompt.trim().is_empty() {
            return Err(configuration(stage, "system_prompt is empty"));
        }
        if def.user_prompt.trim().is_empty() {
            return Err(configuration(stage, "user_prompt is empty"));
        }

        let parameter_names = template::placeholders(&def.user_prompt)
            .map_err(|e| configuration(stage, format!("user_prompt: {e}")))?;

        if let Some(undeclared) = parameter_names
            .iter()
            .find(|name| !def.parameters.contains(name))
        {
            return Err(configuration(
                stage,
                format!("user_prompt references '{{{undeclared}}}' which is not listed in parameters"),
            ));
        }

        Ok(Self {
            stage,
            system_prompt: def.system_prompt.clone(),
            user_prompt_template: def.user_prompt.clone(),
            parameter_names,
            briefs: def.briefs.clone(),
            fingerprint: def.fingerprint(),
        })
    }

    /// Look up a required task brief.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Configuration`] when the definition has no brief by that name.
    pub fn brief(&self, name: &str) -> Result<&TaskBrief, PipelineError> {
        self.briefs
            .get(name)
            .ok_or_else(|| configuration(self.stage, format!("brief '{name}' is not defined")))
    }

    /// Bind this prompt's template against `source`.
    ///
    /// # Errors
    ///
    /// See [`bind`].
    pub fn bind(&self, source: &dyn ParameterSource) -> Result<String, PipelineError> {
        bind(
            self.stage,
            &self.user_prompt_template,
            &self.parameter_names,
            source,
        )
    }
}

/// Substitute every placeholder in `template` with its value from `source`.
///
/// # Errors
///
/// [`PipelineError::MissingParameter`] for the first name in `parameter_names`
/// (or in the template) that `source` cannot supply, and
/// [`PipelineError::Configuration`] if the template does not parse.
pub fn bind(
    stage: StageId,
    template: &str,
    parameter_names: &[String],
    source: &dyn ParameterSource,
) -> Result<String, PipelineError> {
    let missing = |name: &str| PipelineError::MissingParameter {
        stage,
        parameter: name.to_string(),
    };

    let mut values = HashMap::with_capacity(parameter_names.len());
    for name in parameter_names {
        let value = source.parameter(name).ok_or_else(|| missing(name))?;
        values.insert(name.as_str(), value);
    }

    let segments = template::parse(template).map_err(|e| configuration(stage, e))?;
    let mut out = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(&text),
            Segment::Placeholder(name) => match values.get(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(&source.parameter(name).ok_or_else(|| missing(name))?),
            },
        }
    }
    Ok(out)
}

/// In-memory prompt catalog.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    definitions: HashMap<StageId, PromptDefinition>,
}

const BUILTIN: [(StageId, &str); 6] = [
    (
        StageId::AbapCodeAnalyst,
        include_str!("../prompts/abap_code_analyst.yaml"),
    ),
    (
        StageId::ForeignDependencyAgent,
        include_str!("../prompts/foreign_dependency_agent.yaml"),
    ),
    (
        StageId::FunctionalSpecDrafter,
        include_str!("../prompts/functional_spec_drafter.yaml"),
    ),
    (
        StageId::TechnicalSpecWriter,
        include_str!("../prompts/technical_spec_writer.yaml"),
    ),
    (
        StageId::ManagerAgent,
        include_str!("../prompts/manager_agent.yaml"),
    ),
    (
        StageId::OutputReviewer,
        include_str!("../prompts/output_reviewer.yaml"),
    ),
];

impl PromptCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The prompt set compiled into the binary.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Configuration`] if a bundled definition fails to parse.
    pub fn builtin() -> Result<Self, PipelineError> {
        let mut catalog = Self::new();
        for (stage, yaml) in BUILTIN {
            let definition = parse_definition(stage, yaml)?;
            catalog.insert(stage, definition);
        }
        Ok(catalog)
    }

    /// Load `<stage_id>.yaml` files from `dir`.
    ///
    /// Files whose stem is not a stage id are ignored. Stages without a file
    /// are simply absent and fail at resolve time.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotFound`] when `dir` cannot be read, IO errors for
    /// unreadable files, and [`PipelineError::Configuration`] for YAML that
    /// does not describe a prompt definition.
    pub fn load_dir(dir: &Path) -> Result<Self, FstsError> {
        let entries = std::fs::read_dir(dir).map_err(|_| ConfigError::NotFound {
            path: dir.display().to_string(),
        })?;

        let mut catalog = Self::new();
        for entry in entries {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            let Some(stage) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(StageId::parse)
            else {
                continue;
            };
            if !is_yaml {
                continue;
            }

            let yaml = std::fs::read_to_string(&path)?;
            let definition = parse_definition(stage, &yaml)?;
            debug!(stage = %stage, path = %path.display(), "Loaded prompt definition");
            catalog.insert(stage, definition);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, stage: StageId, definition: PromptDefinition) {
        self.definitions.insert(stage, definition);
    }

    #[must_use]
    pub fn with(mut self, stage: StageId, definition: PromptDefinition) -> Self {
        self.insert(stage, definition);
        self
    }

    pub fn remove(&mut self, stage: StageId) -> Option<PromptDefinition> {
        self.definitions.remove(&stage)
    }

    /// Stages with a definition, in pipeline order.
    #[must_use]
    pub fn stages(&self) -> Vec<StageId> {
        let mut stages: Vec<_> = self.definitions.keys().copied().collect();
        stages.sort();
        stages
    }
}

impl PromptStore for PromptCatalog {
    fn definition(&self, stage: StageId) -> Option<&PromptDefinition> {
        self.definitions.get(&stage)
    }
}

fn parse_definition(stage: StageId, yaml: &str) -> Result<PromptDefinition, PipelineError> {
    serde_yaml::from_str(yaml).map_err(|e| configuration(stage, format!("invalid YAML: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(def: PromptDefinition) -> PromptCatalog {
        PromptCatalog::new().with(StageId::TechnicalSpecWriter, def)
    }

    fn state(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let catalog = catalog_with(
            PromptDefinition::new("You write specs.", "TS for {fs_output} using {template_text}")
                .with_parameters(["template_text", "fs_output"]),
        );
        let first = catalog.resolve(StageId::TechnicalSpecWriter).unwrap();
        let second = catalog.resolve(StageId::TechnicalSpecWriter).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.parameter_names, vec!["fs_output", "template_text"]);
    }

    #[test]
    fn test_missing_definition_is_configuration_error() {
        let err = PromptCatalog::new()
            .resolve(StageId::ManagerAgent)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration { stage: StageId::ManagerAgent, .. }
        ));
    }

    #[test]
    fn test_undeclared_placeholder_is_configuration_error() {
        let catalog = catalog_with(
            PromptDefinition::new("sys", "{fs_output} and {surprise}").with_parameters(["fs_output"]),
        );
        let err = catalog.resolve(StageId::TechnicalSpecWriter).unwrap_err();
        match err {
            PipelineError::Configuration { reason, .. } => assert!(reason.contains("surprise")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_prompts_are_rejected() {
        let catalog = catalog_with(PromptDefinition::new("  ", "x"));
        assert!(catalog.resolve(StageId::TechnicalSpecWriter).is_err());
        let catalog = catalog_with(PromptDefinition::new("sys", "\n"));
        assert!(catalog.resolve(StageId::TechnicalSpecWriter).is_err());
    }

    #[test]
    fn test_bind_substitutes_and_unescapes() {
        let catalog = catalog_with(
            PromptDefinition::new("sys", "FS: {fs_output} {{literal}} FS again: {fs_output}")
                .with_parameters(["fs_output"]),
        );
        let resolved = catalog.resolve(StageId::TechnicalSpecWriter).unwrap();
        let text = resolved.bind(&state(&[("fs_output", "draft")])).unwrap();
        assert_eq!(text, "FS: draft {literal} FS again: draft");
    }

    #[test]
    fn test_bind_reports_missing_parameter() {
        let err = bind(
            StageId::OutputReviewer,
            "{manager_output}",
            &["manager_output".to_string()],
            &state(&[]),
        )
        .unwrap_err();
        match err {
            PipelineError::MissingParameter { stage, parameter } => {
                assert_eq!(stage, StageId::OutputReviewer);
                assert_eq!(parameter, "manager_output");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_brief_lookup() {
        let catalog = PromptCatalog::new().with(
            StageId::ManagerAgent,
            PromptDefinition::new("sys", "{task_description}")
                .with_parameters(["task_description"])
                .with_brief("revision", "revise", "final doc"),
        );
        let resolved = catalog.resolve(StageId::ManagerAgent).unwrap();
        assert_eq!(resolved.brief("revision").unwrap().expected_output, "final doc");
        assert!(matches!(
            resolved.brief("consolidation"),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn test_builtin_catalog_resolves_every_prompted_stage() {
        let catalog = PromptCatalog::builtin().unwrap();
        for stage in StageId::all().filter(StageId::invokes_model) {
            let resolved = catalog
                .resolve(stage)
                .unwrap_or_else(|e| panic!("{stage}: {e}"));
            assert!(!resolved.parameter_names.is_empty(), "{stage} takes no input");
        }
        let manager = catalog.resolve(StageId::ManagerAgent).unwrap();
        assert!(manager.brief("consolidation").is_ok());
        assert!(manager.brief("revision").is_ok());
        assert!(catalog.resolve(StageId::FinalOutput).is_err());
    }

    #[test]
    fn test_load_dir_reads_stage_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("output_reviewer.yaml"),
            "system_prompt: critic\nuser_prompt: 'Review {manager_output}'\nparameters: [manager_output]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.yaml"), "not: a prompt\n").unwrap();
        std::fs::write(dir.path().join("manager_agent.txt"), "ignored").unwrap();

        let catalog = PromptCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.stages(), vec![StageId::OutputReviewer]);
        let resolved = catalog.resolve(StageId::OutputReviewer).unwrap();
        assert_eq!(resolved.system_prompt, "critic");
    }

    #[test]
    fn test_load_dir_rejects_malformed_definition() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manager_agent.yaml"), "user_prompt: [1, 2]\n").unwrap();
        let err = PromptCatalog::load_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            FstsError::Pipeline(PipelineError::Configuration {
                stage: StageId::ManagerAgent,
                ..
            })
        ));
    }

    #[test]
    fn test_load_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = PromptCatalog::load_dir(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, FstsError::Config(ConfigError::NotFound { .. })));
    }
}
