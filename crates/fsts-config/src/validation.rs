use fsts_utils::ConfigError;

use crate::model::{Config, Provider};

impl Config {
    /// Validate configuration values.
    ///
    /// Every problem is collected so one run of `fsts config` reports them all.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationFailed`] listing each violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let pipeline = &self.pipeline;

        if pipeline.min_output_reviews > pipeline.max_output_reviews {
            errors.push(format!(
                "min_output_reviews ({}) must not exceed max_output_reviews ({})",
                pipeline.min_output_reviews, pipeline.max_output_reviews
            ));
        }

        let worst_case = pipeline
            .rework_routes
            .worst_case_steps(pipeline.max_output_reviews, pipeline.max_rework_passes);
        if pipeline.recursion_limit < worst_case {
            errors.push(format!(
                "recursion_limit ({}) is below the {worst_case} stage executions a run may need \
                 with max_output_reviews = {} and rework_routes = {}",
                pipeline.recursion_limit, pipeline.max_output_reviews, pipeline.rework_routes
            ));
        }

        if pipeline.run_timeout_secs == Some(0) {
            errors.push("run_timeout_secs must be greater than 0".to_string());
        }

        let llm = &self.llm;
        if !(0.0..=2.0).contains(&llm.temperature) {
            errors.push(format!("temperature ({}) must be between 0 and 2", llm.temperature));
        }
        if llm.timeout_secs == 0 {
            errors.push("timeout_secs must be at least 1".to_string());
        }
        if llm.max_tokens == 0 {
            errors.push("max_tokens must be greater than 0".to_string());
        }
        if llm.model.trim().is_empty() {
            errors.push("model must not be empty".to_string());
        }
        if llm.budget == Some(0) {
            errors.push("budget must be greater than 0 when set".to_string());
        }
        if llm.provider != Provider::Scripted {
            if llm.base_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                errors.push(format!("base_url is required for provider {}", llm.provider));
            }
            if llm.api_key_env.as_deref().is_none_or(|v| v.trim().is_empty()) {
                errors.push(format!("api_key_env is required for provider {}", llm.provider));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                error_count: errors.len(),
                errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsts_utils::types::ReworkRoutes;

    fn errors_of(config: &Config) -> Vec<String> {
        match config.validate() {
            Ok(()) => Vec::new(),
            Err(ConfigError::ValidationFailed { errors, .. }) => errors,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_min_above_max_is_rejected() {
        let mut config = Config::default();
        config.pipeline.min_output_reviews = 3;
        config.pipeline.max_output_reviews = 1;
        let errors = errors_of(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("min_output_reviews"));
    }

    #[test]
    fn test_recursion_limit_must_cover_worst_case() {
        let mut config = Config::default();
        config.pipeline.max_output_reviews = 10;
        let errors = errors_of(&config);
        assert!(errors.iter().any(|e| e.contains("recursion_limit")));

        config.pipeline.recursion_limit = 26;
        assert!(config.validate().is_ok());

        config.pipeline.rework_routes = ReworkRoutes::LoopBack;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_errors_are_collected() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        config.llm.timeout_secs = 0;
        config.llm.base_url = None;
        let errors = errors_of(&config);
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn test_scripted_provider_needs_no_endpoint() {
        let mut config = Config::default();
        config.llm = crate::model::LlmConfig::for_provider(Provider::Scripted);
        assert!(config.validate().is_ok());
    }
}
