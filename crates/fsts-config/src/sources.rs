use std::collections::BTreeMap;

use crate::model::{Config, ConfigSource};

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut entries = BTreeMap::new();
        let mut add = |key: &str, value: String| {
            let source = self
                .source_attribution
                .get(key)
                .cloned()
                .unwrap_or(ConfigSource::Default);
            entries.insert(key.to_string(), (value, source.to_string()));
        };

        let p = &self.pipeline;
        add("min_output_reviews", p.min_output_reviews.to_string());
        add("max_output_reviews", p.max_output_reviews.to_string());
        add("rework_routes", p.rework_routes.to_string());
        add("max_rework_passes", p.max_rework_passes.to_string());
        add("recursion_limit", p.recursion_limit.to_string());
        add("run_timeout_secs", display_optional(p.run_timeout_secs));

        let l = &self.llm;
        add("provider", l.provider.to_string());
        add("model", l.model.clone());
        add("base_url", display_optional(l.base_url.as_ref()));
        add("api_key_env", display_optional(l.api_key_env.as_ref()));
        add("max_tokens", l.max_tokens.to_string());
        add("temperature", l.temperature.to_string());
        add("timeout_secs", l.timeout_secs.to_string());
        add("budget", display_optional(l.budget));
        add("retries", l.retries.to_string());

        add(
            "prompts_dir",
            self.prompts
                .dir
                .as_ref()
                .map_or_else(|| "(built-in)".to_string(), |d| d.display().to_string()),
        );
        add("verbose", self.logging.verbose.to_string());
        add("log_json", self.logging.json.to_string());

        entries
    }
}

fn display_optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "(unset)".to_string(), |v| v.to_string())
}
