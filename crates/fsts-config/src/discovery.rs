use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::model::{
    CliArgs, Config, ConfigSource, LlmConfig, LoggingConfig, PipelineConfig, PromptsConfig,
    Provider, TomlConfig,
};

/// Directory name searched for upward from the working directory.
pub const CONFIG_DIR: &str = ".fsts";
pub const CONFIG_FILE: &str = "config.toml";
/// Environment variable naming a fallback configuration directory.
pub const HOME_ENV: &str = "FSTS_HOME";

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is given in `cli_args`.
    ///
    /// # Errors
    ///
    /// Fails when the working directory is unavailable, an explicit or
    /// discovered file cannot be read or parsed, or validation fails.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        let home = env::var_os(HOME_ENV).map(PathBuf::from);
        Self::discover_from(&start_dir, home.as_deref(), cli_args)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid process-global
    /// state; `home` plays the role of `FSTS_HOME`.
    ///
    /// # Errors
    ///
    /// See [`Config::discover`].
    pub fn discover_from(start_dir: &Path, home: Option<&Path>, cli_args: &CliArgs) -> Result<Self> {
        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(fsts_utils::ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir)
                .or_else(|| home.map(|h| h.join(CONFIG_FILE)).filter(|p| p.is_file())),
        };

        let file = match &config_path {
            Some(path) => Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => TomlConfig::default(),
        };

        let config = Self::layer(file, config_path, cli_args)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge file values and CLI overrides over the defaults.
    fn layer(file: TomlConfig, config_path: Option<PathBuf>, cli: &CliArgs) -> Result<Self> {
        let mut attribution = Attribution::new(config_path.clone());

        let mut pipeline = PipelineConfig::default();
        let p = file.pipeline.unwrap_or_default();
        attribution.apply(
            &mut pipeline.min_output_reviews,
            "min_output_reviews",
            p.min_output_reviews,
            cli.min_output_reviews,
        );
        attribution.apply(
            &mut pipeline.max_output_reviews,
            "max_output_reviews",
            p.max_output_reviews,
            cli.max_output_reviews,
        );
        attribution.apply(
            &mut pipeline.rework_routes,
            "rework_routes",
            p.rework_routes,
            cli.rework_routes,
        );
        attribution.apply(
            &mut pipeline.max_rework_passes,
            "max_rework_passes",
            p.max_rework_passes,
            None,
        );
        attribution.apply(
            &mut pipeline.recursion_limit,
            "recursion_limit",
            p.recursion_limit,
            cli.recursion_limit,
        );
        attribution.apply_optional(
            &mut pipeline.run_timeout_secs,
            "run_timeout_secs",
            p.run_timeout_secs,
            cli.run_timeout_secs,
        );

        let l = file.llm.unwrap_or_default();
        let file_provider = l
            .provider
            .as_deref()
            .map(Provider::parse)
            .transpose()
            .map_err(|e| fsts_utils::ConfigError::InvalidValue {
                key: "llm.provider".to_string(),
                value: e,
            })?;
        let mut provider = Provider::default();
        attribution.apply(&mut provider, "provider", file_provider, cli.provider);

        // Provider-specific defaults are filled in once the provider is known.
        let mut llm = LlmConfig::for_provider(provider);
        attribution.apply(&mut llm.model, "model", l.model, cli.model.clone());
        attribution.apply_optional(&mut llm.base_url, "base_url", l.base_url, cli.base_url.clone());
        attribution.apply_optional(&mut llm.api_key_env, "api_key_env", l.api_key_env, None);
        attribution.apply(&mut llm.max_tokens, "max_tokens", l.max_tokens, None);
        attribution.apply(&mut llm.temperature, "temperature", l.temperature, None);
        attribution.apply(&mut llm.timeout_secs, "timeout_secs", l.timeout_secs, None);
        attribution.apply_optional(&mut llm.budget, "budget", l.budget, None);
        attribution.apply(&mut llm.retries, "retries", l.retries, None);

        let mut prompts = PromptsConfig::default();
        let file_prompts_dir = file.prompts.and_then(|section| section.dir).map(|dir| {
            // Relative prompt dirs are resolved against the project root, i.e.
            // the parent of the `.fsts` directory holding the config file.
            match config_path.as_deref().and_then(project_root) {
                Some(root) if dir.is_relative() => root.join(dir),
                _ => dir,
            }
        });
        attribution.apply_optional(
            &mut prompts.dir,
            "prompts_dir",
            file_prompts_dir,
            cli.prompts_dir.clone(),
        );

        let mut logging = LoggingConfig::default();
        let g = file.logging.unwrap_or_default();
        attribution.apply(&mut logging.verbose, "verbose", g.verbose, cli.verbose);
        attribution.apply(&mut logging.json, "log_json", g.json, cli.log_json);

        Ok(Self {
            pipeline,
            llm,
            prompts,
            logging,
            config_path,
            source_attribution: attribution.finish(),
        })
    }

    /// Discover config file by searching upward from a given directory
    ///
    /// Walks up the directory tree looking for `.fsts/config.toml`, stopping
    /// at repository root markers (.git, .hg, .svn) or the filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists() {
                break;
            }
            current = dir.parent();
        }

        None
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: TomlConfig = toml::from_str(&content).map_err(|e| {
            fsts_utils::ConfigError::InvalidFile(format!("{}: {e}", path.display()))
        })?;
        Ok(config)
    }
}

/// `<root>/.fsts/config.toml` -> `<root>`; other layouts -> the file's directory.
fn project_root(config_path: &Path) -> Option<PathBuf> {
    let dir = config_path.parent()?;
    if dir.file_name().is_some_and(|n| n == CONFIG_DIR) {
        dir.parent().map(Path::to_path_buf)
    } else {
        Some(dir.to_path_buf())
    }
}

/// Records which layer supplied each key while values are merged.
struct Attribution {
    file_source: Option<ConfigSource>,
    sources: HashMap<String, ConfigSource>,
}

impl Attribution {
    fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            file_source: config_path.map(ConfigSource::Config),
            sources: HashMap::new(),
        }
    }

    fn apply<T>(&mut self, slot: &mut T, key: &str, from_file: Option<T>, from_cli: Option<T>) {
        let source = if let Some(value) = from_cli {
            *slot = value;
            ConfigSource::Cli
        } else if let Some(value) = from_file {
            *slot = value;
            self.file_source.clone().unwrap_or(ConfigSource::Default)
        } else {
            ConfigSource::Default
        };
        self.sources.insert(key.to_string(), source);
    }

    fn apply_optional<T>(
        &mut self,
        slot: &mut Option<T>,
        key: &str,
        from_file: Option<T>,
        from_cli: Option<T>,
    ) {
        let mut wrapped = slot.take();
        self.apply(&mut wrapped, key, from_file.map(Some), from_cli.map(Some));
        *slot = wrapped;
    }

    fn finish(self) -> HashMap<String, ConfigSource> {
        self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsts_utils::types::ReworkRoutes;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();

        let config = Config::discover_from(tmp.path(), None, &CliArgs::default()).unwrap();
        assert_eq!(config.pipeline.min_output_reviews, 1);
        assert_eq!(config.pipeline.max_output_reviews, 2);
        assert_eq!(config.pipeline.recursion_limit, 25);
        assert_eq!(config.pipeline.rework_routes, ReworkRoutes::Collapse);
        assert_eq!(config.llm.provider, Provider::OpenaiCompatible);
        assert_eq!(config.llm.model, "gemini-2.5-pro");
        assert_eq!(config.llm.api_key_env.as_deref(), Some("GEMINI_API_KEY"));
        assert!(config.config_path.is_none());
        assert_eq!(config.source_attribution["max_output_reviews"], ConfigSource::Default);
    }

    #[test]
    fn test_file_found_by_upward_search() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        let path = write_config(
            tmp.path(),
            "[pipeline]\nmax_output_reviews = 3\nrework_routes = \"loop_back\"\n\n[prompts]\ndir = \"prompts\"\n",
        );
        let nested = tmp.path().join("src").join("abap");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, None, &CliArgs::default()).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.pipeline.max_output_reviews, 3);
        assert_eq!(config.pipeline.rework_routes, ReworkRoutes::LoopBack);
        assert_eq!(config.prompts.dir, Some(tmp.path().join("prompts")));
        assert_eq!(
            config.source_attribution["max_output_reviews"],
            ConfigSource::Config(path)
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        write_config(
            tmp.path(),
            "[pipeline]\nmin_output_reviews = 2\nmax_output_reviews = 2\n\n[llm]\nmodel = \"from-file\"\n",
        );

        let cli = CliArgs {
            min_output_reviews: Some(0),
            model: Some("from-cli".to_string()),
            ..CliArgs::default()
        };
        let config = Config::discover_from(tmp.path(), None, &cli).unwrap();
        assert_eq!(config.pipeline.min_output_reviews, 0);
        assert_eq!(config.llm.model, "from-cli");
        assert_eq!(config.source_attribution["min_output_reviews"], ConfigSource::Cli);
        assert_eq!(config.source_attribution["model"], ConfigSource::Cli);
    }

    #[test]
    fn test_home_directory_fallback() {
        let project = TempDir::new().unwrap();
        fs::create_dir(project.path().join(".git")).unwrap();
        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join(CONFIG_FILE),
            "[llm]\nprovider = \"anthropic\"\n",
        )
        .unwrap();

        let config =
            Config::discover_from(project.path(), Some(home.path()), &CliArgs::default()).unwrap();
        assert_eq!(config.llm.provider, Provider::Anthropic);
        assert_eq!(config.llm.model, "claude-sonnet-4-5");
        assert_eq!(config.llm.api_key_env.as_deref(), Some("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(tmp.path().join("nope.toml")),
            ..CliArgs::default()
        };
        let err = Config::discover_from(tmp.path(), None, &cli).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        write_config(tmp.path(), "[pipeline\nmax_output_reviews = ");
        assert!(Config::discover_from(tmp.path(), None, &CliArgs::default()).is_err());
    }

    #[test]
    fn test_unknown_provider_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        write_config(tmp.path(), "[llm]\nprovider = \"carrier-pigeon\"\n");
        let err = Config::discover_from(tmp.path(), None, &CliArgs::default()).unwrap_err();
        assert!(format!("{err:#}").contains("carrier-pigeon"));
    }

    #[test]
    fn test_search_stops_at_repository_root() {
        let outer = TempDir::new().unwrap();
        write_config(outer.path(), "[pipeline]\nmax_output_reviews = 4\nrecursion_limit = 30\n");
        let repo = outer.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert!(Config::discover_config_file_from(&repo).is_none());
    }
}
