use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recommend::{
    BlendWeights, ContentWeights, HybridWeights, SeasonTable, BUILTIN_SEASONS,
    DEFAULT_SEASONAL_DECAY_STEP, DEFAULT_SEASONAL_FLOOR,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    pub recommender: RecommenderConfig,
    pub logging: LoggingConfig,
}

/// Scoring weights, seasonal decay and the season table.
#[derive(Clone, Debug, PartialEq)]
pub struct RecommenderConfig {
    pub hybrid: HybridWeights,
    pub content: ContentWeights,
    pub blend: BlendWeights,
    pub seasonal: SeasonalConfig,
    /// Category to in-season months. Replaced wholesale by a `[seasons]` table.
    pub seasons: BTreeMap<String, Vec<u32>>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeasonalConfig {
    pub decay_step: f64,
    pub floor: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub hybrid: Option<HybridWeights>,
    pub seasonal_decay_step: Option<f64>,
    pub seasonal_floor: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            hybrid: HybridWeights::default(),
            content: ContentWeights::default(),
            blend: BlendWeights::default(),
            seasonal: SeasonalConfig::default(),
            seasons: builtin_seasons(),
        }
    }
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self { decay_step: DEFAULT_SEASONAL_DECAY_STEP, floor: DEFAULT_SEASONAL_FLOOR }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

fn builtin_seasons() -> BTreeMap<String, Vec<u32>> {
    BUILTIN_SEASONS
        .iter()
        .map(|(category, months)| ((*category).to_string(), months.to_vec()))
        .collect()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("harvest.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(weights) = patch.weights {
            let recommender = &mut self.recommender;
            if let Some(collaborative) = weights.collaborative {
                recommender.hybrid.collaborative = collaborative;
            }
            if let Some(content) = weights.content {
                recommender.hybrid.content = content;
            }
            if let Some(category) = weights.category {
                recommender.content.category = category;
            }
            if let Some(price) = weights.price {
                recommender.content.price = price;
            }
            if let Some(season) = weights.season {
                recommender.content.season = season;
            }
            if let Some(blend_base) = weights.blend_base {
                recommender.blend.base = blend_base;
            }
            if let Some(blend_seasonal) = weights.blend_seasonal {
                recommender.blend.seasonal = blend_seasonal;
            }
        }

        if let Some(seasonal) = patch.seasonal {
            if let Some(decay_step) = seasonal.decay_step {
                self.recommender.seasonal.decay_step = decay_step;
            }
            if let Some(floor) = seasonal.floor {
                self.recommender.seasonal.floor = floor;
            }
        }

        if let Some(seasons) = patch.seasons {
            self.recommender.seasons = seasons;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HARVEST_WEIGHTS_COLLABORATIVE") {
            self.recommender.hybrid.collaborative =
                parse_f64("HARVEST_WEIGHTS_COLLABORATIVE", &value)?;
        }
        if let Some(value) = read_env("HARVEST_WEIGHTS_CONTENT") {
            self.recommender.hybrid.content = parse_f64("HARVEST_WEIGHTS_CONTENT", &value)?;
        }
        if let Some(value) = read_env("HARVEST_SEASONAL_DECAY_STEP") {
            self.recommender.seasonal.decay_step =
                parse_f64("HARVEST_SEASONAL_DECAY_STEP", &value)?;
        }
        if let Some(value) = read_env("HARVEST_SEASONAL_FLOOR") {
            self.recommender.seasonal.floor = parse_f64("HARVEST_SEASONAL_FLOOR", &value)?;
        }

        let log_level =
            read_env("HARVEST_LOGGING_LEVEL").or_else(|| read_env("HARVEST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HARVEST_LOGGING_FORMAT").or_else(|| read_env("HARVEST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(hybrid) = overrides.hybrid {
            self.recommender.hybrid = hybrid;
        }
        if let Some(decay_step) = overrides.seasonal_decay_step {
            self.recommender.seasonal.decay_step = decay_step;
        }
        if let Some(floor) = overrides.seasonal_floor {
            self.recommender.seasonal.floor = floor;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_recommender(&self.recommender)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("harvest.toml"), PathBuf::from("config/harvest.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_recommender(recommender: &RecommenderConfig) -> Result<(), ConfigError> {
    let invalid = |error: crate::errors::DomainError| ConfigError::Validation(error.to_string());

    recommender.hybrid.validate().map_err(invalid)?;
    recommender.content.validate().map_err(invalid)?;
    recommender.blend.validate().map_err(invalid)?;

    let SeasonalConfig { decay_step, floor } = recommender.seasonal;
    if !(decay_step.is_finite() && decay_step > 0.0 && decay_step <= 1.0) {
        return Err(ConfigError::Validation(
            "seasonal.decay_step must be in range (0, 1]".to_string(),
        ));
    }
    if !(floor.is_finite() && (DEFAULT_SEASONAL_FLOOR..=1.0).contains(&floor)) {
        return Err(ConfigError::Validation(format!(
            "seasonal.floor must be in range [{DEFAULT_SEASONAL_FLOOR}, 1]"
        )));
    }

    SeasonTable::from_map(&recommender.seasons).map_err(invalid)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    weights: Option<WeightsPatch>,
    seasonal: Option<SeasonalPatch>,
    seasons: Option<BTreeMap<String, Vec<u32>>>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WeightsPatch {
    collaborative: Option<f64>,
    content: Option<f64>,
    category: Option<f64>,
    price: Option<f64>,
    season: Option<f64>,
    blend_base: Option<f64>,
    blend_seasonal: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SeasonalPatch {
    decay_step: Option<f64>,
    floor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
