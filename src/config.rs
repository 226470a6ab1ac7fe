//! Configuration for the awareness pipeline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (a `.env` file in the working directory is loaded first)
//! 2. Config file (`$AWARENESS_CONFIG`, or `.awareness/config.yaml` found by
//!    walking up from the current directory, or the user config directory)
//! 3. Defaults
//!
//! Credentials are only ever read from the environment. Paths in the config
//! file are relative to the directory that contains `.awareness/`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{TrendSource, VideoProvider};
use crate::core::output::OutputPaths;
use crate::core::pipeline::Limits;
use crate::domain::Locale;
use crate::error::StageError;

/// Environment variable names
pub mod vars {
    pub const TREND_SOURCE: &str = "TREND_SOURCE";
    pub const TREND_LOCALE: &str = "TREND_LOCALE";
    pub const VIDEO_PROVIDER: &str = "VIDEO_PROVIDER";

    pub const SERPAPI_API_KEY: &str = "SERPAPI_API_KEY";
    pub const NEWSAPI_API_KEY: &str = "NEWSAPI_API_KEY";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
    pub const HEYGEN_API_KEY: &str = "HEYGEN_API_KEY";
    pub const HEYGEN_AVATAR_ID: &str = "HEYGEN_AVATAR_ID";
    pub const HEYGEN_VOICE_ID: &str = "HEYGEN_VOICE_ID";
    pub const DID_API_KEY: &str = "DID_API_KEY";
    pub const DID_SOURCE_URL: &str = "DID_SOURCE_URL";
    pub const DID_VOICE_ID: &str = "DID_VOICE_ID";
    pub const INSTAGRAM_ACCESS_TOKEN: &str = "INSTAGRAM_ACCESS_TOKEN";
    pub const INSTAGRAM_USER_ID: &str = "INSTAGRAM_USER_ID";

    pub const OUTPUT_DIR: &str = "OUTPUT_DIR";
    pub const SCRIPT_PATH: &str = "SCRIPT_PATH";
    pub const VIDEO_PATH: &str = "VIDEO_PATH";
    pub const AWARENESS_CONFIG: &str = "AWARENESS_CONFIG";

    /// Every variable that holds a secret
    pub const CREDENTIALS: [&str; 7] = [
        SERPAPI_API_KEY,
        NEWSAPI_API_KEY,
        OPENAI_API_KEY,
        HEYGEN_API_KEY,
        DID_API_KEY,
        INSTAGRAM_ACCESS_TOKEN,
        INSTAGRAM_USER_ID,
    ];
}

const CONFIG_DIR: &str = ".awareness";
const CONFIG_FILE: &str = "config.yaml";
const APP_DIR: &str = "awareness-bot";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_HEYGEN_AVATAR: &str = "Daisy-inskirt-20220818";
const DEFAULT_HEYGEN_VOICE: &str = "2d5b0e6cf36f460aa7fc47e3eee4ba54";
const DEFAULT_DID_SOURCE: &str =
    "https://d-id-public-bucket.s3.us-west-2.amazonaws.com/alice.jpg";
const DEFAULT_DID_VOICE: &str = "en-US-JennyNeural";

/// Snapshot of the process environment
pub type EnvMap = HashMap<String, String>;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub content: ContentSettings,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    pub trend_source: Option<String>,
    pub video_provider: Option<String>,
    pub locale: Option<String>,
    pub openai_model: Option<String>,
    #[serde(default)]
    pub heygen: HeyGenConfig,
    #[serde(default)]
    pub did: DidConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeyGenConfig {
    pub avatar_id: Option<String>,
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DidConfig {
    pub source_url: Option<String>,
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Output directory (relative to the project root)
    pub output_dir: Option<String>,
    pub script: Option<String>,
    pub video: Option<String>,
}

/// Content shaping: topic filtering, narration length, hashtags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSettings {
    /// Topic candidates containing one of these are preferred
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    #[serde(default = "default_hashtags")]
    pub hashtags: Vec<String>,

    /// Narration word range (~45-60 seconds spoken)
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

fn default_keywords() -> Vec<String> {
    [
        "mental health",
        "anxiety",
        "depression",
        "stress",
        "burnout",
        "mindfulness",
        "therapy",
        "self care",
        "wellbeing",
        "loneliness",
        "sleep",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_hashtags() -> Vec<String> {
    ["mentalhealth", "mentalhealthawareness", "selfcare", "wellbeing"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_min_words() -> usize {
    115
}
fn default_max_words() -> usize {
    150
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            hashtags: default_hashtags(),
            min_words: default_min_words(),
            max_words: default_max_words(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeyGenSettings {
    pub avatar_id: String,
    pub voice_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidSettings {
    /// Presenter image the talk is animated from
    pub source_url: String,
    pub voice_id: String,
}

/// Secrets keyed by variable name. Debug output lists names only.
#[derive(Clone, Default)]
pub struct Credentials(HashMap<&'static str, String>);

impl Credentials {
    fn from_env(env: &EnvMap) -> Self {
        let values = vars::CREDENTIALS
            .iter()
            .filter_map(|var| non_empty(env, var).map(|value| (*var, value)))
            .collect();
        Self(values)
    }

    pub fn get(&self, var: &str) -> Option<&str> {
        self.0.get(var).map(String::as_str)
    }

    pub fn is_set(&self, var: &str) -> bool {
        self.0.contains_key(var)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&&str> = self.0.keys().collect();
        names.sort();
        f.debug_tuple("Credentials").field(&names).finish()
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub trend_source: TrendSource,
    pub video_provider: VideoProvider,
    pub locale: Option<Locale>,
    pub openai_model: String,
    pub heygen: HeyGenSettings,
    pub did: DidSettings,
    pub paths: OutputPaths,
    pub limits: Limits,
    pub content: ContentSettings,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    credentials: Credentials,
}

impl Settings {
    /// Load `.env`, discover the config file and resolve everything
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let env = env_snapshot();

        let file = match discover_config_file(&env) {
            Some(path) => {
                let config = load_config_file(&path)?;
                Some((path, config))
            }
            None => None,
        };

        let settings = Self::resolve(&env, file)?;
        Ok(settings)
    }

    /// Resolve settings from an environment snapshot and an optional parsed
    /// config file
    pub fn resolve(
        env: &EnvMap,
        file: Option<(PathBuf, ConfigFile)>,
    ) -> std::result::Result<Self, StageError> {
        let (config_file, config) = match file {
            Some((path, config)) => (Some(path), config),
            None => (None, ConfigFile::default()),
        };

        // Base directory is the parent of .awareness/ (i.e. grandparent of config.yaml)
        let base_dir = config_file
            .as_deref()
            .and_then(project_root)
            .unwrap_or_else(|| PathBuf::from("."));
        let providers = &config.providers;

        let trend_source = match non_empty(env, vars::TREND_SOURCE).or(providers.trend_source.clone()) {
            Some(raw) => raw.parse().map_err(|message| StageError::InvalidSetting {
                var: vars::TREND_SOURCE.to_string(),
                message,
            })?,
            None => TrendSource::default(),
        };

        let video_provider = match non_empty(env, vars::VIDEO_PROVIDER).or(providers.video_provider.clone()) {
            Some(raw) => raw.parse().map_err(|message| StageError::InvalidSetting {
                var: vars::VIDEO_PROVIDER.to_string(),
                message,
            })?,
            None => VideoProvider::default(),
        };

        let locale = non_empty(env, vars::TREND_LOCALE)
            .or(providers.locale.clone())
            .and_then(|raw| Locale::parse(&raw));

        let openai_model = non_empty(env, vars::OPENAI_MODEL)
            .or(providers.openai_model.clone())
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());

        let heygen = HeyGenSettings {
            avatar_id: non_empty(env, vars::HEYGEN_AVATAR_ID)
                .or(providers.heygen.avatar_id.clone())
                .unwrap_or_else(|| DEFAULT_HEYGEN_AVATAR.to_string()),
            voice_id: non_empty(env, vars::HEYGEN_VOICE_ID)
                .or(providers.heygen.voice_id.clone())
                .unwrap_or_else(|| DEFAULT_HEYGEN_VOICE.to_string()),
        };

        let did = DidSettings {
            source_url: non_empty(env, vars::DID_SOURCE_URL)
                .or(providers.did.source_url.clone())
                .unwrap_or_else(|| DEFAULT_DID_SOURCE.to_string()),
            voice_id: non_empty(env, vars::DID_VOICE_ID)
                .or(providers.did.voice_id.clone())
                .unwrap_or_else(|| DEFAULT_DID_VOICE.to_string()),
        };

        let output_dir = if let Some(dir) = non_empty(env, vars::OUTPUT_DIR) {
            PathBuf::from(dir)
        } else if let Some(ref dir) = config.paths.output_dir {
            resolve_path(&base_dir, dir)
        } else {
            base_dir.join("output")
        };

        let script = if let Some(path) = non_empty(env, vars::SCRIPT_PATH) {
            PathBuf::from(path)
        } else if let Some(ref path) = config.paths.script {
            resolve_path(&base_dir, path)
        } else {
            output_dir.join("script.txt")
        };

        let video = if let Some(path) = non_empty(env, vars::VIDEO_PATH) {
            PathBuf::from(path)
        } else if let Some(ref path) = config.paths.video {
            resolve_path(&base_dir, path)
        } else {
            output_dir.join("video.mp4")
        };

        Ok(Self {
            trend_source,
            video_provider,
            locale,
            openai_model,
            heygen,
            did,
            paths: OutputPaths::new(output_dir, script, video),
            limits: config.limits,
            content: config.content,
            config_file,
            credentials: Credentials::from_env(env),
        })
    }

    /// Look up a credential, failing with a configuration error naming the
    /// variable when it is absent
    pub fn credential(&self, var: &str) -> std::result::Result<&str, StageError> {
        self.credentials
            .get(var)
            .ok_or_else(|| StageError::missing(var))
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// Read the process environment, skipping non-UTF-8 entries
pub fn env_snapshot() -> EnvMap {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

fn non_empty(env: &EnvMap, var: &str) -> Option<String> {
    env.get(var)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Directory containing `.awareness/`, for a config file at `.awareness/config.yaml`
fn project_root(config_path: &Path) -> Option<PathBuf> {
    let dir = config_path.parent()?;
    if dir.file_name().map(|n| n == CONFIG_DIR).unwrap_or(false) {
        dir.parent().map(Path::to_path_buf)
    } else {
        Some(dir.to_path_buf())
    }
}

/// Find the config file: explicit variable, then parents of the current
/// directory, then the user config directory
fn discover_config_file(env: &EnvMap) -> Option<PathBuf> {
    if let Some(explicit) = non_empty(env, vars::AWARENESS_CONFIG) {
        return Some(PathBuf::from(explicit));
    }

    if let Ok(cwd) = std::env::current_dir() {
        if let Some(found) = find_config_upwards(&cwd) {
            return Some(found);
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .filter(|path| path.exists())
}

fn find_config_upwards(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
