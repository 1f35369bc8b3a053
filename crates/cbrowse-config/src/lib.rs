//! User-facing configuration for the type cache.
//!
//! Configuration is read from TOML. Every key has a default, so an empty file (or no file at all)
//! yields [`TypeCacheConfig::default`].

mod logging;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};

/// Environment variable overriding config discovery.
pub const CBROWSE_CONFIG_ENV_VAR: &str = "CBROWSE_CONFIG";

/// Preprocessor context handed to the fallback parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParserConfig {
    /// Search path for `#include` resolution. Relative entries are resolved against the
    /// project root.
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,

    /// Object-like macros (`NAME = "replacement"`). An empty replacement removes the name.
    #[serde(default)]
    pub macros: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeCacheConfig {
    /// Default for reconcile/locate calls: repopulate from the symbol index.
    #[serde(default = "TypeCacheConfig::default_enable_indexing")]
    pub enable_indexing: bool,

    /// Delay before a refresh scheduled by a change event starts.
    #[serde(default = "TypeCacheConfig::default_reconcile_delay_ms")]
    pub reconcile_delay_ms: u64,

    /// Worker threads for interactive jobs. Defaults to `min(available - 1, 8)`.
    #[serde(default)]
    pub compute_threads: Option<usize>,

    /// Worker threads for background refreshes. Defaults to `min(available, 2)`.
    #[serde(default)]
    pub background_threads: Option<usize>,

    /// File extensions (without the dot) treated as C/C++ sources.
    #[serde(default = "TypeCacheConfig::default_source_extensions")]
    pub source_extensions: Vec<String>,

    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TypeCacheConfig {
    fn default_enable_indexing() -> bool {
        true
    }

    fn default_reconcile_delay_ms() -> u64 {
        300
    }

    fn default_source_extensions() -> Vec<String> {
        [
            "c", "cc", "cpp", "cxx", "c++", "h", "hh", "hpp", "hxx", "h++", "inl",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect()
    }

    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }

    fn available_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn effective_compute_threads(&self) -> usize {
        self.compute_threads
            .unwrap_or_else(|| Self::available_parallelism().saturating_sub(1).min(8))
            .max(1)
    }

    pub fn effective_background_threads(&self) -> usize {
        self.background_threads
            .unwrap_or_else(|| Self::available_parallelism().min(2))
            .max(1)
    }

    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: TypeCacheConfig = toml::from_str(text)?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        for ext in &mut self.source_extensions {
            *ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        }
        self.source_extensions.retain(|ext| !ext.is_empty());
        self.source_extensions.sort();
        self.source_extensions.dedup();
    }
}

impl Default for TypeCacheConfig {
    fn default() -> Self {
        let mut config = Self {
            enable_indexing: Self::default_enable_indexing(),
            reconcile_delay_ms: Self::default_reconcile_delay_ms(),
            compute_threads: None,
            background_threads: None,
            source_extensions: Self::default_source_extensions(),
            parser: ParserConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.normalize();
        config
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

/// Redacts quoted and backticked user values from a TOML/serde diagnostic.
fn sanitize_toml_error_message(message: &str) -> String {
    static QUOTED_STRING_RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    static SINGLE_QUOTED_STRING_RE: OnceLock<Option<regex::Regex>> = OnceLock::new();

    let mut out = message.to_owned();
    if let Some(re) = QUOTED_STRING_RE
        .get_or_init(|| regex::Regex::new(r#""(?:\\.|[^"\\])*""#).ok())
        .as_ref()
    {
        out = re.replace_all(&out, r#""<redacted>""#).into_owned();
    }
    if let Some(re) = SINGLE_QUOTED_STRING_RE
        .get_or_init(|| regex::Regex::new(r#"'(?:\\.|[^'\\])*'"#).ok())
        .as_ref()
    {
        out = re.replace_all(&out, "'<redacted>'").into_owned();
    }

    // `unknown field `x`` and `invalid type: integer `1`` echo user input; `missing field`
    // names come from the schema and are kept.
    let mut start = ["unknown field `", "unknown variant `"]
        .iter()
        .filter_map(|pattern| out.find(pattern).map(|pos| pos + pattern.len() - 1))
        .min();
    if start.is_none() && (out.contains("invalid type:") || out.contains("invalid value:")) {
        let boundary = out.find(", expected").unwrap_or(out.len());
        start = out[..boundary].find('`');
    }
    if let Some(start) = start {
        let after_start = &out[start + 1..];
        let end_rel = after_start
            .find("`, expected")
            .or_else(|| after_start.find('`'));
        if let Some(end_rel) = end_rel {
            out.replace_range(start + 1..start + 1 + end_rel, "<redacted>");
        }
    }

    out
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` includes a source snippet; keep only the message.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

/// Finds the config file for a workspace root: `$CBROWSE_CONFIG` (relative paths resolved
/// against the root) or the first of `cbrowse.toml`, `.cbrowse.toml` that exists.
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    if let Some(value) = std::env::var_os(CBROWSE_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path);
    }

    ["cbrowse.toml", ".cbrowse.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
}

/// Loads the config for a workspace root, falling back to defaults when no file exists.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(TypeCacheConfig, Option<PathBuf>), ConfigError> {
    match discover_config_path(workspace_root) {
        Some(path) => {
            let config = TypeCacheConfig::load_from_path(&path)?;
            Ok((config, Some(path)))
        }
        None => Ok((TypeCacheConfig::default(), None)),
    }
}
