use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TokenizerError;

/// Segmentation granularity handed to the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    #[default]
    Normal,
    /// Split long compounds into their parts.
    Decompose,
}

impl SplitMode {
    pub fn as_str(&self) -> &'static str {
        match self { SplitMode::Normal => "normal", SplitMode::Decompose => "decompose" }
    }
}

impl FromStr for SplitMode {
    type Err = TokenizerError;

    /// Accepts `normal` / `decompose`, and the short-unit letters `A` (decompose) or `B` / `C` (normal).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "b" | "c" => Ok(SplitMode::Normal),
            "decompose" | "a" => Ok(SplitMode::Decompose),
            other => Err(TokenizerError::InvalidConfiguration { message: format!("unknown split mode `{other}`") }),
        }
    }
}

/// Default settings for the furigana tokenizer.
#[derive(Debug, Clone, Copy)]
pub struct TokenizerDefaults {
    pub dictionary_uri: &'static str,
    pub max_input_chars: usize,
    pub pool_size: usize,
}

/// Shared defaults so the pipeline, demo and tests stay in sync.
pub const TOKENIZER_DEFAULTS: TokenizerDefaults = TokenizerDefaults {
    dictionary_uri: "embedded://ipadic",
    max_input_chars: 40_000,
    pool_size: 1,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerConfig {
    pub mode: SplitMode,
    pub dictionary_uri: String,
    /// Segments longer than this (in chars) are refused instead of analyzed.
    pub max_input_chars: usize,
    /// Number of analyzer instances; each one is used by a single caller at a time.
    pub pool_size: usize,
}

impl TokenizerConfig {
    pub fn validate(&self) -> Result<(), TokenizerError> {
        if self.max_input_chars == 0 {
            return Err(TokenizerError::InvalidConfiguration { message: "max_input_chars must be greater than zero".into() });
        }
        if self.pool_size == 0 {
            return Err(TokenizerError::InvalidConfiguration { message: "pool_size must be greater than zero".into() });
        }
        if self.dictionary_uri.trim().is_empty() {
            return Err(TokenizerError::InvalidConfiguration { message: "dictionary_uri must not be empty".into() });
        }
        Ok(())
    }
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            mode: SplitMode::Normal,
            dictionary_uri: TOKENIZER_DEFAULTS.dictionary_uri.to_string(),
            max_input_chars: TOKENIZER_DEFAULTS.max_input_chars,
            pool_size: TOKENIZER_DEFAULTS.pool_size,
        }
    }
}

/// Dictionary location: `LINDERA_DICT_URI`, else `LINDERA_DICT_DIR` as a `file://` URI,
/// else the embedded IPADIC.
pub fn dict_uri_from_env() -> String {
    if let Ok(uri) = std::env::var("LINDERA_DICT_URI") { return uri; }
    if let Ok(dir) = std::env::var("LINDERA_DICT_DIR") {
        let p = PathBuf::from(dir);
        let abs = if p.is_absolute() {
            p
        } else {
            match std::env::current_dir() { Ok(cwd) => cwd.join(p), Err(_) => p }
        };
        let mut s = abs.to_string_lossy().replace('\\', "/");
        if !s.starts_with('/') { s = format!("/{s}"); }
        return format!("file://{s}");
    }
    TOKENIZER_DEFAULTS.dictionary_uri.to_string()
}

/// Defaults with the dictionary location taken from the environment.
pub fn default_tokenizer_config() -> TokenizerConfig {
    TokenizerConfig { dictionary_uri: dict_uri_from_env(), ..TokenizerConfig::default() }
}
