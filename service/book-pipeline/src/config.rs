use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use book_parser::{EpubParams, MarkdownParams, MergeOptions, TextChunkParams, TitleParams};
use doc_convert::{ClientConfig, DownloadPolicy};
use furigana_tokenizer::{default_tokenizer_config, SplitMode, TokenizerConfig};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for extracted images and conversion scratch space.
    pub data_dir: PathBuf,
    /// URL prefix the data dir is served under.
    pub static_url_prefix: String,
    pub chunk: TextChunkParams,
    pub title: TitleParams,
    pub merge: MergeOptions,
    /// Heading level and default title for markdown input; its chunk limit follows `chunk`.
    pub markdown: MarkdownParams,
    pub tokenizer: TokenizerConfig,
    pub client: ClientConfig,
    pub download: DownloadPolicy,
    /// Keep conversion work dirs for debugging.
    pub keep_temp: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            static_url_prefix: "/static".to_string(),
            chunk: TextChunkParams::default(),
            title: TitleParams::default(),
            merge: MergeOptions::default(),
            markdown: MarkdownParams::default(),
            tokenizer: TokenizerConfig::default(),
            client: ClientConfig::default(),
            download: DownloadPolicy::default(),
            keep_temp: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by environment variables. Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self { tokenizer: default_tokenizer_config(), ..Self::default() };
        if let Some(v) = env_str("DATA_DIR") { cfg.data_dir = PathBuf::from(v); }
        if let Some(v) = env_parse::<usize>("EPUB_MAX_CHUNK_SIZE") { cfg.chunk.max_chars = v; }
        if let Some(v) = env_parse::<usize>("EPUB_MAX_TITLE_LENGTH") { cfg.title.max_title_chars = v; }
        if let Some(v) = env_bool("MERGE_SAME_TITLE") { cfg.merge.same_title = v; }
        if let Some(v) = env_bool("MERGE_IMAGE_CHAPTERS") { cfg.merge.consecutive_images = v; }
        if let Some(v) = env_parse::<SplitMode>("TOKENIZER_MODE") { cfg.tokenizer.mode = v; }
        if let Some(v) = env_str("MINERU_API_TOKEN") { cfg.client.api_token = v; }
        if let Some(v) = env_str("MINERU_MODEL_VERSION") { cfg.client.model_version = v; }
        if let Some(v) = env_str("MINERU_LANGUAGE") { cfg.client.language = v; }
        if let Some(v) = env_parse::<u64>("MINERU_POLL_INTERVAL") { cfg.client.poll_interval = Duration::from_secs(v); }
        if let Some(v) = env_parse::<u32>("MINERU_MAX_RETRIES") { cfg.client.max_poll_attempts = v; }
        if let Some(v) = env_bool("PDF_KEEP_TEMP") { cfg.keep_temp = v; }
        cfg
    }

    pub fn epub_params(&self) -> EpubParams {
        EpubParams { chunk: self.chunk, title: self.title }
    }

    pub fn markdown_params(&self) -> MarkdownParams {
        MarkdownParams { chunk: self.chunk, ..self.markdown.clone() }
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_str(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => { log::warn!("ignoring {key}={raw}: not a valid value"); None }
    }
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env_str(key)?;
    let parsed = parse_bool(&raw);
    if parsed.is_none() { log::warn!("ignoring {key}={raw}: expected a boolean"); }
    parsed
}
