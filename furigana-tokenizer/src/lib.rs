pub mod config;
pub mod error;
pub mod analyzer;
pub mod kana;
pub mod align;
pub mod tokenizer;

pub use align::align_reading;
pub use analyzer::{AnalyzerPool, Morpheme, MorphAnalyzer, PooledAnalyzer};
pub use config::{default_tokenizer_config, dict_uri_from_env, SplitMode, TokenizerConfig, TOKENIZER_DEFAULTS};
pub use error::TokenizerError;
pub use tokenizer::{build_tokens, FuriganaTokenizer};

#[cfg(feature = "lindera-impl")]
pub use analyzer::LinderaAnalyzer;
