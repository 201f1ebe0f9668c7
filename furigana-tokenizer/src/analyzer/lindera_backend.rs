use std::borrow::Cow;
use std::str::FromStr;

use lindera::dictionary::load_dictionary;
use lindera::mode::Mode;
use lindera::segmenter::Segmenter;

use super::{Morpheme, MorphAnalyzer};
use crate::config::TokenizerConfig;
use crate::error::TokenizerError;

/// Lindera segmenter over an IPADIC-format dictionary.
pub struct LinderaAnalyzer {
    segmenter: Segmenter,
}

impl LinderaAnalyzer {
    pub fn new(config: &TokenizerConfig) -> Result<Self, TokenizerError> {
        let mode = Mode::from_str(config.mode.as_str()).map_err(|e| TokenizerError::InvalidConfiguration {
            message: format!("invalid mode `{}`: {e}", config.mode.as_str()),
        })?;
        let dictionary = load_dictionary(&config.dictionary_uri).map_err(|e| TokenizerError::InvalidConfiguration {
            message: format!("failed to load dictionary `{}`: {e}", config.dictionary_uri),
        })?;
        let user_dictionary = None;
        Ok(Self { segmenter: Segmenter::new(mode, dictionary, user_dictionary) })
    }
}

impl MorphAnalyzer for LinderaAnalyzer {
    fn analyze(&mut self, text: &str) -> Result<Vec<Morpheme>, TokenizerError> {
        let tokens = self
            .segmenter
            .segment(Cow::Borrowed(text))
            .map_err(|e| TokenizerError::Analyzer { message: format!("failed to segment text: {e}") })?;
        let mut out = Vec::with_capacity(tokens.len());
        for mut token in tokens {
            let (start, end) = (token.byte_start, token.byte_end);
            let details: Vec<String> = token.details().iter().map(|d| d.to_string()).collect();
            out.push(Morpheme::from_ipadic(start, end, &details));
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "lindera"
    }
}
