use segment_model::{Chapter, Segment, TextSegment, Token};

use crate::align::align_reading;
use crate::analyzer::{AnalyzerPool, Morpheme};
use crate::config::TokenizerConfig;
use crate::error::TokenizerError;
use crate::kana::{contains_kanji, katakana_to_hiragana};

/// Turns raw segment text into tokens with readings and furigana spans.
///
/// Built once and shared; concurrent callers each check out their own analyzer.
pub struct FuriganaTokenizer {
    pool: AnalyzerPool,
    max_input_chars: usize,
}

impl FuriganaTokenizer {
    pub fn new(pool: AnalyzerPool, config: &TokenizerConfig) -> Result<Self, TokenizerError> {
        config.validate()?;
        Ok(Self { pool, max_input_chars: config.max_input_chars })
    }

    /// Lindera-backed tokenizer with `config.pool_size` analyzers.
    #[cfg(feature = "lindera-impl")]
    pub fn from_config(config: &TokenizerConfig) -> Result<Self, TokenizerError> {
        use crate::analyzer::{LinderaAnalyzer, MorphAnalyzer};
        config.validate()?;
        let pool = AnalyzerPool::with_factory(config.pool_size, || {
            LinderaAnalyzer::new(config).map(|a| Box::new(a) as Box<dyn MorphAnalyzer>)
        })?;
        log::info!("loaded {} lindera analyzer(s) from {}", config.pool_size, config.dictionary_uri);
        Self::new(pool, config)
    }

    pub fn max_input_chars(&self) -> usize { self.max_input_chars }

    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>, TokenizerError> {
        if text.is_empty() { return Ok(Vec::new()); }
        let actual_length = text.chars().count();
        if actual_length > self.max_input_chars {
            return Err(TokenizerError::InputTooLong { max_length: self.max_input_chars, actual_length });
        }
        let morphemes = {
            let mut analyzer = self.pool.checkout()?;
            analyzer.analyze(text)?
        };
        Ok(build_tokens(text, &morphemes))
    }

    /// Replace the segment's raw text with tokens. Already tokenized segments are left as is.
    pub fn tokenize_segment(&self, segment: &mut TextSegment) -> Result<(), TokenizerError> {
        let Some(text) = segment.text() else { return Ok(()); };
        let tokens = self.tokenize(text)?;
        segment.set_tokens(tokens);
        Ok(())
    }

    /// Tokenize every text segment of the chapter; returns how many were converted.
    pub fn tokenize_chapter(&self, chapter: &mut Chapter) -> Result<usize, TokenizerError> {
        let mut converted = 0usize;
        for segment in chapter.segments.iter_mut() {
            if let Segment::Text(text) = segment {
                if text.is_tokenized() { continue; }
                self.tokenize_segment(text)?;
                converted += 1;
            }
        }
        Ok(converted)
    }
}

/// Fill analyzer gaps and annotate morphemes. Surfaces are sliced from `text`, so the
/// concatenated token surfaces always equal `text`.
pub fn build_tokens(text: &str, morphemes: &[Morpheme]) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(morphemes.len() + 1);
    let mut cursor = 0usize;
    for m in morphemes {
        let usable = m.start >= cursor
            && m.start < m.end
            && m.end <= text.len()
            && text.is_char_boundary(m.start)
            && text.is_char_boundary(m.end);
        if !usable {
            log::debug!("ignoring morpheme at {}..{} (cursor {cursor})", m.start, m.end);
            continue;
        }
        if m.start > cursor {
            tokens.push(Token::gap(&text[cursor..m.start]));
        }
        tokens.push(word_token(&text[m.start..m.end], m));
        cursor = m.end;
    }
    if cursor < text.len() {
        tokens.push(Token::gap(&text[cursor..]));
    }
    tokens
}

fn word_token(surface: &str, m: &Morpheme) -> Token {
    let reading = m
        .reading
        .as_deref()
        .map(katakana_to_hiragana)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| surface.to_string());

    let mut token = Token::word(surface, None, m.base_form.clone(), m.pos.clone());
    if contains_kanji(surface) && reading != surface {
        token.ruby = align_reading(surface, &reading);
        token.reading = Some(reading);
    }
    token
}
