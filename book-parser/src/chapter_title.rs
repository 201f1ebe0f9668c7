//! Title guesses for sections that carry neither a TOC entry nor a heading.

use regex::Regex;
use std::sync::LazyLock;

use crate::text_segmenter::is_terminator;

#[derive(Debug, Clone, Copy)]
pub struct TitleParams {
    /// Applies to the sentence and first-line branches; bracketed titles are kept whole.
    pub max_title_chars: usize,
}

impl Default for TitleParams {
    fn default() -> Self { Self { max_title_chars: 32 } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessedTitle {
    pub title: String,
    /// The line the title was lifted from, when it must be removed from the body.
    pub strip_line: Option<String>,
}

/// A whole line made of one bracketed phrase, e.g. 「序章」 or 【第一話】.
static BRACKET_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:「[^」]+」|『[^』]+』|【[^】]+】|〈[^〉]+〉|《[^》]+》|〔[^〕]+〕|［[^］]+］)$").unwrap()
});

fn is_numeric_line(line: &str) -> bool {
    line.chars().all(|c| c.is_numeric() || c.is_whitespace() || matches!(c, '.' | '．' | '-' | '－'))
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Try, in order: a line that is one bracketed phrase, the first sentence (back-tracked to the
/// line start and accepted only when short enough), then the first non-numeric line truncated.
pub fn guess_title(text: &str, params: &TitleParams) -> Option<GuessedTitle> {
    let line = first_line(text)?;

    if BRACKET_LINE_RE.is_match(line) {
        return Some(GuessedTitle { title: line.to_string(), strip_line: Some(line.to_string()) });
    }

    if let Some((idx, ch)) = text.char_indices().find(|&(_, c)| is_terminator(c) && c != '\n') {
        let start = text[..idx].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let sentence = text[start..idx + ch.len_utf8()].trim();
        let n = sentence.chars().count();
        if n > 1 && n <= params.max_title_chars && !is_numeric_line(sentence) {
            return Some(GuessedTitle { title: sentence.to_string(), strip_line: None });
        }
    }

    let line = text.lines().map(str::trim).find(|l| !l.is_empty() && !is_numeric_line(l))?;
    let title: String = line.chars().take(params.max_title_chars).collect();
    Some(GuessedTitle { title, strip_line: None })
}

/// Remove the first occurrence of `line` (and the newline after it) from `text`.
pub fn strip_title_line(text: &str, line: &str) -> String {
    match text.find(line) {
        Some(pos) => {
            let rest = &text[pos + line.len()..];
            let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')).unwrap_or(rest);
            format!("{}{}", &text[..pos], rest)
        }
        None => text.to_string(),
    }
}

pub fn fallback_title(position: usize) -> String {
    format!("Chapter {}", position + 1)
}
