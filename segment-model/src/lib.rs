//! Shared models used across crates

use serde::{Deserialize, Serialize};

/// One ordered unit of chapter content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    Text(TextSegment),
    Image(ImageSegment),
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(TextSegment::raw(text))
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Segment::Image(ImageSegment::new(src, alt))
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Segment::Image(_))
    }

    pub fn as_text(&self) -> Option<&TextSegment> {
        match self { Segment::Text(t) => Some(t), Segment::Image(_) => None }
    }

    pub fn as_image(&self) -> Option<&ImageSegment> {
        match self { Segment::Image(i) => Some(i), Segment::Text(_) => None }
    }
}

/// Text content is either raw (pre-tokenization) or tokenized, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextContent {
    #[serde(rename = "text")]
    Raw(String),
    #[serde(rename = "tokens")]
    Tokenized(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    #[serde(flatten)]
    pub content: TextContent,
}

impl TextSegment {
    pub fn raw(text: impl Into<String>) -> Self {
        Self { content: TextContent::Raw(text.into()) }
    }

    /// Raw text, if the segment has not been tokenized yet.
    pub fn text(&self) -> Option<&str> {
        match &self.content { TextContent::Raw(s) => Some(s.as_str()), TextContent::Tokenized(_) => None }
    }

    pub fn tokens(&self) -> Option<&[Token]> {
        match &self.content { TextContent::Tokenized(t) => Some(t.as_slice()), TextContent::Raw(_) => None }
    }

    pub fn is_tokenized(&self) -> bool {
        matches!(self.content, TextContent::Tokenized(_))
    }

    /// Replace the raw text with tokens. The raw text is dropped.
    pub fn set_tokens(&mut self, tokens: Vec<Token>) {
        self.content = TextContent::Tokenized(tokens);
    }

    /// Reconstruct the text: the raw string, or the concatenated token surfaces.
    pub fn surface_text(&self) -> String {
        match &self.content {
            TextContent::Raw(s) => s.clone(),
            TextContent::Tokenized(tokens) => tokens.iter().map(|t| t.surface.as_str()).collect(),
        }
    }
}

/// A resolved, web-servable image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSegment {
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

impl ImageSegment {
    pub fn new(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self { src: src.into(), alt: alt.into() }
    }
}

/// A sub-span of a token surface paired with its own reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubyPart {
    pub text: String,
    pub ruby: Option<String>,
}

impl RubyPart {
    pub fn new(text: impl Into<String>, ruby: Option<String>) -> Self {
        Self { text: text.into(), ruby }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), ruby: None }
    }
}

/// One analyzed unit of text, or a gap filler covering text the analyzer skipped.
///
/// Serialized with compact keys to keep stored chapters small.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "s")]
    pub surface: String,
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(rename = "b", default, skip_serializing_if = "Option::is_none")]
    pub base_form: Option<String>,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub gap: bool,
    #[serde(rename = "RUBY", default, skip_serializing_if = "Vec::is_empty")]
    pub ruby: Vec<RubyPart>,
}

fn is_false(v: &bool) -> bool { !*v }

impl Token {
    pub fn gap(surface: impl Into<String>) -> Self {
        Self { surface: surface.into(), gap: true, ..Self::default() }
    }

    pub fn word(surface: impl Into<String>, reading: Option<String>, base_form: Option<String>, pos: Option<String>) -> Self {
        Self { surface: surface.into(), reading, base_form, pos, ..Self::default() }
    }
}

/// An ordered list of segments under a title. `index` is the position in the final chapter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub index: usize,
    pub segments: Vec<Segment>,
}

impl Chapter {
    pub fn new(title: impl Into<String>, index: usize) -> Self {
        Self { title: title.into(), index, segments: Vec::new() }
    }

    /// True when the chapter has at least one segment and every segment is an image.
    pub fn is_image_only(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(Segment::is_image)
    }

    pub fn first_image(&self) -> Option<&ImageSegment> {
        self.segments.iter().find_map(Segment::as_image)
    }
}

/// Re-derive indices from list position.
pub fn reindex(chapters: &mut [Chapter]) {
    for (i, c) in chapters.iter_mut().enumerate() {
        c.index = i;
    }
}

/// Stage of the document-conversion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Uploading,
    Processing,
    Downloading,
    Parsing,
}

/// Progress report for the conversion path; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseProgress {
    pub stage: ProgressStage,
    pub current: u32,
    pub total: u32,
    pub message: String,
}

impl ParseProgress {
    pub fn new(stage: ProgressStage, current: u32, total: u32, message: impl Into<String>) -> Self {
        Self { stage, current, total, message: message.into() }
    }
}

/// Serialize a chapter list to the JSON shape handed to persistence.
pub fn chapters_to_json(chapters: &[Chapter]) -> serde_json::Result<String> {
    serde_json::to_string(chapters)
}
