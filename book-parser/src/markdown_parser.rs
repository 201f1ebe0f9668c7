//! Line scanner for converter-produced markdown: headings split chapters, inline images
//! become image segments, everything else is text.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use segment_model::{Chapter, Segment};

use crate::error::{ImagePathError, ParseError};
use crate::image_map::copy_image_tree;
use crate::paths::percent_decode;
use crate::text_segmenter::{flush_text, TextChunkParams};
use crate::{book_id_for_file, cover_image, BookAssets, ParsedBook};

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})[ \t]+(.*?)(?:[ \t]+#+[ \t]*)?$").unwrap()
});

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[(.*?)\]\((.*?)\)").unwrap()
});

const IMAGE_ROOT: &str = "images";

#[derive(Debug, Clone)]
pub struct MarkdownParams {
    /// Headings at this level or above start a chapter; deeper ones stay in the text.
    pub split_header_level: usize,
    pub default_title: String,
    pub chunk: TextChunkParams,
}

impl Default for MarkdownParams {
    fn default() -> Self {
        Self { split_header_level: 2, default_title: "正文".to_string(), chunk: TextChunkParams::default() }
    }
}

#[derive(Debug)]
enum Piece {
    /// `same_line` is set when the text continues an earlier text piece of the same line.
    Text { text: String, same_line: bool },
    Break,
    Image { src: String, alt: String },
}

/// Map a markdown image reference to a web path under `web_prefix`.
///
/// Remote (`http`, `https`) and `data:` references pass through. Local references keep their
/// path below `images/` (or just their file name otherwise); a path that climbs out is refused.
pub fn resolve_markdown_image(src: &str, web_prefix: &str) -> Result<String, ImagePathError> {
    let decoded = percent_decode(src.trim());
    // `path "title"` -> path
    let target = decoded.split_whitespace().next().ok_or(ImagePathError::Empty)?;
    let target = target.trim_matches(['<', '>']);

    let lower = target.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:") {
        return Ok(target.to_string());
    }

    let mut parts: Vec<&str> = Vec::new();
    let normalized = target.replace('\\', "/");
    for comp in normalized.trim_start_matches('/').split('/') {
        match comp {
            "" | "." => {}
            ".." => { if parts.pop().is_none() { return Err(ImagePathError::Unsafe(target.to_string())); } }
            c => parts.push(c),
        }
    }
    let rel: &[&str] = match parts.split_first() {
        None => return Err(ImagePathError::Empty),
        Some((first, rest)) if *first == IMAGE_ROOT && !rest.is_empty() => rest,
        Some(_) => &parts[parts.len() - 1..],
    };
    Ok(format!("{}/{}", web_prefix.trim_end_matches('/'), rel.join("/")))
}

/// Scan markdown into chapters. Image references resolve under `web_prefix`.
pub fn parse_markdown(text: &str, web_prefix: &str, params: &MarkdownParams) -> Vec<Chapter> {
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut title = params.default_title.clone();
    let mut pieces: Vec<Piece> = Vec::new();

    for raw_line in text.split('\n') {
        let line = raw_line.trim_end();

        let mut content: std::borrow::Cow<'_, str> = line.into();
        if let Some(caps) = HEADING_RE.captures(line) {
            let level = caps[1].len();
            let heading = caps[2].trim().to_string();
            if level <= params.split_header_level {
                finish_chapter(&mut chapters, &title, &mut pieces, web_prefix, params);
                title = if heading.is_empty() { params.default_title.clone() } else { heading };
                continue;
            }
            content = format!("\n{heading}\n").into();
        }

        if content.trim().is_empty() {
            if matches!(pieces.last(), Some(Piece::Text { .. })) { pieces.push(Piece::Break); }
            continue;
        }
        scan_line(&content, &mut pieces);
    }
    finish_chapter(&mut chapters, &title, &mut pieces, web_prefix, params);
    chapters
}

fn scan_line(line: &str, pieces: &mut Vec<Piece>) {
    let mut last = 0usize;
    let mut same_line = false;
    for caps in IMAGE_RE.captures_iter(line) {
        let Some(m) = caps.get(0) else { continue; };
        if m.start() > last {
            pieces.push(Piece::Text { text: line[last..m.start()].to_string(), same_line });
            same_line = true;
        }
        pieces.push(Piece::Image { src: caps[2].to_string(), alt: caps[1].to_string() });
        last = m.end();
    }
    if last < line.len() { pieces.push(Piece::Text { text: line[last..].to_string(), same_line }); }
}

/// Joins text pieces line by line, then cleans and chunks them around images.
/// Refused image references are dropped and the text on both sides of them stays on one line.
fn finish_chapter(chapters: &mut Vec<Chapter>, title: &str, pieces: &mut Vec<Piece>, web_prefix: &str, params: &MarkdownParams) {
    if pieces.is_empty() { return; }
    let mut segments: Vec<Segment> = Vec::new();
    let mut buffer = String::new();
    let mut joined = 0usize;
    for piece in pieces.drain(..) {
        match piece {
            Piece::Text { text, same_line } => {
                if joined > 0 && !same_line { buffer.push('\n'); }
                buffer.push_str(&text.replace('\u{a0}', " "));
                joined += 1;
            }
            Piece::Break => {
                if joined > 0 { buffer.push('\n'); }
                joined += 1;
            }
            Piece::Image { src, alt } => match resolve_markdown_image(&src, web_prefix) {
                Ok(web) => {
                    flush_text(&mut buffer, &mut segments, &params.chunk);
                    joined = 0;
                    segments.push(Segment::image(web, alt));
                }
                Err(e) => log::warn!("skipping markdown image {src:?}: {e}"),
            },
        }
    }
    flush_text(&mut buffer, &mut segments, &params.chunk);
    if segments.is_empty() { return; }
    let mut chapter = Chapter::new(title, chapters.len());
    chapter.segments = segments;
    chapters.push(chapter);
}

/// Parse a markdown file. Images in the `images/` folder next to it are copied to
/// `assets.images_dir(book_id)` so local references resolve.
pub fn parse_markdown_file(path: &Path, assets: &BookAssets, params: &MarkdownParams) -> Result<ParsedBook, ParseError> {
    let book_id = book_id_for_file(path)?;
    let image_src = path.parent().unwrap_or(Path::new("")).join(IMAGE_ROOT);
    if image_src.is_dir() {
        copy_image_tree(&image_src, &assets.images_dir(&book_id))?;
    }
    let bytes = std::fs::read(path)?;
    let text = crate::reader_epub::decode_text(&bytes, &path.display().to_string())?;
    let chapters = parse_markdown(&text, &assets.images_url(&book_id), params);
    log::info!("parsed markdown {} into {} chapters", path.display(), chapters.len());
    let cover = cover_image(&chapters);
    let title = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    Ok(ParsedBook { book_id, title, author: None, chapters, cover })
}
