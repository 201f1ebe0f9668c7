use std::path::Path;

use scraper::Html;
use segment_model::{Chapter, Segment};

use crate::chapter_title::{fallback_title, guess_title, strip_title_line, TitleParams};
use crate::error::ParseError;
use crate::html_walker::{first_heading, SectionWalker};
use crate::image_map::{extract_images, ImageMap};
use crate::paths::parent_dir;
use crate::reader_epub::{read_epub, EpubPackage};
use crate::text_segmenter::TextChunkParams;
use crate::{book_id_for_file, cover_image, BookAssets, ParsedBook};

#[derive(Debug, Clone, Copy, Default)]
pub struct EpubParams {
    pub chunk: TextChunkParams,
    pub title: TitleParams,
}

/// Parse an EPUB file, writing its images under `assets`. Chapters are returned unmerged.
pub fn parse_epub_file(path: &Path, assets: &BookAssets, params: &EpubParams) -> Result<ParsedBook, ParseError> {
    let book_id = book_id_for_file(path)?;
    let package = read_epub(path)?;
    let images = extract_images(&package.images, &assets.images_dir(&book_id), &assets.images_url(&book_id))?;
    let chapters = build_chapters(&package, &images, params);
    log::info!("parsed epub {} into {} chapters ({} sections)", path.display(), chapters.len(), package.sections.len());
    let cover = cover_image(&chapters);
    Ok(ParsedBook { book_id, title: package.title, author: package.author, chapters, cover })
}

/// One chapter per spine section that yields at least one segment.
pub fn build_chapters(package: &EpubPackage, images: &ImageMap, params: &EpubParams) -> Vec<Chapter> {
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut inherited: Option<String> = None;

    for (position, section) in package.sections.iter().enumerate() {
        let doc = Html::parse_document(&section.content);
        let mut segments = SectionWalker::new(images, parent_dir(&section.path), params.chunk).walk(&doc);

        let title = if let Some(t) = package.toc.get(&section.path) {
            inherited = Some(t.clone());
            t.clone()
        } else if let Some(t) = &inherited {
            t.clone()
        } else if let Some(h) = first_heading(&doc) {
            h
        } else if let Some(guess) = first_text(&segments).and_then(|t| guess_title(t, &params.title)) {
            if let Some(line) = &guess.strip_line { strip_from_first_text(&mut segments, line); }
            guess.title
        } else {
            fallback_title(position)
        };

        if segments.is_empty() {
            log::debug!("section {} produced no segments; skipped", section.path);
            continue;
        }
        let mut chapter = Chapter::new(title, chapters.len());
        chapter.segments = segments;
        chapters.push(chapter);
    }
    chapters
}

fn first_text(segments: &[Segment]) -> Option<&str> {
    segments.iter().find_map(|s| s.as_text().and_then(|t| t.text()))
}

/// Drop the title line from the first text segment; a segment holding nothing else goes away.
fn strip_from_first_text(segments: &mut Vec<Segment>, line: &str) {
    let Some(pos) = segments.iter().position(|s| !s.is_image()) else { return; };
    let Some(text) = segments[pos].as_text().and_then(|t| t.text()) else { return; };
    let stripped = strip_title_line(text, line);
    if stripped.trim().is_empty() {
        segments.remove(pos);
    } else {
        segments[pos] = Segment::text(stripped);
    }
}
