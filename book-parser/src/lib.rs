pub mod error;
pub mod paths;
pub mod text_segmenter;
pub mod image_map;
pub mod html_walker;
pub mod chapter_title;
pub mod reader_epub;
pub mod epub_parser;
pub mod markdown_parser;
pub mod chapter_merge;

pub use chapter_merge::{merge_chapters, MergeOptions};
pub use chapter_title::TitleParams;
pub use epub_parser::{parse_epub_file, EpubParams};
pub use error::{ImagePathError, ParseError};
pub use markdown_parser::{parse_markdown, parse_markdown_file, resolve_markdown_image, MarkdownParams};
pub use text_segmenter::TextChunkParams;

use segment_model::Chapter;
use sha2::Digest;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const BOOK_ID_HEAD_BYTES: usize = 1024;
const BOOK_ID_HEX_LEN: usize = 12;

/// Where extracted book images are written and how they are served.
#[derive(Debug, Clone)]
pub struct BookAssets {
    pub data_dir: PathBuf,
    pub static_url_prefix: String,
}

impl BookAssets {
    pub fn new(data_dir: impl Into<PathBuf>, static_url_prefix: impl Into<String>) -> Self {
        Self { data_dir: data_dir.into(), static_url_prefix: static_url_prefix.into() }
    }

    /// `<data_dir>/books/<book_id>/images`
    pub fn images_dir(&self, book_id: &str) -> PathBuf {
        self.data_dir.join("books").join(book_id).join("images")
    }

    /// `<static_url_prefix>/books/<book_id>/images`
    pub fn images_url(&self, book_id: &str) -> String {
        format!("{}/books/{}/images", self.static_url_prefix.trim_end_matches('/'), book_id)
    }
}

/// Parser output handed to merge, tokenization and persistence.
#[derive(Debug, Clone)]
pub struct ParsedBook {
    pub book_id: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub chapters: Vec<Chapter>,
    /// Web path of the first image in reading order.
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormat {
    Epub,
    Markdown,
    Pdf,
}

impl BookFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "epub" => Some(BookFormat::Epub),
            "md" | "markdown" => Some(BookFormat::Markdown),
            "pdf" => Some(BookFormat::Pdf),
            _ => None,
        }
    }
}

/// Short stable id from the first KiB of the source bytes.
pub fn book_id_from_head(head: &[u8]) -> String {
    let head = &head[..head.len().min(BOOK_ID_HEAD_BYTES)];
    let digest = sha2::Sha256::digest(head);
    let mut id = hex::encode(digest);
    id.truncate(BOOK_ID_HEX_LEN);
    id
}

pub fn book_id_for_file(path: &Path) -> Result<String, ParseError> {
    let f = File::open(path)?;
    let mut head = Vec::with_capacity(BOOK_ID_HEAD_BYTES);
    f.take(BOOK_ID_HEAD_BYTES as u64).read_to_end(&mut head)?;
    Ok(book_id_from_head(&head))
}

pub fn cover_image(chapters: &[Chapter]) -> Option<String> {
    chapters.iter().find_map(|c| c.first_image()).map(|img| img.src.clone())
}
