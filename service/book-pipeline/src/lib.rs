pub mod config;

pub use config::{parse_bool, PipelineConfig};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use book_parser::{
    book_id_for_file, cover_image, merge_chapters, parse_epub_file, parse_markdown_file, BookAssets, BookFormat, ParseError,
    ParsedBook,
};
use doc_convert::{ConversionApi, ConversionClient, ConvertError, PdfConverter};
use furigana_tokenizer::{FuriganaTokenizer, TokenizerError};
use segment_model::{Chapter, ParseProgress};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("tokenizer error: {0}")]
    Tokenize(#[from] TokenizerError),
    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),
    #[error("unsupported input: {0}")]
    Unsupported(String),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("canceled")]
    Canceled,
}

/// Cooperative cancellation checked between pipeline steps and chapters.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
    pub fn new() -> Self { Self(Arc::new(AtomicBool::new(false))) }
    pub fn cancel(&self) { self.0.store(true, Ordering::Relaxed); }
    pub fn is_canceled(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

/// Progress events emitted while a book is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Remote conversion stage (PDF input only).
    Conversion(ParseProgress),
    Parsed { chapters: usize },
    Merged { before: usize, after: usize },
    TokenizedChapter { done: usize, total: usize, segments: usize },
    Finished { chapters: usize },
    Canceled,
}

pub type ProgressFn = Box<dyn FnMut(ProgressEvent) + Send>;

/// A parsed, merged and tokenized book ready for persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedBook {
    pub book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover: Option<String>,
    #[serde(skip)]
    pub format: Option<BookFormat>,
    pub chapters: Vec<Chapter>,
}

impl ProcessedBook {
    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

pub struct BookPipeline {
    cfg: PipelineConfig,
    tokenizer: FuriganaTokenizer,
}

impl BookPipeline {
    pub fn new(cfg: PipelineConfig, tokenizer: FuriganaTokenizer) -> Self {
        Self { cfg, tokenizer }
    }

    /// Pipeline with a lindera-backed tokenizer built from `cfg.tokenizer`.
    #[cfg(feature = "lindera")]
    pub fn from_config(cfg: PipelineConfig) -> Result<Self, PipelineError> {
        let tokenizer = FuriganaTokenizer::from_config(&cfg.tokenizer)?;
        Ok(Self::new(cfg, tokenizer))
    }

    pub fn config(&self) -> &PipelineConfig { &self.cfg }

    pub fn tokenizer(&self) -> &FuriganaTokenizer { &self.tokenizer }

    pub fn assets(&self) -> BookAssets {
        BookAssets::new(self.cfg.data_dir.clone(), self.cfg.static_url_prefix.clone())
    }

    /// Dispatch on the file extension. PDF input goes through the HTTP conversion service.
    pub fn process_file(
        &self,
        path: &Path,
        cancel: Option<&CancelToken>,
        progress: Option<ProgressFn>,
    ) -> Result<ProcessedBook, PipelineError> {
        match BookFormat::from_path(path) {
            Some(BookFormat::Epub) => self.process_epub(path, cancel, progress),
            Some(BookFormat::Markdown) => self.process_markdown(path, cancel, progress),
            Some(BookFormat::Pdf) => {
                let client = ConversionClient::from_config(self.cfg.client.clone()).map_err(ConvertError::from)?;
                let converter = self.pdf_converter(client);
                self.process_pdf(path, &converter, cancel, progress)
            }
            None => Err(PipelineError::Unsupported(path.display().to_string())),
        }
    }

    /// Converter wired with this pipeline's download policy, markdown settings and temp policy.
    pub fn pdf_converter<A: ConversionApi>(&self, client: ConversionClient<A>) -> PdfConverter<A> {
        PdfConverter::new(client, self.cfg.download, self.cfg.markdown_params()).keep_temp(self.cfg.keep_temp)
    }

    pub fn process_epub(
        &self,
        path: &Path,
        cancel: Option<&CancelToken>,
        progress: Option<ProgressFn>,
    ) -> Result<ProcessedBook, PipelineError> {
        let parsed = parse_epub_file(path, &self.assets(), &self.cfg.epub_params())?;
        self.finish(path, BookFormat::Epub, parsed, cancel, progress)
    }

    pub fn process_markdown(
        &self,
        path: &Path,
        cancel: Option<&CancelToken>,
        progress: Option<ProgressFn>,
    ) -> Result<ProcessedBook, PipelineError> {
        let parsed = parse_markdown_file(path, &self.assets(), &self.cfg.markdown_params())?;
        self.finish(path, BookFormat::Markdown, parsed, cancel, progress)
    }

    pub fn process_pdf<A: ConversionApi>(
        &self,
        path: &Path,
        converter: &PdfConverter<A>,
        cancel: Option<&CancelToken>,
        mut progress: Option<ProgressFn>,
    ) -> Result<ProcessedBook, PipelineError> {
        let book_id = book_id_for_file(path)?;
        let doc = {
            let mut on_stage = |p: ParseProgress| emit(&mut progress, ProgressEvent::Conversion(p));
            converter.convert(path, &book_id, &self.assets(), Some(&mut on_stage as &mut dyn FnMut(ParseProgress)))?
        };
        let cover = cover_image(&doc.chapters);
        let parsed = ParsedBook { book_id, title: Some(doc.title), author: None, chapters: doc.chapters, cover };
        self.finish(path, BookFormat::Pdf, parsed, cancel, progress)
    }

    /// Merge and tokenize an already parsed book.
    fn finish(
        &self,
        path: &Path,
        format: BookFormat,
        parsed: ParsedBook,
        cancel: Option<&CancelToken>,
        mut progress: Option<ProgressFn>,
    ) -> Result<ProcessedBook, PipelineError> {
        let before = parsed.chapters.len();
        emit(&mut progress, ProgressEvent::Parsed { chapters: before });
        check_cancel(cancel, &mut progress)?;

        let mut chapters = merge_chapters(parsed.chapters, &self.cfg.merge);
        emit(&mut progress, ProgressEvent::Merged { before, after: chapters.len() });
        log::info!("{}: {before} chapter(s) parsed, {} after merge", path.display(), chapters.len());

        self.tokenize_chapters(&mut chapters, cancel, &mut progress)?;

        let title = parsed
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default());
        emit(&mut progress, ProgressEvent::Finished { chapters: chapters.len() });
        Ok(ProcessedBook {
            book_id: parsed.book_id,
            title,
            author: parsed.author,
            cover: parsed.cover,
            format: Some(format),
            chapters,
        })
    }

    /// Tokenize every raw text segment in place, one chapter at a time.
    pub fn tokenize_chapters(
        &self,
        chapters: &mut [Chapter],
        cancel: Option<&CancelToken>,
        progress: &mut Option<ProgressFn>,
    ) -> Result<(), PipelineError> {
        let total = chapters.len();
        for (i, chapter) in chapters.iter_mut().enumerate() {
            check_cancel(cancel, progress)?;
            let segments = self.tokenizer.tokenize_chapter(chapter)?;
            emit(progress, ProgressEvent::TokenizedChapter { done: i + 1, total, segments });
        }
        Ok(())
    }
}

fn emit(progress: &mut Option<ProgressFn>, event: ProgressEvent) {
    if let Some(cb) = progress.as_deref_mut() { cb(event); }
}

fn check_cancel(cancel: Option<&CancelToken>, progress: &mut Option<ProgressFn>) -> Result<(), PipelineError> {
    if let Some(ct) = cancel {
        if ct.is_canceled() {
            emit(progress, ProgressEvent::Canceled);
            return Err(PipelineError::Canceled);
        }
    }
    Ok(())
}
