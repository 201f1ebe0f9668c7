pub mod error;
pub mod config;
pub mod client;
pub mod download;
pub mod archive;

pub use archive::{collect_markdown, copy_images, extract_archive, safe_member_path};
pub use client::{BatchState, ConversionApi, ConversionClient, ExtractProgress, ExtractResult, HttpConversionApi, UploadRequest, UploadSlot};
pub use config::{ClientConfig, DownloadPolicy, CLIENT_DEFAULTS};
pub use download::{download_with_resume, part_path, DownloadBody};
pub use error::{ArchiveError, ClientError, ConvertError, DownloadError};

use std::fs;
use std::path::Path;

use book_parser::{parse_markdown, BookAssets, MarkdownParams};
use segment_model::{Chapter, ParseProgress, ProgressStage};

/// Chapters recovered from a converted document.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    /// File stem of the source document.
    pub title: String,
    pub chapters: Vec<Chapter>,
    pub images_copied: usize,
}

/// Paginated document -> remote markdown conversion -> chapters.
pub struct PdfConverter<A: ConversionApi = HttpConversionApi> {
    client: ConversionClient<A>,
    policy: DownloadPolicy,
    markdown: MarkdownParams,
    keep_temp: bool,
}

impl<A: ConversionApi> PdfConverter<A> {
    pub fn new(client: ConversionClient<A>, policy: DownloadPolicy, markdown: MarkdownParams) -> Self {
        Self { client, policy, markdown, keep_temp: false }
    }

    /// Leave the work directory on disk after the conversion.
    pub fn keep_temp(mut self, keep: bool) -> Self {
        self.keep_temp = keep;
        self
    }

    pub fn client(&self) -> &ConversionClient<A> { &self.client }

    /// Scratch space lives under `<data_dir>/books/<book_id>/temp`; images land in
    /// `assets.images_dir(book_id)`.
    pub fn convert(
        &self,
        source: &Path,
        book_id: &str,
        assets: &BookAssets,
        mut progress: Option<&mut dyn FnMut(ParseProgress)>,
    ) -> Result<ConvertedDocument, ConvertError> {
        let temp_root = assets.data_dir.join("books").join(book_id).join("temp");
        fs::create_dir_all(&temp_root)?;
        let work = tempfile::Builder::new().prefix("convert-").tempdir_in(&temp_root)?;
        let result = self.convert_in(source, book_id, assets, work.path(), &mut progress);
        if let Err(e) = &result {
            log::error!("conversion of {} (book {book_id}) failed: {e}", source.display());
        }
        if self.keep_temp {
            log::info!("keeping work dir {}", work.keep().display());
        } else {
            let path = work.path().to_path_buf();
            match work.close() {
                Ok(()) => log::info!("removed work dir {}", path.display()),
                Err(e) => log::warn!("failed to remove work dir {}: {e}", path.display()),
            }
        }
        result
    }

    fn convert_in(
        &self,
        source: &Path,
        book_id: &str,
        assets: &BookAssets,
        work: &Path,
        progress: &mut Option<&mut dyn FnMut(ParseProgress)>,
    ) -> Result<ConvertedDocument, ConvertError> {
        emit(progress, ParseProgress::new(ProgressStage::Uploading, 0, 1, "uploading document"));
        let batch_id = {
            let mut on_pages = |current: u32, total: u32| {
                emit(progress, ParseProgress::new(ProgressStage::Processing, current, total, format!("converting page {current}/{total}")));
            };
            self.client.upload_and_wait(source, Some(&mut on_pages as &mut dyn FnMut(u32, u32)))?
        };

        emit(progress, ParseProgress::new(ProgressStage::Downloading, 0, 1, "downloading result"));
        let zip_path = self.client.download_result(&batch_id, work, &self.policy)?;

        emit(progress, ParseProgress::new(ProgressStage::Parsing, 0, 1, "parsing content"));
        let extracted = work.join("extracted");
        let members = extract_archive(&zip_path, &extracted)?;
        log::info!("extracted {members} file(s) from {}", zip_path.display());
        let markdown = collect_markdown(&extracted)?;
        let images_copied = copy_images(&extracted, &assets.images_dir(book_id))?;

        let chapters = parse_markdown(&markdown, &assets.images_url(book_id), &self.markdown);
        log::info!("parsed {} chapter(s) from converted {}", chapters.len(), source.display());
        let title = source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(ConvertedDocument { title, chapters, images_copied })
    }
}

fn emit(progress: &mut Option<&mut dyn FnMut(ParseProgress)>, event: ParseProgress) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(event);
    }
}
