use std::collections::VecDeque;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use book_pipeline::{parse_bool, BookPipeline, CancelToken, PipelineConfig, PipelineError, ProgressEvent, ProgressFn};
use doc_convert::{
    ClientConfig, ClientError, ConversionApi, ConversionClient, DownloadBody, DownloadError, ExtractResult, UploadRequest,
    UploadSlot,
};
use furigana_tokenizer::{AnalyzerPool, FuriganaTokenizer, Morpheme, MorphAnalyzer, SplitMode, TokenizerConfig, TokenizerError};
use segment_model::{ProgressStage, Segment};
use zip::write::FileOptions;

/// Reads single kanji from a tiny table and skips everything else.
struct KanjiAnalyzer;

impl MorphAnalyzer for KanjiAnalyzer {
    fn analyze(&mut self, text: &str) -> Result<Vec<Morpheme>, TokenizerError> {
        let table = [('猫', "ネコ"), ('犬', "イヌ"), ('名', "ナ"), ('前', "マエ")];
        Ok(text
            .char_indices()
            .filter_map(|(i, c)| {
                table.iter().find(|(k, _)| *k == c).map(|(_, r)| Morpheme {
                    start: i,
                    end: i + c.len_utf8(),
                    reading: Some(r.to_string()),
                    base_form: Some(c.to_string()),
                    pos: Some("名詞".into()),
                })
            })
            .collect())
    }

    fn name(&self) -> &'static str { "kanji-table" }
}

fn pipeline(data_dir: &Path) -> BookPipeline {
    let pool = AnalyzerPool::new(vec![Box::new(KanjiAnalyzer) as Box<dyn MorphAnalyzer>]).expect("pool");
    let tokenizer = FuriganaTokenizer::new(pool, &TokenizerConfig::default()).expect("tokenizer");
    let cfg = PipelineConfig { data_dir: data_dir.to_path_buf(), ..PipelineConfig::default() };
    BookPipeline::new(cfg, tokenizer)
}

fn recorder() -> (Arc<Mutex<Vec<ProgressEvent>>>, ProgressFn) {
    let events = Arc::new(Mutex::new(Vec::<ProgressEvent>::new()));
    let sink = Arc::clone(&events);
    (events, Box::new(move |e: ProgressEvent| sink.lock().expect("lock").push(e)))
}

fn write_zip(path: &Path, members: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(fs::File::create(path).expect("create zip"));
    for (name, data) in members {
        zip.start_file(*name, FileOptions::default()).expect("start member");
        zip.write_all(data.as_bytes()).expect("write member");
    }
    zip.finish().expect("finish zip");
}

#[test]
fn markdown_book_is_merged_tokenized_and_exported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let md = dir.path().join("猫.md");
    fs::write(&md, "# 一\n猫がいる。\n# 一\n犬もいる。\n# 二\n名前。\n").expect("write md");

    let (events, progress) = recorder();
    let book = pipeline(dir.path()).process_file(&md, None, Some(progress)).expect("processed");

    assert_eq!(book.title, "猫");
    let titles: Vec<&str> = book.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["一", "二"]);
    assert_eq!(book.chapters.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1]);

    let text = book.chapters[0].segments[0].as_text().expect("text segment");
    assert!(text.is_tokenized());
    assert!(text.surface_text().starts_with("猫がいる。"));
    let neko = text.tokens().and_then(|ts| ts.iter().find(|t| t.surface == "猫")).expect("猫 token");
    assert_eq!(neko.reading.as_deref(), Some("ねこ"));

    let events = events.lock().expect("lock").clone();
    assert_eq!(events.first(), Some(&ProgressEvent::Parsed { chapters: 3 }));
    assert_eq!(events.get(1), Some(&ProgressEvent::Merged { before: 3, after: 2 }));
    assert!(matches!(events.get(2), Some(ProgressEvent::TokenizedChapter { done: 1, total: 2, .. })));
    assert_eq!(events.last(), Some(&ProgressEvent::Finished { chapters: 2 }));

    let json: serde_json::Value = serde_json::from_str(&book.to_json().expect("json")).expect("valid json");
    let seg = &json["chapters"][0]["segments"][0];
    assert_eq!(seg["type"], "text");
    assert!(seg.get("tokens").is_some());
    assert!(seg.get("text").is_none());
    assert_eq!(json["title"], "猫");

    let out = dir.path().join("export").join("book.json");
    book.write_json(&out).expect("write json");
    assert!(fs::read_to_string(&out).expect("read json").contains("\"s\":\"猫\""));
}

#[test]
fn epub_book_keeps_images_and_reports_a_cover() {
    let dir = tempfile::tempdir().expect("tempdir");
    let epub = dir.path().join("book.epub");
    write_zip(
        &epub,
        &[
            ("mimetype", "application/epub+zip"),
            (
                "META-INF/container.xml",
                r#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#,
            ),
            (
                "OEBPS/content.opf",
                r#"<?xml version="1.0"?><package xmlns="http://www.idpf.org/2007/opf" version="2.0"><metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>猫の本</dc:title></metadata><manifest><item id="c1" href="Text/c1.xhtml" media-type="application/xhtml+xml"/><item id="pic" href="Images/pic.png" media-type="image/png"/></manifest><spine><itemref idref="c1"/></spine></package>"#,
            ),
            (
                "OEBPS/Text/c1.xhtml",
                r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><h1>第一章</h1><p>猫がいる。</p><img src="../Images/pic.png" alt=""/></body></html>"#,
            ),
            ("OEBPS/Images/pic.png", "png"),
        ],
    );

    let book = pipeline(dir.path()).process_file(&epub, None, None).expect("processed");
    assert_eq!(book.title, "猫の本");
    assert_eq!(book.chapters.len(), 1);
    assert_eq!(book.chapters[0].title, "第一章");
    let expected = format!("/static/books/{}/images/pic.png", book.book_id);
    assert_eq!(book.cover.as_deref(), Some(expected.as_str()));
    assert!(book.chapters[0].segments.iter().any(|s| matches!(s, Segment::Image(i) if i.src == expected)));
    assert!(dir.path().join("books").join(&book.book_id).join("images").join("pic.png").is_file());
}

#[test]
fn cancel_before_tokenizing_stops_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let md = dir.path().join("a.md");
    fs::write(&md, "# 一\n猫。\n").expect("write md");
    let cancel = CancelToken::new();
    cancel.cancel();

    let (events, progress) = recorder();
    let err = pipeline(dir.path()).process_file(&md, Some(&cancel), Some(progress)).expect_err("canceled");
    assert!(matches!(err, PipelineError::Canceled));
    assert_eq!(*events.lock().expect("lock"), vec![ProgressEvent::Parsed { chapters: 1 }, ProgressEvent::Canceled]);
}

#[test]
fn unknown_extensions_are_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let txt = dir.path().join("notes.txt");
    fs::write(&txt, "猫").expect("write");
    assert!(matches!(pipeline(dir.path()).process_file(&txt, None, None), Err(PipelineError::Unsupported(_))));
}

/// Conversion service that reports done at once and serves a fixed archive.
struct FakeService {
    polls: Mutex<VecDeque<ExtractResult>>,
    archive: Vec<u8>,
}

impl ConversionApi for FakeService {
    fn request_upload_slot(&self, _request: &UploadRequest) -> Result<UploadSlot, ClientError> {
        Ok(UploadSlot { batch_id: "b".into(), upload_urls: vec!["https://upload.example/b".into()] })
    }

    fn upload(&self, _url: &str, _path: &Path) -> Result<(), ClientError> { Ok(()) }

    fn batch_results(&self, _batch_id: &str) -> Result<Vec<ExtractResult>, ClientError> {
        let next = self.polls.lock().expect("lock").pop_front();
        Ok(vec![next.unwrap_or_else(|| ExtractResult {
            state: "done".into(),
            full_zip_url: Some("https://cdn.example/b.zip".into()),
            ..ExtractResult::default()
        })])
    }

    fn open_download(&self, _url: &str, _offset: u64) -> Result<DownloadBody, DownloadError> {
        Ok(DownloadBody::fresh(Cursor::new(self.archive.clone())))
    }
}

fn converted_archive(dir: &Path) -> Vec<u8> {
    let path = dir.join("result.zip");
    write_zip(&path, &[("full.md", "# 第一章\n猫と犬。\n"), ("images/p.png", "png")]);
    fs::read(&path).expect("read zip")
}

#[test]
fn pdf_goes_through_conversion_before_tokenizing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pdf: PathBuf = dir.path().join("scan.pdf");
    fs::write(&pdf, b"%PDF-1.7\n").expect("write pdf");

    let pipeline = pipeline(dir.path());
    let service = FakeService { polls: Mutex::new(VecDeque::new()), archive: converted_archive(dir.path()) };
    let client_cfg = ClientConfig { poll_interval: Duration::ZERO, ..ClientConfig::default() };
    let converter = pipeline.pdf_converter(ConversionClient::new(service, client_cfg));

    let (events, progress) = recorder();
    let book = pipeline.process_pdf(&pdf, &converter, None, Some(progress)).expect("processed");

    assert_eq!(book.title, "scan");
    assert_eq!(book.chapters.len(), 1);
    assert_eq!(book.chapters[0].title, "第一章");
    assert!(book.chapters[0].segments[0].as_text().map(|t| t.is_tokenized()).unwrap_or(false));

    let events = events.lock().expect("lock").clone();
    let stages: Vec<ProgressStage> = events
        .iter()
        .filter_map(|e| match e { ProgressEvent::Conversion(p) => Some(p.stage), _ => None })
        .collect();
    assert_eq!(stages, vec![ProgressStage::Uploading, ProgressStage::Downloading, ProgressStage::Parsing]);
    assert!(matches!(events.first(), Some(ProgressEvent::Conversion(_))));
    assert_eq!(events.last(), Some(&ProgressEvent::Finished { chapters: 1 }));
    assert!(dir.path().join("books").join(&book.book_id).join("images").join("p.png").is_file());
}

#[test]
fn environment_overrides_defaults() {
    assert_eq!(parse_bool("ON"), Some(true));
    assert_eq!(parse_bool("0"), Some(false));
    assert_eq!(parse_bool("maybe"), None);

    std::env::set_var("EPUB_MAX_CHUNK_SIZE", "100");
    std::env::set_var("MERGE_SAME_TITLE", "off");
    std::env::set_var("TOKENIZER_MODE", "decompose");
    std::env::set_var("MINERU_POLL_INTERVAL", "soon");
    std::env::set_var("PDF_KEEP_TEMP", "yes");
    let cfg = PipelineConfig::from_env();
    for key in ["EPUB_MAX_CHUNK_SIZE", "MERGE_SAME_TITLE", "TOKENIZER_MODE", "MINERU_POLL_INTERVAL", "PDF_KEEP_TEMP"] {
        std::env::remove_var(key);
    }

    assert_eq!(cfg.chunk.max_chars, 100);
    assert_eq!(cfg.markdown_params().chunk.max_chars, 100);
    assert_eq!(cfg.epub_params().chunk.max_chars, 100);
    assert!(!cfg.merge.same_title);
    assert!(cfg.merge.consecutive_images);
    assert_eq!(cfg.tokenizer.mode, SplitMode::Decompose);
    assert_eq!(cfg.client.poll_interval, Duration::from_secs(5));
    assert!(cfg.keep_temp);
}
