use std::path::PathBuf;

use book_pipeline::{BookPipeline, PipelineConfig, ProgressEvent, ProgressFn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cargo run -p book-pipeline --features lindera --example ingest_book -- <BOOK> [OUT.json]");
        std::process::exit(1);
    }
    let input = PathBuf::from(&args[1]);
    let output = args.get(2).map(PathBuf::from).unwrap_or_else(|| input.with_extension("json"));

    let cfg = PipelineConfig::from_env();
    let pipeline = BookPipeline::from_config(cfg)?;
    let progress: ProgressFn = Box::new(|e: ProgressEvent| match e {
        ProgressEvent::Conversion(p) => eprintln!("[{:?}] {}/{} {}", p.stage, p.current, p.total, p.message),
        ProgressEvent::TokenizedChapter { done, total, .. } => eprintln!("tokenized {done}/{total}"),
        other => eprintln!("{other:?}"),
    });
    let book = pipeline.process_file(&input, None, Some(progress))?;

    book.write_json(&output)?;
    println!("{} ({}): {} chapters -> {}", book.title, book.book_id, book.chapters.len(), output.display());
    if let Some(cover) = &book.cover {
        println!("cover: {cover}");
    }
    Ok(())
}
