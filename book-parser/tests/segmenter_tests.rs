use book_parser::text_segmenter::{clean_text, flush_text, split_into_chunks, TextChunkParams};
use segment_model::Segment;

fn params(max_chars: usize) -> TextChunkParams {
    TextChunkParams { max_chars }
}

fn texts(segments: &[Segment]) -> Vec<String> {
    segments.iter().filter_map(|s| s.as_text().and_then(|t| t.text()).map(str::to_string)).collect()
}

#[test]
fn clean_text_strips_invisibles_and_caps_blank_lines() {
    let cleaned = clean_text("a\u{200b}b\u{feff}c\n\n\n\nd\u{0007}\te");
    assert_eq!(cleaned, "abc\n\nd\te");
}

#[test]
fn short_text_is_a_single_chunk() {
    let chunks = split_into_chunks("今日は晴れ。明日は雨。", &params(100));
    assert_eq!(chunks, vec!["今日は晴れ。明日は雨。".to_string()]);
}

#[test]
fn chunks_respect_the_bound_and_keep_terminators() {
    let text = "一二三四五。六七八九十。壱弐参！\n終わり?";
    let chunks = split_into_chunks(text, &params(8));
    assert_eq!(chunks.concat(), text, "chunking must not lose characters");
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 8, "chunk too long: {chunk:?}");
    }
    assert_eq!(chunks[0], "一二三四五。");
    assert!(chunks[1].ends_with('。'));
}

#[test]
fn unbroken_run_longer_than_bound_is_emitted_whole() {
    let run = "あ".repeat(20);
    let text = format!("短い。{run}");
    let chunks = split_into_chunks(&text, &params(10));
    assert_eq!(chunks, vec!["短い。".to_string(), run]);
}

#[test]
fn flush_skips_whitespace_and_clears_buffer() {
    let mut out = Vec::new();
    let mut buffer = String::from(" \n\u{200b}\n ");
    flush_text(&mut buffer, &mut out, &params(10));
    assert!(out.is_empty());
    assert!(buffer.is_empty());

    buffer.push_str("本文。");
    flush_text(&mut buffer, &mut out, &params(10));
    assert_eq!(texts(&out), vec!["本文。".to_string()]);
}
