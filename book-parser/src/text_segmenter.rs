use segment_model::Segment;

#[derive(Debug, Clone, Copy)]
pub struct TextChunkParams {
    /// Upper bound (in chars) for a single text segment. A run with no sentence end or newline
    /// longer than this is emitted whole.
    pub max_chars: usize,
}

impl Default for TextChunkParams {
    fn default() -> Self {
        Self { max_chars: 2048 }
    }
}

/// Sentence terminators (ASCII and full-width) plus newline; the terminator stays with the preceding text.
pub fn is_terminator(ch: char) -> bool {
    matches!(ch, '。' | '！' | '？' | '?' | '!' | '\n')
}

fn is_invisible(ch: char) -> bool {
    match ch {
        '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}' | '\u{feff}' | '\u{00ad}' => true,
        '\n' | '\t' => false,
        c => c.is_control(),
    }
}

/// Strip zero-width/invisible control characters and collapse 3+ newlines to exactly 2.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if is_invisible(ch) { continue; }
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 { out.push('\n'); }
            continue;
        }
        newlines = 0;
        out.push(ch);
    }
    out
}

/// Split on terminators, accumulating pieces so that no chunk exceeds `max_chars`
/// unless a single piece is itself longer.
pub fn split_into_chunks(text: &str, params: &TextChunkParams) -> Vec<String> {
    let max = params.max_chars.max(1);
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut pieces: Vec<&str> = Vec::new();
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        if is_terminator(ch) {
            let end = idx + ch.len_utf8();
            pieces.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() { pieces.push(&text[start..]); }

    let mut chunks: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;
    for piece in pieces {
        let piece_len = piece.chars().count();
        if cur_len + piece_len > max && !cur.is_empty() {
            chunks.push(std::mem::take(&mut cur));
            cur_len = 0;
        }
        cur.push_str(piece);
        cur_len += piece_len;
    }
    if !cur.is_empty() { chunks.push(cur); }
    chunks
}

/// Turn buffered text into zero or more text segments and clear the buffer.
/// Whitespace-only text produces nothing.
pub fn flush_text(buffer: &mut String, out: &mut Vec<Segment>, params: &TextChunkParams) {
    if buffer.is_empty() { return; }
    let cleaned = clean_text(buffer);
    buffer.clear();
    if cleaned.trim().is_empty() { return; }
    for chunk in split_into_chunks(&cleaned, params) {
        out.push(Segment::text(chunk));
    }
}
