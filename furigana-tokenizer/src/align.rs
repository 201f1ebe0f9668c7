//! Splits a token surface into furigana spans by anchoring on its kana.
//!
//! Matching is greedy: the first kana of the surface is matched to its first occurrence in the
//! reading. Surfaces that repeat a kana in ambiguous positions can misalign.

use segment_model::RubyPart;

use crate::kana::{contains_kanji, is_kana};

fn ruby(reading: &str) -> Option<String> {
    if reading.is_empty() { None } else { Some(reading.to_string()) }
}

/// Align `surface` with its hiragana `reading`. Anchor kana never carry ruby; a kanji-free
/// remainder is annotated only when its reading differs from it (katakana under a hiragana reading).
pub fn align_reading(surface: &str, reading: &str) -> Vec<RubyPart> {
    if !contains_kanji(surface) {
        let r = if reading == surface { None } else { ruby(reading) };
        return vec![RubyPart::new(surface, r)];
    }

    let Some((s_idx, anchor)) = surface.char_indices().find(|&(_, c)| is_kana(c)) else {
        return vec![RubyPart::new(surface, ruby(reading))];
    };
    let Some(r_idx) = reading.find(anchor) else {
        return vec![RubyPart::new(surface, ruby(reading))];
    };

    let width = anchor.len_utf8();
    let (s_head, s_tail) = (&surface[..s_idx], &surface[s_idx + width..]);
    let (r_head, r_tail) = (&reading[..r_idx], &reading[r_idx + width..]);

    let mut parts = Vec::new();
    if !s_head.is_empty() { parts.extend(align_reading(s_head, r_head)); }
    parts.push(RubyPart::plain(anchor.to_string()));
    if !s_tail.is_empty() { parts.extend(align_reading(s_tail, r_tail)); }
    parts
}
