//! Character classes for mixed kanji/kana text.

/// CJK unified ideographs (main block and extension A), compatibility ideographs, and 々.
pub fn is_kanji(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}' | '\u{f900}'..='\u{faff}' | '々')
}

/// Hiragana ぁ-ん, katakana ァ-ン, and the long-vowel mark.
pub fn is_kana(c: char) -> bool {
    matches!(c, 'ぁ'..='ん' | 'ァ'..='ン' | 'ー')
}

pub fn contains_kanji(s: &str) -> bool {
    s.chars().any(is_kanji)
}

pub fn katakana_to_hiragana(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'ァ'..='ヶ' | 'ヽ' | 'ヾ' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
            _ => c,
        })
        .collect()
}
