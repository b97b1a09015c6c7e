use unicode_segmentation::UnicodeSegmentation;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Display width of one grapheme cluster, in cells.
///
/// Returns 0 for clusters made only of combining marks, variation
/// selectors, ZWJ, or skin-tone modifiers (they attach to the previous
/// cell); 2 for East-Asian wide/fullwidth characters, emoji-presentation
/// clusters (VS16- or keycap-terminated, ZWJ sequences, SMP emoji); 1 for
/// everything else.
pub fn grapheme_width(grapheme: &str) -> u16 {
    if grapheme.is_empty() {
        return 0;
    }
    if grapheme.chars().all(is_zero_width) {
        return 0;
    }
    if grapheme.contains('\u{200D}')
        || grapheme.ends_with('\u{FE0F}')
        || grapheme.ends_with('\u{20E3}')
    {
        return 2;
    }
    (UnicodeWidthStr::width(grapheme) as u16).min(2)
}

fn is_zero_width(c: char) -> bool {
    // ZWJ, variation selectors, skin-tone modifiers, then the general
    // combining-mark classes unicode-width already reports as zero.
    matches!(c, '\u{200D}' | '\u{FE0E}' | '\u{FE0F}')
        || matches!(c as u32, 0x1F3FB..=0x1F3FF)
        || UnicodeWidthChar::width(c) == Some(0)
}

/// Split text into grapheme clusters (extended clusters, matching what a
/// terminal user perceives as one character).
pub fn graphemes(text: &str) -> impl Iterator<Item = &str> {
    UnicodeSegmentation::graphemes(text, true)
}
