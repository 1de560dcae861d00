//! Attachment filename sanitization.
//!
//! Media titles go straight into `Content-Disposition` headers and onto the
//! client's filesystem, so path separators, wildcard characters, and the
//! quote/backslash pair that would break a quoted header value all have to
//! go. Non-ASCII text (CJK titles in particular) is preserved as-is.

/// Characters never allowed in an attachment filename.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest filename emitted, in bytes, leaving headroom for the extension
/// within common 255-byte filesystem limits.
const MAX_BYTES: usize = 180;

/// Sanitize a media title for use as an attachment filename.
///
/// Control characters and [`INVALID_CHARS`] become underscores, with runs
/// collapsed to a single one. The result is cut to [`MAX_BYTES`] on a char
/// boundary, then leading and trailing dots and spaces are trimmed. An input
/// that sanitizes away entirely falls back to `"media"`.
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let mut cut = MAX_BYTES.min(result.len());
    while !result.is_char_boundary(cut) {
        cut -= 1;
    }

    let trimmed = result[..cut].trim_matches([' ', '.']);
    if trimmed.is_empty() {
        "media".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_falls_back() {
        assert_eq!(sanitize_filename(""), "media");
        assert_eq!(sanitize_filename("   "), "media");
        assert_eq!(sanitize_filename("..."), "media");
    }

    #[test]
    fn test_invalid_characters_replaced() {
        assert_eq!(sanitize_filename("what/is\\this"), "what_is_this");
        assert_eq!(sanitize_filename("say \"hi\""), "say _hi_");
    }

    #[test]
    fn test_consecutive_invalid_chars_collapse() {
        assert_eq!(sanitize_filename("clip???final"), "clip_final");
        assert_eq!(sanitize_filename("a<>:\"b"), "a_b");
    }

    #[test]
    fn test_control_characters_replaced() {
        assert_eq!(sanitize_filename("line\r\nbreak"), "line_break");
        assert_eq!(sanitize_filename("nul\x00byte"), "nul_byte");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(sanitize_filename("观看一只青蛙"), "观看一只青蛙");
        assert_eq!(sanitize_filename("こんにちは?"), "こんにちは_");
    }

    #[test]
    fn test_edge_trimming() {
        assert_eq!(sanitize_filename("  clip  "), "clip");
        assert_eq!(sanitize_filename("..hidden.."), "hidden");
    }

    #[test]
    fn test_long_titles_cut_on_char_boundary() {
        let long = "a".repeat(400);
        assert_eq!(sanitize_filename(&long).len(), 180);

        // Three bytes per char; 180 is not a boundary of a 60x3-byte run
        // offset by one ASCII char.
        let mixed = format!("x{}", "语".repeat(100));
        let cut = sanitize_filename(&mixed);
        assert!(cut.len() <= 180);
        assert!(cut.chars().all(|c| c == 'x' || c == '语'));
    }
}
