//! File name handling for downloaded media.

use lazy_static::lazy_static;
use regex::Regex;

const MAX_FILENAME_LEN: usize = 128;
const FALLBACK_FILENAME: &str = "download";

lazy_static! {
    static ref DISALLOWED: Regex =
        Regex::new(r"[^A-Za-z0-9 \-_().]").expect("valid disallowed characters regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
}

/// Make a name safe to use as a single path component.
///
/// Keeps `[A-Za-z0-9 -_().]`, collapses whitespace, strips leading dots and
/// caps the length at 128 characters, preserving the extension.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = DISALLOWED.replace_all(name, "");
    let collapsed = WHITESPACE.replace_all(&cleaned, " ");
    let trimmed = collapsed.trim().trim_start_matches('.').trim_start();

    if trimmed.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }
    truncate_keeping_extension(trimmed, MAX_FILENAME_LEN)
}

/// Only ASCII survives sanitization, so byte and char lengths agree.
fn truncate_keeping_extension(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let extension = &extension[..extension.len().min(max_len / 2)];
    let stem_len = max_len - extension.len();
    format!("{}{}", stem[..stem_len.min(stem.len())].trim_end(), extension)
}

/// `name` with a ` (n)` counter before the extension. Zero leaves it as is.
pub fn numbered_filename(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], n, &name[dot..]),
        _ => format!("{} ({})", name, n),
    }
}

/// Filename from a `Content-Disposition` header value.
///
/// Prefers the RFC 5987 `filename*` form over the plain `filename`.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in header.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'percent-encoded
                let encoded = value.trim().splitn(3, '\'').nth(2).unwrap_or(value);
                if let Ok(decoded) = urlencoding::decode(encoded.trim_matches('"')) {
                    extended = Some(decoded.into_owned());
                }
            }
            "filename" => plain = Some(value.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }

    extended
        .or(plain)
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or_default().to_string())
        .filter(|name| !name.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_removes_disallowed_characters() {
        assert_eq!(
            sanitize_filename("Dune: Messiah? <1969>.epub"),
            "Dune Messiah 1969.epub"
        );
        assert_eq!(sanitize_filename("a/../../etc/passwd"), "a....etcpasswd");
    }

    #[test]
    fn test_sanitize_collapses_whitespace_and_leading_dots() {
        assert_eq!(sanitize_filename("  The   Left  Hand .pdf "), "The Left Hand .pdf");
        assert_eq!(sanitize_filename("...hidden.epub"), "hidden.epub");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize_filename(""), "download");
        assert_eq!(sanitize_filename("???"), "download");
        assert_eq!(sanitize_filename("..."), "download");
    }

    #[test]
    fn test_sanitize_caps_length_keeping_extension() {
        let long = format!("{}.epub", "a".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.len(), 128);
        assert!(sanitized.ends_with(".epub"));
    }

    #[test]
    fn test_sanitize_caps_long_extension() {
        let long = format!("name.{}", "x".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= 128);
        assert!(sanitized.starts_with("name."));
    }

    #[test]
    fn test_numbered_filename() {
        assert_eq!(numbered_filename("book.pdf", 0), "book.pdf");
        assert_eq!(numbered_filename("book.pdf", 2), "book (2).pdf");
        assert_eq!(numbered_filename("A - B.flac", 1), "A - B (1).flac");
        assert_eq!(numbered_filename("download", 3), "download (3)");
    }

    #[test]
    fn test_content_disposition_plain() {
        assert_eq!(
            content_disposition_filename(r#"attachment; filename="Dune.epub""#).as_deref(),
            Some("Dune.epub")
        );
        assert_eq!(
            content_disposition_filename("attachment; filename=Dune.epub").as_deref(),
            Some("Dune.epub")
        );
    }

    #[test]
    fn test_content_disposition_extended_wins() {
        let header = r#"attachment; filename="fallback.pdf"; filename*=UTF-8''Le%20Guin%20-%20Dispossessed.pdf"#;
        assert_eq!(
            content_disposition_filename(header).as_deref(),
            Some("Le Guin - Dispossessed.pdf")
        );
    }

    #[test]
    fn test_content_disposition_strips_directories() {
        assert_eq!(
            content_disposition_filename(r#"attachment; filename="../../x.pdf""#).as_deref(),
            Some("x.pdf")
        );
    }

    #[test]
    fn test_content_disposition_without_filename() {
        assert_eq!(content_disposition_filename("attachment"), None);
        assert_eq!(content_disposition_filename(r#"inline; filename="""#), None);
    }
}
