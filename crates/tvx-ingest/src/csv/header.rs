//! Header normalization.

/// Trim whitespace and a byte-order mark, and collapse inner runs of
/// whitespace to single spaces.
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}').trim();
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive header comparison after normalization.
pub(crate) fn header_matches(header: &str, wanted: &str) -> bool {
    header.eq_ignore_ascii_case(&normalize_header(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  entry  "), "entry");
        assert_eq!(normalize_header("\u{feff}id"), "id");
        assert_eq!(normalize_header("exit   date"), "exit date");
    }

    #[test]
    fn test_header_matches_ignores_case() {
        assert!(header_matches("ID", "id"));
        assert!(header_matches("Start", " start "));
        assert!(!header_matches("stop", "start"));
    }
}
