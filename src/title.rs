use std::collections::HashSet;

/// Characters Windows refuses in filenames, plus NUL.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\0'];

/// Normalize a sidecar title into a filesystem-safe filename.
///
/// Strips the forbidden character set and leading/trailing spaces and dots
/// (illegal at the end of a Windows name). Everything else, including
/// non-ASCII text, is preserved verbatim. May return an empty string if the
/// title consisted entirely of forbidden characters.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title.chars().filter(|c| !FORBIDDEN.contains(c)).collect();
    cleaned.trim_matches(|c| c == ' ' || c == '.').to_string()
}

/// Derive a name for `title` that does not collide with any title already
/// claimed this run. Numbered suffixes are always derived from the original
/// title, never stacked on a previous variant, so the result is
/// `{stem}({n}).{ext}` for the smallest free `n`.
pub fn resolve_duplicate(title: &str, moved: &HashSet<String>) -> String {
    let (stem, ext) = match title.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (title, ""),
    };

    let mut candidate = title.to_string();
    let mut counter = 1u32;
    while moved.contains(&candidate) {
        candidate = if ext.is_empty() {
            format!("{}({})", stem, counter)
        } else {
            format!("{}({}).{}", stem, counter, ext)
        };
        counter += 1;
    }
    candidate
}
