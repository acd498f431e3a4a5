use std::collections::HashSet;
use std::fs;
use std::iter;
use std::path::Path;

use crate::title;

/// The export tool truncates long basenames at this many characters.
const TRUNCATED_STEM_LEN: usize = 47;

/// Suffix the export tool appends to edited variants by default.
pub const DEFAULT_EDITED_SUFFIX: &str = "editado";

/// One filename hypothesis. `implies_original` marks edited-variant patterns
/// whose plain-named original becomes superseded when the pattern matches.
struct Candidate {
    filename: String,
    implies_original: bool,
}

impl Candidate {
    fn edited(stem: &str, suffix: &str, ext: &str) -> Self {
        Candidate {
            filename: format!("{}-{}.{}", stem, suffix, ext),
            implies_original: true,
        }
    }

    fn numbered(stem: &str, n: u32, ext: &str) -> Self {
        Candidate {
            filename: format!("{}({}).{}", stem, n, ext),
            implies_original: false,
        }
    }

    fn plain(stem: &str, ext: &str) -> Self {
        Candidate {
            filename: format!("{}.{}", stem, ext),
            implies_original: false,
        }
    }
}

/// Ordered patterns for one stem: edited variant first, then `(1)`, the
/// exact name, and `(2)` through `(10)`. Lazy, so the search never formats
/// names past the first hit.
fn stem_patterns<'a>(
    stem: &'a str,
    ext: &'a str,
    edited_suffix: &'a str,
) -> impl Iterator<Item = Candidate> + 'a {
    let mut idx = 0u32;
    iter::from_fn(move || {
        let cand = match idx {
            0 => Candidate::edited(stem, edited_suffix, ext),
            1 => Candidate::numbered(stem, 1, ext),
            2 => Candidate::plain(stem, ext),
            n @ 3..=11 => Candidate::numbered(stem, n - 1, ext),
            _ => return None,
        };
        idx += 1;
        Some(cand)
    })
}

/// Find the on-disk file for a sanitized sidecar `title` inside `dir`.
///
/// Tries an ordered list of rename patterns the export tool produces and
/// returns the first that exists on disk. When an edited variant wins, the
/// plain-named original (if still present) is relocated into
/// `superseded_dir`; a failed relocation is logged and does not abort the
/// match. Returns `None` when the title carries no extension or nothing
/// matches.
///
/// The pattern search itself is purely filesystem-driven; `moved` is only
/// consulted by the last-resort duplicate-name fallback.
pub fn locate(
    dir: &Path,
    title: &str,
    moved: &HashSet<String>,
    superseded_dir: &Path,
    edited_suffix: &str,
) -> Option<String> {
    let (stem, ext) = title.rsplit_once('.')?;

    let truncated: Option<String> = (stem.chars().count() > TRUNCATED_STEM_LEN)
        .then(|| stem.chars().take(TRUNCATED_STEM_LEN).collect());

    let mut patterns: Box<dyn Iterator<Item = Candidate> + '_> =
        Box::new(stem_patterns(stem, ext, edited_suffix));
    if let Some(short) = truncated.as_deref() {
        patterns = Box::new(patterns.chain(stem_patterns(short, ext, edited_suffix)));
    }
    if edited_suffix != DEFAULT_EDITED_SUFFIX {
        // Mixed-locale batches can carry the default suffix even when a
        // custom one is configured.
        patterns = Box::new(patterns.chain(iter::once(Candidate::edited(
            stem,
            DEFAULT_EDITED_SUFFIX,
            ext,
        ))));
        if let Some(short) = truncated.as_deref() {
            patterns = Box::new(patterns.chain(iter::once(Candidate::edited(
                short,
                DEFAULT_EDITED_SUFFIX,
                ext,
            ))));
        }
    }

    let numbered_one_tail = format!("(1).{}", ext);
    let dup_sidecar = format!("{}(1).json", title);

    for cand in patterns {
        // A `(1)` file owning its own sidecar belongs to a different record
        // and must not be claimed by this one.
        if cand.filename.ends_with(&numbered_one_tail) && dir.join(&dup_sidecar).exists() {
            continue;
        }
        if !dir.join(&cand.filename).exists() {
            continue;
        }
        if cand.implies_original {
            let original = dir.join(title);
            if original.exists() {
                if let Err(err) = fs::rename(&original, superseded_dir.join(title)) {
                    log::warn!("could not relocate superseded original {}: {}", title, err);
                }
            }
        }
        return Some(cand.filename);
    }

    if moved.contains(title) {
        return Some(title::resolve_duplicate(title, moved));
    }
    None
}
