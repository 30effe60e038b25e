use std::sync::LazyLock;

use regex::Regex;

pub(crate) const DEFAULT_SLUG_LEN: usize = 40;
const FALLBACK_SLUG: &str = "image";

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\-\x{4E00}-\x{9FFF}]+").expect("slug pattern is valid")
});
static UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("underscore pattern is valid"));

/// Short filesystem-safe rendering of a prompt, for readable file names only.
/// Distinct prompts may share a slug.
pub(crate) fn slugify(text: &str, max_len: usize) -> String {
    let truncated: String = text.trim().chars().take(max_len).collect();
    let replaced = DISALLOWED.replace_all(&truncated, "_");
    let collapsed = UNDERSCORES.replace_all(&replaced, "_");
    match collapsed.trim_matches('_') {
        "" => FALLBACK_SLUG.to_string(),
        slug => slug.to_string(),
    }
}
