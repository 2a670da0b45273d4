//! Text normalization shared by index builds and queries, plus the tantivy
//! token filter used by the search-library backend.

pub mod prefix_gram_filter;
pub use prefix_gram_filter::PrefixGramFilter;

/// Languages whose dotted/dotless `i` must not follow the default case mapping.
fn uses_turkic_casing(locale: &str) -> bool {
    let lang = locale
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    lang == "tr" || lang == "az"
}

/// Lowercases `text` following the case rules of `locale` (a BCP 47 tag such
/// as `"de-DE"`; empty means root).
pub fn case_fold(locale: &str, text: &str) -> String {
    if uses_turkic_casing(locale) {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                'I' => out.push('ı'),
                'İ' => out.push('i'),
                _ => out.extend(c.to_lowercase()),
            }
        }
        out
    } else {
        text.to_lowercase()
    }
}

/// Trims, collapses inner whitespace runs and case-folds.
pub fn normalize(locale: &str, text: &str) -> String {
    let folded = case_fold(locale, text.trim());
    let mut out = String::with_capacity(folded.len());
    for word in folded.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
