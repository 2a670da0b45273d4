use crate::tokenizer::normalize;
use std::collections::HashMap;

/// Query rewrites shipped with a tenant's data: sharpened terms are shown
/// ahead of index matches, relaxed terms fill up short result lists.
/// Keys are stored normalized so lookups use the normalized query term.
#[derive(Debug, Clone, Default)]
pub struct ModifiedTerms {
    sharpened: HashMap<String, Vec<String>>,
    relaxed: HashMap<String, Vec<String>>,
}

impl ModifiedTerms {
    pub fn new(
        locale: &str,
        sharpened: HashMap<String, Vec<String>>,
        relaxed: HashMap<String, Vec<String>>,
    ) -> Self {
        let fold = |map: HashMap<String, Vec<String>>| {
            let mut out: HashMap<String, Vec<String>> = HashMap::with_capacity(map.len());
            for (term, targets) in map {
                let key = normalize(locale, &term);
                if key.is_empty() {
                    continue;
                }
                out.entry(key).or_default().extend(targets);
            }
            out
        };
        ModifiedTerms {
            sharpened: fold(sharpened),
            relaxed: fold(relaxed),
        }
    }

    /// At most `max` sharpened replacements for `term`.
    pub fn sharpened(&self, term: &str, max: usize) -> &[String] {
        match self.sharpened.get(term) {
            Some(terms) => &terms[..terms.len().min(max)],
            None => &[],
        }
    }

    pub fn relaxed(&self, term: &str) -> &[String] {
        self.relaxed.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.sharpened.is_empty() && self.relaxed.is_empty()
    }
}
