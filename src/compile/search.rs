use aho_corasick::{AhoCorasick, Input, MatchKind};

use crate::types::syntax::{Kind, Syntax};

/// Finds template delimiters in the source.
///
/// All delimiters are matched in a single pass using leftmost-longest
/// semantics so that `{{-` wins over `{{`.
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Searcher {
    imp: AhoCorasick,
    kinds: Vec<Kind>,
}

impl Searcher {
    pub fn new(syntax: Syntax) -> Self {
        let (kinds, patterns): (Vec<_>, Vec<_>) = syntax.patterns.into_iter().unzip();
        let imp = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .expect("delimiter automaton within size limits");
        Self { imp, kinds }
    }

    /// Returns the kind and byte range of the first delimiter at or after
    /// `at`.
    pub fn find_at(&self, haystack: &str, at: usize) -> Option<(Kind, usize, usize)> {
        let input = Input::new(haystack).range(at..);
        self.imp.find(input).map(|m| {
            let kind = self.kinds[m.pattern().as_usize()];
            (kind, m.start(), m.end())
        })
    }

    /// Returns the kind and end offset of a delimiter starting exactly at
    /// `at`.
    pub fn starts_with(&self, haystack: &str, at: usize) -> Option<(Kind, usize)> {
        let (kind, i, j) = self.find_at(haystack, at)?;
        (at == i).then_some((kind, j))
    }
}
