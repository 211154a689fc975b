//! Reconciles the markdown sections of a manual with its table of contents.

use crate::error::IngestError;
use crate::markdown::SectionMap;
use crate::models::{TocEntry, TocSection};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

pub const STRICT_THRESHOLD: f32 = 0.80;
pub const RELAXED_THRESHOLD: f32 = 0.70;

fn punctuation_or_symbol() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{P}\p{S}]").expect("static punctuation regex"))
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static whitespace regex"))
}

/// NFKC, trim, lowercase, drop punctuation and symbols, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let folded = text.nfkc().collect::<String>();
    let lowered = folded.trim().to_lowercase();
    let stripped = punctuation_or_symbol().replace_all(&lowered, "");
    whitespace_run().replace_all(&stripped, " ").into_owned()
}

/// Sequences at least this long drop their most frequent elements from the
/// match index.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Greedy longest-matching-block matcher over characters. Matches are found
/// by repeatedly taking the longest common block and recursing on both
/// sides of it, so scores follow `2 * matched / total` over those blocks
/// rather than an optimal alignment.
struct BlockMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> BlockMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, ch) in b.iter().enumerate() {
            b2j.entry(*ch).or_default().push(j);
        }
        if b.len() >= AUTOJUNK_MIN_LEN {
            let popular = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= popular);
        }
        Self { a, b, b2j }
    }

    /// Longest block `a[i..i+k] == b[j..j+k]` inside the given ranges; the
    /// earliest in `a`, then in `b`, wins among equally long blocks.
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
        let mut run_ending_at: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let len = j
                        .checked_sub(1)
                        .and_then(|prev| run_ending_at.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, len);
                    if len > best_len {
                        best_i = i + 1 - len;
                        best_j = j + 1 - len;
                        best_len = len;
                    }
                }
            }
            run_ending_at = next;
        }

        // popular elements are left out of the index but may still extend a block
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_len += 1;
        }
        while best_i + best_len < ahi
            && best_j + best_len < bhi
            && self.a[best_i + best_len] == self.b[best_j + best_len]
        {
            best_len += 1;
        }

        (best_i, best_j, best_len)
    }

    fn matched_len(&self) -> usize {
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        let mut matched = 0;

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let (i, j, len) = self.longest_match(alo, ahi, blo, bhi);
            if len == 0 {
                continue;
            }
            matched += len;
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + len < ahi && j + len < bhi {
                pending.push((i + len, ahi, j + len, bhi));
            }
        }

        matched
    }

    fn ratio(&self) -> f32 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * self.matched_len() as f32 / total as f32
    }
}

/// Similarity ratio in `[0, 1]` of two strings, scored over greedy longest
/// matching blocks. Not symmetric in general: `right` is the indexed side.
pub fn similarity(left: &str, right: &str) -> f32 {
    let left = left.chars().collect::<Vec<_>>();
    let right = right.chars().collect::<Vec<_>>();
    BlockMatcher::new(&left, &right).ratio()
}

/// Returns the position of the candidate best matching `title`.
///
/// A unique substring hit on normalized text wins outright. Otherwise the
/// candidate with the highest similarity is returned when it reaches
/// `threshold`; ties go to the earliest candidate.
pub fn find_best_match(title: &str, candidates: &[(String, String)], threshold: f32) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }

    let normalized_title = normalize_text(title);
    let normalized_keys = candidates
        .iter()
        .map(|(key, _)| normalize_text(key))
        .collect::<Vec<_>>();

    let substring_hits = normalized_keys
        .iter()
        .enumerate()
        .filter(|(_, key)| key.contains(&normalized_title) || normalized_title.contains(key.as_str()))
        .map(|(index, _)| index)
        .collect::<Vec<_>>();

    if let [only] = substring_hits.as_slice() {
        return Some(*only);
    }

    let mut best: Option<(usize, f32)> = None;
    for (index, key) in normalized_keys.iter().enumerate() {
        let score = similarity(&normalized_title, key);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.filter(|(_, score)| *score >= threshold)
        .map(|(index, _)| index)
}

fn match_pass(
    entries: &mut [TocSection],
    pending: &[usize],
    sections: &mut SectionMap,
    threshold: f32,
) -> Vec<usize> {
    let mut unmatched = Vec::new();
    for &position in pending {
        let entry = &mut entries[position];
        let found = find_best_match(&entry.title, sections.entries(), threshold)
            .map(|index| sections.entries()[index].0.clone());

        match found.and_then(|key| sections.remove(&key)) {
            Some(content) => entry.content = Some(content),
            None => unmatched.push(position),
        }
    }
    unmatched
}

/// Assigns every markdown section to a ToC entry, keeping ToC order.
///
/// Entries that never match are kept with no content. Fails when sections are
/// left over, since their text would otherwise silently drop out of the index.
pub fn match_toc(toc: Vec<TocEntry>, mut sections: SectionMap) -> Result<Vec<TocSection>, IngestError> {
    let mut entries = toc.into_iter().map(TocSection::from).collect::<Vec<_>>();
    let all = (0..entries.len()).collect::<Vec<_>>();

    let retries = match_pass(&mut entries, &all, &mut sections, STRICT_THRESHOLD);
    let still_unmatched = match_pass(&mut entries, &retries, &mut sections, RELAXED_THRESHOLD);

    for &position in &still_unmatched {
        let entry = &entries[position];
        tracing::warn!(title = %entry.title, page = entry.page, "toc entry has no matching section");
    }

    if !sections.is_empty() {
        return Err(IngestError::UnmatchedSections(sections.keys()));
    }

    Ok(entries)
}
