use regex::Regex;
use std::sync::OnceLock;

const KEPT_SYMBOLS: &str = "!@#$%^&*()_-+=[]{}|;:'\",.<>/?\\` \t\n□△◇：±℃φ×Ω（）";

fn heading_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#+\s").expect("static heading regex"))
}

/// Drops decorative glyphs, keeping ASCII alphanumerics, ASCII punctuation
/// and the handful of technical symbols manuals use in tables.
pub fn clean_markdown(markdown: &str) -> String {
    markdown
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || KEPT_SYMBOLS.contains(*ch))
        .collect()
}

/// Splits at every newline that opens a heading and strips the heading marker.
pub fn split_markdown(markdown: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in markdown.match_indices("\n#") {
        pieces.push(&markdown[start..index]);
        start = index + 1;
    }
    pieces.push(&markdown[start..]);

    pieces
        .into_iter()
        .map(|piece| heading_marker().replace(piece, "").into_owned())
        .collect()
}

/// Sections keyed by their first line, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    entries: Vec<(String, String)>,
}

impl SectionMap {
    pub fn insert(&mut self, key: String, content: String) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = content,
            None => self.entries.push((key, content)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let position = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn build_section_map(pieces: &[String]) -> SectionMap {
    let mut map = SectionMap::default();
    for piece in pieces {
        let key = piece.split('\n').next().unwrap_or_default().to_string();
        map.insert(key, piece.clone());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decorative_glyphs_are_removed() {
        let cleaned = clean_markdown("■ Rated 24V ±10% ★\r\nΩ (max)");
        assert_eq!(cleaned, " Rated 24V ±10% \nΩ (max)");
    }

    #[test]
    fn split_breaks_only_at_headings() {
        let pieces = split_markdown("# Intro\ntext #1\n## Wiring\nbody\n#Tail");
        assert_eq!(pieces, vec!["Intro\ntext #1", "Wiring\nbody", "#Tail"]);
    }

    #[test]
    fn duplicate_keys_keep_first_position() {
        let pieces = vec![
            "A\none".to_string(),
            "B\ntwo".to_string(),
            "A\nthree".to_string(),
        ];
        let map = build_section_map(&pieces);
        assert_eq!(map.keys(), vec!["A", "B"]);
        assert_eq!(map.entries()[0].1, "A\nthree");
    }
}
