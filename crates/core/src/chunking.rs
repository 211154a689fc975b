use crate::error::IngestError;
use crate::models::{ChunkRecord, TocSection};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub const DEFAULT_TOKEN_LIMIT: usize = 300;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub token_limit: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            token_limit: DEFAULT_TOKEN_LIMIT,
        }
    }
}

/// Counts the tokens a piece of text costs against the chunk budget.
pub trait TokenCounter {
    fn count(&self, text: &str) -> usize;
}

/// Word runs and single punctuation marks, a close stand-in for the
/// sub-word tokenizers embedding models ship with.
#[derive(Debug, Clone)]
pub struct RegexTokenCounter {
    pattern: Regex,
}

impl RegexTokenCounter {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            pattern: Regex::new(r"\w+|[^\w\s]")?,
        })
    }
}

impl TokenCounter for RegexTokenCounter {
    fn count(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }
}

struct CleanRules {
    hyphen_break: Regex,
    line_break: Regex,
    spaces: Regex,
    dots: Regex,
    note: Regex,
}

fn clean_rules() -> &'static CleanRules {
    static RULES: OnceLock<CleanRules> = OnceLock::new();
    RULES.get_or_init(|| CleanRules {
        hyphen_break: Regex::new(r"-<br\s*/?>").expect("static regex"),
        line_break: Regex::new(r"<br\s*/?>").expect("static regex"),
        spaces: Regex::new(r" +").expect("static regex"),
        dots: Regex::new(r"\.+").expect("static regex"),
        note: Regex::new(r"Note (\d\))").expect("static regex"),
    })
}

/// Undoes table-cell line breaks and the dot leaders of manual layouts.
pub fn clean_text(text: &str) -> String {
    let rules = clean_rules();
    let text = rules.hyphen_break.replace_all(text, "");
    let text = rules.line_break.replace_all(&text, "; ");
    let text = rules.spaces.replace_all(&text, " ");
    let text = rules.dots.replace_all(&text, ".");
    let text = text.replace('~', "");
    rules.note.replace_all(&text, " *Note ${1}").into_owned()
}

/// Splits `text` on line boundaries into chunks of at most `token_limit`
/// tokens. Chunks are balanced: the target size is the total divided evenly
/// over the fewest chunks that respect the limit. Returns the chunks and the
/// target size.
pub fn chunk_text_by_lines(
    text: &str,
    token_limit: usize,
    counter: &impl TokenCounter,
) -> Result<(Vec<String>, usize), IngestError> {
    if token_limit == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "token limit must be positive".to_string(),
        ));
    }

    let total = counter.count(text);
    if total == 0 {
        return Ok((Vec::new(), 0));
    }

    let chunk_count = total.div_ceil(token_limit);
    let chunk_size = total.div_ceil(chunk_count);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    let mut flush = |current: &mut String, current_tokens: &mut usize| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        current.clear();
        *current_tokens = 0;
    };

    for line in text.split_inclusive('\n') {
        let line_tokens = counter.count(line);
        if current_tokens + line_tokens > token_limit {
            flush(&mut current, &mut current_tokens);
        }

        current.push_str(line);
        current_tokens += line_tokens;

        if current_tokens > chunk_size {
            flush(&mut current, &mut current_tokens);
        }
    }
    flush(&mut current, &mut current_tokens);

    Ok((chunks, chunk_size))
}

pub fn chunk_sections(
    sections: &[TocSection],
    config: ChunkingConfig,
    counter: &impl TokenCounter,
) -> Result<Vec<ChunkRecord>, IngestError> {
    let mut records = Vec::new();

    for section in sections {
        let Some(content) = &section.content else {
            tracing::warn!(title = %section.title, page = section.page, "skipping section without content");
            continue;
        };

        let cleaned = clean_text(content);
        let (chunks, chunk_size) = chunk_text_by_lines(&cleaned, config.token_limit, counter)?;
        tracing::debug!(title = %section.title, chunks = chunks.len(), chunk_size, "section chunked");

        records.extend(chunks.into_iter().map(|text| ChunkRecord {
            level: section.level,
            title: section.title.clone(),
            page: section.page,
            text,
        }));
    }

    Ok(records)
}

/// Reads matched sections from `input`, writes chunk records to `output`.
pub fn chunk_file(input: &Path, output: &Path, config: ChunkingConfig) -> Result<Vec<ChunkRecord>, IngestError> {
    let sections: Vec<TocSection> = serde_json::from_str(&std::fs::read_to_string(input)?)?;
    let counter = RegexTokenCounter::new()?;
    let records = chunk_sections(&sections, config, &counter)?;

    std::fs::write(output, serde_json::to_string_pretty(&records)?)?;
    tracing::info!(input = %input.display(), output = %output.display(), chunks = records.len(), "chunk file written");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clean_text_rewrites_layout_artifacts() {
        let cleaned = clean_text("Servo-<br>motor<br/>24V   DC.....~5A Note 1) see below");
        assert_eq!(cleaned, "Servomotor; 24V DC.5A  *Note 1) see below");
    }

    #[test]
    fn token_counter_counts_words_and_punctuation() {
        let counter = RegexTokenCounter::new().unwrap();
        assert_eq!(counter.count("Set Pr.1 to 50, then reboot."), 10);
    }

    #[test]
    fn chunks_are_balanced_under_the_limit() {
        let counter = RegexTokenCounter::new().unwrap();
        let text = "one two three four\nfive six seven eight\nnine ten eleven twelve\n";

        let (chunks, size) = chunk_text_by_lines(text, 10, &counter).unwrap();

        assert_eq!(size, 6);
        assert_eq!(
            chunks,
            vec!["one two three four\nfive six seven eight", "nine ten eleven twelve"]
        );
    }

    #[test]
    fn short_text_stays_in_one_chunk() {
        let counter = RegexTokenCounter::new().unwrap();
        let (chunks, size) = chunk_text_by_lines("a b c\nd e", 300, &counter).unwrap();
        assert_eq!(size, 5);
        assert_eq!(chunks, vec!["a b c\nd e"]);
    }

    #[test]
    fn oversized_first_line_does_not_emit_empty_chunk() {
        let counter = RegexTokenCounter::new().unwrap();
        let (chunks, _) = chunk_text_by_lines("a b c d e f\ng", 4, &counter).unwrap();
        assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
        assert_eq!(chunks.join(" ").split_whitespace().count(), 7);
    }

    #[test]
    fn zero_limit_and_empty_text_are_handled() {
        let counter = RegexTokenCounter::new().unwrap();
        assert!(matches!(
            chunk_text_by_lines("text", 0, &counter),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert_eq!(chunk_text_by_lines("  \n", 10, &counter).unwrap(), (Vec::new(), 0));
    }

    #[test]
    fn chunk_file_skips_unmatched_sections() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let input = dir.path().join("manual_content.json");
        let output = dir.path().join("manual_chunked.json");
        let sections = vec![
            TocSection {
                level: 1,
                title: "Safety".to_string(),
                page: 2,
                content: Some("Safety\nWear gloves.".to_string()),
            },
            TocSection {
                level: 2,
                title: "Orphan".to_string(),
                page: 3,
                content: None,
            },
        ];
        std::fs::write(&input, serde_json::to_string(&sections)?)?;

        let records = chunk_file(&input, &output, ChunkingConfig::default())?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Safety");
        let written: Vec<ChunkRecord> = serde_json::from_str(&std::fs::read_to_string(&output)?)?;
        assert_eq!(written, records);
        Ok(())
    }
}
