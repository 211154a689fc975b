use crate::error::LlmError;
use crate::models::ScoredPoint;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

pub const CONTEXT_EXTENSION: &str = "context_extension";
pub const REFINE_QUERY: &str = "refine_query";
pub const ASSISTANT_PROMPT: &str = "assistant_prompt";

const DEFAULT_CONTEXT_EXTENSION: &str = "\
You are indexing a technical manual. Below is a chunk taken from the manual \
and the passages surrounding it.

<neighbors>
{{ neighbors }}
</neighbors>

<chunk>
{{ chunk }}
</chunk>

Write one or two sentences that situate the chunk within the surrounding \
passages so it can be understood on its own. Answer with the context only.";

const DEFAULT_REFINE_QUERY: &str = "\
Rephrase the following question about a technical manual in {{ query_count }} \
different ways. Keep technical terms, part numbers and parameter names \
unchanged. Output exactly {{ query_count }} lines, one rephrased question per \
line, with no numbering or extra text.

Question: {{ query }}";

const DEFAULT_ASSISTANT_PROMPT: &str = "\
You are a technical support assistant. Answer the question using only the \
excerpts from the manuals below. Cite the manual and chapter you used. If the \
excerpts do not contain the answer, say that you don't know.

Excerpts:
{{ context }}

Question: {{ query }}";

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("static placeholder regex"))
}

/// Named prompt templates with `{{ name }}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptLoader {
    prompts: HashMap<String, String>,
}

impl Default for PromptLoader {
    fn default() -> Self {
        let prompts = [
            (CONTEXT_EXTENSION, DEFAULT_CONTEXT_EXTENSION),
            (REFINE_QUERY, DEFAULT_REFINE_QUERY),
            (ASSISTANT_PROMPT, DEFAULT_ASSISTANT_PROMPT),
        ]
        .into_iter()
        .map(|(name, template)| (name.to_string(), template.to_string()))
        .collect();
        Self { prompts }
    }
}

impl PromptLoader {
    /// Loads templates from a YAML mapping of name to template. Names the file
    /// leaves out keep their built-in template.
    pub fn from_path(path: &Path) -> Result<Self, LlmError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| LlmError::PromptFile(format!("{}: {error}", path.display())))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, LlmError> {
        let overrides: HashMap<String, String> =
            serde_yaml::from_str(raw).map_err(|error| LlmError::PromptFile(error.to_string()))?;
        let mut loader = Self::default();
        loader.prompts.extend(overrides);
        Ok(loader)
    }

    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String, LlmError> {
        let template = self
            .prompts
            .get(name)
            .ok_or_else(|| LlmError::UnknownPrompt(name.to_string()))?;

        let rendered = placeholder().replace_all(template, |caps: &Captures| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }

    /// Renders the final answer prompt with one context block per result.
    pub fn build_prompt(&self, query: &str, results: &[ScoredPoint]) -> Result<String, LlmError> {
        let mut context = String::new();
        for (index, point) in results.iter().enumerate() {
            let payload = &point.payload;
            context.push_str(&format!(
                "{index}) Manual:\t{},\nMain Chapter:\t{}\nChapter:\t{}\nContent: {}\n\n",
                payload.manual, payload.main_chapter, payload.chapter, payload.content
            ));
        }
        self.render(ASSISTANT_PROMPT, &[("query", query), ("context", context.as_str())])
    }
}
