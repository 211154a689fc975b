use crate::llm::ChatMessage;
use crate::rag::RagBackend;
use rand::seq::SliceRandom;
use std::path::Path;
use uuid::Uuid;

pub const MAX_INPUT_CHARS: usize = 500;

pub const SYSTEM_MESSAGE: &str = "Be concise and answer only from the technical manuals. \
If you cannot find the answer, say that you don't know.";

pub const GREETING: &str = "Hello! I am a technical support chatbot.\nFeel free to ask me about some technical stuff!";

const FAQ_PLACEHOLDERS: &[&str] = &[
    "How do I reset an alarm?",
    "What does error code E.OC1 mean?",
    "How do I change the operation mode?",
    "Which parameters control acceleration time?",
    "How do I restore factory settings?",
];

/// Reads one question per non-empty line.
pub fn read_faq(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// One conversation with the support bot.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    messages: Vec<ChatMessage>,
    placeholder: String,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_faq(&[])
    }

    /// Picks the input placeholder from `faq`, or from built-in questions
    /// when `faq` is empty.
    pub fn with_faq(faq: &[String]) -> Self {
        let mut rng = rand::thread_rng();
        let placeholder = faq
            .choose(&mut rng)
            .cloned()
            .or_else(|| FAQ_PLACEHOLDERS.choose(&mut rng).map(|question| question.to_string()))
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            messages: vec![ChatMessage::system(SYSTEM_MESSAGE), ChatMessage::assistant(GREETING)],
            placeholder,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Example question to show in an empty input box.
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Everything except the system message.
    pub fn visible_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|message| !message.is_system())
    }

    /// Sends one user turn through the RAG backend and records the reply.
    /// Backend failures become an assistant message instead of an error.
    pub async fn send(&mut self, text: &str, backend: &dyn RagBackend) -> String {
        let text = text.chars().take(MAX_INPUT_CHARS).collect::<String>();
        self.messages.push(ChatMessage::user(text.as_str()));

        let reply = match backend.answer(&text).await {
            Ok(answer) => answer.answer,
            Err(error) => {
                tracing::error!(session = %self.id, %error, "rag backend failed");
                format!("RAG backend error: {error}\n\nSee logs for details.")
            }
        };

        self.messages.push(ChatMessage::assistant(reply.as_str()));
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, RagError};
    use crate::rag::RagAnswer;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoBackend {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl RagBackend for EchoBackend {
        async fn answer(&self, query: &str) -> Result<RagAnswer, RagError> {
            self.seen.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(LlmError::EmptyResponse.into());
            }
            Ok(RagAnswer {
                answer: format!("echo: {query}"),
                queries: vec![query.to_string()],
                results: Vec::new(),
                prompt: String::new(),
            })
        }
    }

    #[test]
    fn new_session_starts_with_greeting() {
        let session = ChatSession::new();
        let visible = session.visible_messages().collect::<Vec<_>>();

        assert_eq!(session.messages().len(), 2);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].content, GREETING);
        assert!(FAQ_PLACEHOLDERS.contains(&session.placeholder()));
    }

    #[test]
    fn faq_file_supplies_the_placeholder() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("faq.txt");
        std::fs::write(&path, "\n  How do I wire the brake resistor?  \n\n")?;

        let faq = read_faq(&path)?;
        let session = ChatSession::with_faq(&faq);

        assert_eq!(session.placeholder(), "How do I wire the brake resistor?");
        Ok(())
    }

    #[tokio::test]
    async fn long_input_is_truncated() {
        let backend = EchoBackend::default();
        let mut session = ChatSession::new();

        let reply = session.send(&"a".repeat(800), &backend).await;

        assert_eq!(backend.seen.lock().unwrap()[0].len(), MAX_INPUT_CHARS);
        assert!(reply.starts_with("echo: "));
        assert_eq!(session.messages().len(), 4);
    }

    #[tokio::test]
    async fn backend_errors_become_assistant_messages() {
        let backend = EchoBackend {
            fail: true,
            ..Default::default()
        };
        let mut session = ChatSession::new();

        let reply = session.send("hi", &backend).await;

        assert_eq!(reply, "RAG backend error: llm returned no choices\n\nSee logs for details.");
        assert_eq!(session.messages().last().map(|m| m.content.as_str()), Some(reply.as_str()));
    }
}
