use fraudguard_core::{Assistant, SearchError};
use std::io::{BufRead, Write};

const HELP: &str = "Ask a question about fraud. /history shows this session, /clear resets it, /quit exits.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
}

#[derive(Debug, Default)]
struct Transcript {
    turns: Vec<(Role, String)>,
}

impl Transcript {
    fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push((role, text.into()));
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Line-oriented chat. Each line is answered independently; failed answers
/// are shown and recorded rather than ending the session.
pub fn run<R: BufRead, W: Write>(
    assistant: &Assistant,
    input: R,
    mut output: W,
) -> anyhow::Result<()> {
    let mut transcript = Transcript::default();
    writeln!(output, "{HELP}")?;
    prompt(&mut output)?;

    for line in input.lines() {
        let line = line?;
        let question = line.trim();

        match question {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => {
                transcript.clear();
                writeln!(output, "history cleared")?;
            }
            "/history" => {
                for (role, text) in &transcript.turns {
                    let label = match role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    writeln!(output, "{label}: {text}")?;
                }
            }
            _ => {
                transcript.push(Role::User, question);
                let reply = match assistant.answer(question) {
                    Ok(answer) => answer.text,
                    Err(error) => {
                        tracing::warn!(%error, "answer failed");
                        describe(&error)
                    }
                };
                writeln!(output, "{reply}")?;
                transcript.push(Role::Assistant, reply);
            }
        }
        prompt(&mut output)?;
    }

    Ok(())
}

fn prompt<W: Write>(output: &mut W) -> std::io::Result<()> {
    write!(output, "> ")?;
    output.flush()
}

fn describe(error: &SearchError) -> String {
    match error {
        SearchError::IndexNotFound(path) => {
            format!("❌ No index found at {path}. Run `fraudguard build-index` first.")
        }
        other => format!("❌ Error generating response: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraudguard_core::{
        CharacterNgramEmbedder, ChatModel, Chunk, FlatIndex, Metric, Retriever,
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    struct EchoModel;

    impl ChatModel for EchoModel {
        fn complete(&self, _system: &str, user: &str) -> Result<String, SearchError> {
            Ok(format!("answer to: {user}"))
        }
    }

    fn assistant(dir: &std::path::Path) -> Result<Assistant, Box<dyn std::error::Error>> {
        let path = dir.join("faiss_index");
        let embedder = CharacterNgramEmbedder::default();
        let chunks = vec![Chunk {
            text: "Do not share OTP codes.".to_string(),
            source: "data/otp.pdf".to_string(),
        }];
        FlatIndex::build(chunks, &embedder, Metric::Cosine)?.save(&path)?;
        let retriever = Retriever::open(Arc::new(embedder), &path)?;
        Ok(Assistant::new(Arc::new(retriever), Arc::new(EchoModel), 3))
    }

    #[test]
    fn answers_lines_and_keeps_history_until_cleared() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let assistant = assistant(dir.path())?;
        let input = "what is an otp scam?\n/history\n/clear\n/history\n/quit\nignored\n";
        let mut output = Vec::new();

        run(&assistant, input.as_bytes(), &mut output)?;

        let printed = String::from_utf8(output)?;
        assert!(printed.contains("answer to: what is an otp scam?"));
        assert!(printed.contains("you: what is an otp scam?"));
        assert!(printed.contains("history cleared"));
        assert_eq!(printed.matches("you: ").count(), 1);
        assert!(!printed.contains("ignored"));
        Ok(())
    }

    #[test]
    fn missing_index_is_explained() {
        let message = describe(&SearchError::IndexNotFound("faiss_index".to_string()));
        assert!(message.contains("build-index"));
    }
}
