//! Prompt templates for grounded answer generation

use crate::conversation::format_history;
use crate::types::Turn;

/// Separator between context chunks in the prompt
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Join context chunks in rank order
    pub fn build_context(chunks: &[String]) -> String {
        chunks.join(CONTEXT_SEPARATOR)
    }

    /// Build the full prompt from context, conversation history and question
    pub fn build_rag_prompt(question: &str, context: &[String], history: &[Turn]) -> String {
        let history_section = if history.is_empty() {
            String::new()
        } else {
            format!(
                "CONVERSATION SO FAR:\n{}\n\n",
                format_history(history)
            )
        };

        if context.is_empty() {
            return Self::build_no_context_prompt(question, &history_section);
        }

        format!(
            r#"You are a document-grounded assistant that answers questions using the provided documents.

RULES:
1. Use only information stated in the CONTEXT below
2. If the context does not contain the answer, say that the selected documents do not cover it
3. Do not use outside knowledge or guess beyond what the context states
4. Use the conversation so far to resolve follow-up questions

{history}CONTEXT FROM DOCUMENTS:
{context}

QUESTION: {question}

ANSWER:"#,
            history = history_section,
            context = Self::build_context(context),
            question = question
        )
    }

    fn build_no_context_prompt(question: &str, history_section: &str) -> String {
        format!(
            r#"You are a document-grounded assistant that answers questions using the user's documents.

No relevant context was found in the selected documents for this question.
Tell the user that you could not find any relevant information in the selected documents.
Do not answer from outside knowledge.

{history}QUESTION: {question}

ANSWER:"#,
            history = history_section,
            question = question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_joined_with_separator() {
        let prompt = PromptBuilder::build_rag_prompt(
            "What color is the sky?",
            &["The sky is blue.".to_string(), "Grass is green.".to_string()],
            &[],
        );

        assert!(prompt.contains("The sky is blue.\n\n---\n\nGrass is green."));
        assert!(prompt.contains("QUESTION: What color is the sky?"));
        assert!(!prompt.contains("CONVERSATION SO FAR"));
    }

    #[test]
    fn test_history_included() {
        let prompt = PromptBuilder::build_rag_prompt(
            "And the grass?",
            &["Grass is green.".to_string()],
            &[Turn::new("What color is the sky?", "Blue.")],
        );

        assert!(prompt.contains("Human: What color is the sky?\nAI: Blue."));
    }

    #[test]
    fn test_no_context_instruction() {
        let prompt = PromptBuilder::build_rag_prompt("Anything?", &[], &[]);

        assert!(prompt.contains("No relevant context was found"));
        assert!(prompt.contains("QUESTION: Anything?"));
        assert!(!prompt.contains("CONTEXT FROM DOCUMENTS"));
    }
}
