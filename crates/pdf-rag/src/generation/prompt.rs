//! Prompt templates for retrieval-augmented answers

use crate::types::Turn;

/// Prompt builder for the answer-generation step
pub struct PromptBuilder;

impl PromptBuilder {
    /// Join tool outputs into one context block, in the order given
    pub fn build_context(tool_turns: &[Turn]) -> String {
        tool_turns
            .iter()
            .map(|turn| turn.content())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// System instruction embedding the retrieved context
    pub fn build_answer_instruction(context: &str) -> String {
        format!(
            "You are an assistant for question-answering tasks. \
             Use the following pieces of retrieved context to answer the question. \
             If you don't know the answer, say that you don't know. \
             Use three sentences maximum and keep the answer concise.\
             \n\n{context}",
            context = context
        )
    }

    /// Tool output recorded when retrieval could not run
    pub fn retrieval_failed(reason: &str) -> String {
        format!(
            "Retrieval failed: no information could be retrieved from the indexed documents ({}). \
             There is no context available to answer from.",
            reason
        )
    }

    /// Tool output recorded when retrieval ran but matched nothing
    pub fn no_passages_found() -> String {
        "No relevant passages were found in the indexed documents.".to_string()
    }
}
