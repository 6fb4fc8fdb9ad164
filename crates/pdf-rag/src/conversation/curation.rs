//! Context curation for the answer-generation step

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::types::{Role, Turn};

/// Model input for answer generation.
///
/// The system instruction is kept as text so that curating the same turns
/// twice yields equal values.
#[derive(Debug, Clone, PartialEq)]
pub struct CuratedContext {
    pub system_instruction: String,
    pub messages: Vec<Turn>,
}

impl CuratedContext {
    /// System instruction followed by the filtered history
    pub fn to_model_input(&self) -> Vec<Turn> {
        let mut input = Vec::with_capacity(self.messages.len() + 1);
        input.push(Turn::system(self.system_instruction.clone()));
        input.extend(self.messages.iter().cloned());
        input
    }
}

/// The maximal run of tool turns at the end of `turns`
pub fn trailing_tool_turns(turns: &[Turn]) -> &[Turn] {
    let start = turns
        .iter()
        .rposition(|t| t.role() != Role::Tool)
        .map_or(0, |i| i + 1);
    &turns[start..]
}

/// Every trailing tool turn must answer exactly one request of the
/// assistant turn right before the run.
pub fn check_tool_correlation(turns: &[Turn]) -> Result<()> {
    let tools = trailing_tool_turns(turns);
    if tools.is_empty() {
        return Ok(());
    }

    let preceding = &turns[..turns.len() - tools.len()];
    let Some(request) = preceding.last().filter(|t| t.is_tool_request()) else {
        return Err(Error::correlation(
            "tool turns are not preceded by an assistant tool request",
        ));
    };

    let requested: HashSet<&str> = request.tool_calls().iter().map(|c| c.id.as_str()).collect();
    let mut answered = HashSet::new();
    for tool in tools {
        let id = tool
            .tool_call_id()
            .ok_or_else(|| Error::correlation("tool turn has no tool_call_id"))?;
        if !requested.contains(id) {
            return Err(Error::correlation(format!(
                "tool turn '{}' does not match any request",
                id
            )));
        }
        if !answered.insert(id) {
            return Err(Error::correlation(format!("request '{}' answered twice", id)));
        }
    }

    Ok(())
}

/// Build the answer-generation input from the full turn sequence.
///
/// Pure: the result depends only on `turns`.
pub fn curate(turns: &[Turn]) -> Result<CuratedContext> {
    check_tool_correlation(turns)?;

    let context = PromptBuilder::build_context(trailing_tool_turns(turns));
    let messages = turns
        .iter()
        .filter(|t| match t.role() {
            Role::Human | Role::System => true,
            Role::Assistant => t.is_final_answer(),
            Role::Tool => false,
        })
        .cloned()
        .collect();

    Ok(CuratedContext {
        system_instruction: PromptBuilder::build_answer_instruction(&context),
        messages,
    })
}
