use crate::config::TaskDefinition;
use crate::constants::{
    CLOSING_INSTRUCTION, CONTEXT_HEADER, DEFAULT_INSTRUCTION, DRAFT_LABEL, NO_CONTEXT_MARKER,
    QUESTION_LABEL, RESEARCH_ADDENDUM,
};
use crate::core::retrieval::RetrievedFragment;

fn base_instruction(task: &TaskDefinition) -> &str {
    let template = task.instruction_template.trim();
    if template.is_empty() {
        DEFAULT_INSTRUCTION
    } else {
        template
    }
}

fn context_block(fragments: &[RetrievedFragment]) -> String {
    if fragments.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }
    fragments
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "[Fragment {}, source={}, score={:.4}]\n{}",
                i + 1,
                f.source_id,
                f.score,
                f.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders the system instruction for one generation call
pub fn build(task: &TaskDefinition, query: &str, fragments: &[RetrievedFragment]) -> String {
    format!(
        "{}\n\n{}\n{}\n\n{} {}\n\n{}",
        base_instruction(task),
        CONTEXT_HEADER,
        context_block(fragments),
        QUESTION_LABEL,
        query,
        CLOSING_INSTRUCTION
    )
}

/// Renders the refinement instruction of the research pass
pub fn build_research(
    task: &TaskDefinition,
    query: &str,
    fragments: &[RetrievedFragment],
    draft: &str,
) -> String {
    format!(
        "{}\n\n{}\n\n{}\n{}",
        build(task, query, fragments),
        RESEARCH_ADDENDUM,
        DRAFT_LABEL,
        draft
    )
}
