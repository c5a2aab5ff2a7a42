//! System instructions for each refine stage.
//!
//! [`compose_instruction`] is the single entry point: given a [`Stage`] and
//! optional guidance it returns the system-role text for that stage. It is
//! pure, so identical inputs always produce byte-identical output.
//!
//! Instructions are assembled with [`InstructionBuilder`], which appends
//! sentence-level clauses and silently drops empty ones.

use super::session::Stage;

const DRAFT_INSTRUCTION: &str = "Answer the following question as best as you can. \
Balance concision with the quality of the answer and tacit user needs implied by the \
question, if they exist.";

const DRAFT_GUIDANCE_PREFIX: &str = "Also, consider the following guidance on how to answer:";

const CRITIQUE_INSTRUCTION: &str = "You are a writing editor. Review the question and \
response, and make suggestions to improve the quality and clarity of the writing. Your job \
IS NOT to revise the writing, but instead to provide feedback to the writer, who will \
incorporate your feedback into a revised response.";

const CRITIQUE_GUIDANCE_PREFIX: &str = "Also, consider the following editorial guidance:";

const REVISE_INSTRUCTION: &str = "Review the question posed to the writer, the writer's \
initial response as well as the feedback from the editor and revise the initial response \
accordingly. Do not include the feedback or anything like \"Revised response:\" in your \
response.";

/// Builder for single-paragraph instructions.
///
/// Clauses are joined with a single space. Empty clauses are skipped, so an
/// absent or empty guidance string never leaves a dangling prefix behind.
///
/// ```
/// use refine_rs::pipeline::prompt::InstructionBuilder;
///
/// let text = InstructionBuilder::new("Answer the question.")
///     .clause_if(true, || "Be brief.".into())
///     .clause_opt(None::<String>)
///     .build();
///
/// assert_eq!(text, "Answer the question. Be brief.");
/// ```
pub struct InstructionBuilder {
    clauses: Vec<String>,
}

impl InstructionBuilder {
    /// Start from the fixed base instruction.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            clauses: vec![base.into()],
        }
    }

    /// Append a clause. Skipped if empty.
    pub fn clause(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.clauses.push(content);
        }
        self
    }

    /// Append a clause only if `condition` holds. `content_fn` runs lazily.
    pub fn clause_if(self, condition: bool, content_fn: impl FnOnce() -> String) -> Self {
        if condition {
            self.clause(content_fn())
        } else {
            self
        }
    }

    /// Append a clause only if the content is `Some`.
    pub fn clause_opt(self, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.clause(c),
            None => self,
        }
    }

    pub fn build(self) -> String {
        self.clauses.join(" ")
    }
}

/// Compose the system instruction for `stage`.
///
/// Guidance shapes Draft and Critique only; Revise ignores it.
pub fn compose_instruction(stage: Stage, guidance: Option<&str>) -> String {
    let guidance = guidance.filter(|g| !g.is_empty());
    match stage {
        Stage::Draft => InstructionBuilder::new(DRAFT_INSTRUCTION)
            .clause_opt(guidance.map(|g| format!("{DRAFT_GUIDANCE_PREFIX} {g}")))
            .build(),
        Stage::Critique => InstructionBuilder::new(CRITIQUE_INSTRUCTION)
            .clause_opt(guidance.map(|g| format!("{CRITIQUE_GUIDANCE_PREFIX} {g}")))
            .build(),
        Stage::Revise => InstructionBuilder::new(REVISE_INSTRUCTION).build(),
    }
}
