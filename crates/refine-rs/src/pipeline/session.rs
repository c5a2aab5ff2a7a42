//! The state of one refine run.
//!
//! A [`Session`] owns the question, the optional guidance, and the outputs of
//! each stage as they arrive. Outputs can only be recorded in
//! Draft → Critique → Revise order; anything else is a [`SessionError`].
//!
//! [`StageInput`] models the user content each stage sends, so prompt
//! assembly is data rather than string splicing at the call site.

use std::fmt;

use chrono::{DateTime, Local};

use crate::api::tracing::{CostTracker, generate_trace_id};
use crate::error::SessionError;

// ── Stage ──────────────────────────────────────────────────────────

/// One request/response exchange with the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Draft,
    Critique,
    Revise,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Draft, Stage::Critique, Stage::Revise];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Draft => write!(f, "Draft"),
            Stage::Critique => write!(f, "Critique"),
            Stage::Revise => write!(f, "Revise"),
        }
    }
}

// ── SessionState ───────────────────────────────────────────────────

/// Position of a session in the strictly linear stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Init,
    Drafted,
    Critiqued,
    Revised,
    Done,
}

impl SessionState {
    /// The stage that may run from this state, if any.
    pub fn next_stage(self) -> Option<Stage> {
        match self {
            SessionState::Init => Some(Stage::Draft),
            SessionState::Drafted => Some(Stage::Critique),
            SessionState::Critiqued => Some(Stage::Revise),
            SessionState::Revised | SessionState::Done => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Init => "INIT",
            SessionState::Drafted => "DRAFTED",
            SessionState::Critiqued => "CRITIQUED",
            SessionState::Revised => "REVISED",
            SessionState::Done => "DONE",
        };
        f.write_str(s)
    }
}

// ── Session ────────────────────────────────────────────────────────

/// The accumulated record of one pipeline run.
///
/// `question` and `guidance` are fixed at construction. Stage outputs are
/// populated through [`record`](Self::record), which enforces ordering.
#[derive(Debug, Clone)]
pub struct Session {
    trace_id: String,
    started_at: DateTime<Local>,
    question: String,
    guidance: Option<String>,
    draft: Option<String>,
    critique: Option<String>,
    revision: Option<String>,
    state: SessionState,
    usage: CostTracker,
}

impl Session {
    /// Start a session. Empty guidance is stored as `None`.
    pub fn new(question: impl Into<String>, guidance: Option<impl Into<String>>) -> Self {
        let guidance = guidance.map(Into::<String>::into).filter(|g| !g.is_empty());
        Self {
            trace_id: generate_trace_id(),
            started_at: Local::now(),
            question: question.into(),
            guidance,
            draft: None,
            critique: None,
            revision: None,
            state: SessionState::Init,
            usage: CostTracker::new(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn guidance(&self) -> Option<&str> {
        self.guidance.as_deref()
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn critique(&self) -> Option<&str> {
        self.critique.as_deref()
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token usage and estimated cost across completed stages.
    pub fn usage(&self) -> &CostTracker {
        &self.usage
    }

    pub(crate) fn usage_mut(&mut self) -> &mut CostTracker {
        &mut self.usage
    }

    /// Output of a given stage, if it has completed.
    pub fn output(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Draft => self.draft(),
            Stage::Critique => self.critique(),
            Stage::Revise => self.revision(),
        }
    }

    /// `(draft, critique, revision)` once all three stages have completed.
    pub fn triple(&self) -> Option<(&str, &str, &str)> {
        Some((self.draft()?, self.critique()?, self.revision()?))
    }

    /// Record the output of `stage`, advancing the state.
    ///
    /// Fails unless `stage` is exactly the next stage for the current state.
    pub fn record(&mut self, stage: Stage, output: impl Into<String>) -> Result<(), SessionError> {
        if self.state.next_stage() != Some(stage) {
            return Err(SessionError::OutOfOrder {
                stage,
                state: self.state,
            });
        }
        let output = output.into();
        match stage {
            Stage::Draft => {
                self.draft = Some(output);
                self.state = SessionState::Drafted;
            }
            Stage::Critique => {
                self.critique = Some(output);
                self.state = SessionState::Critiqued;
            }
            Stage::Revise => {
                self.revision = Some(output);
                self.state = SessionState::Revised;
            }
        }
        Ok(())
    }

    /// Move a revised session to its terminal state. No-op otherwise.
    pub(crate) fn finish(&mut self) {
        if self.state == SessionState::Revised {
            self.state = SessionState::Done;
        }
    }

    /// The user content for `stage`, built from what the session holds.
    ///
    /// Returns `None` when a prerequisite output is missing.
    pub fn input_for(&self, stage: Stage) -> Option<StageInput<'_>> {
        match stage {
            Stage::Draft => Some(StageInput::Question {
                question: &self.question,
            }),
            Stage::Critique => Some(StageInput::Review {
                question: &self.question,
                draft: self.draft.as_deref()?,
            }),
            Stage::Revise => Some(StageInput::Revision {
                question: &self.question,
                draft: self.draft.as_deref()?,
                feedback: self.critique.as_deref()?,
            }),
        }
    }
}

// ── StageInput ─────────────────────────────────────────────────────

/// Structured user content for one stage.
///
/// The Critique and Revise stages share the same labeled (question, draft)
/// context; Revise appends the editor's feedback as a second element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput<'a> {
    Question {
        question: &'a str,
    },
    Review {
        question: &'a str,
        draft: &'a str,
    },
    Revision {
        question: &'a str,
        draft: &'a str,
        feedback: &'a str,
    },
}

impl StageInput<'_> {
    /// Render as the single user-role message sent to the service.
    pub fn render(&self) -> String {
        match self {
            StageInput::Question { question } => (*question).to_string(),
            StageInput::Review { question, draft } => review_context(question, draft),
            StageInput::Revision {
                question,
                draft,
                feedback,
            } => format!(
                "{}\n\nEditor feedback: {feedback}",
                review_context(question, draft)
            ),
        }
    }
}

fn review_context(question: &str, draft: &str) -> String {
    format!("User question: {question}\n\nThe response you must edit: {draft}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_init() {
        let s = Session::new("q", None::<String>);
        assert_eq!(s.state(), SessionState::Init);
        assert!(s.draft().is_none());
        assert!(s.triple().is_none());
        assert!(s.trace_id().starts_with("tr-"));
    }

    #[test]
    fn empty_guidance_is_none() {
        assert!(Session::new("q", Some("")).guidance().is_none());
        assert_eq!(Session::new("q", Some("be brief")).guidance(), Some("be brief"));
    }

    #[test]
    fn stages_record_in_order() {
        let mut s = Session::new("q", None::<String>);
        s.record(Stage::Draft, "A").unwrap();
        assert_eq!(s.state(), SessionState::Drafted);
        s.record(Stage::Critique, "B").unwrap();
        assert_eq!(s.state(), SessionState::Critiqued);
        s.record(Stage::Revise, "C").unwrap();
        assert_eq!(s.state(), SessionState::Revised);
        assert_eq!(s.triple(), Some(("A", "B", "C")));

        s.finish();
        assert_eq!(s.state(), SessionState::Done);
    }

    #[test]
    fn critique_before_draft_rejected() {
        let mut s = Session::new("q", None::<String>);
        let err = s.record(Stage::Critique, "B").unwrap_err();
        assert_eq!(
            err,
            SessionError::OutOfOrder {
                stage: Stage::Critique,
                state: SessionState::Init
            }
        );
        assert!(s.critique().is_none());
    }

    #[test]
    fn revise_requires_critique() {
        let mut s = Session::new("q", None::<String>);
        s.record(Stage::Draft, "A").unwrap();
        assert!(s.record(Stage::Revise, "C").is_err());
        assert!(s.input_for(Stage::Revise).is_none());
    }

    #[test]
    fn stage_cannot_be_recorded_twice() {
        let mut s = Session::new("q", None::<String>);
        s.record(Stage::Draft, "A").unwrap();
        assert!(s.record(Stage::Draft, "A2").is_err());
        assert_eq!(s.draft(), Some("A"));
    }

    #[test]
    fn finish_before_revised_is_noop() {
        let mut s = Session::new("q", None::<String>);
        s.finish();
        assert_eq!(s.state(), SessionState::Init);
    }

    #[test]
    fn review_and_revision_share_context() {
        let mut s = Session::new("Why is the sky blue?", None::<String>);
        s.record(Stage::Draft, "Rayleigh scattering.").unwrap();
        s.record(Stage::Critique, "Mention wavelength.").unwrap();

        let review = s.input_for(Stage::Critique).unwrap().render();
        assert_eq!(
            review,
            "User question: Why is the sky blue?\n\nThe response you must edit: Rayleigh scattering."
        );

        let revision = s.input_for(Stage::Revise).unwrap().render();
        assert!(revision.starts_with(&review));
        assert!(revision.ends_with("Editor feedback: Mention wavelength."));
    }

    #[test]
    fn draft_input_is_the_question() {
        let s = Session::new("What is Rust?", Some("be funny"));
        assert_eq!(s.input_for(Stage::Draft).unwrap().render(), "What is Rust?");
    }
}
