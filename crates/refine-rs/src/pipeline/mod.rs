//! The refine pipeline and its supporting pieces.
//!
//! - [`refine::RefinePipeline`] — runs Draft → Critique → Revise. Start here.
//! - [`session`] — [`Session`] state, [`Stage`], and structured [`StageInput`]s.
//! - [`prompt`] — system instruction for each stage.
//! - [`artifact`] — collision-free persistence of the finished triple.
//! - [`events`] — [`EventHandler`] trait and [`RefineEvent`] enum for
//!   observing a run.

pub mod artifact;
pub mod events;
pub mod prompt;
pub mod refine;
pub mod session;

pub use artifact::{Artifact, ArtifactWriter, parse_artifact, render_artifact};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler, RefineEvent,
};
pub use prompt::{InstructionBuilder, compose_instruction};
pub use refine::{RefineOutcome, RefinePipeline};
pub use session::{Session, SessionState, Stage, StageInput};
