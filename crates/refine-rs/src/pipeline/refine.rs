//! The Draft → Critique → Revise pipeline.
//!
//! [`RefinePipeline`] drives one [`Session`] through its three stages, one
//! completion call per stage, strictly in order. Each stage's user content is
//! built from the outputs before it, so nothing can be reordered or run in
//! parallel.
//!
//! On a completion failure the run stops at that stage and returns a
//! [`RefineFailure`] holding the partial session. Nothing is persisted for a
//! failed run.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info};

use super::artifact::ArtifactWriter;
use super::events::{EventHandler, NoopHandler, RefineEvent};
use super::prompt::compose_instruction;
use super::session::{Session, Stage};
use crate::api::completion::{CompletionClient, StageRequest};
use crate::api::retry::retry_completion;
use crate::api::tracing::stage_span_id;
use crate::config::RefineConfig;
use crate::error::{ArtifactError, PipelineError, RefineFailure, SessionError};

/// A completed run and the result of persisting it.
///
/// Persistence failure does not discard the text: `session` is always fully
/// revised, and `artifact` reports separately whether it reached disk.
#[derive(Debug)]
pub struct RefineOutcome {
    pub session: Session,
    pub artifact: Result<PathBuf, ArtifactError>,
}

/// Orchestrates the three refine stages against a [`CompletionClient`].
///
/// ```ignore
/// let pipeline = RefinePipeline::new(&client, RefineConfig::new("openai/gpt-4o"))
///     .with_event_handler(&LoggingHandler);
///
/// let session = pipeline.run("Why is the sky blue?", Some("explain it to a child")).await?;
/// println!("{}", session.revision().unwrap_or_default());
/// ```
pub struct RefinePipeline<'a> {
    client: &'a dyn CompletionClient,
    config: RefineConfig,
    event_handler: &'a dyn EventHandler,
}

impl<'a> RefinePipeline<'a> {
    pub fn new(client: &'a dyn CompletionClient, config: RefineConfig) -> Self {
        Self {
            client,
            config,
            event_handler: &NoopHandler,
        }
    }

    /// Attach an event handler.
    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Run all three stages for a new session.
    pub async fn run(
        &self,
        question: &str,
        guidance: Option<&str>,
    ) -> Result<Session, RefineFailure> {
        self.run_session(Session::new(question, guidance)).await
    }

    /// Run whatever stages `session` has left, then mark it done.
    pub async fn run_session(&self, mut session: Session) -> Result<Session, RefineFailure> {
        info!(
            "Refine session {} started (state={}, guidance={})",
            session.trace_id(),
            session.state(),
            session.guidance().is_some()
        );

        loop {
            match self.advance(&mut session).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(error) => {
                    return Err(RefineFailure {
                        error,
                        partial: Box::new(session),
                    });
                }
            }
        }

        session.finish();
        self.event_handler
            .on_event(&RefineEvent::Finished { session: &session });
        Ok(session)
    }

    /// Run the pipeline, then hand the result to `writer`.
    ///
    /// Only completion failures are errors here; a write failure is reported
    /// in [`RefineOutcome::artifact`] alongside the finished session.
    pub async fn run_to_artifact(
        &self,
        question: &str,
        guidance: Option<&str>,
        writer: &ArtifactWriter,
    ) -> Result<RefineOutcome, RefineFailure> {
        let session = self.run(question, guidance).await?;
        let artifact = writer.write(&session);
        Ok(RefineOutcome { session, artifact })
    }

    /// Run the next pending stage of `session`.
    ///
    /// Returns the stage that ran, or `None` once the session is revised.
    pub async fn advance(&self, session: &mut Session) -> Result<Option<Stage>, PipelineError> {
        let Some(stage) = session.state().next_stage() else {
            return Ok(None);
        };

        let request = self.request_for(session, stage)?;
        debug!(
            "[{}] {stage} request: model={}, system={} chars, user={} chars",
            stage_span_id(session.trace_id(), stage),
            request.model,
            request.system.len(),
            request.user.len()
        );

        self.event_handler.on_event(&RefineEvent::StageStarted {
            stage,
            model: &request.model,
        });

        let start = Instant::now();
        let client = self.client;
        let req = &request;
        let result = retry_completion(
            &self.config.retry,
            || client.complete(req),
            |attempt, delay, error| {
                self.event_handler.on_event(&RefineEvent::StageRetrying {
                    stage,
                    attempt,
                    max_retries: self.config.retry.max_retries,
                    delay,
                    error,
                });
            },
        )
        .await;

        let completion = match result {
            Ok(c) => c,
            Err(source) => {
                self.event_handler.on_event(&RefineEvent::StageFailed {
                    stage,
                    error: &source,
                });
                return Err(PipelineError::Completion { stage, source });
            }
        };

        if let Some(ref usage) = completion.usage {
            session.usage_mut().record_usage(usage, &request.model);
        }
        session.record(stage, completion.text)?;

        self.event_handler.on_event(&RefineEvent::StageCompleted {
            stage,
            output: session.output(stage).unwrap_or_default(),
            usage: completion.usage.as_ref(),
            elapsed: start.elapsed(),
        });

        Ok(Some(stage))
    }

    /// Build the request for `stage` from the session's current outputs.
    ///
    /// Guidance reaches the Draft and Critique instructions only.
    fn request_for(&self, session: &Session, stage: Stage) -> Result<StageRequest, SessionError> {
        let input = session
            .input_for(stage)
            .ok_or(SessionError::OutOfOrder {
                stage,
                state: session.state(),
            })?;

        let guidance = match stage {
            Stage::Draft | Stage::Critique => session.guidance(),
            Stage::Revise => None,
        };

        Ok(StageRequest {
            stage,
            model: self.config.model_for(stage).to_string(),
            system: compose_instruction(stage, guidance),
            user: input.render(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UsageInfo;
    use crate::api::completion::{Completion, CompletionFuture};
    use crate::api::retry::RetryConfig;
    use crate::error::CompletionError;
    use crate::pipeline::events::FnEventHandler;
    use crate::pipeline::session::SessionState;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned results in order and records every request.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<Completion, CompletionError>>>,
        requests: Mutex<Vec<StageRequest>>,
    }

    impl ScriptedClient {
        fn new(
            responses: impl IntoIterator<Item = Result<Completion, CompletionError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn replying(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(Completion::text(*t))))
        }

        fn requests(&self) -> Vec<StageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionClient for ScriptedClient {
        fn complete<'a>(&'a self, request: &'a StageRequest) -> CompletionFuture<'a> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".into())));
            Box::pin(async move { next })
        }
    }

    fn config() -> RefineConfig {
        RefineConfig::new("writer-model")
    }

    #[tokio::test]
    async fn full_run_populates_all_stages() {
        let client = ScriptedClient::replying(&["draft text", "critique text", "revised text"]);
        let session = RefinePipeline::new(&client, config())
            .run("What is Rust?", Some("be witty"))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(
            session.triple(),
            Some(("draft text", "critique text", "revised text"))
        );
        assert_eq!(session.question(), "What is Rust?");
        assert_eq!(session.guidance(), Some("be witty"));
    }

    #[tokio::test]
    async fn stage_inputs_chain_outputs() {
        let client = ScriptedClient::replying(&["DRAFT", "FEEDBACK", "FINAL"]);
        RefinePipeline::new(&client, config())
            .run("Q?", Some("GUIDE"))
            .await
            .unwrap();

        let reqs = client.requests();
        assert_eq!(reqs.len(), 3);
        assert_eq!(
            reqs.iter().map(|r| r.stage).collect::<Vec<_>>(),
            Stage::ALL.to_vec()
        );

        // Draft: question only, guidance in the instruction.
        assert_eq!(reqs[0].user, "Q?");
        assert!(reqs[0].system.ends_with("GUIDE"));

        // Critique: labeled question + draft, editorial guidance.
        assert_eq!(
            reqs[1].user,
            "User question: Q?\n\nThe response you must edit: DRAFT"
        );
        assert!(reqs[1].system.contains("editorial guidance: GUIDE"));

        // Revise: same context plus the feedback, no guidance.
        assert!(reqs[2].user.starts_with(&reqs[1].user));
        assert!(reqs[2].user.ends_with("FEEDBACK"));
        assert!(!reqs[2].system.contains("GUIDE"));
    }

    #[tokio::test]
    async fn empty_guidance_never_reaches_prompts() {
        let client = ScriptedClient::replying(&["a", "b", "c"]);
        RefinePipeline::new(&client, config())
            .run("Q?", Some(""))
            .await
            .unwrap();
        for req in client.requests() {
            assert!(!req.system.contains("Also, consider"), "{}", req.stage);
        }
    }

    #[tokio::test]
    async fn critique_failure_keeps_draft_only() {
        let client = ScriptedClient::new([
            Ok(Completion::text("draft")),
            Err(CompletionError::Status {
                status: 500,
                body: "boom".into(),
            }),
        ]);
        let failure = RefinePipeline::new(&client, config())
            .run("Q?", None)
            .await
            .unwrap_err();

        assert_eq!(failure.stage(), Some(Stage::Critique));
        assert!(matches!(
            failure.error,
            PipelineError::Completion {
                source: CompletionError::Status { status: 500, .. },
                ..
            }
        ));
        assert_eq!(failure.partial.draft(), Some("draft"));
        assert!(failure.partial.critique().is_none());
        assert!(failure.partial.revision().is_none());
        assert_eq!(failure.partial.state(), SessionState::Drafted);

        // Revise was never attempted.
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn revise_failure_keeps_draft_and_critique() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new([
            Ok(Completion::text("draft")),
            Ok(Completion::text("feedback")),
            Err(CompletionError::Transport("connection reset".into())),
        ]);
        let failure = RefinePipeline::new(&client, config())
            .run_to_artifact("Q?", None, &ArtifactWriter::new(dir.path()))
            .await
            .unwrap_err();

        assert_eq!(failure.stage(), Some(Stage::Revise));
        assert_eq!(failure.partial.draft(), Some("draft"));
        assert_eq!(failure.partial.critique(), Some("feedback"));
        assert!(failure.partial.revision().is_none());
        assert_eq!(failure.partial.state(), SessionState::Critiqued);
        assert_eq!(client.requests().len(), 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn draft_auth_failure_stops_immediately() {
        let client = ScriptedClient::new([Err(CompletionError::Auth {
            status: 401,
            body: "bad key".into(),
        })]);
        let failure = RefinePipeline::new(&client, config().with_retries(3))
            .run("Q?", None)
            .await
            .unwrap_err();
        assert_eq!(failure.stage(), Some(Stage::Draft));
        assert_eq!(failure.partial.state(), SessionState::Init);
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_retried_when_enabled() {
        let client = ScriptedClient::new([
            Ok(Completion::text("draft")),
            Err(CompletionError::Transport("connection reset".into())),
            Ok(Completion::text("critique")),
            Ok(Completion::text("revision")),
        ]);
        let retry = RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..RetryConfig::with_retries(1)
        };
        let retried = Mutex::new(Vec::new());
        let handler = FnEventHandler::new(|event| {
            if let RefineEvent::StageRetrying { stage, attempt, .. } = event {
                retried.lock().unwrap().push((*stage, *attempt));
            }
        });

        let session = RefinePipeline::new(&client, config().with_retry(retry))
            .with_event_handler(&handler)
            .run("Q?", None)
            .await
            .unwrap();

        assert_eq!(session.revision(), Some("revision"));
        assert_eq!(*retried.lock().unwrap(), vec![(Stage::Critique, 1)]);
        assert_eq!(client.requests().len(), 4);
    }

    #[tokio::test]
    async fn editor_model_used_for_critique_only() {
        let client = ScriptedClient::replying(&["a", "b", "c"]);
        RefinePipeline::new(&client, config().with_editor_model("editor-model"))
            .run("Q?", None)
            .await
            .unwrap();
        let models: Vec<String> = client.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(models, vec!["writer-model", "editor-model", "writer-model"]);
    }

    #[tokio::test]
    async fn usage_accumulates_across_stages() {
        let usage = UsageInfo {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: Some(15),
        };
        let reply = |text: &str| {
            Ok(Completion {
                text: text.to_string(),
                usage: Some(usage.clone()),
            })
        };
        let client = ScriptedClient::new([reply("a"), reply("b"), reply("c")]);
        let session = RefinePipeline::new(&client, config())
            .run("Q?", None)
            .await
            .unwrap();
        assert_eq!(session.usage().calls, 3);
        assert_eq!(session.usage().total_tokens(), 45);
    }

    #[tokio::test]
    async fn events_follow_stage_order() {
        let client = ScriptedClient::replying(&["a", "b", "c"]);
        let log = Mutex::new(Vec::new());
        let handler = FnEventHandler::new(|event| {
            let entry = match event {
                RefineEvent::StageStarted { stage, .. } => format!("start:{stage}"),
                RefineEvent::StageCompleted { stage, output, .. } => {
                    format!("done:{stage}:{output}")
                }
                RefineEvent::Finished { .. } => "finished".to_string(),
                other => format!("{other:?}"),
            };
            log.lock().unwrap().push(entry);
        });

        RefinePipeline::new(&client, config())
            .with_event_handler(&handler)
            .run("Q?", None)
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start:Draft",
                "done:Draft:a",
                "start:Critique",
                "done:Critique:b",
                "start:Revise",
                "done:Revise:c",
                "finished",
            ]
        );
    }

    #[tokio::test]
    async fn advance_steps_one_stage_at_a_time() {
        let client = ScriptedClient::replying(&["a", "b", "c"]);
        let pipeline = RefinePipeline::new(&client, config());
        let mut session = Session::new("Q?", None::<String>);

        assert_eq!(
            pipeline.advance(&mut session).await.unwrap(),
            Some(Stage::Draft)
        );
        assert_eq!(session.state(), SessionState::Drafted);
        assert_eq!(client.requests().len(), 1);

        assert_eq!(
            pipeline.advance(&mut session).await.unwrap(),
            Some(Stage::Critique)
        );
        assert_eq!(
            pipeline.advance(&mut session).await.unwrap(),
            Some(Stage::Revise)
        );
        assert_eq!(pipeline.advance(&mut session).await.unwrap(), None);
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn run_to_artifact_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let client = ScriptedClient::replying(&["A", "B", "C"]);

        let outcome = RefinePipeline::new(&client, config())
            .run_to_artifact("Q?", None, &writer)
            .await
            .unwrap();

        let path = outcome.artifact.unwrap();
        assert_eq!(path, dir.path().join("output.txt"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Initial response: \"A\"\n\nEditor feedback: \"B\"\n\nRevised response: \"C\""
        );
    }

    #[tokio::test]
    async fn failed_run_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let client = ScriptedClient::new([
            Ok(Completion::text("A")),
            Err(CompletionError::MalformedResponse("no choices".into())),
        ]);

        let failure = RefinePipeline::new(&client, config())
            .run_to_artifact("Q?", None, &writer)
            .await
            .unwrap_err();

        assert_eq!(failure.stage(), Some(Stage::Critique));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unwritable_dir_still_returns_session() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("missing").join("nested"));
        let client = ScriptedClient::replying(&["A", "B", "C"]);

        let outcome = RefinePipeline::new(&client, config())
            .run_to_artifact("Q?", None, &writer)
            .await
            .unwrap();

        assert!(matches!(outcome.artifact, Err(ArtifactError::Io { .. })));
        assert_eq!(outcome.session.triple(), Some(("A", "B", "C")));
    }
}
