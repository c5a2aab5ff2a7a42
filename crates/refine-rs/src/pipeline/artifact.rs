//! The on-disk record of a finished session.
//!
//! Each run writes one flat UTF-8 text file holding three labeled, quoted
//! blocks (draft, feedback, revision). Files are never overwritten: the
//! writer tries `output.txt`, then `output1.txt`, `output2.txt`, … and
//! takes the first name that does not exist yet.
//!
//! The text is written to a temp file first and moved into place without
//! clobbering, so if another process claims a name between the probe and the
//! move, probing simply moves on.

use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;
use tracing::{debug, info};

use super::session::{Session, SessionState};
use crate::error::ArtifactError;

const DRAFT_LABEL: &str = "Initial response: \"";
const CRITIQUE_SEPARATOR: &str = "\"\n\nEditor feedback: \"";
const REVISION_SEPARATOR: &str = "\"\n\nRevised response: \"";

/// The three stage outputs of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub draft: String,
    pub critique: String,
    pub revision: String,
}

impl Artifact {
    /// Extract the triple from a revised (or done) session.
    pub fn from_session(session: &Session) -> Result<Self, ArtifactError> {
        if session.state() < SessionState::Revised {
            return Err(ArtifactError::Incomplete(session.state()));
        }
        let (draft, critique, revision) = session
            .triple()
            .ok_or(ArtifactError::Incomplete(session.state()))?;
        Ok(Self {
            draft: draft.to_string(),
            critique: critique.to_string(),
            revision: revision.to_string(),
        })
    }
}

/// Render the artifact text. No trailing newline.
pub fn render_artifact(draft: &str, critique: &str, revision: &str) -> String {
    format!("{DRAFT_LABEL}{draft}{CRITIQUE_SEPARATOR}{critique}{REVISION_SEPARATOR}{revision}\"")
}

/// Recover the triple from artifact text.
///
/// The feedback block is located from the left and the revision block from
/// the right, so quotes and blank lines inside the texts are preserved.
pub fn parse_artifact(text: &str) -> Result<Artifact, ArtifactError> {
    let body = text
        .strip_prefix(DRAFT_LABEL)
        .ok_or_else(|| ArtifactError::Parse("missing \"Initial response\" block".into()))?;
    let body = body
        .strip_suffix('"')
        .ok_or_else(|| ArtifactError::Parse("unterminated \"Revised response\" block".into()))?;

    let (draft, rest) = body
        .split_once(CRITIQUE_SEPARATOR)
        .ok_or_else(|| ArtifactError::Parse("missing \"Editor feedback\" block".into()))?;
    let (critique, revision) = rest
        .rsplit_once(REVISION_SEPARATOR)
        .ok_or_else(|| ArtifactError::Parse("missing \"Revised response\" block".into()))?;

    Ok(Artifact {
        draft: draft.to_string(),
        critique: critique.to_string(),
        revision: revision.to_string(),
    })
}

/// Writes session artifacts into a directory without overwriting earlier runs.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    stem: String,
    extension: String,
}

impl ArtifactWriter {
    /// Writer for `dir/output.txt`, `dir/output1.txt`, ….
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stem: "output".to_string(),
            extension: "txt".to_string(),
        }
    }

    /// Override the file stem (default `output`).
    pub fn with_stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = stem.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Candidate path for probe index `n`: `output.txt` for 0, `output{n}.txt` otherwise.
    fn candidate(&self, n: u64) -> PathBuf {
        let name = if n == 0 {
            format!("{}.{}", self.stem, self.extension)
        } else {
            format!("{}{n}.{}", self.stem, self.extension)
        };
        self.dir.join(name)
    }

    /// First candidate at or after index `from` that does not exist.
    fn probe_from(&self, from: u64) -> (u64, PathBuf) {
        let mut n = from;
        loop {
            let path = self.candidate(n);
            if !path.exists() {
                return (n, path);
            }
            n += 1;
        }
    }

    /// The path the next [`write`](Self::write) would use, as of now.
    pub fn next_free_path(&self) -> PathBuf {
        self.probe_from(0).1
    }

    /// Persist a revised session. Returns the path written.
    ///
    /// The text is staged in a hidden temp file in the target directory and
    /// only then linked under its final name, so a failed write never leaves
    /// a partial artifact holding an `output*.txt` name.
    pub fn write(&self, session: &Session) -> Result<PathBuf, ArtifactError> {
        let artifact = Artifact::from_session(session)?;
        let text = render_artifact(&artifact.draft, &artifact.critique, &artifact.revision);

        let path = self.persist_with(text.as_bytes(), |file, bytes| file.write_all(bytes))?;
        info!(
            "Saved session {} to {} ({} bytes)",
            session.trace_id(),
            path.display(),
            text.len()
        );
        Ok(path)
    }

    fn persist_with(
        &self,
        bytes: &[u8],
        fill: impl FnOnce(&mut File, &[u8]) -> io::Result<()>,
    ) -> Result<PathBuf, ArtifactError> {
        let io_err = |path: &Path, source: io::Error| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Dropping `staged` on any early return deletes the temp file.
        let mut staged = Builder::new()
            .prefix(&format!(".{}-", self.stem))
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| io_err(self.dir.as_path(), e))?;
        fill(staged.as_file_mut(), bytes)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| io_err(staged.path(), e))?;

        let (mut n, mut path) = self.probe_from(0);
        loop {
            match staged.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    debug!("{} claimed concurrently, probing on", path.display());
                    staged = e.file;
                    (n, path) = self.probe_from(n + 1);
                }
                Err(e) => return Err(io_err(path.as_path(), e.error)),
            }
        }
    }
}
