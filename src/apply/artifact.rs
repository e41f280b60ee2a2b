use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::extract::CandidatePatch;

/// Temporary on-disk copy of a candidate, fed to `git apply`.
///
/// The file is removed when the artifact is dropped, whichever way the
/// candidate's processing ends. [`PatchArtifact::close`] does the same but
/// reports a failed removal.
pub(crate) struct PatchArtifact {
    index: usize,
    file: NamedTempFile,
}

impl PatchArtifact {
    /// ファイル名: fencepatch-{index}-XXXXXX.patch
    pub fn create(dir: &Path, candidate: &CandidatePatch) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("fencepatch-{}-", candidate.index))
            .suffix(".patch")
            .tempfile_in(dir)?;

        file.write_all(candidate.body.as_bytes())?;
        // git apply treats a missing final newline as a truncated patch
        if !candidate.body.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;

        Ok(Self {
            index: candidate.index,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn close(self) {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            warn!(
                index = self.index,
                path = %path.display(),
                error = %e,
                "failed to remove patch artifact"
            );
        }
    }
}
