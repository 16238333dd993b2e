use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use estimator_core::{ProjectId, WorkflowError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub const QUESTIONS_FILE: &str = "QUESTIONS.json";
pub const ASSESS_RESPONSE_FILE: &str = "ASSESS_RESPONSE.json";
pub const QNA_RESPONSE_FILE: &str = "QNA_RESPONSE.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact I/O failed for `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact `{path}` is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("artifact could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        WorkflowError::Internal(error.to_string())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { path: path.to_path_buf(), source }
}

/// Per-project JSON artifacts under `{root}/{project_id}/`. Writes go to a
/// temp file in the same directory and are renamed into place.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, project_id: &ProjectId) -> PathBuf {
        self.root.join(project_id.as_str())
    }

    pub fn artifact_path(&self, project_id: &ProjectId, file: &str) -> PathBuf {
        self.project_dir(project_id).join(file)
    }

    pub async fn write_json<T: Serialize>(
        &self,
        project_id: &ProjectId,
        file: &str,
        value: &T,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.project_dir(project_id);
        tokio::fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

        let bytes = serde_json::to_vec_pretty(value)?;
        let path = dir.join(file);
        let temp = dir.join(format!(".{file}.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&temp, &bytes).await.map_err(io_error(&temp))?;
        if let Err(source) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StoreError::Io { path, source });
        }
        Ok(path)
    }

    /// `None` when the artifact has not been written.
    pub async fn read_json<T: DeserializeOwned>(
        &self,
        project_id: &ProjectId,
        file: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = self.artifact_path(project_id, file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    pub async fn remove_artifact(
        &self,
        project_id: &ProjectId,
        file: &str,
    ) -> Result<(), StoreError> {
        let path = self.artifact_path(project_id, file);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Removes the whole project directory; `false` when there was none.
    pub async fn remove_project(&self, project_id: &ProjectId) -> Result<bool, StoreError> {
        let dir = self.project_dir(project_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path: dir, source }),
        }
    }
}
