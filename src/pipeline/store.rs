// Durable storage for stage artifacts and run records

use super::run::PipelineRun;
use super::stage::StageName;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const RUNS_DIR: &str = "runs";
const RUN_FILE: &str = "run.json";
const ARTIFACTS_DIR: &str = "artifacts";

/// Output of one stage execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    pub stage: StageName,
    pub text: String,
    pub generated_at: DateTime<Utc>,
    /// Hash of the context the artifact was generated from
    pub context_hash: String,
}

impl StageArtifact {
    pub fn new(stage: StageName, text: impl Into<String>, context_hash: impl Into<String>) -> Self {
        Self {
            stage,
            text: text.into(),
            generated_at: Utc::now(),
            context_hash: context_hash.into(),
        }
    }
}

/// Keyed storage for artifacts and run records
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, run_id: &str, stage: StageName, artifact: &StageArtifact) -> Result<()>;

    async fn get(&self, run_id: &str, stage: StageName) -> Result<Option<StageArtifact>>;

    async fn save_run(&self, run: &PipelineRun) -> Result<()>;

    async fn load_run(&self, run_id: &str) -> Result<Option<PipelineRun>>;

    /// Drop every artifact of a run, keeping its record
    async fn clear_artifacts(&self, run_id: &str) -> Result<()>;

    async fn latest_completed_stage(&self, run_id: &str) -> Result<Option<StageName>> {
        Ok(self
            .load_run(run_id)
            .await?
            .and_then(|run| run.latest_completed_stage()))
    }
}

/// Stores JSON documents under `<root>/runs/<run_id>/`.
///
/// Every write lands in a sibling temp file first and is renamed into place.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(RUNS_DIR).join(run_id)
    }

    pub fn artifact_path(&self, run_id: &str, stage: StageName) -> PathBuf {
        self.run_dir(run_id)
            .join(ARTIFACTS_DIR)
            .join(format!("{}.json", stage.slug()))
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(RUN_FILE)
    }

    async fn write_atomic<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        let dir = path
            .parent()
            .ok_or_else(|| Error::other(format!("no parent directory for {}", path.display())))?;
        fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::persistence(dir, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));
        if let Err(e) = fs::write(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::persistence(&tmp_path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::persistence(path, e));
        }
        debug!(path = %path.display(), bytes = data.len(), "persisted");
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::persistence(path, e)),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, run_id: &str, stage: StageName, artifact: &StageArtifact) -> Result<()> {
        self.write_atomic(&self.artifact_path(run_id, stage), artifact)
            .await
    }

    async fn get(&self, run_id: &str, stage: StageName) -> Result<Option<StageArtifact>> {
        self.read_json(&self.artifact_path(run_id, stage)).await
    }

    async fn save_run(&self, run: &PipelineRun) -> Result<()> {
        self.write_atomic(&self.run_path(&run.run_id), run).await
    }

    async fn load_run(&self, run_id: &str) -> Result<Option<PipelineRun>> {
        self.read_json(&self.run_path(run_id)).await
    }

    async fn clear_artifacts(&self, run_id: &str) -> Result<()> {
        let dir = self.run_dir(run_id).join(ARTIFACTS_DIR);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::persistence(dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::run::StageState;
    use crate::pipeline::stage::TestKind;
    use tempfile::TempDir;

    fn all_files(dir: &Path) -> Vec<PathBuf> {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    #[tokio::test]
    async fn test_put_and_get_artifact() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let stage = StageName::Generate(TestKind::Flow);
        let artifact = StageArtifact::new(stage, "test('x', async () => {})", "hash");

        store.put("run-1", stage, &artifact).await.unwrap();
        let loaded = store.get("run-1", stage).await.unwrap().unwrap();
        assert_eq!(loaded, artifact);
        assert!(store
            .artifact_path("run-1", stage)
            .ends_with("runs/run-1/artifacts/generate-flow.json"));
    }

    #[tokio::test]
    async fn test_missing_entries_are_none() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        assert!(store.get("nope", StageName::UserFlows).await.unwrap().is_none());
        assert!(store.load_run("nope").await.unwrap().is_none());
        assert!(store.latest_completed_stage("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_leave_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let mut run = PipelineRun::new("run-2", "repo", "h");
        store.save_run(&run).await.unwrap();
        run.set_state(StageName::Analyze, StageState::Completed);
        store.save_run(&run).await.unwrap();
        store
            .put("run-2", StageName::Analyze, &StageArtifact::new(StageName::Analyze, "{}", "h"))
            .await
            .unwrap();

        let files = all_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| !p.to_string_lossy().ends_with(".tmp")));
        assert_eq!(
            store.latest_completed_stage("run-2").await.unwrap(),
            Some(StageName::Analyze)
        );
    }

    #[tokio::test]
    async fn test_clear_artifacts_keeps_run() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        store.save_run(&PipelineRun::new("run-5", "repo", "h")).await.unwrap();
        store
            .put("run-5", StageName::UserFlows, &StageArtifact::new(StageName::UserFlows, "## Flow: a", "h"))
            .await
            .unwrap();

        store.clear_artifacts("run-5").await.unwrap();
        store.clear_artifacts("run-5").await.unwrap();
        assert!(store.get("run-5", StageName::UserFlows).await.unwrap().is_none());
        assert!(store.load_run("run-5").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unwritable_root_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("state");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = FsArtifactStore::new(&blocker);

        let err = store
            .save_run(&PipelineRun::new("run-3", "repo", "h"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_json_error() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let path = store.run_dir("run-4").join("run.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(matches!(store.load_run("run-4").await, Err(Error::Json(_))));
    }
}
