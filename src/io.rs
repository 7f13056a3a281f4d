//! JSON embedding files and report output.
//!
//! Embedding files use the record layout
//!
//! ```json
//! {
//!   "name": "bert-dialogue",
//!   "dimension": 768,
//!   "count": 100,
//!   "consecutive_similarity": 0.94,
//!   "vectors": [[0.01, ...], ...]
//! }
//! ```
//!
//! `consecutive_similarity` is whatever the producer measured and is optional.
//! The header fields are checked against the vectors on load.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AttractorError, Result};
use crate::pipeline::PipelineReport;
use crate::sequence::VectorSequence;

/// On-disk embedding record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingFile {
    pub name: String,
    pub dimension: usize,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_similarity: Option<f64>,
    pub vectors: Vec<Vec<f32>>,
}

impl EmbeddingFile {
    /// Record for an existing sequence.
    pub fn from_sequence(name: impl Into<String>, seq: &VectorSequence) -> Self {
        Self {
            name: name.into(),
            dimension: seq.dimension(),
            count: seq.len(),
            consecutive_similarity: None,
            vectors: seq.to_vecs(),
        }
    }

    /// Validate the header and build the sequence.
    ///
    /// # Errors
    ///
    /// [`AttractorError::Configuration`] when `count` disagrees with the
    /// number of vectors, [`AttractorError::DimensionMismatch`] when a vector
    /// disagrees with `dimension`, plus the usual sequence validation.
    pub fn to_sequence(&self) -> Result<VectorSequence> {
        if self.count != self.vectors.len() {
            return Err(AttractorError::config(format!(
                "embedding file '{}' declares {} vectors but contains {}",
                self.name,
                self.count,
                self.vectors.len()
            )));
        }
        if let Some((index, v)) = self
            .vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimension)
        {
            return Err(AttractorError::DimensionMismatch {
                index,
                expected: self.dimension,
                actual: v.len(),
            });
        }
        VectorSequence::new(self.vectors.clone())
    }
}

/// Read an embedding file and return the record with its validated sequence.
pub fn load_embeddings(path: impl AsRef<Path>) -> Result<(EmbeddingFile, VectorSequence)> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let file: EmbeddingFile = serde_json::from_slice(&bytes)?;
    let seq = file.to_sequence()?;
    debug!(path = %path.display(), n = seq.len(), d = seq.dimension(), "loaded embeddings");
    Ok((file, seq))
}

/// Write JSON to `path` through a temporary sibling, then rename.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Write an embedding record.
pub fn save_embeddings(path: impl AsRef<Path>, file: &EmbeddingFile) -> Result<()> {
    write_atomic(path.as_ref(), &serde_json::to_vec(file)?)
}

/// Write a pipeline report as pretty JSON.
pub fn write_report(path: impl AsRef<Path>, report: &PipelineReport) -> Result<()> {
    let path = path.as_ref();
    write_atomic(path, report.to_json()?.as_bytes())?;
    debug!(path = %path.display(), "wrote report");
    Ok(())
}

/// Read a report written by [`write_report`].
pub fn read_report(path: impl AsRef<Path>) -> Result<PipelineReport> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets;
    use crate::pipeline::{self, PipelineConfig};

    #[test]
    fn embeddings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drift.json");
        let seq = datasets::conversational_drift(12, 8, 0.05, 1).unwrap();

        let mut file = EmbeddingFile::from_sequence("drift", &seq);
        file.consecutive_similarity = Some(0.99);
        save_embeddings(&path, &file).unwrap();

        let (loaded, loaded_seq) = load_embeddings(&path).unwrap();
        assert_eq!(loaded.name, "drift");
        assert_eq!(loaded.consecutive_similarity, Some(0.99));
        assert_eq!(loaded_seq, seq);
    }

    #[test]
    fn optional_similarity_may_be_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.json");
        fs::write(
            &path,
            r#"{"name":"tiny","dimension":2,"count":2,"vectors":[[1.0,0.0],[0.5,0.5]]}"#,
        )
        .unwrap();
        let (file, seq) = load_embeddings(&path).unwrap();
        assert!(file.consecutive_similarity.is_none());
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn header_mismatches_rejected() {
        let bad_count = EmbeddingFile {
            name: "x".into(),
            dimension: 2,
            count: 3,
            consecutive_similarity: None,
            vectors: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        };
        assert!(matches!(bad_count.to_sequence(), Err(AttractorError::Configuration(_))));

        let bad_dim = EmbeddingFile {
            count: 2,
            dimension: 3,
            ..bad_count
        };
        assert!(matches!(
            bad_dim.to_sequence(),
            Err(AttractorError::DimensionMismatch {
                index: 0,
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_embeddings(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, AttractorError::Io(_)));
    }

    #[test]
    fn report_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        let seq = datasets::conversational_drift(40, 16, 0.05, 3).unwrap();
        let report = pipeline::run(&seq, &PipelineConfig::default()).unwrap();

        write_report(&path, &report).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(read_report(&path).unwrap(), report);
    }
}
