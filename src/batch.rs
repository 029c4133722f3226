//! Batch processing from a JSON manifest.
//!
//! ```json
//! { "inputs": [
//!     { "name": "ch3", "content": "ch3.pdf",
//!       "standard": "Class 6", "subject": "Science", "chapter": "Plants" },
//!     { "name": "notes", "content": "p1.jpg, p2.jpg", "type": "images",
//!       "standard": "Class 7", "subject": "History", "chapter": "Empires" }
//! ] }
//! ```
//!
//! Items are independent: one that cannot be resolved is reported as failed
//! and the rest still run.

use crate::error::StudyKitError;
use crate::material::{SourceMaterial, TargetMetadata};
use crate::output::WorkflowOutcome;
use crate::workflow::Workflow;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Parsed batch manifest.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchManifest {
    pub inputs: Vec<BatchItem>,
}

/// One request in a manifest.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchItem {
    pub name: String,
    /// Path or URL, or a comma-separated image list.
    pub content: String,
    pub standard: String,
    pub subject: String,
    pub chapter: String,
    /// Declared `"pdf"` or `"images"`; checked against what `content` resolves to.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl BatchItem {
    pub fn sources(&self) -> Vec<&str> {
        self.content
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn target(&self) -> TargetMetadata {
        TargetMetadata::new(&self.standard, &self.subject, &self.chapter)
    }
}

impl BatchManifest {
    pub fn from_json(json: &str, origin: &Path) -> Result<Self, StudyKitError> {
        let manifest: BatchManifest =
            serde_json::from_str(json).map_err(|e| StudyKitError::InvalidManifest {
                path: origin.to_path_buf(),
                detail: e.to_string(),
            })?;
        if manifest.inputs.is_empty() {
            return Err(StudyKitError::InvalidManifest {
                path: origin.to_path_buf(),
                detail: "no inputs".to_string(),
            });
        }
        Ok(manifest)
    }

    pub async fn load(path: &Path) -> Result<Self, StudyKitError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StudyKitError::InvalidManifest {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        Self::from_json(&json, path)
    }
}

/// Result of one manifest item.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub name: String,
    pub success: bool,
    /// Set when the item reached the workflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WorkflowOutcome>,
    /// Set when the item could not be resolved into material.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    fn processed(name: String, outcome: WorkflowOutcome) -> Self {
        Self {
            name,
            success: outcome.success,
            outcome: Some(outcome),
            error: None,
        }
    }

    fn rejected(name: String, error: String) -> Self {
        Self {
            name,
            success: false,
            outcome: None,
            error: Some(error),
        }
    }
}

/// Run every item, `concurrency` at a time. Results keep manifest order.
pub async fn run_batch(
    workflow: &Workflow,
    manifest: &BatchManifest,
    concurrency: usize,
    download_timeout_secs: u64,
) -> Vec<BatchResult> {
    let total = manifest.inputs.len();
    info!("Batch: {} item(s), concurrency {}", total, concurrency);

    let mut results: Vec<(usize, BatchResult)> =
        stream::iter(manifest.inputs.iter().enumerate().map(|(idx, item)| async move {
            let result = run_item(workflow, item, download_timeout_secs).await;
            info!(
                "Batch item {}/{} '{}': {}",
                idx + 1,
                total,
                item.name,
                if result.success { "ok" } else { "failed" }
            );
            (idx, result)
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, r)| r).collect()
}

async fn run_item(workflow: &Workflow, item: &BatchItem, download_timeout_secs: u64) -> BatchResult {
    let name = item.name.clone();
    let material = match resolve_item(item, download_timeout_secs).await {
        Ok(m) => m,
        Err(e) => {
            warn!("Batch item '{}' rejected: {}", item.name, e);
            return BatchResult::rejected(name, e.to_string());
        }
    };
    let target = item.target();
    let outcome = workflow
        .process_content_until(&material, &target, std::future::pending())
        .await;
    BatchResult::processed(name, outcome)
}

async fn resolve_item(
    item: &BatchItem,
    download_timeout_secs: u64,
) -> Result<SourceMaterial, StudyKitError> {
    item.target().validate()?;
    let material = SourceMaterial::resolve(item.sources().as_slice(), download_timeout_secs).await?;
    if let Some(ref declared) = item.content_type {
        let declared = declared.trim().to_ascii_lowercase();
        if declared != material.content_type() {
            return Err(StudyKitError::MixedSources {
                detail: format!(
                    "declared type '{}' but content resolved to {}",
                    declared,
                    material.content_type()
                ),
            });
        }
    }
    Ok(material)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_with_optional_type() {
        let json = r#"{"inputs":[
            {"name":"a","content":"a.pdf","standard":"Class 6","subject":"Science","chapter":"Plants"},
            {"name":"b","content":"p1.png, p2.png ,","type":"images",
             "standard":"Class 7","subject":"History","chapter":"Empires"}
        ]}"#;
        let m = BatchManifest::from_json(json, Path::new("m.json")).unwrap();
        assert_eq!(m.inputs.len(), 2);
        assert_eq!(m.inputs[0].content_type, None);
        assert_eq!(m.inputs[1].content_type.as_deref(), Some("images"));
        assert_eq!(m.inputs[1].sources(), vec!["p1.png", "p2.png"]);
    }

    #[test]
    fn empty_manifest_is_invalid() {
        let err = BatchManifest::from_json(r#"{"inputs":[]}"#, Path::new("m.json")).unwrap_err();
        assert!(matches!(err, StudyKitError::InvalidManifest { .. }));
    }

    #[test]
    fn missing_field_is_invalid() {
        let err = BatchManifest::from_json(r#"{"inputs":[{"name":"a"}]}"#, Path::new("m.json"))
            .unwrap_err();
        assert!(err.to_string().contains("m.json"));
    }

    #[tokio::test]
    async fn declared_type_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("doc.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n%fake\n").unwrap();
        let item = BatchItem {
            name: "x".into(),
            content: pdf.display().to_string(),
            standard: "Class 6".into(),
            subject: "Science".into(),
            chapter: "Plants".into(),
            content_type: Some("images".into()),
        };
        let err = resolve_item(&item, 5).await.unwrap_err();
        assert!(err.to_string().contains("declared type 'images'"));
    }

    #[tokio::test]
    async fn missing_file_is_rejected_not_fatal() {
        let item = BatchItem {
            name: "gone".into(),
            content: "/definitely/not/here.pdf".into(),
            standard: "Class 6".into(),
            subject: "Science".into(),
            chapter: "Plants".into(),
            content_type: None,
        };
        let err = resolve_item(&item, 5).await.unwrap_err();
        assert!(matches!(err, StudyKitError::FileNotFound { .. }));
    }
}
