use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

pub const ARTIFACT_MIME_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Bytes,
    /// Download name, extension included
    pub filename: String,
    pub mime_type: &'static str,
    pub created_at: DateTime<Utc>,
}

/// Finished audio files, reachable through revocable handles
#[derive(Default)]
pub struct ArtifactRepository {
    artifacts: RwLock<HashMap<Uuid, Artifact>>,
}

impl ArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, data: Bytes, filename: &str) -> Uuid {
        let handle = Uuid::new_v4();
        let artifact = Artifact {
            data,
            filename: download_name(filename),
            mime_type: ARTIFACT_MIME_TYPE,
            created_at: Utc::now(),
        };
        tracing::debug!(
            handle = %handle,
            filename = %artifact.filename,
            size_bytes = artifact.data.len(),
            "Artifact stored"
        );
        self.artifacts.write().insert(handle, artifact);
        handle
    }

    pub fn get(&self, handle: Uuid) -> Option<Artifact> {
        self.artifacts.read().get(&handle).cloned()
    }

    /// Returns false when the handle was unknown or already revoked
    pub fn revoke(&self, handle: Uuid) -> bool {
        let revoked = self.artifacts.write().remove(&handle).is_some();
        if revoked {
            tracing::debug!(handle = %handle, "Artifact revoked");
        }
        revoked
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn download_name(filename: &str) -> String {
    if filename.to_lowercase().ends_with(".mp3") {
        filename.to_string()
    } else {
        format!("{}.mp3", filename)
    }
}
