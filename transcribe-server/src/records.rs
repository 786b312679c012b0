use std::collections::HashSet;

use audio_blob_store::BlobId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::whisper::Transcript;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptionRecord {
    pub id: Uuid,
    pub audio_path: BlobId,
    pub status: TranscriptionStatus,
    pub text: Option<String>,
    pub language: Option<String>,
    pub duration: Option<f64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    pub status: Option<TranscriptionStatus>,
    pub language: Option<String>,
    /// Case-insensitive substring of the blob identifier.
    pub audio_path: Option<String>,
}

impl RecordFilter {
    fn matches(&self, record: &TranscriptionRecord) -> bool {
        if self.status.is_some_and(|status| status != record.status) {
            return false;
        }
        if let Some(language) = &self.language {
            if record.language.as_deref() != Some(language.as_str()) {
                return false;
            }
        }
        match &self.audio_path {
            Some(fragment) => record
                .audio_path
                .as_str()
                .to_lowercase()
                .contains(&fragment.to_lowercase()),
            None => true,
        }
    }
}

/// In-memory transcription records. Every stored blob that should survive
/// reconciliation is referenced by exactly one record here.
#[derive(Default)]
pub struct RecordRegistry {
    records: DashMap<Uuid, TranscriptionRecord>,
}

impl RecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, audio_path: BlobId) -> TranscriptionRecord {
        let now = Utc::now();
        let record = TranscriptionRecord {
            id: Uuid::new_v4(),
            audio_path,
            status: TranscriptionStatus::Pending,
            text: None,
            language: None,
            duration: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(record.id, record.clone());
        record
    }

    pub fn get(&self, id: &Uuid) -> Option<TranscriptionRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    pub fn complete(&self, id: &Uuid, transcript: Transcript) -> Option<TranscriptionRecord> {
        self.records.get_mut(id).map(|mut entry| {
            let record = entry.value_mut();
            record.status = TranscriptionStatus::Completed;
            record.text = Some(transcript.text);
            record.language = transcript.language;
            record.duration = transcript.duration;
            record.error = None;
            record.updated_at = Utc::now();
            record.clone()
        })
    }

    pub fn fail(&self, id: &Uuid, error: String) -> Option<TranscriptionRecord> {
        self.records.get_mut(id).map(|mut entry| {
            let record = entry.value_mut();
            record.status = TranscriptionStatus::Failed;
            record.error = Some(error);
            record.updated_at = Utc::now();
            record.clone()
        })
    }

    pub fn remove(&self, id: &Uuid) -> Option<TranscriptionRecord> {
        self.records.remove(id).map(|(_, record)| record)
    }

    /// Matching records, newest first, after skipping `offset` and keeping
    /// at most `limit`.
    pub fn list(&self, filter: &RecordFilter, offset: usize, limit: usize) -> Vec<TranscriptionRecord> {
        let mut matching: Vec<TranscriptionRecord> = self
            .records
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        let page: Vec<TranscriptionRecord> = matching.into_iter().skip(offset).take(limit).collect();
        tracing::debug!("Listed {} transcriptions (offset={}, limit={})", page.len(), offset, limit);
        page
    }

    /// Blob identifiers still referenced by some record.
    pub fn referenced_paths(&self) -> HashSet<BlobId> {
        self.records.iter().map(|entry| entry.value().audio_path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
