use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::analysis::emotion::analyze;
use crate::backend::RecordStore;
use crate::error::{EntryError, ReadError, StoreError, ValidationError, WriteError};
use crate::models::entry::{DiaryEntry, EntryQuery, NewEntry};

pub const MIN_CONTENT_CHARS: usize = 10;
/// Shown as a counter in the entry form; longer entries are still accepted.
pub const ADVISORY_MAX_CONTENT_CHARS: usize = 1000;

/// Trim `content` and check it is long enough to be stored.
pub fn validate_content(content: &str) -> Result<&str, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if trimmed.chars().count() < MIN_CONTENT_CHARS {
        return Err(ValidationError::ContentTooShort {
            min: MIN_CONTENT_CHARS,
        });
    }
    Ok(trimmed)
}

/// Owner-scoped access to diary entries in the record store.
#[derive(Clone)]
pub struct EntryRepository {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

enum Bounded<T> {
    Done(Result<T, StoreError>),
    TimedOut,
}

async fn bounded<T>(limit: Duration, call: impl Future<Output = Result<T, StoreError>>) -> Bounded<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Bounded::Done(result),
        Err(_) => Bounded::TimedOut,
    }
}

impl EntryRepository {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Validate, score and store one entry. Exactly one insert is attempted,
    /// and none when validation fails.
    pub async fn create(&self, owner: Uuid, content: &str) -> Result<DiaryEntry, EntryError> {
        let content = validate_content(content)?;
        let chars = content.chars().count();
        if chars > ADVISORY_MAX_CONTENT_CHARS {
            tracing::debug!(user_id = %owner, chars, "Entry longer than the advisory limit");
        }

        let analysis = analyze(content);
        let row = NewEntry::new(owner, content, analysis);
        match bounded(self.timeout, self.store.insert_entry(row)).await {
            Bounded::Done(Ok(entry)) => {
                tracing::info!(
                    user_id = %owner,
                    entry_id = %entry.id,
                    mood_score = entry.mood_score,
                    emotion = entry.primary_emotion.label(),
                    "Diary entry stored"
                );
                Ok(entry)
            }
            Bounded::Done(Err(e)) => Err(WriteError::Store(e).into()),
            Bounded::TimedOut => Err(WriteError::Timeout.into()),
        }
    }

    /// Entries of `owner`, newest first.
    pub async fn list_by_owner(
        &self,
        owner: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<DiaryEntry>, ReadError> {
        let query = EntryQuery { owner, limit };
        match bounded(self.timeout, self.store.select_entries(query)).await {
            Bounded::Done(Ok(entries)) => Ok(entries),
            Bounded::Done(Err(e)) => Err(ReadError::Store(e)),
            Bounded::TimedOut => Err(ReadError::Timeout),
        }
    }

    pub async fn most_recent(&self, owner: Uuid) -> Result<Option<DiaryEntry>, ReadError> {
        Ok(self.list_by_owner(owner, Some(1)).await?.into_iter().next())
    }
}
