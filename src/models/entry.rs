use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::analysis::emotion::{Analysis, Emotion};

/// One stored journal record. Field names follow the hosted `journal_entries` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    #[serde(default, deserialize_with = "stored_score")]
    pub mood_score: u8,
    #[serde(default)]
    pub primary_emotion: Emotion,
    pub created_at: DateTime<Utc>,
}

/// Missing or null scores read as 0; anything else is rounded into 0..=100.
fn stored_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let score = Option::<f64>::deserialize(deserializer)?;
    Ok(score
        .filter(|s| s.is_finite())
        .map(|s| s.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0))
}

impl DiaryEntry {
    /// The analysis stored with the entry at write time.
    pub fn analysis(&self) -> Analysis {
        Analysis {
            mood_score: self.mood_score,
            primary_emotion: self.primary_emotion,
        }
    }

    /// First `max_chars` characters, with an ellipsis when the content is longer.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

/// Row sent to the record store on insert. `id` is assigned by the store.
#[derive(Debug, Clone, Serialize)]
pub struct NewEntry {
    pub user_id: Uuid,
    pub content: String,
    pub mood_score: u8,
    pub primary_emotion: Emotion,
    pub created_at: DateTime<Utc>,
}

impl NewEntry {
    pub fn new(user_id: Uuid, content: impl Into<String>, analysis: Analysis) -> Self {
        Self {
            user_id,
            content: content.into(),
            mood_score: analysis.mood_score,
            primary_emotion: analysis.primary_emotion,
            created_at: Utc::now(),
        }
    }
}

/// Owner-scoped select, always newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryQuery {
    pub owner: Uuid,
    pub limit: Option<usize>,
}

/// POST /api/entries
#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub content: String,
}

/// GET /api/entries
#[derive(Debug, Deserialize)]
pub struct EntryListQuery {
    pub limit: Option<usize>,
}

/// GET /api/results
#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub entry_id: Option<Uuid>,
}
