//! Request/response DTOs for the JSON surface.
//!
//! Conventions:
//! - `*Request`  → deserialized from client JSON body or query params
//! - `*Response` / `*View` → serialized to client JSON
//! - Field validation is expressed via `validator` derive macros; rules that
//!   span fields (password confirmation) are checked in the handler first

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::analysis::emotion::{Analysis, Emotion, MoodBand};
use crate::analysis::stats::{self, AggregateStats, TrendPoint, TREND_LEN};
use crate::models::entry::DiaryEntry;
use crate::models::identity::{Identity, ProfileResponse};
use crate::recommendations::{recommend, Recommendation};

// ============================================================================
// Common
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Auth
// ============================================================================

pub const MIN_PASSWORD_CHARS: usize = 6;

/// POST /api/auth/register
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(length(max = 50, message = "Name too long"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 254, message = "Email too long"))]
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// POST /api/auth/login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// POST /api/auth/resend
#[derive(Debug, Deserialize, Validate)]
pub struct ResendRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    SignedIn,
    ConfirmationRequired,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub outcome: AuthOutcome,
    pub user: ProfileResponse,
    /// Screen the client should show next.
    pub redirect: &'static str,
}

impl AuthResponse {
    pub fn signed_in(identity: &Identity) -> Self {
        Self {
            outcome: AuthOutcome::SignedIn,
            user: identity.into(),
            redirect: "/",
        }
    }

    pub fn confirmation_required(identity: &Identity) -> Self {
        Self {
            outcome: AuthOutcome::ConfirmationRequired,
            user: identity.into(),
            redirect: "/login",
        }
    }
}

// ============================================================================
// View routing
// ============================================================================

/// POST /api/view/navigate
#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub path: String,
}

// ============================================================================
// Dashboard
// ============================================================================

pub const DASHBOARD_RECENT: usize = 5;
pub const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Serialize)]
pub struct EntrySummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub preview: String,
    pub mood_score: u8,
    pub primary_emotion: Emotion,
    pub band: MoodBand,
    pub emoji: &'static str,
}

impl From<&DiaryEntry> for EntrySummary {
    fn from(entry: &DiaryEntry) -> Self {
        let band = MoodBand::for_score(entry.mood_score);
        Self {
            id: entry.id,
            created_at: entry.created_at,
            preview: entry.preview(PREVIEW_CHARS),
            mood_score: entry.mood_score,
            primary_emotion: entry.primary_emotion,
            band,
            emoji: band.emoji(),
        }
    }
}

/// GET /api/dashboard
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub greeting_name: String,
    pub stats: AggregateStats,
    pub recent_entries: Vec<EntrySummary>,
}

impl DashboardResponse {
    /// `entries` must be the owner's full collection, newest first.
    pub fn build(identity: &Identity, entries: &[DiaryEntry], now: DateTime<Utc>) -> Self {
        Self {
            greeting_name: identity.display_name().to_string(),
            stats: stats::aggregate(entries, now),
            recent_entries: entries
                .iter()
                .take(DASHBOARD_RECENT)
                .map(EntrySummary::from)
                .collect(),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One entry with its stored analysis, the matching playlist and the owner's
/// aggregates. Everything is `null` when the owner has no entries yet.
#[derive(Debug, Serialize)]
pub struct ResultsView {
    pub entry: Option<DiaryEntry>,
    pub analysis: Option<Analysis>,
    pub band: Option<MoodBand>,
    pub emoji: Option<&'static str>,
    pub recommendation: Option<Recommendation>,
    /// `None` when the collection could not be loaded after a write.
    pub stats: Option<AggregateStats>,
    /// Empty until the owner has more than one entry.
    pub trend: Vec<TrendPoint>,
}

impl ResultsView {
    pub fn build(
        entry: Option<DiaryEntry>,
        collection: Option<&[DiaryEntry]>,
        now: DateTime<Utc>,
    ) -> Self {
        let analysis = entry.as_ref().map(DiaryEntry::analysis);
        let band = analysis.map(|a| MoodBand::for_score(a.mood_score));
        Self {
            entry,
            analysis,
            band,
            emoji: band.map(MoodBand::emoji),
            recommendation: analysis.map(|a| recommend(a.primary_emotion)),
            stats: collection.map(|all| stats::aggregate(all, now)),
            trend: collection
                .filter(|all| all.len() > 1)
                .map(|all| stats::trend(all, TREND_LEN))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendations::Playlist;

    fn entry(content: &str, mood_score: u8, primary_emotion: Emotion) -> DiaryEntry {
        DiaryEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            content: content.into(),
            mood_score,
            primary_emotion,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_register_request_validation() {
        let req = RegisterRequest {
            name: "민지".into(),
            email: "not-an-email".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn test_results_view_uses_stored_analysis() {
        // Stored score disagrees with what the text would score today.
        let stored = entry("오늘 너무 슬픔이 가득했다", 90, Emotion::Positive);
        let all = vec![stored.clone()];
        let view = ResultsView::build(Some(stored), Some(all.as_slice()), Utc::now());

        assert_eq!(view.analysis.unwrap().mood_score, 90);
        assert_eq!(view.band, Some(MoodBand::Great));
        assert_eq!(view.recommendation.unwrap().playlist, Playlist::Happy);
        assert_eq!(view.stats.unwrap().total, 1);
        // A single entry has no trend to draw.
        assert!(view.trend.is_empty());
    }

    #[test]
    fn test_results_view_trend_needs_two_entries() {
        let all = vec![
            entry("오늘은 행복했다 정말로", 100, Emotion::Positive),
            entry("오늘은 슬펐다 정말로", 0, Emotion::Negative),
        ];
        let view = ResultsView::build(all.first().cloned(), Some(all.as_slice()), Utc::now());
        assert_eq!(view.trend.len(), 2);

        let view = ResultsView::build(all.first().cloned(), Some(&all[..1]), Utc::now());
        assert!(view.trend.is_empty());
    }

    #[test]
    fn test_empty_results_view() {
        let view = ResultsView::build(None, Some(&[][..]), Utc::now());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["entry"].is_null());
        assert!(json["recommendation"].is_null());
        assert_eq!(json["stats"]["total"], 0);
        assert_eq!(json["trend"], serde_json::json!([]));
    }

    #[test]
    fn test_dashboard_takes_five_previews() {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            name: None,
            email_confirmed_at: None,
        };
        let long = "가".repeat(80);
        let entries: Vec<_> = (0..7).map(|_| entry(&long, 50, Emotion::Neutral)).collect();
        let dashboard = DashboardResponse::build(&identity, &entries, Utc::now());

        assert_eq!(dashboard.greeting_name, "사용자");
        assert_eq!(dashboard.stats.total, 7);
        assert_eq!(dashboard.recent_entries.len(), 5);
        assert_eq!(dashboard.recent_entries[0].preview.chars().count(), 53);
        assert!(dashboard.recent_entries[0].preview.ends_with("..."));
    }
}
