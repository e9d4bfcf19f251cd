use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::emotion::{Emotion, MoodBand};
use crate::models::entry::DiaryEntry;

/// Length of the trailing "this week" window.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// How many entries the results trend shows.
pub const TREND_LEN: usize = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub total: usize,
    pub recent: usize,
    pub average_mood: u8,
}

pub fn aggregate(entries: &[DiaryEntry], now: DateTime<Utc>) -> AggregateStats {
    let total = entries.len();
    let window_start = now - Duration::days(RECENT_WINDOW_DAYS);
    let recent = entries
        .iter()
        .filter(|e| e.created_at > window_start)
        .count();

    let average_mood = if total == 0 {
        0
    } else {
        let sum: u64 = entries.iter().map(|e| u64::from(e.mood_score)).sum();
        (sum as f64 / total as f64).round() as u8
    };

    AggregateStats {
        total,
        recent,
        average_mood,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub entry_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub mood_score: u8,
    pub primary_emotion: Emotion,
    pub band: MoodBand,
    pub emoji: &'static str,
}

/// The first `limit` entries of a newest-first collection, as trend points.
pub fn trend(entries: &[DiaryEntry], limit: usize) -> Vec<TrendPoint> {
    entries
        .iter()
        .take(limit)
        .map(|e| {
            let band = MoodBand::for_score(e.mood_score);
            TrendPoint {
                entry_id: e.id,
                created_at: e.created_at,
                mood_score: e.mood_score,
                primary_emotion: e.primary_emotion,
                band,
                emoji: band.emoji(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(score: u8, created_at: DateTime<Utc>) -> DiaryEntry {
        DiaryEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            content: "diary content".into(),
            mood_score: score,
            primary_emotion: Emotion::Neutral,
            created_at,
        }
    }

    #[test]
    fn test_empty_collection() {
        let stats = aggregate(&[], Utc::now());
        assert_eq!(stats, AggregateStats { total: 0, recent: 0, average_mood: 0 });
    }

    #[test]
    fn test_recent_window_is_strict() {
        let now = Utc::now();
        let entries = vec![
            entry(80, now - Duration::hours(1)),
            entry(60, now - Duration::days(6)),
            entry(40, now - Duration::days(7)),
            entry(20, now - Duration::days(30)),
        ];
        let stats = aggregate(&entries, now);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.recent, 2);
        assert_eq!(stats.average_mood, 50);
    }

    #[test]
    fn test_average_rounds_half_up() {
        let now = Utc::now();
        // (50 + 51) / 2 = 50.5 -> 51
        let entries = vec![entry(50, now), entry(51, now)];
        assert_eq!(aggregate(&entries, now).average_mood, 51);
        // (0 + 0 + 100) / 3 = 33.3 -> 33
        let entries = vec![entry(0, now), entry(0, now), entry(100, now)];
        assert_eq!(aggregate(&entries, now).average_mood, 33);
    }

    #[test]
    fn test_trend_takes_newest_first_prefix() {
        let now = Utc::now();
        let entries: Vec<DiaryEntry> = (0..10)
            .map(|i| entry(i * 10, now - Duration::days(i64::from(i))))
            .collect();
        let points = trend(&entries, TREND_LEN);
        assert_eq!(points.len(), TREND_LEN);
        assert_eq!(points[0].entry_id, entries[0].id);
        assert_eq!(points[6].mood_score, 60);
        assert_eq!(points[6].band, MoodBand::Good);
    }

    proptest! {
        #[test]
        fn prop_average_matches_rounded_mean(scores in prop::collection::vec(0u8..=100, 1..50)) {
            let now = Utc::now();
            let entries: Vec<DiaryEntry> = scores.iter().map(|s| entry(*s, now)).collect();
            let sum: u32 = scores.iter().map(|s| u32::from(*s)).sum();
            let n = scores.len() as u32;
            // Integer round-half-up of sum / n.
            let expected = ((2 * sum + n) / (2 * n)) as u8;
            let stats = aggregate(&entries, now);
            prop_assert_eq!(stats.average_mood, expected);
            prop_assert_eq!(stats.total, scores.len());
            prop_assert_eq!(stats.recent, scores.len());
        }
    }
}
