//! Keyword-based mood scoring.
//!
//! A diary text is scored by counting which marker words occur in it. Each
//! marker counts at most once and matches as a plain substring, so a marker
//! inside a longer unrelated word also counts. Neutral markers are tallied but
//! do not take part in the score.

use serde::{Deserialize, Deserializer, Serialize};

pub const POSITIVE_MARKERS: [&str; 10] = [
    "행복", "기쁨", "좋다", "만족", "감사", "사랑", "즐거움", "희망", "성공", "웃음",
];

pub const NEGATIVE_MARKERS: [&str; 10] = [
    "슬픔", "우울", "화남", "스트레스", "걱정", "불안", "실패", "절망", "고민", "피곤",
];

pub const NEUTRAL_MARKERS: [&str; 5] = ["보통", "평범", "일반", "그저", "그냥"];

/// Score reported when no marker matched or the two sides tie.
pub const BASELINE_SCORE: u8 = 50;

/// Coarse label stored next to the score. Serialized as the stored label text.
///
/// Decoding is lenient: rows written by other clients may carry labels outside
/// the three known ones, or none at all. Those read back as `Neutral`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Emotion {
    #[serde(rename = "긍정")]
    Positive,
    #[serde(rename = "부정")]
    Negative,
    #[default]
    #[serde(rename = "중립")]
    Neutral,
}

impl Emotion {
    pub fn label(self) -> &'static str {
        match self {
            Emotion::Positive => "긍정",
            Emotion::Negative => "부정",
            Emotion::Neutral => "중립",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "긍정" => Emotion::Positive,
            "부정" => Emotion::Negative,
            "중립" => Emotion::Neutral,
            other => {
                tracing::debug!(label = other, "Unknown emotion label, reading as neutral");
                Emotion::Neutral
            }
        }
    }
}

impl<'de> Deserialize<'de> for Emotion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label.as_deref().map(Emotion::from_label).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub mood_score: u8,
    pub primary_emotion: Emotion,
}

impl Analysis {
    const NEUTRAL: Analysis = Analysis {
        mood_score: BASELINE_SCORE,
        primary_emotion: Emotion::Neutral,
    };
}

/// How many distinct markers of each set occur in a text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkerTally {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

fn count_markers(haystack: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| haystack.contains(*m)).count()
}

pub fn tally(text: &str) -> MarkerTally {
    let folded = text.to_lowercase();
    MarkerTally {
        positive: count_markers(&folded, &POSITIVE_MARKERS),
        negative: count_markers(&folded, &NEGATIVE_MARKERS),
        neutral: count_markers(&folded, &NEUTRAL_MARKERS),
    }
}

/// Score a diary text. Never fails; the same text always yields the same result.
pub fn analyze(text: &str) -> Analysis {
    let counts = tally(text);
    let hits = counts.positive + counts.negative;
    if hits == 0 {
        return Analysis::NEUTRAL;
    }

    let pos_ratio = counts.positive as f64 / hits as f64;
    let neg_ratio = counts.negative as f64 / hits as f64;

    let (score, emotion) = if pos_ratio > neg_ratio {
        (50.0 + pos_ratio * 50.0, Emotion::Positive)
    } else if neg_ratio > pos_ratio {
        (50.0 - neg_ratio * 50.0, Emotion::Negative)
    } else {
        return Analysis::NEUTRAL;
    };

    Analysis {
        mood_score: score.round().clamp(0.0, 100.0) as u8,
        primary_emotion: emotion,
    }
}

/// Display bucket for a mood score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodBand {
    Great,
    Good,
    Okay,
    Low,
    Bad,
}

impl MoodBand {
    pub fn for_score(score: u8) -> Self {
        match score {
            80.. => MoodBand::Great,
            60..=79 => MoodBand::Good,
            40..=59 => MoodBand::Okay,
            20..=39 => MoodBand::Low,
            _ => MoodBand::Bad,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            MoodBand::Great => "😊",
            MoodBand::Good => "🙂",
            MoodBand::Okay => "😐",
            MoodBand::Low => "😔",
            MoodBand::Bad => "😢",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_no_markers_is_neutral_baseline() {
        let a = analyze("오늘은 회사에 갔다가 집에 왔다");
        assert_eq!(a, Analysis { mood_score: 50, primary_emotion: Emotion::Neutral });
    }

    #[test]
    fn test_two_positive_markers() {
        let a = analyze("오늘 정말 행복하고 기쁨을 느꼈다");
        assert_eq!(tally("오늘 정말 행복하고 기쁨을 느꼈다").positive, 2);
        assert_eq!(a, Analysis { mood_score: 100, primary_emotion: Emotion::Positive });
    }

    #[test]
    fn test_two_negative_markers() {
        let a = analyze("너무 우울하고 슬픔이 크다");
        assert_eq!(a, Analysis { mood_score: 0, primary_emotion: Emotion::Negative });
    }

    #[test]
    fn test_tie_is_neutral() {
        let a = analyze("행복했지만 걱정도 많았다");
        assert_eq!(a, Analysis { mood_score: 50, primary_emotion: Emotion::Neutral });
    }

    #[test]
    fn test_mixed_ratio_rounds() {
        // 2 positive, 1 negative -> 50 + 2/3 * 50 = 83.33
        let a = analyze("감사하고 사랑하지만 피곤하다");
        assert_eq!(a, Analysis { mood_score: 83, primary_emotion: Emotion::Positive });
        // 1 positive, 2 negative -> 50 - 2/3 * 50 = 16.67
        let a = analyze("희망은 있지만 불안하고 걱정된다");
        assert_eq!(a, Analysis { mood_score: 17, primary_emotion: Emotion::Negative });
    }

    #[test]
    fn test_repeated_marker_counts_once() {
        let t = tally("행복 행복 행복 슬픔");
        assert_eq!((t.positive, t.negative), (1, 1));
        assert_eq!(analyze("행복 행복 행복 슬픔").primary_emotion, Emotion::Neutral);
    }

    #[test]
    fn test_neutral_markers_are_tallied_but_ignored() {
        let t = tally("그냥 보통의 하루, 평범했다. 그래도 웃음이 났다");
        assert_eq!(t.neutral, 3);
        assert_eq!(t.positive, 1);
        assert_eq!(analyze("그냥 보통의 하루, 평범했다. 그래도 웃음이 났다").mood_score, 100);
    }

    #[test]
    fn test_substring_match_inside_longer_word() {
        // "성공" inside "성공적" still counts.
        assert_eq!(analyze("프로젝트가 성공적으로 끝났다").primary_emotion, Emotion::Positive);
    }

    #[test]
    fn test_mood_band_boundaries() {
        assert_eq!(MoodBand::for_score(100), MoodBand::Great);
        assert_eq!(MoodBand::for_score(80), MoodBand::Great);
        assert_eq!(MoodBand::for_score(79), MoodBand::Good);
        assert_eq!(MoodBand::for_score(60), MoodBand::Good);
        assert_eq!(MoodBand::for_score(59), MoodBand::Okay);
        assert_eq!(MoodBand::for_score(40), MoodBand::Okay);
        assert_eq!(MoodBand::for_score(39), MoodBand::Low);
        assert_eq!(MoodBand::for_score(20), MoodBand::Low);
        assert_eq!(MoodBand::for_score(19), MoodBand::Bad);
        assert_eq!(MoodBand::for_score(0).emoji(), "😢");
    }

    #[test]
    fn test_emotion_labels_round_trip_through_serde() {
        let json = serde_json::to_string(&Emotion::Negative).unwrap();
        assert_eq!(json, "\"부정\"");
        let back: Emotion = serde_json::from_str("\"긍정\"").unwrap();
        assert_eq!(back, Emotion::Positive);
    }

    #[test]
    fn test_unknown_or_missing_labels_read_as_neutral() {
        for raw in ["\"기쁨\"", "\"\"", "null"] {
            let back: Emotion = serde_json::from_str(raw).unwrap();
            assert_eq!(back, Emotion::Neutral, "{raw}");
        }
        assert!(serde_json::from_str::<Emotion>("3").is_err());
    }

    fn marker_text() -> impl Strategy<Value = String> {
        let words: Vec<&'static str> = POSITIVE_MARKERS
            .iter()
            .chain(NEGATIVE_MARKERS.iter())
            .chain(NEUTRAL_MARKERS.iter())
            .copied()
            .chain(["하루", "오늘", "Happy", " ", "그리고"])
            .collect();
        prop::collection::vec(prop::sample::select(words), 0..20).prop_map(|w| w.join(" "))
    }

    proptest! {
        #[test]
        fn prop_score_in_range(text in any::<String>()) {
            let a = analyze(&text);
            prop_assert!(a.mood_score <= 100);
        }

        #[test]
        fn prop_marker_text_score_in_range_and_deterministic(text in marker_text()) {
            let a = analyze(&text);
            prop_assert!(a.mood_score <= 100);
            prop_assert_eq!(a, analyze(&text));
        }

        #[test]
        fn prop_marker_free_text_is_baseline(text in "[a-zA-Z0-9 .,!?]{0,200}") {
            prop_assert_eq!(
                analyze(&text),
                Analysis { mood_score: 50, primary_emotion: Emotion::Neutral }
            );
        }

        #[test]
        fn prop_label_agrees_with_score(text in marker_text()) {
            let a = analyze(&text);
            match a.primary_emotion {
                Emotion::Positive => prop_assert!(a.mood_score > 50),
                Emotion::Negative => prop_assert!(a.mood_score < 50),
                Emotion::Neutral => prop_assert_eq!(a.mood_score, 50),
            }
        }
    }
}
