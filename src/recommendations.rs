use serde::Serialize;

use crate::analysis::emotion::Emotion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Song {
    pub title: &'static str,
    pub artist: &'static str,
    pub genre: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Playlist {
    Happy,
    Sad,
    Calm,
}

const HAPPY: [Song; 3] = [
    Song { title: "Happy", artist: "Pharrell Williams", genre: "Pop" },
    Song { title: "Good Life", artist: "OneRepublic", genre: "Pop Rock" },
    Song { title: "Walking on Sunshine", artist: "Katrina & The Waves", genre: "Pop" },
];

const SAD: [Song; 3] = [
    Song { title: "Fix You", artist: "Coldplay", genre: "Alternative Rock" },
    Song { title: "Someone Like You", artist: "Adele", genre: "Pop" },
    Song { title: "All of Me", artist: "John Legend", genre: "R&B" },
];

const CALM: [Song; 3] = [
    Song { title: "Weightless", artist: "Marconi Union", genre: "Ambient" },
    Song { title: "Claire de Lune", artist: "Debussy", genre: "Classical" },
    Song { title: "River Flows in You", artist: "Yiruma", genre: "Piano" },
];

impl Playlist {
    pub fn for_emotion(emotion: Emotion) -> Self {
        match emotion {
            Emotion::Positive => Playlist::Happy,
            Emotion::Negative => Playlist::Sad,
            Emotion::Neutral => Playlist::Calm,
        }
    }

    pub fn songs(self) -> &'static [Song] {
        match self {
            Playlist::Happy => &HAPPY,
            Playlist::Sad => &SAD,
            Playlist::Calm => &CALM,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub playlist: Playlist,
    pub songs: &'static [Song],
}

pub fn recommend(emotion: Emotion) -> Recommendation {
    let playlist = Playlist::for_emotion(emotion);
    Recommendation {
        playlist,
        songs: playlist.songs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selects_playlist() {
        assert_eq!(recommend(Emotion::Positive).playlist, Playlist::Happy);
        assert_eq!(recommend(Emotion::Negative).playlist, Playlist::Sad);
        assert_eq!(recommend(Emotion::Neutral).playlist, Playlist::Calm);
    }

    #[test]
    fn test_every_playlist_has_three_songs() {
        for playlist in [Playlist::Happy, Playlist::Sad, Playlist::Calm] {
            assert_eq!(playlist.songs().len(), 3);
        }
        assert_eq!(recommend(Emotion::Negative).songs[0].title, "Fix You");
    }
}
