//! Style hints that vary the voice of replies from turn to turn.
//!
//! Each hint is one tone, two conversational moves and a cadence drawn from
//! fixed vocabularies. Production uses [`SeededStyleHints`]; tests inject a
//! [`FixedStyleHint`] so prompts are deterministic.

use std::fmt;
use std::sync::Mutex;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

const TONES: &[&str] = &[
    "warm",
    "playful",
    "calm",
    "curious",
    "gently wry",
    "tender",
    "grounded",
];

const MOVES: &[&str] = &[
    "mirror one detail they said",
    "offer a small concrete image",
    "name the feeling underneath",
    "ask one open question",
    "share a brief observation",
    "suggest one tiny next step",
    "leave a comfortable pause",
];

const CADENCES: &[&str] = &[
    "short sentences",
    "one longer sentence then a short one",
    "an easy spoken rhythm",
    "unhurried and simple",
];

/// One drawn style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleHint {
    pub tone: String,
    pub moves: Vec<String>,
    pub cadence: String,
}

impl fmt::Display for StyleHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tone: {}; moves: {}; cadence: {}",
            self.tone,
            self.moves.join(", "),
            self.cadence
        )
    }
}

pub trait StyleHintProvider: Send + Sync {
    fn hint(&self) -> StyleHint;
}

/// Draws hints from a seedable RNG.
pub struct SeededStyleHints {
    rng: Mutex<StdRng>,
}

impl SeededStyleHints {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl StyleHintProvider for SeededStyleHints {
    fn hint(&self) -> StyleHint {
        // A poisoned lock still holds a usable RNG.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let tone = TONES.choose(&mut *rng).copied().unwrap_or("warm");
        let moves = MOVES
            .choose_multiple(&mut *rng, 2)
            .map(|m| m.to_string())
            .collect();
        let cadence = CADENCES.choose(&mut *rng).copied().unwrap_or("short sentences");
        StyleHint {
            tone: tone.to_string(),
            moves,
            cadence: cadence.to_string(),
        }
    }
}

/// Always returns the same hint.
#[derive(Debug, Clone)]
pub struct FixedStyleHint(pub StyleHint);

impl FixedStyleHint {
    pub fn plain() -> Self {
        Self(StyleHint {
            tone: "warm".to_string(),
            moves: vec!["mirror one detail they said".to_string()],
            cadence: "short sentences".to_string(),
        })
    }
}

impl StyleHintProvider for FixedStyleHint {
    fn hint(&self) -> StyleHint {
        self.0.clone()
    }
}
