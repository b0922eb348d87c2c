// SM-2 (SuperMemo 2) scheduling.
// Quality >= 3 counts as a successful recall; anything lower is a lapse.

use chrono::{DateTime, Days, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 5.0;
const LAPSE_PENALTY: f64 = 0.2;

/// Upper bound on a single interval (about a century). Keeps the due date
/// representable however long a success streak runs.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("quality must be between 0 and 5, got {0}")]
pub struct InvalidQuality(pub i64);

/// A recall rating in `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn new(n: i64) -> Result<Quality, InvalidQuality> {
        match u8::try_from(n) {
            Ok(q) if q <= Self::MAX => Ok(Quality(q)),
            _ => Err(InvalidQuality(n)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 >= 3
    }
}

impl TryFrom<i64> for Quality {
    type Error = InvalidQuality;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        Quality::new(n)
    }
}

/// Scheduling fields embedded in every flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingState {
    pub ease_factor: f64,
    pub interval: u32,
    pub repetition: u32,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: DateTime<Utc>,
    pub total_reviews: u32,
}

impl SchedulingState {
    /// State of a card that has never been reviewed: due immediately.
    pub fn new(now: DateTime<Utc>) -> Self {
        SchedulingState {
            ease_factor: DEFAULT_EASE,
            interval: 1,
            repetition: 0,
            last_reviewed: None,
            next_review: now,
            total_reviews: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub state: SchedulingState,
    pub interval_delta: i64,
    pub ease_delta: f64,
    pub message: String,
}

/// Clamps to `[MIN_EASE, MAX_EASE]` and rounds to two decimals.
pub fn clamp_ease(ease: f64) -> f64 {
    let clamped = ease.clamp(MIN_EASE, MAX_EASE);
    (clamped * 100.0).round() / 100.0
}

fn ease_adjustment(q: Quality) -> f64 {
    let miss = f64::from(Quality::MAX - q.value());
    0.1 - miss * (0.08 + miss * 0.02)
}

fn next_interval(state: &SchedulingState) -> u32 {
    match state.repetition {
        0 => 1,
        1 => 6,
        _ => {
            let grown = (f64::from(state.interval) * state.ease_factor).round();
            grown.clamp(1.0, f64::from(MAX_INTERVAL_DAYS)) as u32
        }
    }
}

/// Adds whole calendar days, saturating at the latest representable instant.
pub fn add_days(at: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    at.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn feedback(q: Quality, interval: u32) -> String {
    match q.value() {
        4.. => format!("Great! Next review in {interval} days."),
        3 => format!("Good. Next review in {interval} days."),
        _ => "Keep practicing. You'll see this card again tomorrow.".to_string(),
    }
}

/// Applies one review to `state`. Pure: the caller persists the result.
pub fn apply_review(
    state: &SchedulingState,
    quality: Quality,
    now: DateTime<Utc>,
) -> ReviewOutcome {
    let (interval, repetition, ease) = if quality.is_success() {
        (
            next_interval(state),
            state.repetition.saturating_add(1),
            state.ease_factor + ease_adjustment(quality),
        )
    } else {
        (1, 0, f64::max(MIN_EASE, state.ease_factor - LAPSE_PENALTY))
    };
    let ease_factor = clamp_ease(ease);

    let next = SchedulingState {
        ease_factor,
        interval,
        repetition,
        last_reviewed: Some(now),
        next_review: add_days(now, interval),
        total_reviews: state.total_reviews.saturating_add(1),
    };

    ReviewOutcome {
        interval_delta: i64::from(interval) - i64::from(state.interval),
        ease_delta: ease_factor - state.ease_factor,
        message: feedback(quality, interval),
        state: next,
    }
}
