use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::card::{self, Flashcard, FlashcardUpdate, NewFlashcard, StudySession};
use crate::clock::Clock;
use crate::review::{self, StudyStats};
use crate::sm2::{self, InvalidQuality, Quality};
use crate::store::{Repository, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    InvalidQuality(#[from] InvalidQuality),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl ServiceError {
    fn card(id: &str) -> Self {
        ServiceError::NotFound {
            kind: "Flashcard",
            id: id.to_string(),
        }
    }

    fn session(id: &str) -> Self {
        ServiceError::NotFound {
            kind: "Study session",
            id: id.to_string(),
        }
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub flashcard_id: String,
    pub quality: i64,
    /// Milliseconds the learner took to answer.
    pub response_time: u64,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewResult {
    pub flashcard: Flashcard,
    pub next_interval: u32,
    pub interval_delta: i64,
    pub ease_factor_change: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlashcardList {
    pub flashcards: Vec<Flashcard>,
    pub total: usize,
    pub due_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardHistory {
    pub flashcard_id: String,
    pub total_reviews: u32,
    pub current_interval: u32,
    pub ease_factor: f64,
    pub repetition: u32,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Flashcard, study-session and analytics operations over a [`Repository`].
///
/// Every read-modify-write of a record holds that record's lock for the
/// whole cycle, so two reviews of one card cannot lose an update while
/// reviews of different cards run in parallel.
pub struct FlashcardService {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FlashcardService {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>) -> Self {
        FlashcardService {
            repo,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs `f` while holding the lock for `key`. The table entry is dropped
    /// once no other caller holds or waits on it, so lookups of unknown ids
    /// leave nothing behind.
    fn with_record_lock<T>(&self, key: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self
            .locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();
        let out = {
            let _guard = lock.lock();
            f()
        };

        let mut table = self.locks.lock();
        // One reference in the table, one here.
        if Arc::strong_count(&lock) == 2 {
            table.remove(key);
        }
        out
    }

    // -- Flashcards --

    pub fn create_flashcard(&self, input: NewFlashcard) -> Result<Flashcard> {
        card::validate_new(&input).map_err(ServiceError::Validation)?;
        let card = self.repo.put(Flashcard::new(input, self.clock.now()))?;
        tracing::info!(card_id = %card.id, "flashcard created");
        Ok(card)
    }

    pub fn get_flashcard(&self, id: &str) -> Result<Flashcard> {
        self.repo.get(id)?.ok_or_else(|| ServiceError::card(id))
    }

    pub fn list_flashcards(&self) -> Result<FlashcardList> {
        let flashcards = self.repo.list_all()?;
        let due_count = review::select_due(&flashcards, self.clock.now()).len();
        Ok(FlashcardList {
            total: flashcards.len(),
            due_count,
            flashcards,
        })
    }

    pub fn update_flashcard(&self, id: &str, update: FlashcardUpdate) -> Result<Flashcard> {
        card::validate_update(&update).map_err(ServiceError::Validation)?;
        let card = self.with_record_lock(id, || {
            let mut card = self.get_flashcard(id)?;
            update.apply_to(&mut card);
            Ok(self.repo.put(card)?)
        })?;
        tracing::info!(card_id = %id, "flashcard updated");
        Ok(card)
    }

    pub fn delete_flashcard(&self, id: &str) -> Result<()> {
        let deleted = self.with_record_lock(id, || Ok(self.repo.delete(id)?))?;
        if !deleted {
            return Err(ServiceError::card(id));
        }
        tracing::info!(card_id = %id, "flashcard deleted");
        Ok(())
    }

    pub fn due_flashcards(&self) -> Result<Vec<Flashcard>> {
        let all = self.repo.list_all()?;
        Ok(review::select_due(&all, self.clock.now())
            .into_iter()
            .cloned()
            .collect())
    }

    // -- Reviews --

    /// Applies one SM-2 review to a stored card and persists the result.
    /// The new state is computed in full before it is written, so a failed
    /// write leaves the stored card untouched.
    pub fn review_flashcard(&self, id: &str, quality: i64) -> Result<ReviewResult> {
        let quality = Quality::new(quality)?;
        let (card, outcome) = self.with_record_lock(id, || {
            let mut card = self.get_flashcard(id)?;
            let outcome = sm2::apply_review(&card.schedule, quality, self.clock.now());
            card.schedule = outcome.state.clone();
            Ok((self.repo.put(card)?, outcome))
        })?;

        tracing::info!(
            card_id = %id,
            quality = quality.value(),
            interval = card.schedule.interval,
            ease_factor = card.schedule.ease_factor,
            "flashcard reviewed"
        );

        Ok(ReviewResult {
            next_interval: card.schedule.interval,
            interval_delta: outcome.interval_delta,
            ease_factor_change: outcome.ease_delta,
            message: outcome.message,
            flashcard: card,
        })
    }

    /// Reviews a card and, when a session is given, counts the answer in it.
    /// An unknown session does not fail the review.
    pub fn submit_review(
        &self,
        request: &ReviewRequest,
        session_id: Option<&str>,
    ) -> Result<ReviewResult> {
        let result = self.review_flashcard(&request.flashcard_id, request.quality)?;
        if let Some(session_id) = session_id {
            match self.record_review(session_id, request.correct) {
                Ok(_) => {}
                Err(ServiceError::NotFound { .. }) => {
                    tracing::warn!(session_id, "review submitted for unknown session");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }

    // -- Study sessions --

    pub fn start_session(&self) -> Result<StudySession> {
        let session = self.repo.put_session(StudySession::start(self.clock.now()))?;
        tracing::info!(session_id = %session.id, "study session started");
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<StudySession> {
        self.repo
            .get_session(id)?
            .ok_or_else(|| ServiceError::session(id))
    }

    pub fn end_session(&self, id: &str) -> Result<StudySession> {
        let session = self.with_record_lock(&session_key(id), || {
            let mut session = self.get_session(id)?;
            session.end(self.clock.now());
            Ok(self.repo.put_session(session)?)
        })?;
        tracing::info!(
            session_id = %id,
            reviewed = session.cards_reviewed,
            correct = session.cards_correct,
            "study session ended"
        );
        Ok(session)
    }

    pub fn record_review(&self, session_id: &str, correct: bool) -> Result<StudySession> {
        self.with_record_lock(&session_key(session_id), || {
            let mut session = self.get_session(session_id)?;
            session.record(correct);
            Ok(self.repo.put_session(session)?)
        })
    }

    // -- Analytics --

    pub fn study_stats(&self) -> Result<StudyStats> {
        let cards = self.repo.list_all()?;
        let sessions = self.repo.list_sessions()?;
        Ok(review::study_stats(&cards, &sessions, self.clock.now()))
    }

    pub fn card_history(&self, id: &str) -> Result<CardHistory> {
        let card = self.get_flashcard(id)?;
        Ok(CardHistory {
            flashcard_id: card.id,
            total_reviews: card.schedule.total_reviews,
            current_interval: card.schedule.interval,
            ease_factor: card.schedule.ease_factor,
            repetition: card.schedule.repetition,
            last_reviewed: card.schedule.last_reviewed,
            next_review: card.schedule.next_review,
            created_at: card.created_at,
        })
    }
}

fn session_key(id: &str) -> String {
    format!("session:{id}")
}
