use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::card::{Flashcard, StudySession};
use crate::clock::Clock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Record storage consumed by the service layer.
pub trait Repository: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Flashcard>, StoreError>;
    /// Inserts or replaces by id and stamps `updated_at`.
    fn put(&self, card: Flashcard) -> Result<Flashcard, StoreError>;
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
    /// All cards in creation order.
    fn list_all(&self) -> Result<Vec<Flashcard>, StoreError>;

    fn get_session(&self, id: &str) -> Result<Option<StudySession>, StoreError>;
    fn put_session(&self, session: StudySession) -> Result<StudySession, StoreError>;
    fn list_sessions(&self) -> Result<Vec<StudySession>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    flashcards: Vec<Flashcard>,
    #[serde(default)]
    study_sessions: Vec<StudySession>,
}

/// In-memory records mirrored to a JSON file after every write.
///
/// Writes go to disk before the in-memory copy changes, so a failed write
/// leaves both exactly as they were.
pub struct Store {
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    data: RwLock<Snapshot>,
}

impl Store {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Store {
            path: None,
            clock,
            data: RwLock::new(Snapshot::default()),
        }
    }

    /// Loads `path` if it exists; otherwise starts empty and creates the
    /// file on first write.
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            let raw = std::fs::read(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&raw).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?
        } else {
            Snapshot::default()
        };
        tracing::info!(
            path = %path.display(),
            flashcards = data.flashcards.len(),
            sessions = data.study_sessions.len(),
            "store opened"
        );
        Ok(Store {
            path: Some(path),
            clock,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        tracing::debug!(path = %path.display(), "store persisted");
        Ok(())
    }

    /// Applies `change` to a copy, persists it, then swaps it in.
    fn write<T>(&self, change: impl FnOnce(&mut Snapshot) -> T) -> Result<T, StoreError> {
        let mut data = self.data.write();
        let mut next = data.clone();
        let out = change(&mut next);
        self.persist(&next)?;
        *data = next;
        Ok(out)
    }
}

impl Repository for Store {
    fn get(&self, id: &str) -> Result<Option<Flashcard>, StoreError> {
        Ok(self.data.read().flashcards.iter().find(|c| c.id == id).cloned())
    }

    fn put(&self, mut card: Flashcard) -> Result<Flashcard, StoreError> {
        card.updated_at = self.clock.now();
        self.write(|data| {
            match data.flashcards.iter_mut().find(|c| c.id == card.id) {
                Some(slot) => *slot = card.clone(),
                None => data.flashcards.push(card.clone()),
            }
            card
        })
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        if !self.data.read().flashcards.iter().any(|c| c.id == id) {
            return Ok(false);
        }
        self.write(|data| {
            let before = data.flashcards.len();
            data.flashcards.retain(|c| c.id != id);
            data.flashcards.len() != before
        })
    }

    fn list_all(&self) -> Result<Vec<Flashcard>, StoreError> {
        Ok(self.data.read().flashcards.clone())
    }

    fn get_session(&self, id: &str) -> Result<Option<StudySession>, StoreError> {
        Ok(self
            .data
            .read()
            .study_sessions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    fn put_session(&self, session: StudySession) -> Result<StudySession, StoreError> {
        self.write(|data| {
            match data.study_sessions.iter_mut().find(|s| s.id == session.id) {
                Some(slot) => *slot = session.clone(),
                None => data.study_sessions.push(session.clone()),
            }
            session
        })
    }

    fn list_sessions(&self) -> Result<Vec<StudySession>, StoreError> {
        Ok(self.data.read().study_sessions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::NewFlashcard;
    use crate::clock::FixedClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn new_card(question: &str) -> Flashcard {
        Flashcard::new(
            NewFlashcard {
                question: question.into(),
                answer: "answer".into(),
                tags: vec!["t".into()],
            },
            t0(),
        )
    }

    #[test]
    fn crud_in_memory() {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = Store::in_memory(clock.clone());

        let card = store.put(new_card("first?")).unwrap();
        store.put(new_card("second?")).unwrap();
        assert_eq!(store.get(&card.id).unwrap().unwrap().question, "first?");
        assert!(store.get("missing").unwrap().is_none());

        clock.advance(Duration::minutes(5));
        let mut edited = card.clone();
        edited.answer = "changed".into();
        let saved = store.put(edited).unwrap();
        assert_eq!(saved.updated_at, t0() + Duration::minutes(5));
        assert_eq!(saved.created_at, t0());

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].answer, "changed");
        assert_eq!(all[1].question, "second?");

        assert!(store.delete(&card.id).unwrap());
        assert!(!store.delete(&card.id).unwrap());
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let clock = Arc::new(FixedClock::new(t0()));

        let mut card = new_card("persisted?");
        card.schedule.ease_factor = 2.36;
        card.schedule.last_reviewed = Some(t0());
        card.schedule.next_review = t0() + Duration::days(6);
        let session = StudySession::start(t0());
        {
            let store = Store::open(&path, clock.clone()).unwrap();
            store.put(card.clone()).unwrap();
            store.put_session(session.clone()).unwrap();
        }

        let reopened = Store::open(&path, clock).unwrap();
        assert_eq!(reopened.get(&card.id).unwrap(), Some(card.clone()));
        assert_eq!(reopened.get_session(&session.id).unwrap(), Some(session.clone()));
    }

    #[test]
    fn failed_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let store = Store::open(sub.join("data.json"), Arc::new(FixedClock::new(t0()))).unwrap();

        let card = store.put(new_card("before?")).unwrap();
        std::fs::remove_dir_all(&sub).unwrap();

        let mut edited = card.clone();
        edited.question = "after?".into();
        assert!(matches!(store.put(edited), Err(StoreError::Io { .. })));
        assert!(store.delete(&card.id).is_err());
        assert_eq!(store.get(&card.id).unwrap().unwrap().question, "before?");
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = Store::open(&path, Arc::new(FixedClock::new(t0()))).err().unwrap();
        assert!(matches!(err, StoreError::Json { .. }));
    }
}
