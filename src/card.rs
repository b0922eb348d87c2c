use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::sm2::SchedulingState;

pub const QUESTION_MIN_CHARS: usize = 3;
pub const ANSWER_MIN_CHARS: usize = 1;
pub const TEXT_MAX_CHARS: usize = 1000;

const TAG_SEPARATOR: &str = ";";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub schedule: SchedulingState,
}

impl Flashcard {
    pub fn new(input: NewFlashcard, now: DateTime<Utc>) -> Self {
        Flashcard {
            id: uuid::Uuid::new_v4().to_string(),
            question: input.question,
            answer: input.answer,
            tags: input.tags,
            created_at: now,
            updated_at: now,
            schedule: SchedulingState::new(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlashcard {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Fields a client may change on an existing card. Scheduling state is not
/// among them: only a review moves it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlashcardUpdate {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl FlashcardUpdate {
    pub fn apply_to(self, card: &mut Flashcard) {
        if let Some(question) = self.question {
            card.question = question;
        }
        if let Some(answer) = self.answer {
            card.answer = answer;
        }
        if let Some(tags) = self.tags {
            card.tags = tags;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub cards_reviewed: u32,
    pub cards_correct: u32,
    /// Milliseconds between start and end, zero while the session is open.
    pub total_time: i64,
}

impl StudySession {
    pub fn start(now: DateTime<Utc>) -> Self {
        StudySession {
            id: uuid::Uuid::new_v4().to_string(),
            start_time: now,
            end_time: None,
            cards_reviewed: 0,
            cards_correct: 0,
            total_time: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn record(&mut self, correct: bool) {
        self.cards_reviewed += 1;
        if correct {
            self.cards_correct += 1;
        }
    }

    pub fn end(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.total_time = (now - self.start_time).num_milliseconds();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CardFileError {
    #[error("{path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn check_len(field: &str, value: &str, min: usize) -> Result<(), String> {
    let n = value.chars().count();
    if n < min {
        return Err(format!("{field} must be at least {min} characters long"));
    }
    if n > TEXT_MAX_CHARS {
        return Err(format!(
            "{field} must be at most {TEXT_MAX_CHARS} characters long"
        ));
    }
    Ok(())
}

pub fn validate_question(question: &str) -> Result<(), String> {
    check_len("question", question, QUESTION_MIN_CHARS)
}

pub fn validate_answer(answer: &str) -> Result<(), String> {
    check_len("answer", answer, ANSWER_MIN_CHARS)
}

pub fn validate_new(input: &NewFlashcard) -> Result<(), String> {
    validate_question(&input.question)?;
    validate_answer(&input.answer)
}

pub fn validate_update(update: &FlashcardUpdate) -> Result<(), String> {
    if let Some(question) = &update.question {
        validate_question(question)?;
    }
    if let Some(answer) = &update.answer {
        validate_answer(answer)?;
    }
    Ok(())
}

fn parse_tags(s: &str) -> Vec<String> {
    s.split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads `question,answer,tags` rows. Extra columns (as written by
/// [`save_csv`]) are ignored, so an export can be imported again.
pub fn load_csv(path: &Path) -> Result<Vec<NewFlashcard>, CardFileError> {
    let csv_err = |source| CardFileError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut cards = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let column = |i| record.get(i).unwrap_or_default();
        cards.push(NewFlashcard {
            question: column(0).to_string(),
            answer: column(1).to_string(),
            tags: parse_tags(column(2)),
        });
    }
    Ok(cards)
}

pub fn save_csv(path: &Path, cards: &[Flashcard]) -> Result<(), CardFileError> {
    let csv_err = |source| CardFileError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;

    writer
        .write_record([
            "question",
            "answer",
            "tags",
            "ease_factor",
            "interval",
            "repetition",
            "next_review",
        ])
        .map_err(csv_err)?;

    for card in cards {
        writer
            .write_record([
                &card.question,
                &card.answer,
                &card.tags.join(TAG_SEPARATOR),
                &format!("{:.2}", card.schedule.ease_factor),
                &card.schedule.interval.to_string(),
                &card.schedule.repetition.to_string(),
                &card.schedule.next_review.to_rfc3339(),
            ])
            .map_err(csv_err)?;
    }

    writer.flush().map_err(|source| CardFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// CSV files named directly or found under the given directories, in path
/// order with duplicates removed so repeated imports are reproducible.
pub fn discover_files(paths: &[String]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for root in paths.iter().map(Path::new) {
        if root.is_dir() {
            walk_csv(root, &mut found);
        } else if is_csv(root) {
            found.insert(root.to_path_buf());
        } else {
            tracing::warn!(path = %root.display(), "skipping non-csv path");
        }
    }
    found.into_iter().collect()
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn walk_csv(dir: &Path, found: &mut BTreeSet<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            walk_csv(&path, found);
        } else if is_csv(&path) {
            found.insert(path);
        }
    }
}
