//! Validation for the legacy `/quiz/create` endpoint.
//!
//! Text is checked for length, normalized (whitespace runs collapse to a
//! single space) and screened for markup that has no place in a flashcard.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::card;

/// Timestamp echoed back in the metadata; fixed so responses are stable.
const CREATED_AT: &str = "2024-01-01T00:00:00Z";

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static NO_WORD_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\w]*$").expect("valid regex"));
static DIGITS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static FORBIDDEN: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [r"(?i)<script", r"(?i)javascript:", r"(?i)data:.*base64"]
        .map(|p| Regex::new(p).expect("valid regex"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizMetadata {
    pub question_length: usize,
    pub answer_length: usize,
    pub created_at: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizAccepted {
    pub status: &'static str,
    pub item: QuizItem,
    pub metadata: QuizMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    /// A field is malformed on its own.
    #[error("{0}")]
    Invalid(String),
    /// Well-formed fields that are refused together or for their content.
    #[error("{0}")]
    Rejected(String),
}

fn normalize(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

fn clean_question(raw: &str) -> Result<String, QuizError> {
    card::validate_question(raw).map_err(QuizError::Invalid)?;
    if raw.trim().is_empty() {
        return Err(QuizError::Invalid(
            "Question cannot be empty or whitespace only".into(),
        ));
    }
    let q = normalize(raw);
    if q.chars().count() < card::QUESTION_MIN_CHARS {
        return Err(QuizError::Invalid(
            "Question must be at least 3 characters long".into(),
        ));
    }
    if NO_WORD_CHARS.is_match(&q) || DIGITS_ONLY.is_match(&q) {
        return Err(QuizError::Invalid(
            "Question must contain meaningful text".into(),
        ));
    }
    Ok(q)
}

fn clean_answer(raw: &str) -> Result<String, QuizError> {
    card::validate_answer(raw).map_err(QuizError::Invalid)?;
    if raw.trim().is_empty() {
        return Err(QuizError::Invalid(
            "Answer cannot be empty or whitespace only".into(),
        ));
    }
    Ok(normalize(raw))
}

pub fn validate(item: &QuizItem) -> Result<QuizAccepted, QuizError> {
    let question = clean_question(&item.question)?;
    let answer = clean_answer(&item.answer)?;

    if question.to_lowercase() == answer.to_lowercase() {
        return Err(QuizError::Rejected(
            "Question and answer cannot be identical".into(),
        ));
    }

    if FORBIDDEN
        .iter()
        .any(|re| re.is_match(&question) || re.is_match(&answer))
    {
        tracing::warn!("quiz item rejected for forbidden content");
        return Err(QuizError::Rejected(
            "Content contains potentially harmful patterns".into(),
        ));
    }

    Ok(QuizAccepted {
        status: "ok",
        metadata: QuizMetadata {
            question_length: question.chars().count(),
            answer_length: answer.chars().count(),
            created_at: CREATED_AT,
        },
        item: QuizItem { question, answer },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(question: &str, answer: &str) -> QuizItem {
        QuizItem {
            question: question.into(),
            answer: answer.into(),
        }
    }

    #[test]
    fn accepts_and_reports_lengths() {
        let ok = validate(&item("What is 2+2?", "4")).unwrap();
        assert_eq!(ok.status, "ok");
        assert_eq!(ok.metadata.question_length, 12);
        assert_eq!(ok.metadata.answer_length, 1);
        assert_eq!(ok.metadata.created_at, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn collapses_whitespace() {
        let ok = validate(&item("  What   is\n\tRust?  ", "  A   language ")).unwrap();
        assert_eq!(ok.item.question, "What is Rust?");
        assert_eq!(ok.item.answer, "A language");
    }

    #[test]
    fn length_limits() {
        assert!(matches!(validate(&item("ab", "x")), Err(QuizError::Invalid(_))));
        assert!(matches!(validate(&item("abc", "")), Err(QuizError::Invalid(_))));
        assert!(matches!(
            validate(&item(&"q".repeat(1001), "x")),
            Err(QuizError::Invalid(_))
        ));
        assert!(validate(&item(&"q".repeat(1000), "x")).is_ok());
    }

    #[test]
    fn whitespace_only_fields() {
        assert_eq!(
            validate(&item("     ", "x")),
            Err(QuizError::Invalid(
                "Question cannot be empty or whitespace only".into()
            ))
        );
        assert!(matches!(validate(&item("What?", "   ")), Err(QuizError::Invalid(_))));
        assert!(matches!(validate(&item(" a  ", "x")), Err(QuizError::Invalid(_))));
    }

    #[test]
    fn meaningless_questions() {
        for q in ["???", "!@#$%", "12345"] {
            assert_eq!(
                validate(&item(q, "x")),
                Err(QuizError::Invalid("Question must contain meaningful text".into()))
            );
        }
        assert!(validate(&item("What is 123?", "x")).is_ok());
    }

    #[test]
    fn identical_question_and_answer() {
        assert_eq!(
            validate(&item("Same Text", "same text")),
            Err(QuizError::Rejected(
                "Question and answer cannot be identical".into()
            ))
        );
    }

    #[test]
    fn harmful_patterns() {
        for (q, a) in [
            ("<SCRIPT>alert(1)</script>", "x"),
            ("Click here", "JavaScript:void(0)"),
            ("Image?", "data:image/png;base64,AAAA"),
        ] {
            assert!(matches!(validate(&item(q, a)), Err(QuizError::Rejected(_))));
        }
    }

    #[test]
    fn unicode_is_counted_by_char() {
        let ok = validate(&item("¿Qué es esto?", "数学")).unwrap();
        assert_eq!(ok.metadata.question_length, 13);
        assert_eq!(ok.metadata.answer_length, 2);
    }
}
