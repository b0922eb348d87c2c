use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use crate::card::{Flashcard, StudySession};
use crate::sm2::DEFAULT_EASE;

const UPCOMING_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalBucket {
    OneDay,
    UpToSixDays,
    UpToFourWeeks,
    OverAMonth,
}

impl IntervalBucket {
    pub fn label(self) -> &'static str {
        match self {
            IntervalBucket::OneDay => "1 day",
            IntervalBucket::UpToSixDays => "2-6 days",
            IntervalBucket::UpToFourWeeks => "1-4 weeks",
            IntervalBucket::OverAMonth => "1+ months",
        }
    }
}

/// Interval 0 only turns up in imported or hand-edited data and is counted
/// with the short intervals, not as "1 day".
pub fn interval_bucket(interval: u32) -> IntervalBucket {
    match interval {
        1 => IntervalBucket::OneDay,
        0 | 2..=6 => IntervalBucket::UpToSixDays,
        7..=28 => IntervalBucket::UpToFourWeeks,
        _ => IntervalBucket::OverAMonth,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntervalDistribution {
    #[serde(rename = "1 day")]
    pub one_day: usize,
    #[serde(rename = "2-6 days")]
    pub up_to_six_days: usize,
    #[serde(rename = "1-4 weeks")]
    pub up_to_four_weeks: usize,
    #[serde(rename = "1+ months")]
    pub over_a_month: usize,
}

impl IntervalDistribution {
    fn count(&mut self, bucket: IntervalBucket) {
        let slot = match bucket {
            IntervalBucket::OneDay => &mut self.one_day,
            IntervalBucket::UpToSixDays => &mut self.up_to_six_days,
            IntervalBucket::UpToFourWeeks => &mut self.up_to_four_weeks,
            IntervalBucket::OverAMonth => &mut self.over_a_month,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyStats {
    pub total_cards: usize,
    pub due_today: usize,
    pub total_reviews: u64,
    pub accuracy: f64,
    pub average_ease_factor: f64,
    pub sessions_completed: usize,
    pub total_study_time: i64,
    pub interval_distribution: IntervalDistribution,
    pub upcoming_reviews: BTreeMap<String, usize>,
}

/// Cards with `next_review <= now`, most overdue first. The sort is stable,
/// so cards due at the same instant keep their input order.
pub fn select_due(cards: &[Flashcard], now: DateTime<Utc>) -> Vec<&Flashcard> {
    let mut due: Vec<&Flashcard> = cards.iter().filter(|c| c.schedule.is_due(now)).collect();
    due.sort_by_key(|c| c.schedule.next_review);
    due
}

pub fn interval_distribution(cards: &[Flashcard]) -> IntervalDistribution {
    let mut dist = IntervalDistribution::default();
    for card in cards {
        dist.count(interval_bucket(card.schedule.interval));
    }
    dist
}

/// Cards scheduled on each of the next seven calendar days, keyed `YYYY-MM-DD`.
pub fn upcoming_reviews(cards: &[Flashcard], today: NaiveDate) -> BTreeMap<String, usize> {
    (0..UPCOMING_DAYS)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .map(|day| {
            let count = cards
                .iter()
                .filter(|c| c.schedule.next_review.date_naive() == day)
                .count();
            (day.format("%Y-%m-%d").to_string(), count)
        })
        .collect()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn study_stats(
    cards: &[Flashcard],
    sessions: &[StudySession],
    now: DateTime<Utc>,
) -> StudyStats {
    let today = now.date_naive();

    let due_today = cards
        .iter()
        .filter(|c| c.schedule.next_review.date_naive() <= today)
        .count();

    let average_ease_factor = if cards.is_empty() {
        DEFAULT_EASE
    } else {
        cards.iter().map(|c| c.schedule.ease_factor).sum::<f64>() / cards.len() as f64
    };

    let total_reviews = cards
        .iter()
        .map(|c| u64::from(c.schedule.total_reviews))
        .sum();

    let completed: Vec<&StudySession> = sessions.iter().filter(|s| s.is_completed()).collect();
    let total_study_time = completed.iter().map(|s| s.total_time).sum();
    let reviewed: u64 = completed.iter().map(|s| u64::from(s.cards_reviewed)).sum();
    let correct: u64 = completed.iter().map(|s| u64::from(s.cards_correct)).sum();
    let accuracy = if reviewed > 0 {
        correct as f64 / reviewed as f64 * 100.0
    } else {
        0.0
    };

    StudyStats {
        total_cards: cards.len(),
        due_today,
        total_reviews,
        accuracy: round2(accuracy),
        average_ease_factor: round2(average_ease_factor),
        sessions_completed: completed.len(),
        total_study_time,
        interval_distribution: interval_distribution(cards),
        upcoming_reviews: upcoming_reviews(cards, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::NewFlashcard;
    use chrono::{Duration, TimeZone};

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()
    }

    fn card(question: &str, next_review: DateTime<Utc>, interval: u32) -> Flashcard {
        let mut c = Flashcard::new(
            NewFlashcard {
                question: question.into(),
                answer: "a".into(),
                tags: Vec::new(),
            },
            t(),
        );
        c.schedule.next_review = next_review;
        c.schedule.interval = interval;
        c
    }

    #[test]
    fn select_due_filters_and_orders() {
        let cards = vec![
            card("yesterday", t() - Duration::days(1), 1),
            card("tomorrow", t() + Duration::days(1), 1),
            card("now", t(), 1),
        ];
        let due: Vec<&str> = select_due(&cards, t())
            .iter()
            .map(|c| c.question.as_str())
            .collect();
        assert_eq!(due, vec!["yesterday", "now"]);
    }

    #[test]
    fn select_due_ties_keep_input_order() {
        let cards = vec![
            card("first", t() - Duration::hours(1), 1),
            card("second", t() - Duration::hours(1), 1),
            card("older", t() - Duration::hours(2), 1),
            card("third", t() - Duration::hours(1), 1),
        ];
        let due: Vec<&str> = select_due(&cards, t())
            .iter()
            .map(|c| c.question.as_str())
            .collect();
        assert_eq!(due, vec!["older", "first", "second", "third"]);
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(interval_bucket(0), IntervalBucket::UpToSixDays);
        assert_eq!(interval_bucket(1), IntervalBucket::OneDay);
        assert_eq!(interval_bucket(2), IntervalBucket::UpToSixDays);
        assert_eq!(interval_bucket(6), IntervalBucket::UpToSixDays);
        assert_eq!(interval_bucket(7), IntervalBucket::UpToFourWeeks);
        assert_eq!(interval_bucket(28), IntervalBucket::UpToFourWeeks);
        assert_eq!(interval_bucket(29), IntervalBucket::OverAMonth);
        assert_eq!(interval_bucket(29).label(), "1+ months");
    }

    #[test]
    fn distribution_serializes_with_labels() {
        let cards = vec![
            card("a", t(), 1),
            card("b", t(), 15),
            card("c", t(), 15),
            card("d", t(), 0),
        ];
        let json = serde_json::to_value(interval_distribution(&cards)).unwrap();
        assert_eq!(json["1 day"], 1);
        assert_eq!(json["2-6 days"], 1);
        assert_eq!(json["1-4 weeks"], 2);
        assert_eq!(json["1+ months"], 0);
    }

    #[test]
    fn upcoming_crosses_month_end() {
        let cards = vec![
            card("a", t() + Duration::days(1), 1),
            card("b", t() + Duration::days(1), 1),
            card("c", t() + Duration::days(10), 10),
        ];
        let upcoming = upcoming_reviews(&cards, t().date_naive());
        assert_eq!(upcoming.len(), 7);
        assert_eq!(upcoming["2025-06-30"], 0);
        assert_eq!(upcoming["2025-07-01"], 2);
        assert!(upcoming.contains_key("2025-07-06"));
        assert_eq!(upcoming.values().sum::<usize>(), 2);
    }

    #[test]
    fn stats_on_empty_store() {
        let stats = study_stats(&[], &[], t());
        assert_eq!(stats.total_cards, 0);
        assert_eq!(stats.average_ease_factor, 2.5);
        assert_eq!(stats.accuracy, 0.0);
        assert_eq!(stats.sessions_completed, 0);
    }

    #[test]
    fn stats_count_completed_sessions_only() {
        let mut cards = vec![
            card("due earlier today", t() - Duration::hours(3), 1),
            card("later", t() + Duration::days(3), 6),
        ];
        cards[0].schedule.total_reviews = 4;
        cards[0].schedule.ease_factor = 2.36;
        cards[1].schedule.total_reviews = 2;

        let mut done = StudySession::start(t() - Duration::minutes(10));
        done.record(true);
        done.record(true);
        done.record(false);
        done.end(t());
        let mut open = StudySession::start(t());
        open.record(false);

        let stats = study_stats(&cards, &[done, open], t());
        assert_eq!(stats.total_cards, 2);
        assert_eq!(stats.due_today, 1);
        assert_eq!(stats.total_reviews, 6);
        assert_eq!(stats.average_ease_factor, 2.43);
        assert_eq!(stats.sessions_completed, 1);
        assert_eq!(stats.accuracy, 66.67);
        assert_eq!(stats.total_study_time, 600_000);
    }
}
