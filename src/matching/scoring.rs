//! Candidate scoring
//!
//! A candidate's score is a weighted sum of three signals:
//!
//! | Signal | Weight |
//! |---|---|
//! | amount exactly equal | 0.4 |
//! | date proximity factor | 0.3 |
//! | reference similarity | 0.3 |

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::types::{MatchDetails, MatchMethod};

pub const AMOUNT_WEIGHT: f64 = 0.4;
pub const DATE_WEIGHT: f64 = 0.3;
pub const REFERENCE_WEIGHT: f64 = 0.3;

/// Reference similarity from which a reference counts as corroborating
const STRONG_REFERENCE: f64 = 0.8;

/// Date proximity factor for a distance in days
pub fn date_factor(days: i64) -> f64 {
    match days.abs() {
        0 => 1.0,
        1..=2 => 0.5,
        3..=5 => 0.2,
        _ => 0.0,
    }
}

/// Similarity ratio in `0.0..=1.0` between two references.
///
/// Both sides are trimmed and compared case-insensitively. The ratio is
/// `2 * common / (len_a + len_b)` where `common` is the number of characters
/// covered by recursively taking the longest common substring and repeating
/// on the pieces to its left and right. Missing or blank references score 0.
pub fn reference_similarity(left: Option<&str>, right: Option<&str>) -> f64 {
    let (Some(left), Some(right)) = (left, right) else {
        return 0.0;
    };
    let left: Vec<char> = left.trim().to_uppercase().chars().collect();
    let right: Vec<char> = right.trim().to_uppercase().chars().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let common = common_chars(&left, &right);
    (2 * common) as f64 / (left.len() + right.len()) as f64
}

fn common_chars(left: &[char], right: &[char]) -> usize {
    let (left_pos, right_pos, len) = longest_common_substring(left, right);
    if len == 0 {
        return 0;
    }

    len + common_chars(&left[..left_pos], &right[..right_pos])
        + common_chars(&left[left_pos + len..], &right[right_pos + len..])
}

/// Returns (start in left, start in right, length), first occurrence wins
fn longest_common_substring(left: &[char], right: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j + 1] = common suffix length of left[..=i] and right[..=j]
    let mut lengths = vec![0usize; right.len() + 1];

    for (i, left_char) in left.iter().enumerate() {
        let mut diagonal = 0;
        for (j, right_char) in right.iter().enumerate() {
            let above = lengths[j + 1];
            lengths[j + 1] = if left_char == right_char {
                diagonal + 1
            } else {
                0
            };
            if lengths[j + 1] > best.2 {
                let len = lengths[j + 1];
                best = (i + 1 - len, j + 1 - len, len);
            }
            diagonal = above;
        }
    }

    best
}

/// Score a candidate against a bank transaction
pub fn score_candidate(
    transaction_amount: &BigDecimal,
    transaction_date: NaiveDate,
    transaction_reference: Option<&str>,
    candidate_amount: &BigDecimal,
    candidate_date: NaiveDate,
    candidate_reference: Option<&str>,
) -> MatchDetails {
    let amount_match = transaction_amount.abs() == candidate_amount.abs();
    let date_difference_days = (transaction_date - candidate_date).num_days().abs();
    let date_factor = date_factor(date_difference_days);
    let reference_similarity = reference_similarity(transaction_reference, candidate_reference);

    let amount_component = if amount_match { AMOUNT_WEIGHT } else { 0.0 };
    let score = amount_component
        + DATE_WEIGHT * date_factor
        + REFERENCE_WEIGHT * reference_similarity;

    MatchDetails {
        amount_match,
        date_difference_days,
        date_factor,
        reference_similarity,
        score,
    }
}

/// Auto match method that best describes the evidence
pub fn suggest_method(details: &MatchDetails) -> MatchMethod {
    let strong_reference = details.reference_similarity >= STRONG_REFERENCE;
    match (strong_reference, details.date_factor) {
        (true, factor) if factor > 0.0 => MatchMethod::AutoCombined,
        (true, _) => MatchMethod::AutoReference,
        (false, factor) if factor >= 1.0 => MatchMethod::AutoDate,
        _ => MatchMethod::AutoAmount,
    }
}

/// Convert a `0.0..=1.0` score into a 0–100 confidence
pub fn confidence_from_score(score: f64) -> u8 {
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}
