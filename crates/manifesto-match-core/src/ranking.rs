use serde::{Deserialize, Serialize};

use crate::linker::TagAnswerMap;
use crate::model::TopicTag;
use crate::round_to;
use crate::scoring::AlignmentResult;

/// `(topic, average raw answer)`; serialized as a two-element array.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UserPreference(pub TopicTag, pub f64);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentReport {
    pub alignment_results: Vec<AlignmentResult>,
    pub user_preferences: Vec<UserPreference>,
}

/// Order results by overall alignment, highest first.
///
/// The sort is stable: manifestos with equal alignment keep their input order.
#[must_use]
pub fn rank_results(mut results: Vec<AlignmentResult>) -> Vec<AlignmentResult> {
    results.sort_by(|lhs, rhs| rhs.alignment.total_cmp(&lhs.alignment));
    results
}

#[must_use]
pub fn summarize_preferences(answers: &TagAnswerMap) -> Vec<UserPreference> {
    let mut preferences = answers
        .groups()
        .iter()
        .filter(|group| !group.answers.is_empty())
        .map(|group| UserPreference(group.topic, round_to(group.average(), 2)))
        .collect::<Vec<_>>();
    preferences.sort_by(|lhs, rhs| rhs.1.total_cmp(&lhs.1));
    preferences
}
