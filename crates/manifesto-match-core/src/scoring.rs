use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::linker::TagAnswerMap;
use crate::model::{Manifesto, Score, TopicTag, NOT_MENTIONED_EXPLANATION};
use crate::{count_as_f64, round_to, AlignmentOptions, EngineError};

/// Largest possible distance on the 1..=5 scale.
pub const MAX_DISTANCE: f64 = 4.0;
pub const TOP_TOPIC_LIMIT: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicDetail {
    pub tag: TopicTag,
    /// Average similarity for this topic, in percent.
    pub similarity_score: f64,
    pub explanation: String,
    pub party_score: u8,
    /// Average raw user answer for this topic.
    pub user_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentResult {
    pub manifesto_id: u64,
    pub name: String,
    pub alignment: f64,
    pub summary: String,
    pub top_matching_policies: Vec<TopicDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_disagreements: Option<Vec<TopicDetail>>,
}

/// Similarity in `[0, 1]` between a user answer and a manifesto stance.
#[must_use]
pub fn similarity(user: Score, document: Score) -> f64 {
    let distance = f64::from(user.get().abs_diff(document.get()));
    (1.0 - distance / MAX_DISTANCE).max(0.0)
}

fn by_similarity_desc(lhs: &TopicDetail, rhs: &TopicDetail) -> Ordering {
    rhs.similarity_score.total_cmp(&lhs.similarity_score)
}

fn by_similarity_asc(lhs: &TopicDetail, rhs: &TopicDetail) -> Ordering {
    lhs.similarity_score.total_cmp(&rhs.similarity_score)
}

/// Score one manifesto against the grouped answers.
///
/// Returns `Ok(None)` when the manifesto has no stance mapping at all; such
/// manifestos are left out of the ranking rather than scored as 0%.
///
/// # Errors
/// Returns [`EngineError::Internal`] when a stance score falls outside 1..=5.
pub fn align_manifesto(
    answers: &TagAnswerMap,
    manifesto: &Manifesto,
    options: &AlignmentOptions,
) -> Result<Option<AlignmentResult>, EngineError> {
    let Some(stances) = manifesto.stances() else {
        return Ok(None);
    };

    let total_answers = answers.total_answers();
    let mut score_sum = 0.0_f64;
    let mut details = Vec::with_capacity(answers.groups().len());

    for group in answers.groups() {
        let (party_score, explanation) = match stances.get(group.topic.as_str()) {
            Some(stance) => {
                let score = Score::new(stance.score).ok_or_else(|| {
                    EngineError::Internal(format!(
                        "manifesto {} has out-of-range score {} for {}",
                        manifesto.id, stance.score, group.topic
                    ))
                })?;
                (score, stance.explanation.clone())
            }
            None => (Score::NEUTRAL, NOT_MENTIONED_EXPLANATION.to_string()),
        };

        let topic_sum: f64 =
            group.answers.iter().map(|answer| similarity(*answer, party_score)).sum();
        score_sum += topic_sum;

        let topic_similarity = if group.answers.is_empty() {
            0.0
        } else {
            topic_sum / count_as_f64(group.answers.len())
        };

        details.push(TopicDetail {
            tag: group.topic,
            similarity_score: round_to(topic_similarity * 100.0, 1),
            explanation,
            party_score: party_score.get(),
            user_score: round_to(group.average(), 1),
        });
    }

    let alignment = if total_answers == 0 {
        0.0
    } else {
        score_sum / count_as_f64(total_answers) * 100.0
    };

    let top_disagreements = options.include_disagreements.then(|| {
        let mut ascending = details.clone();
        ascending.sort_by(by_similarity_asc);
        ascending.truncate(TOP_TOPIC_LIMIT);
        ascending
    });

    details.sort_by(by_similarity_desc);
    details.truncate(TOP_TOPIC_LIMIT);

    Ok(Some(AlignmentResult {
        manifesto_id: manifesto.id,
        name: manifesto.display_name(),
        alignment: round_to(alignment, 1),
        summary: manifesto.summary().to_string(),
        top_matching_policies: details,
        top_disagreements,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::linker::link_answers_to_topics;
    use crate::model::{ManifestoAnalysis, PolicyStance, SurveyItem};

    fn score(value: i64) -> Score {
        Score::new(value).unwrap_or_else(|| panic!("fixture score out of range: {value}"))
    }

    fn catalog(tags: &[&str]) -> Vec<SurveyItem> {
        tags.iter()
            .zip(1_u64..)
            .map(|(tag, id)| SurveyItem {
                id,
                question: format!("Question {id}"),
                tag: Some((*tag).to_string()),
                options: BTreeMap::new(),
            })
            .collect()
    }

    fn manifesto(id: u64, stances: &[(&str, i64)]) -> Manifesto {
        Manifesto {
            id,
            name: Some(format!("Party {id}")),
            analysis: Some(ManifestoAnalysis {
                summary: Some(format!("Summary {id}")),
                policy_scores: stances
                    .iter()
                    .map(|(tag, value)| {
                        (
                            (*tag).to_string(),
                            PolicyStance { score: *value, explanation: format!("{tag} stance") },
                        )
                    })
                    .collect(),
            }),
            source_text: None,
            analyzed_at: None,
        }
    }

    fn align(tags: &[&str], answers: &[i64], manifesto: &Manifesto) -> Option<AlignmentResult> {
        let answers = answers.iter().map(|value| score(*value)).collect::<Vec<_>>();
        let map = link_answers_to_topics(&catalog(tags), &answers);
        match align_manifesto(&map, manifesto, &AlignmentOptions::default()) {
            Ok(result) => result,
            Err(err) => panic!("alignment should succeed: {err}"),
        }
    }

    // Test IDs: TSIM-001
    #[test]
    fn similarity_is_one_for_identical_scores() {
        for value in 1..=5 {
            assert!((similarity(score(value), score(value)) - 1.0).abs() < f64::EPSILON);
        }
    }

    // Test IDs: TSIM-002
    #[test]
    fn similarity_bottoms_out_at_zero_for_opposite_extremes() {
        assert_eq!(similarity(score(1), score(5)), 0.0);
        assert_eq!(similarity(score(5), score(1)), 0.0);
        assert!(similarity(score(1), score(5)).is_sign_positive());
    }

    // Test IDs: TAGG-001
    #[test]
    fn missing_topic_uses_neutral_default() {
        let party = manifesto(1, &[("Economy", 5)]);
        let result = align(&["Environment"], &[4], &party)
            .unwrap_or_else(|| panic!("manifesto with stances should be scored"));

        assert_eq!(result.alignment, 75.0);
        let detail = &result.top_matching_policies[0];
        assert_eq!(detail.tag, TopicTag::Environment);
        assert_eq!(detail.similarity_score, 75.0);
        assert_eq!(detail.party_score, 3);
        assert_eq!(detail.explanation, NOT_MENTIONED_EXPLANATION);
    }

    // Test IDs: TAGG-002
    #[test]
    fn overall_alignment_weights_every_answer_not_every_topic() {
        let party = manifesto(1, &[("Economy", 5), ("Education", 1)]);
        // Economy answered three times (all 5), Education once (5 vs 1 -> 0.0).
        let result = align(&["Economy", "Economy", "Economy", "Education"], &[5, 5, 5, 5], &party)
            .unwrap_or_else(|| panic!("manifesto with stances should be scored"));

        assert_eq!(result.alignment, 75.0);
    }

    // Test IDs: TAGG-003
    #[test]
    fn manifesto_without_stances_is_excluded() {
        let empty = manifesto(1, &[]);
        assert!(align(&["Economy"], &[3], &empty).is_none());

        let missing = Manifesto { analysis: None, ..manifesto(2, &[]) };
        assert!(align(&["Economy"], &[3], &missing).is_none());
    }

    // Test IDs: TAGG-004
    #[test]
    fn top_matches_are_capped_and_sorted_descending() {
        let party = manifesto(
            1,
            &[("Economy", 1), ("Education", 5), ("Defense", 3), ("Healthcare", 4), ("Agriculture", 2)],
        );
        let result = align(
            &["Economy", "Education", "Defense", "Healthcare", "Agriculture"],
            &[5, 5, 5, 5, 5],
            &party,
        )
        .unwrap_or_else(|| panic!("manifesto with stances should be scored"));

        let tags =
            result.top_matching_policies.iter().map(|detail| detail.tag).collect::<Vec<_>>();
        assert_eq!(tags, vec![TopicTag::Education, TopicTag::Healthcare, TopicTag::Defense]);
        assert!(result.top_disagreements.is_none());
    }

    // Test IDs: TAGG-005
    #[test]
    fn equal_topic_similarity_keeps_answer_order() {
        let party = manifesto(1, &[("Economy", 4), ("Education", 4), ("Defense", 4)]);
        let result = align(&["Defense", "Economy", "Education"], &[4, 4, 4], &party)
            .unwrap_or_else(|| panic!("manifesto with stances should be scored"));

        let tags =
            result.top_matching_policies.iter().map(|detail| detail.tag).collect::<Vec<_>>();
        assert_eq!(tags, vec![TopicTag::Defense, TopicTag::Economy, TopicTag::Education]);
    }

    // Test IDs: TAGG-006
    #[test]
    fn disagreements_are_sorted_ascending_when_requested() {
        let party = manifesto(1, &[("Economy", 1), ("Education", 5), ("Defense", 3), ("Healthcare", 4)]);
        let answers = [5, 5, 5, 5].iter().map(|value| score(*value)).collect::<Vec<_>>();
        let map = link_answers_to_topics(
            &catalog(&["Economy", "Education", "Defense", "Healthcare"]),
            &answers,
        );
        let options = AlignmentOptions { include_disagreements: true };
        let result = match align_manifesto(&map, &party, &options) {
            Ok(Some(result)) => result,
            Ok(None) => panic!("manifesto with stances should be scored"),
            Err(err) => panic!("alignment should succeed: {err}"),
        };

        let disagreements = result
            .top_disagreements
            .unwrap_or_else(|| panic!("disagreements were requested"));
        let tags = disagreements.iter().map(|detail| detail.tag).collect::<Vec<_>>();
        assert_eq!(tags, vec![TopicTag::Economy, TopicTag::Defense, TopicTag::Healthcare]);
        assert_eq!(result.top_matching_policies.len(), 3);
    }

    // Test IDs: TAGG-007
    #[test]
    fn out_of_range_stance_is_an_internal_error() {
        let party = manifesto(9, &[("Economy", 7)]);
        let answers = vec![score(3)];
        let map = link_answers_to_topics(&catalog(&["Economy"]), &answers);
        let err = match align_manifesto(&map, &party, &AlignmentOptions::default()) {
            Ok(_) => panic!("out-of-range stance must not be scored"),
            Err(err) => err,
        };
        assert!(matches!(err, EngineError::Internal(message) if message.contains("manifesto 9")));
    }

    // Test IDs: TAGG-008
    #[test]
    fn user_score_is_rounded_raw_average() {
        let party = manifesto(1, &[("Economy", 3)]);
        let result = align(&["Economy", "Economy", "Economy"], &[5, 4, 4], &party)
            .unwrap_or_else(|| panic!("manifesto with stances should be scored"));

        let detail = &result.top_matching_policies[0];
        assert_eq!(detail.user_score, 4.3);
        // (0.5 + 0.75 + 0.75) / 3 = 0.6667
        assert_eq!(detail.similarity_score, 66.7);
    }
}
