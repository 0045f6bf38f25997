use crate::model::{SurveyItem, TopicTag, UserAnswer};
use crate::count_as_f64;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TopicAnswers {
    pub topic: TopicTag,
    pub answers: Vec<UserAnswer>,
}

impl TopicAnswers {
    /// Mean of the raw 1..=5 answers; `0.0` for an empty group.
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.answers.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.answers.iter().map(|answer| u32::from(answer.get())).sum();
        f64::from(sum) / count_as_f64(self.answers.len())
    }
}

/// Survey answers grouped by topic, in first-encounter order.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct TagAnswerMap {
    groups: Vec<TopicAnswers>,
}

impl TagAnswerMap {
    #[must_use]
    pub fn groups(&self) -> &[TopicAnswers] {
        &self.groups
    }

    #[must_use]
    pub fn get(&self, topic: TopicTag) -> Option<&[UserAnswer]> {
        self.groups.iter().find(|group| group.topic == topic).map(|group| group.answers.as_slice())
    }

    pub fn topics(&self) -> impl Iterator<Item = TopicTag> + '_ {
        self.groups.iter().map(|group| group.topic)
    }

    /// Count of individual answers across every topic.
    #[must_use]
    pub fn total_answers(&self) -> usize {
        self.groups.iter().map(|group| group.answers.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Pair answer `i` with catalog item `i` and group the answers by topic.
///
/// Pairing stops at the shorter of the two sequences; surplus answers or
/// unanswered items are dropped without error. Items whose tag is missing or
/// not a known topic are skipped together with their answer.
#[must_use]
pub fn link_answers_to_topics(catalog: &[SurveyItem], answers: &[UserAnswer]) -> TagAnswerMap {
    let mut groups: Vec<TopicAnswers> = Vec::new();

    for (item, answer) in catalog.iter().zip(answers) {
        let Some(topic) = item.topic() else {
            tracing::debug!(item_id = item.id, tag = ?item.tag, "skipping survey item without a known topic");
            continue;
        };

        match groups.iter_mut().find(|group| group.topic == topic) {
            Some(group) => group.answers.push(*answer),
            None => groups.push(TopicAnswers { topic, answers: vec![*answer] }),
        }
    }

    if answers.len() != catalog.len() {
        tracing::debug!(
            answers = answers.len(),
            survey_items = catalog.len(),
            "answer count differs from survey length; unmatched tail ignored"
        );
    }

    TagAnswerMap { groups }
}
