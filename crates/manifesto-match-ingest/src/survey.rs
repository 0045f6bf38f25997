use std::collections::BTreeMap;

use manifesto_match_core::{SurveyItem, TopicTag};
use rand::seq::SliceRandom;
use rand::Rng;

pub const OPTION_LABELS: [&str; 5] =
    ["Strongly Disagree", "Disagree", "Neutral", "Agree", "Strongly Agree"];

#[must_use]
pub fn templates_for(topic: TopicTag) -> &'static [&'static str] {
    match topic {
        TopicTag::Economy => &[
            "Do you support government initiatives to boost economic growth?",
            "Should taxes be reduced to encourage private sector development?",
            "Do you agree with increased spending on job creation programs?",
        ],
        TopicTag::Education => &[
            "Should education be more practical and skill-oriented?",
            "Do you support free higher education for all students?",
            "Should government increase funding for schools and universities?",
        ],
        TopicTag::Technology => &[
            "Should artificial intelligence and automation be regulated to prevent misuse?",
            "Do you support investment in digital infrastructure?",
            "Should government promote research and innovation in technology?",
        ],
        TopicTag::Environment => &[
            "Do you support increased funding for renewable energy?",
            "Should stricter policies be enforced to reduce pollution?",
            "Do you agree with conservation programs for forests and wildlife?",
        ],
        TopicTag::Healthcare => &[
            "Should healthcare be completely free and government-funded?",
            "Do you support government initiatives for mental health?",
            "Should public hospitals receive increased funding?",
        ],
        TopicTag::Defense => &[
            "Do you support increased government spending on national defense?",
            "Should military modernization programs be prioritized?",
            "Do you agree with the current defense policy approach?",
        ],
        TopicTag::Infrastructure => &[
            "Should the government invest more in public transport and smart cities?",
            "Do you support development of roads, bridges, and housing?",
            "Should infrastructure projects prioritize sustainability?",
        ],
        TopicTag::ForeignPolicy => &[
            "Do you support strengthening diplomatic relations internationally?",
            "Should government prioritize trade agreements with other countries?",
            "Do you agree with the current foreign policy strategy?",
        ],
        TopicTag::SocialJustice => &[
            "Should laws be strengthened to ensure equality and social justice?",
            "Do you support policies promoting gender equality?",
            "Should the government take action against discrimination?",
        ],
        TopicTag::Agriculture => &[
            "Should farmers receive a guaranteed minimum price for crops?",
            "Do you support government subsidies for agriculture?",
            "Should irrigation and soil improvement programs be prioritized?",
        ],
    }
}

#[must_use]
pub fn default_options() -> BTreeMap<u8, String> {
    (1_u8..).zip(OPTION_LABELS).map(|(key, label)| (key, label.to_string())).collect()
}

/// One question per topic, in canonical topic order, with ids starting at 1.
#[must_use]
pub fn generate_survey<R: Rng + ?Sized>(rng: &mut R) -> Vec<SurveyItem> {
    TopicTag::ALL
        .iter()
        .zip(1_u64..)
        .filter_map(|(topic, id)| {
            let question = templates_for(*topic).choose(rng)?;
            Some(SurveyItem {
                id,
                question: (*question).to_string(),
                tag: Some(topic.as_str().to_string()),
                options: default_options(),
            })
        })
        .collect()
}
