use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Explanation attached to a topic the manifesto never scored.
pub const NOT_MENTIONED_EXPLANATION: &str = "This policy was not clearly mentioned.";
pub const DEFAULT_SUMMARY: &str = "No summary available.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TopicTag {
    Economy,
    Education,
    Technology,
    Environment,
    Healthcare,
    Defense,
    Infrastructure,
    #[serde(rename = "Foreign Policy")]
    ForeignPolicy,
    #[serde(rename = "Social Justice")]
    SocialJustice,
    Agriculture,
}

impl TopicTag {
    /// Canonical topic order, used by survey generation and the analysis prompt.
    pub const ALL: [Self; 10] = [
        Self::Economy,
        Self::Education,
        Self::Technology,
        Self::Environment,
        Self::Healthcare,
        Self::Defense,
        Self::Infrastructure,
        Self::ForeignPolicy,
        Self::SocialJustice,
        Self::Agriculture,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Economy => "Economy",
            Self::Education => "Education",
            Self::Technology => "Technology",
            Self::Environment => "Environment",
            Self::Healthcare => "Healthcare",
            Self::Defense => "Defense",
            Self::Infrastructure => "Infrastructure",
            Self::ForeignPolicy => "Foreign Policy",
            Self::SocialJustice => "Social Justice",
            Self::Agriculture => "Agriculture",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Economy" => Some(Self::Economy),
            "Education" => Some(Self::Education),
            "Technology" => Some(Self::Technology),
            "Environment" => Some(Self::Environment),
            "Healthcare" => Some(Self::Healthcare),
            "Defense" => Some(Self::Defense),
            "Infrastructure" => Some(Self::Infrastructure),
            "Foreign Policy" => Some(Self::ForeignPolicy),
            "Social Justice" => Some(Self::SocialJustice),
            "Agriculture" => Some(Self::Agriculture),
            _ => None,
        }
    }
}

impl Display for TopicTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value on the shared 1..=5 scale used by survey answers and manifesto stances.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Score(u8);

/// One survey response, positionally paired with a [`SurveyItem`].
pub type UserAnswer = Score;

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;
    pub const NEUTRAL: Self = Self(3);

    #[must_use]
    pub fn new(value: i64) -> Option<Self> {
        let value = u8::try_from(value).ok()?;
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SurveyItem {
    pub id: u64,
    pub question: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<u8, String>,
}

impl SurveyItem {
    /// Resolved topic, or `None` when the tag is absent or not a known topic.
    #[must_use]
    pub fn topic(&self) -> Option<TopicTag> {
        self.tag.as_deref().and_then(TopicTag::parse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PolicyStance {
    /// Missing or null scores read as neutral. Integral floats such as `4.0` are accepted.
    #[serde(default = "neutral_stance_score", deserialize_with = "deserialize_stance_score")]
    pub score: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct ManifestoAnalysis {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub policy_scores: BTreeMap<String, PolicyStance>,
}

fn neutral_stance_score() -> i64 {
    i64::from(Score::NEUTRAL.get())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

struct StanceScoreVisitor;

impl Visitor<'_> for StanceScoreVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("an integral stance score")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
        Ok(value)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
        i64::try_from(value).map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
    }

    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn visit_f64<E: de::Error>(self, value: f64) -> Result<i64, E> {
        // Bounded well inside i64 so the cast is exact.
        if value.is_finite() && value.trunc() == value && value.abs() <= 1e15 {
            Ok(value as i64)
        } else {
            Err(E::invalid_value(Unexpected::Float(value), &self))
        }
    }

    fn visit_unit<E: de::Error>(self) -> Result<i64, E> {
        Ok(neutral_stance_score())
    }

    fn visit_none<E: de::Error>(self) -> Result<i64, E> {
        Ok(neutral_stance_score())
    }
}

fn deserialize_stance_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    deserializer.deserialize_any(StanceScoreVisitor)
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Manifesto {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub analysis: Option<ManifestoAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub analyzed_at: Option<OffsetDateTime>,
}

impl Manifesto {
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Manifesto {}", self.id),
        }
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        self.analysis
            .as_ref()
            .and_then(|analysis| analysis.summary.as_deref())
            .unwrap_or(DEFAULT_SUMMARY)
    }

    /// Stance mapping, or `None` when it is missing or empty.
    ///
    /// A manifesto without stances is excluded from alignment, which is different
    /// from one whose every topic falls back to the neutral default.
    #[must_use]
    pub fn stances(&self) -> Option<&BTreeMap<String, PolicyStance>> {
        self.analysis
            .as_ref()
            .map(|analysis| &analysis.policy_scores)
            .filter(|scores| !scores.is_empty())
    }
}
