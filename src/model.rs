//! Core data types: entities, questions, answers, and completed-game records.
//!
//! Entities carry a sparse [`AttributeVector`]: a key that is absent is
//! "unknown" and contributes value 0 with zero weight. It is never stored as
//! an explicit zero.

use std::collections::BTreeMap;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Create an id from a raw `u64`. Returns `None` if `raw` is zero.
            pub fn new(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map($name)
            }

            /// Get the underlying `u64` value.
            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of an entity in the attribute store.
    EntityId,
    "entity"
);

id_type!(
    /// Identifier of a question in the catalogue.
    QuestionId,
    "q"
);

/// Opaque identifier of a live game session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random 128-bit session id (hex encoded).
    pub fn generate() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Attribute values and answers
// ---------------------------------------------------------------------------

/// A signed attribute value in `-2..=2`.
///
/// `-2` is a firm "no", `2` a firm "yes", `0` "don't know".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub struct AttributeValue(i8);

impl AttributeValue {
    pub const MIN: i8 = -2;
    pub const MAX: i8 = 2;
    pub const UNKNOWN: AttributeValue = AttributeValue(0);

    /// Create a value, returning `None` outside `-2..=2`.
    pub fn new(raw: i8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&raw).then_some(Self(raw))
    }

    /// Create a value, clamping into `-2..=2`.
    pub fn clamped(raw: i64) -> Self {
        Self(raw.clamp(Self::MIN as i64, Self::MAX as i64) as i8)
    }

    pub fn get(self) -> i8 {
        self.0
    }
}

impl TryFrom<i8> for AttributeValue {
    type Error = String;

    fn try_from(raw: i8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| format!("attribute value {raw} outside -2..=2"))
    }
}

impl From<AttributeValue> for i8 {
    fn from(v: AttributeValue) -> i8 {
        v.0
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+}", self.0)
    }
}

/// The five answers a player can give.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Yes,
    ProbablyYes,
    DontKnow,
    ProbablyNo,
    No,
}

impl Answer {
    pub const ALL: [Answer; 5] = [
        Answer::Yes,
        Answer::ProbablyYes,
        Answer::DontKnow,
        Answer::ProbablyNo,
        Answer::No,
    ];

    /// Numeric value this answer maps to.
    pub fn value(self) -> AttributeValue {
        AttributeValue(match self {
            Answer::Yes => 2,
            Answer::ProbablyYes => 1,
            Answer::DontKnow => 0,
            Answer::ProbablyNo => -1,
            Answer::No => -2,
        })
    }

    /// Wire label (`yes`, `probably_yes`, ...).
    pub fn label(self) -> &'static str {
        match self {
            Answer::Yes => "yes",
            Answer::ProbablyYes => "probably_yes",
            Answer::DontKnow => "dont_know",
            Answer::ProbablyNo => "probably_no",
            Answer::No => "no",
        }
    }
}

impl std::str::FromStr for Answer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Answer::ALL
            .into_iter()
            .find(|a| a.label() == s)
            .ok_or_else(|| format!("unknown answer \"{s}\""))
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A stored attribute: value plus the confidence we have in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub value: AttributeValue,
    /// Strength of belief in `value`, in `[0, 1]`.
    pub confidence: f64,
}

impl Attribute {
    pub fn new(value: AttributeValue, confidence: f64) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Sparse attribute vector keyed by attribute key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeVector(BTreeMap<String, Attribute>);

impl AttributeVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.0.get(key)
    }

    /// Value for `key`, or [`AttributeValue::UNKNOWN`] when absent.
    pub fn value_or_unknown(&self, key: &str) -> AttributeValue {
        self.0
            .get(key)
            .map(|a| a.value)
            .unwrap_or(AttributeValue::UNKNOWN)
    }

    pub fn set(&mut self, key: impl Into<String>, attribute: Attribute) {
        self.0.insert(key.into(), attribute);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Attribute)> for AttributeVector {
    fn from_iter<T: IntoIterator<Item = (String, Attribute)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Entities and questions
// ---------------------------------------------------------------------------

/// Display metadata and play counters for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub times_played: u64,
    pub times_guessed: u64,
}

impl EntityMeta {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            image_url: None,
            times_played: 0,
            times_guessed: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A stored entity: metadata plus its sparse attribute vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub meta: EntityMeta,
    pub attributes: AttributeVector,
}

/// An entity candidate for insertion: metadata without an id yet, plus attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub attributes: AttributeVector,
}

impl NewEntity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an attribute with full confidence (manual entry).
    pub fn with(mut self, key: &str, value: i8) -> Self {
        if let Some(value) = AttributeValue::new(value) {
            self.attributes.set(key, Attribute::new(value, 1.0));
        }
        self
    }

    /// Take every answered key of a game as a full-confidence attribute.
    pub fn with_answers(mut self, answers: &BTreeMap<String, AttributeValue>) -> Self {
        for (key, value) in answers {
            self.attributes.set(key, Attribute::new(*value, 1.0));
        }
        self
    }
}

/// A catalogue question probing one attribute key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub attribute_key: String,
    pub times_asked: u64,
    /// Learned usefulness weight; starts at 1.0.
    pub effectiveness_score: f64,
}

impl Question {
    pub const DEFAULT_EFFECTIVENESS: f64 = 1.0;

    pub fn new(id: QuestionId, text: impl Into<String>, attribute_key: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            attribute_key: attribute_key.into(),
            times_asked: 0,
            effectiveness_score: Self::DEFAULT_EFFECTIVENESS,
        }
    }
}

/// Persisted summary of a finished game; the sole input to learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub session_id: SessionId,
    /// The entity the player had in mind, when known.
    pub target_entity: Option<EntityId>,
    pub guessed_entity: EntityId,
    pub success: bool,
    /// Questions in the order they were asked.
    pub questions_asked: Vec<QuestionId>,
    /// Attribute key → answer value given.
    pub answers: BTreeMap<String, AttributeValue>,
    pub question_count: u32,
    /// Seconds since UNIX epoch.
    pub finished_at: u64,
}

/// Seconds since UNIX epoch.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_labels_map_to_fixed_values() {
        let pairs: Vec<(&str, i8)> = Answer::ALL
            .iter()
            .map(|a| (a.label(), a.value().get()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("yes", 2),
                ("probably_yes", 1),
                ("dont_know", 0),
                ("probably_no", -1),
                ("no", -2)
            ]
        );
    }

    #[test]
    fn answer_parses_from_label() {
        assert_eq!("probably_no".parse::<Answer>().unwrap(), Answer::ProbablyNo);
        assert!("maybe".parse::<Answer>().is_err());
    }

    #[test]
    fn answer_serde_uses_snake_case() {
        let json = serde_json::to_string(&Answer::DontKnow).unwrap();
        assert_eq!(json, "\"dont_know\"");
    }

    #[test]
    fn attribute_value_rejects_out_of_range() {
        assert!(AttributeValue::new(3).is_none());
        assert!(AttributeValue::new(-3).is_none());
        assert_eq!(AttributeValue::clamped(7).get(), 2);
        assert_eq!(AttributeValue::clamped(-9).get(), -2);
        assert!(serde_json::from_str::<AttributeValue>("5").is_err());
    }

    #[test]
    fn absent_attribute_is_unknown() {
        let vector = NewEntity::named("x").with("is_human", 2).attributes;
        assert_eq!(vector.value_or_unknown("is_human").get(), 2);
        assert_eq!(vector.value_or_unknown("can_fly"), AttributeValue::UNKNOWN);
        assert!(vector.get("can_fly").is_none());
    }

    #[test]
    fn ids_reject_zero() {
        assert!(EntityId::new(0).is_none());
        assert_eq!(QuestionId::new(3).unwrap().to_string(), "q:3");
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
