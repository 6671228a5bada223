//! Flat trace event record.
//!
//! Every line the instrumenter prints becomes one [`TraceEvent`]. The record
//! is a union of the fields all event kinds can carry; per kind, most fields
//! are absent, and absence is always legal. Unrecognized `type` strings fold
//! into [`EventKind::Unknown`] instead of failing the parse.

use cityscape_core::CoreError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind discriminator carried in the `type` field of every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Function entry
    Call,
    /// Function exit
    Return,
    /// Variable declaration
    Decl,
    /// Variable mutation
    Assign,
    /// Formal parameter captured on entry
    Param,
    /// Loop condition evaluation
    Loop,
    /// Branch condition evaluation
    Condition,
    /// Branch arm taken
    Branch,
    /// Variable read
    Read,
    /// Call into uninstrumented code
    ExternalCall,
    /// Anything the instrumenter emitted that we do not recognize
    Unknown,
}

impl EventKind {
    /// Wire label for this kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Return => "RETURN",
            Self::Decl => "DECL",
            Self::Assign => "ASSIGN",
            Self::Param => "PARAM",
            Self::Loop => "LOOP",
            Self::Condition => "CONDITION",
            Self::Branch => "BRANCH",
            Self::Read => "READ",
            Self::ExternalCall => "EXTERNAL_CALL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CALL" => Ok(Self::Call),
            "RETURN" => Ok(Self::Return),
            "DECL" => Ok(Self::Decl),
            "ASSIGN" => Ok(Self::Assign),
            "PARAM" => Ok(Self::Param),
            "LOOP" => Ok(Self::Loop),
            "CONDITION" => Ok(Self::Condition),
            "BRANCH" => Ok(Self::Branch),
            "READ" => Ok(Self::Read),
            "EXTERNAL_CALL" => Ok(Self::ExternalCall),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(CoreError::malformed(format!(
                "unknown event kind: {other}"
            ))),
        }
    }
}

// Wire tolerance: unrecognized labels fold to `Unknown` instead of failing
// the whole document.
impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(label.parse().unwrap_or(Self::Unknown))
    }
}

/// One instrumented observation.
///
/// `index` is the event's position in its trace and doubles as replay time;
/// loaders re-stamp it, so wire `id` values are advisory. `depth` is the
/// instrumenter's block-nesting level, used only as a secondary guard during
/// boundary extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    /// Position in the trace
    #[serde(default, alias = "id")]
    pub index: usize,
    /// Event kind
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Function name, variable name, or condition text, by kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Formatted value, already rendered by the instrumenter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Pointer-formatted address of the subject, when captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Source line the event was emitted from
    #[serde(default, alias = "line_number", skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Block-nesting depth at emission
    #[serde(default, alias = "stack_depth", skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
    /// Kind refinement: loop flavor, branch label, or returned-name marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Condition source text for LOOP events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Condition outcome; zero and absent both mean falsy
    #[serde(
        default,
        alias = "condition_result",
        deserialize_with = "de_condition_result",
        skip_serializing_if = "Option::is_none"
    )]
    pub condition_result: Option<i64>,
    /// printf format the instrumenter used; carried through opaquely
    #[serde(default, alias = "format_spec", skip_serializing_if = "Option::is_none")]
    pub format_spec: Option<String>,
    /// Rendered argument list for CALL events
    #[serde(
        default,
        deserialize_with = "de_args",
        skip_serializing_if = "Option::is_none"
    )]
    pub args: Option<String>,
}

impl TraceEvent {
    /// Empty event of the given kind, for programmatic construction
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            index: 0,
            kind,
            subject: None,
            value: None,
            address: None,
            line: None,
            depth: None,
            subtype: None,
            condition: None,
            condition_result: None,
            format_spec: None,
            args: None,
        }
    }

    /// Sets the trace position
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Sets the subject name
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the formatted value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the captured address
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the source line
    #[must_use]
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Sets the nesting depth
    #[must_use]
    pub fn with_depth(mut self, depth: i64) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Sets the kind refinement
    #[must_use]
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Sets the condition text
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Sets the condition outcome
    #[must_use]
    pub fn with_condition_result(mut self, result: i64) -> Self {
        self.condition_result = Some(result);
        self
    }

    /// Sets the rendered argument list
    #[must_use]
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }

    /// Whether the recorded condition evaluated truthy.
    ///
    /// An absent outcome counts as falsy, matching how the instrumenter
    /// reports conditions it could not capture.
    #[must_use]
    pub fn condition_holds(&self) -> bool {
        self.condition_result.is_some_and(|result| result != 0)
    }

    /// Condition text, falling back to the subject when the instrumenter
    /// put it there (CONDITION events do)
    #[must_use]
    pub fn condition_text(&self) -> Option<&str> {
        self.condition.as_deref().or(self.subject.as_deref())
    }
}

/// Accepts the condition outcome as a JSON int, bool, or numeric string.
fn de_condition_result<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Bool(bool),
        Text(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(raw.map(|raw| match raw {
        Raw::Int(value) => value,
        Raw::Bool(value) => i64::from(value),
        Raw::Text(text) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .unwrap_or_else(|_| i64::from(trimmed.eq_ignore_ascii_case("true")))
        }
    }))
}

/// Accepts the argument list as a JSON string or an array of values.
fn de_args<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Many(Vec<serde_json::Value>),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(raw.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Many(parts) => parts
            .iter()
            .map(|part| match part {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
    }))
}
