use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RelayError, Result};

pub const DEFAULT_SPEAKER: i64 = 6;
pub const DEFAULT_SPEED: f64 = 1.0;

/// One synthesis request as accepted from a caller. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisQuery {
    text: String,
    speaker_id: i64,
    speed_scale: f64,
    output_stereo: bool,
}

impl SynthesisQuery {
    /// Build a query, rejecting blank text before anything reaches VOICEVOX.
    pub fn new(text: impl Into<String>, speaker_id: i64, speed_scale: f64) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RelayError::Validation("Text cannot be empty".to_string()));
        }
        if !speed_scale.is_finite() || speed_scale <= 0.0 {
            return Err(RelayError::Validation(format!(
                "Speed must be a positive number, got {speed_scale}"
            )));
        }

        Ok(Self {
            text,
            speaker_id,
            speed_scale,
            output_stereo: false,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn speaker_id(&self) -> i64 {
        self.speaker_id
    }

    pub fn speed_scale(&self) -> f64 {
        self.speed_scale
    }

    pub fn output_stereo(&self) -> bool {
        self.output_stereo
    }
}

/// Parameter document produced by `audio_query` and consumed by `synthesis`.
///
/// VOICEVOX owns its schema, so it is kept as an untyped JSON object and only
/// the fields this relay overrides are touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioQuery(Map<String, Value>);

impl AudioQuery {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(RelayError::UpstreamMalformed(format!(
                "audio_query returned {} instead of an object",
                json_kind(&other)
            ))),
        }
    }

    /// Apply the caller's speed and the fixed mono output setting.
    pub fn apply(&mut self, query: &SynthesisQuery) {
        self.0
            .insert("speedScale".to_string(), Value::from(query.speed_scale()));
        self.0
            .insert("outputStereo".to_string(), Value::Bool(query.output_stereo()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
