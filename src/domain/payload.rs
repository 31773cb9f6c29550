//! Inbound stream payloads
//!
//! A payload is one message from the `/ws/tags` feed. The reads are decoded
//! into [`TagRead`]s for the display buffer; the whole JSON object is kept
//! verbatim (key order included) for the live payload view.

use crate::domain::types::TagRead;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const TAG_READS_KEY: &str = "tag_reads";

/// Why an inbound message was dropped
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("message is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("message is not a JSON object")]
    NotObject,
    #[error("message has no tag_reads")]
    MissingTagReads,
    #[error("tag_reads is not an array")]
    TagReadsNotArray,
    #[error("tag read {index} is malformed: {source}")]
    BadTagRead {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One inbound message: decoded reads plus the verbatim body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    #[serde(skip)]
    tag_reads: Vec<TagRead>,
    #[serde(flatten)]
    body: Map<String, Value>,
}

impl Payload {
    /// Parse a raw stream message
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(text).map_err(PayloadError::NotJson)?;
        Self::from_value(value)
    }

    /// Parse a raw stream message delivered as bytes
    pub fn parse_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(bytes).map_err(PayloadError::NotJson)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let Value::Object(body) = value else {
            return Err(PayloadError::NotObject);
        };

        let reads = match body.get(TAG_READS_KEY) {
            None | Some(Value::Null) => return Err(PayloadError::MissingTagReads),
            Some(Value::Array(reads)) => reads,
            Some(_) => return Err(PayloadError::TagReadsNotArray),
        };

        let tag_reads = reads
            .iter()
            .enumerate()
            .map(|(index, read)| {
                TagRead::deserialize(read).map_err(|source| PayloadError::BadTagRead { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { tag_reads, body })
    }

    /// Build a payload from already-decoded reads (simulated or test input)
    pub fn from_reads(tag_reads: Vec<TagRead>) -> Self {
        let encoded = tag_reads.iter().filter_map(|r| serde_json::to_value(r).ok()).collect();
        let mut body = Map::new();
        body.insert(TAG_READS_KEY.to_string(), Value::Array(encoded));
        Self { tag_reads, body }
    }

    pub fn tag_reads(&self) -> &[TagRead] {
        &self.tag_reads
    }

    /// Fields other than `tag_reads`, in their original order
    pub fn metadata(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.body.iter().filter(|(key, _)| key.as_str() != TAG_READS_KEY)
    }

    /// The message exactly as received
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.body).unwrap_or_default()
    }
}
