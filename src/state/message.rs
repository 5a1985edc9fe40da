//! Bus message records.
//!
//! Inbound: `cube/right/<sender>` neighbor reports. Outbound: letter,
//! border, flash and lock updates queued for an external publisher.

use std::collections::VecDeque;

use serde::Serialize;

/// Topic prefix for right-neighbor reports.
pub const NEIGHBOR_TOPIC_PREFIX: &str = "cube/right/";

/// Payload a cube sends when nothing is to its right.
pub const NO_NEIGHBOR: &str = "-";

/// A parsed `cube/right/<sender>` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborReport {
    pub sender: String,
    /// `None` when the payload is empty or `"-"`
    pub neighbor: Option<String>,
}

impl NeighborReport {
    /// Parse a topic/payload pair. Returns `None` for any other topic.
    pub fn parse(topic: &str, payload: &str) -> Option<Self> {
        let sender = topic.strip_prefix(NEIGHBOR_TOPIC_PREFIX)?;
        if sender.is_empty() || sender.contains('/') {
            return None;
        }

        let payload = payload.trim();
        let neighbor = if payload.is_empty() || payload == NO_NEIGHBOR {
            None
        } else {
            Some(payload.to_string())
        };

        Some(Self {
            sender: sender.to_string(),
            neighbor,
        })
    }
}

/// One edge of a cube's border display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BorderSide {
    East,
    North,
    South,
    West,
}

impl BorderSide {
    pub fn as_char(&self) -> char {
        match self {
            Self::East => 'E',
            Self::North => 'N',
            Self::South => 'S',
            Self::West => 'W',
        }
    }
}

/// Border instruction for a single cube.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BorderDirective {
    /// Turn every border off
    Clear,
    /// Draw the given sides in a color
    Draw { sides: Vec<BorderSide>, color: String },
}

impl BorderDirective {
    /// Wire payload: `"<sides>:<color>"` with sides sorted, or `":"` to clear.
    pub fn payload(&self) -> String {
        match self {
            Self::Clear => ":".to_string(),
            Self::Draw { sides, color } => {
                let mut sides = sides.clone();
                sides.sort();
                sides.dedup();
                let sides: String = sides.iter().map(BorderSide::as_char).collect();
                format!("{}:{}", sides, color)
            }
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear)
    }
}

/// An outbound bus message: `(topic, payload, retain, timestamp_ms)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub topic: String,
    /// `None` clears a retained value
    pub payload: Option<String>,
    pub retain: bool,
    pub timestamp_ms: i64,
}

impl OutboundMessage {
    pub fn new(topic: String, payload: Option<String>, retain: bool, timestamp_ms: i64) -> Self {
        Self {
            topic,
            payload,
            retain,
            timestamp_ms,
        }
    }

    pub fn letter(cube_id: &str, letter: &str, now_ms: i64) -> Self {
        Self::new(
            format!("cube/{}/letter", cube_id),
            Some(letter.to_string()),
            true,
            now_ms,
        )
    }

    pub fn border(cube_id: &str, directive: &BorderDirective, now_ms: i64) -> Self {
        Self::new(
            format!("cube/{}/border", cube_id),
            Some(directive.payload()),
            true,
            now_ms,
        )
    }

    pub fn flash(cube_id: &str, now_ms: i64) -> Self {
        Self::new(
            format!("cube/{}/flash", cube_id),
            Some("1".to_string()),
            false,
            now_ms,
        )
    }

    pub fn lock(cube_id: &str, now_ms: i64) -> Self {
        Self::new(
            format!("cube/{}/lock", cube_id),
            Some("1".to_string()),
            true,
            now_ms,
        )
    }

    pub fn unlock(cube_id: &str, now_ms: i64) -> Self {
        Self::new(format!("cube/{}/lock", cube_id), None, true, now_ms)
    }

    /// Cube ID embedded in a `cube/<id>/...` topic.
    pub fn cube_id(&self) -> Option<&str> {
        let mut parts = self.topic.split('/');
        match (parts.next(), parts.next()) {
            (Some("cube"), Some(id)) => Some(id),
            _ => None,
        }
    }

    /// One line of the publish log.
    pub fn to_jsonl(&self) -> String {
        serde_json::json!({
            "event_type": "mqtt_publish",
            "topic": self.topic,
            "message": self.payload,
            "retain": self.retain
        })
        .to_string()
    }
}

/// FIFO of outbound messages. Producers never wait on the publisher.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<OutboundMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: OutboundMessage) {
        self.queue.push_back(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = OutboundMessage>) {
        self.queue.extend(messages);
    }

    /// Take every queued message in publish order.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        self.queue.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
