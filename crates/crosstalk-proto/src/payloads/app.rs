//! Application relay payload bodies: chat and canvas.

use serde::{Deserialize, Serialize};

/// Chat message body.
///
/// The same shape travels both directions: clients submit it under
/// `SendMessage` and the relay delivers it under `CreateMessage`, text and
/// sender name untouched. Chat is the one event echoed back to its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message text, relayed verbatim.
    pub text: String,
    /// Display name the sender chose. Not checked against the peer id.
    pub sender_name: String,
}

/// One drawing stroke segment.
///
/// Coordinates live in the logical 800x600 canvas space clients agree on by
/// convention. The relay treats them as opaque numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    /// Room the stroke targets. Required on submission and validated against
    /// the sender's current room; stripped from the forwarded copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Segment start x.
    pub x0: f32,
    /// Segment start y.
    pub y0: f32,
    /// Segment end x.
    pub x1: f32,
    /// Segment end y.
    pub y1: f32,
    /// Stroke color as a CSS color string.
    pub color: String,
}

impl Stroke {
    /// Copy of this stroke without the room id, the shape forwarded to
    /// room members.
    pub fn without_room(&self) -> Self {
        Self { room_id: None, ..self.clone() }
    }
}
