//! Chat message records as stored and shown by the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EncryptedEnvelope;

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted by the server
    Sent,
    /// Reached the recipient's device
    Delivered,
    /// Opened by the recipient
    Read,
}

/// A message as it travels and rests: body sealed in an envelope
///
/// The sealed fields are nested under `"envelope"` rather than laid out
/// beside `id` and `chatId`. [`EncryptedEnvelope`] rejects unknown fields,
/// which rules out flattening it into this record, and keeping it whole lets
/// the same envelope JSON be handed to [`EncryptedEnvelope::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    /// Message id
    pub id: String,
    /// Conversation the message belongs to
    pub chat_id: String,
    /// Account id of the author
    pub sender_id: String,
    /// The sealed body
    pub envelope: EncryptedEnvelope,
    /// Milliseconds since the Unix epoch on the wire
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Delivery status
    pub status: MessageStatus,
}

/// A message after decryption, ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedMessage {
    /// Message id
    pub id: String,
    /// Conversation the message belongs to
    pub chat_id: String,
    /// Account id of the author
    pub sender_id: String,
    /// Decrypted body
    pub text: String,
    /// When the message was sent
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Delivery status
    pub status: MessageStatus,
    /// Sent by this device's identity
    pub is_own: bool,
}

impl EncryptedMessage {
    /// Advance the delivery status; never moves backwards
    pub fn advance_status(&mut self, status: MessageStatus) {
        if status > self.status {
            self.status = status;
        }
    }
}

impl PartialOrd for MessageStatus {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MessageStatus {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(status: &MessageStatus) -> u8 {
            match status {
                MessageStatus::Sent => 0,
                MessageStatus::Delivered => 1,
                MessageStatus::Read => 2,
            }
        }
        rank(self).cmp(&rank(other))
    }
}
