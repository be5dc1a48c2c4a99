use mongodb::bson::{DateTime, oid::ObjectId};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::{hex, iso, validate_object_id};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub sender_id: ObjectId,
    pub receiver_id: ObjectId,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime>,
    pub booking_id: Option<ObjectId>,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct SendMessageDto {
    #[validate(custom = "validate_object_id")]
    pub receiver_id: String,
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[validate(url)]
    pub file_url: Option<String>,
    #[validate(custom = "validate_object_id")]
    pub booking_id: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct MessageResponse {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub booking_id: Option<String>,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        MessageResponse {
            id: hex(&m.id),
            sender_id: m.sender_id.to_hex(),
            receiver_id: m.receiver_id.to_hex(),
            content: m.content,
            message_type: m.message_type,
            file_url: m.file_url,
            is_read: m.is_read,
            read_at: m.read_at.map(iso),
            booking_id: m.booking_id.map(|id| id.to_hex()),
            created_at: iso(m.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_defaults_to_text() {
        let dto: SendMessageDto = serde_json::from_str(
            r#"{"receiver_id":"507f1f77bcf86cd799439011","content":"Habari, are you free Monday?"}"#,
        )
        .unwrap();
        assert_eq!(dto.message_type, MessageType::Text);
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn oversized_content_and_bad_receiver_fail() {
        let dto = SendMessageDto {
            receiver_id: "nobody".into(),
            content: "x".repeat(1001),
            message_type: MessageType::Text,
            file_url: None,
            booking_id: None,
        };
        let errors = dto.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("content"));
        assert!(fields.contains_key("receiver_id"));
    }
}
