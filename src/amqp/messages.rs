//! AMQP message definitions and serialization

use crate::error::{LeagueError, Result};
use crate::types::*;
use serde_json;

/// AMQP queue names
pub const SUBMISSIONS_QUEUE: &str = "league.result_submissions";
pub const NOTIFICATIONS_EXCHANGE: &str = "league.notifications";

/// Routing keys
pub const RESULT_SUBMITTED_ROUTING_KEY: &str = "result.submitted";
pub const NOTIFICATION_ROUTING_KEY: &str = "notification.send";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            LeagueError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            LeagueError::InvalidSubmission {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize a result submission to bytes
    pub fn serialize_result_submission(submission: &ResultSubmission) -> Result<Vec<u8>> {
        Self::validate_result_submission(submission)?;
        serde_json::to_vec(submission).map_err(|e| {
            LeagueError::InternalError {
                message: format!("Failed to serialize result submission: {}", e),
            }
            .into()
        })
    }

    /// Deserialize a result submission from bytes
    pub fn deserialize_result_submission(bytes: &[u8]) -> Result<ResultSubmission> {
        let submission: ResultSubmission =
            serde_json::from_slice(bytes).map_err(|e| LeagueError::InvalidSubmission {
                reason: format!("Failed to deserialize result submission: {}", e),
            })?;

        Self::validate_result_submission(&submission)?;
        Ok(submission)
    }

    /// Wire-level sanity checks on a submission; full score validation
    /// happens in the processor.
    pub fn validate_result_submission(submission: &ResultSubmission) -> Result<()> {
        if submission.player_a == submission.player_b {
            return Err(LeagueError::InvalidSubmission {
                reason: "Submission must name two distinct players".to_string(),
            }
            .into());
        }

        if submission.sets_a > 3 || submission.sets_b > 3 {
            return Err(LeagueError::InvalidSubmission {
                reason: format!(
                    "Set counts out of range: {}:{}",
                    submission.sets_a, submission.sets_b
                ),
            }
            .into());
        }

        Ok(())
    }

    /// Validate an outbound notification
    pub fn validate_notification(notification: &Notification) -> Result<()> {
        if notification.recipient.is_empty() {
            return Err(LeagueError::InvalidSubmission {
                reason: "Notification recipient cannot be empty".to_string(),
            }
            .into());
        }

        if notification.text.is_empty() {
            return Err(LeagueError::InvalidSubmission {
                reason: "Notification text cannot be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: serde::Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            LeagueError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Get routing key for a message type
    pub fn get_routing_key(message: &AmqpMessage) -> &'static str {
        match message {
            AmqpMessage::ResultSubmission(_) => RESULT_SUBMITTED_ROUTING_KEY,
            AmqpMessage::Notification(_) => NOTIFICATION_ROUTING_KEY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{current_timestamp, generate_id};

    fn create_test_submission() -> ResultSubmission {
        let player_a = generate_id();
        ResultSubmission {
            division_id: generate_id(),
            player_a,
            player_b: generate_id(),
            sets_a: 3,
            sets_b: 1,
            submitted_by: player_a,
            timestamp: current_timestamp(),
        }
    }

    #[test]
    fn test_message_envelope_creation() {
        let submission = create_test_submission();
        let envelope = MessageEnvelope::new(submission, "test.routing.key".to_string());

        assert_eq!(envelope.routing_key, "test.routing.key");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_submission_validation() {
        let valid = create_test_submission();
        assert!(MessageUtils::validate_result_submission(&valid).is_ok());

        // Same player on both sides
        let mut invalid = create_test_submission();
        invalid.player_b = invalid.player_a;
        assert!(MessageUtils::validate_result_submission(&invalid).is_err());

        // Out-of-range set count
        let mut invalid = create_test_submission();
        invalid.sets_a = 7;
        assert!(MessageUtils::validate_result_submission(&invalid).is_err());
    }

    #[test]
    fn test_notification_validation() {
        let notification = Notification {
            recipient: "@alice".to_string(),
            text: "Your result was recorded".to_string(),
            action_link: None,
            timestamp: current_timestamp(),
        };
        assert!(MessageUtils::validate_notification(&notification).is_ok());

        let mut invalid = notification.clone();
        invalid.recipient = String::new();
        assert!(MessageUtils::validate_notification(&invalid).is_err());

        let mut invalid = notification;
        invalid.text = String::new();
        assert!(MessageUtils::validate_notification(&invalid).is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let submission = create_test_submission();
        let bytes = MessageUtils::serialize_result_submission(&submission).unwrap();
        let deserialized = MessageUtils::deserialize_result_submission(&bytes).unwrap();

        assert_eq!(submission.division_id, deserialized.division_id);
        assert_eq!(submission.player_a, deserialized.player_a);
        assert_eq!(submission.sets_a, deserialized.sets_a);
        assert_eq!(submission.submitted_by, deserialized.submitted_by);
    }

    #[test]
    fn test_invalid_payload_is_rejected() {
        let err = MessageUtils::deserialize_result_submission(b"not json").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::InvalidSubmission { .. })
        ));
    }

    #[test]
    fn test_routing_key_generation() {
        let submission = AmqpMessage::ResultSubmission(create_test_submission());
        assert_eq!(
            MessageUtils::get_routing_key(&submission),
            RESULT_SUBMITTED_ROUTING_KEY
        );

        let notification = AmqpMessage::Notification(Notification {
            recipient: "@alice".to_string(),
            text: "hello".to_string(),
            action_link: None,
            timestamp: current_timestamp(),
        });
        assert_eq!(
            MessageUtils::get_routing_key(&notification),
            NOTIFICATION_ROUTING_KEY
        );
    }
}
