use super::{protobuf::dispatch_job::DispatchJobProtobuf, DispatchEvent, NotificationType};
use anyhow::anyhow;
use std::str::FromStr;
use time::OffsetDateTime;

///
/// One queued execution of a dispatch event.
///
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchJob {
    pub event: DispatchEvent,
    /// 1 based
    pub attempt: u32,
}

impl DispatchJob {
    pub fn next_attempt(&self, attempt: u32) -> Self {
        Self {
            event: self.event.clone(),
            attempt,
        }
    }
}

impl TryFrom<DispatchJobProtobuf> for DispatchJob {
    type Error = anyhow::Error;

    ///
    /// Message without `created_at` is stamped with the time of receipt.
    /// Every republished attempt carries the stamp, so retries keep the dispatch id.
    ///
    fn try_from(message: DispatchJobProtobuf) -> Result<Self, Self::Error> {
        let notification_type = NotificationType::from_str(&message.event_type)
            .map_err(|_| anyhow!("unknown event type '{}'", message.event_type))?;

        let occurred_at = match message.created_at {
            Some(timestamp) => {
                let nanos = i128::from(timestamp.seconds) * 1_000_000_000
                    + i128::from(timestamp.nanos);
                OffsetDateTime::from_unix_timestamp_nanos(nanos)
                    .map_err(|err| anyhow!("invalid created_at: {err}"))?
            }
            None => OffsetDateTime::now_utc(),
        };

        Ok(Self {
            event: DispatchEvent {
                notification_type,
                actor_id: message.actor_id,
                recipient_id: message.recipient_id,
                context: message.context,
                occurred_at,
            },
            attempt: message.attempt.max(1),
        })
    }
}

impl From<&DispatchJob> for DispatchJobProtobuf {
    fn from(job: &DispatchJob) -> Self {
        let occurred_at = job.event.occurred_at;
        Self {
            event_type: job.event.notification_type.to_string(),
            actor_id: job.event.actor_id,
            recipient_id: job.event.recipient_id,
            context: job.event.context.clone(),
            attempt: job.attempt,
            created_at: Some(prost_types::Timestamp {
                seconds: occurred_at.unix_timestamp(),
                nanos: occurred_at.nanosecond() as i32,
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use prost::Message;
    use std::collections::BTreeMap;

    #[test]
    fn attempt_zero_is_first_attempt() {
        let message = DispatchJobProtobuf {
            event_type: "connection_request".to_string(),
            actor_id: 1,
            recipient_id: 2,
            context: BTreeMap::new(),
            attempt: 0,
            created_at: Some(prost_types::Timestamp {
                seconds: 1_700_000_000,
                nanos: 500,
            }),
        };

        let job = DispatchJob::try_from(message).unwrap();

        assert_eq!(job.attempt, 1);
        assert_eq!(job.event.notification_type, NotificationType::ConnectionRequest);
        assert_eq!(
            job.event.occurred_at.unix_timestamp_nanos(),
            1_700_000_000_000_000_500
        );
    }

    #[test]
    fn missing_created_at_stamped_on_receipt() {
        let message = DispatchJobProtobuf {
            event_type: "new_message".to_string(),
            attempt: 1,
            ..Default::default()
        };
        let before = OffsetDateTime::now_utc();

        let job = DispatchJob::try_from(message).unwrap();

        assert!(job.event.occurred_at >= before);
        assert!(job.event.occurred_at <= OffsetDateTime::now_utc());
    }

    #[test]
    fn unknown_event_type_rejected() {
        let message = DispatchJobProtobuf {
            event_type: "story_viewed".to_string(),
            ..Default::default()
        };

        assert!(DispatchJob::try_from(message).is_err());
    }

    #[test]
    fn republished_job_keeps_event_and_dispatch_id() {
        let job = DispatchJob {
            event: DispatchEvent {
                notification_type: NotificationType::IncomingCall,
                actor_id: 7,
                recipient_id: 9,
                context: BTreeMap::from([
                    ("call_id".to_string(), "55".to_string()),
                    ("call_type".to_string(), "video".to_string()),
                ]),
                occurred_at: OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_456_789)
                    .unwrap(),
            },
            attempt: 1,
        };

        let retried = job.next_attempt(2);
        let encoded = DispatchJobProtobuf::from(&retried).encode_to_vec();
        let decoded = DispatchJobProtobuf::decode(encoded.as_slice()).unwrap();
        let decoded = DispatchJob::try_from(decoded).unwrap();

        assert_eq!(decoded.attempt, 2);
        assert_eq!(decoded.event, job.event);
        assert_eq!(decoded.event.dispatch_id(), job.event.dispatch_id());
    }
}
