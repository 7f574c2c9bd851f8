use super::NotificationType;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

const DISPATCH_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b7_4d0a_8c55_1e7f_d2b9_0a63);

///
/// Event that triggers one dispatch run.
/// `context` carries correlation ids such as `request_id` or `message_id`.
///
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    pub notification_type: NotificationType,
    pub actor_id: i64,
    pub recipient_id: i64,
    pub context: BTreeMap<String, String>,
    /// Carried unchanged by every retry of the event
    pub occurred_at: OffsetDateTime,
}

impl DispatchEvent {
    ///
    /// Deterministic id of the event, identical across retries of the same job.
    /// It is the idempotency key of notification records and delivery attempts.
    ///
    /// Two events with equal content that occurred at different times
    /// (a second like after an unlike, a repeated call) get different ids.
    ///
    pub fn dispatch_id(&self) -> Uuid {
        let mut canonical = String::new();
        push_field(&mut canonical, self.notification_type.as_ref());
        push_field(&mut canonical, &self.actor_id.to_string());
        push_field(&mut canonical, &self.recipient_id.to_string());
        push_field(
            &mut canonical,
            &self.occurred_at.unix_timestamp_nanos().to_string(),
        );
        for (key, value) in self.context.iter() {
            push_field(&mut canonical, key);
            push_field(&mut canonical, value);
        }

        Uuid::new_v5(&DISPATCH_ID_NAMESPACE, canonical.as_bytes())
    }

    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

// length prefix keeps "a" + "bc" distinct from "ab" + "c"
fn push_field(canonical: &mut String, value: &str) {
    canonical.push_str(&value.len().to_string());
    canonical.push(':');
    canonical.push_str(value);
}
