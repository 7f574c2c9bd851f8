//!
//! Pure eligibility checks, evaluated before any channel is attempted.
//! Unset preference keys count as enabled.
//!

use crate::{
    dto::{DeliveryChannel, NotificationType},
    repository::{NotificationPreferences, User},
};

pub const PUSH_NOTIFICATIONS_KEY: &str = "push_notifications";
pub const EMAIL_NOTIFICATIONS_KEY: &str = "email_notifications";

pub fn is_channel_enabled(preferences: &NotificationPreferences, channel: DeliveryChannel) -> bool {
    match channel.is_push() {
        true => preferences.is_enabled(PUSH_NOTIFICATIONS_KEY),
        false => preferences.is_enabled(EMAIL_NOTIFICATIONS_KEY),
    }
}

///
/// Per event type toggle, keyed by the type tag e.g. `new_message`.
///
pub fn is_event_enabled(
    preferences: &NotificationPreferences,
    notification_type: NotificationType,
) -> bool {
    preferences.is_enabled(notification_type.as_ref())
}

pub fn has_verified_email(user: &User) -> Option<&str> {
    match user.email_verified {
        true => user.email.as_deref().filter(|email| !email.trim().is_empty()),
        false => None,
    }
}
