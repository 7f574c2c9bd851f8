//!
//! Clients of external delivery channels.
//! Clients never return errors, every failure is described by [DeliveryOutcome].
//!

mod channel_client;
mod delivery_channels;
mod delivery_outcome;
mod email_client;
mod expo_client;
mod fcm_client;
mod payload;
mod web_push_client;

pub use channel_client::*;
pub use delivery_channels::*;
pub use delivery_outcome::*;
pub use email_client::*;
pub use expo_client::*;
pub use fcm_client::*;
pub use payload::*;
pub use web_push_client::*;
