use super::{EmailClient, PushClient};
use crate::dto::DeliveryChannel;
use std::sync::Arc;

///
/// Clients built once from configuration.
/// `None` marks channel that is not configured, its targets are skipped.
///
#[derive(Clone, Default)]
pub struct DeliveryChannels {
    pub fcm: Option<Arc<dyn PushClient>>,
    pub expo: Option<Arc<dyn PushClient>>,
    pub web_push: Option<Arc<dyn PushClient>>,
    pub email: Option<Arc<dyn EmailClient>>,
}

impl DeliveryChannels {
    pub fn push_client(&self, channel: DeliveryChannel) -> Option<&Arc<dyn PushClient>> {
        match channel {
            DeliveryChannel::Fcm => self.fcm.as_ref(),
            DeliveryChannel::Expo => self.expo.as_ref(),
            DeliveryChannel::WebPush => self.web_push.as_ref(),
            DeliveryChannel::Email => None,
        }
    }

    pub fn configured(&self) -> Vec<DeliveryChannel> {
        [
            (DeliveryChannel::Fcm, self.fcm.is_some()),
            (DeliveryChannel::Expo, self.expo.is_some()),
            (DeliveryChannel::WebPush, self.web_push.is_some()),
            (DeliveryChannel::Email, self.email.is_some()),
        ]
        .into_iter()
        .filter_map(|(channel, configured)| configured.then_some(channel))
        .collect()
    }
}
