mod access_token_provider;
mod fcm_client;

pub use access_token_provider::*;
pub use fcm_client::*;
