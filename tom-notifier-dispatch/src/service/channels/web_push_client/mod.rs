mod encryption;
mod vapid;
mod web_push_client;

pub use web_push_client::*;
