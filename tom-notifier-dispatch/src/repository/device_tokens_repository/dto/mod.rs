mod device_token;

pub use device_token::*;
