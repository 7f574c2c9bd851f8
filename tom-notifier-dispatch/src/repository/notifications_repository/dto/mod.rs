mod new_notification_record;
mod notification_record;

pub use new_notification_record::*;
pub use notification_record::*;
