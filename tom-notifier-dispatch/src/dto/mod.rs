//!
//! Module with dtos shared by repositories and services
//! and messages received from RabbitMQ
//!

mod delivery;
mod dispatch_event;
mod dispatch_job;
mod notification_type;

pub use delivery::*;
pub use dispatch_event::*;
pub use dispatch_job::*;
pub use notification_type::*;

pub mod protobuf {
    include!(concat!(env!("OUT_DIR"), "/protobuf.rs"));
}
