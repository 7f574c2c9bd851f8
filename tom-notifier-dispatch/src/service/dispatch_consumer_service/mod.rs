mod dispatch_consumer_service;
mod dispatch_job_publisher;

pub use dispatch_consumer_service::*;
pub use dispatch_job_publisher::*;

#[derive(Debug, Clone)]
pub struct DispatchQueueConfig {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    /// Number of jobs processed at once
    pub prefetch_count: u16,
}
