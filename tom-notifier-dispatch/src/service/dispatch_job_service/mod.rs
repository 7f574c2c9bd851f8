mod dispatch_failure_handler;
mod dispatch_job_service;
mod dispatch_job_service_impl;

pub use dispatch_failure_handler::*;
pub use dispatch_job_service::*;
pub use dispatch_job_service_impl::*;
