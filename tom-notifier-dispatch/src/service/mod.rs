pub mod channels;
pub mod dispatch_consumer_service;
pub mod dispatch_job_service;
pub mod dispatch_service;
pub mod event_templates;
pub mod preference_gate;
