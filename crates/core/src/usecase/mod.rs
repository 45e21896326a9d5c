pub mod audit_service;
pub mod dispatcher;
pub mod job_queue;
pub mod orchestrator;
