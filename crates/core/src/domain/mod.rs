pub mod error;
pub mod job;
pub mod run;
pub mod settings;
pub mod summary;
pub mod types;
