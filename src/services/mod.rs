pub mod backend;
pub mod poller;
pub mod submitter;
pub mod transform;
