pub mod api;
pub mod cancellation;
pub mod chunker;
pub mod events;
pub mod fetcher;
pub mod label_file;
pub mod poller;
pub mod retry;
pub mod session;
pub mod submitter;
pub mod validation;
