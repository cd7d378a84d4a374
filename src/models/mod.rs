pub mod detection;
pub mod event;
pub mod job;
pub mod response;
