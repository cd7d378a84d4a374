//! Cloud auto-labeling
//!
//! This library drives a remote object-detection service on behalf of a
//! local annotation tool: it uploads images singly or in chunks, polls the
//! resulting jobs, validates the returned detections against the local class
//! list and writes them as YOLO label files next to the images.

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;

pub use config::LabelerConfig;
pub use error::LabelerError;
pub use models::event::LabelerEvent;
pub use orchestrator::Orchestrator;
