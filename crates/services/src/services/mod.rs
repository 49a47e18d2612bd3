pub mod analysis;
pub mod events;
pub mod github;
pub mod orchestrator;
pub mod static_analysis;
