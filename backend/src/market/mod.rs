pub mod health;
pub mod normalize;
pub mod orchestrator;
pub mod sources;
pub mod types;
