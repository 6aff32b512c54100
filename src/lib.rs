pub mod analysis;
pub mod baseline;
pub mod config;
pub mod error;
pub mod gemini;
pub mod insight;
pub mod metrics;
pub mod policy;
pub mod population;
pub mod session;
pub mod simulation;
pub mod types;
