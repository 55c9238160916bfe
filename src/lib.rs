//! Backend for Rapid KL journey tools: static transit data, an LLM-backed
//! estimate relay and a per-line fare model trained from fare tables.

pub mod config;
pub mod error;
pub mod estimate;
pub mod geo;
pub mod llm;
pub mod model;
pub mod normalize;
pub mod samples;
pub mod server;
pub mod store;
pub mod training;

pub use config::Config;
pub use error::FareError;
pub use model::{FareModel, LineFare};
pub use server::{build_router, AppState};
pub use store::FareModelStore;
pub use training::{FareTrainer, TrainingReport};
