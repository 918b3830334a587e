//! Service facade wiring the engine's components together

mod engine;

pub use engine::SyncEngine;
