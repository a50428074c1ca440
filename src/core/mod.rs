//! Core module - engine orchestration and demo wiring

mod demo;
mod engine;

pub use demo::spawn_demo_producer;
pub use engine::Engine;
