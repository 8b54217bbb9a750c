//! HTTP API
//!
//! One module per operation group. Request and response bodies are typed
//! structs; handlers only translate between JSON and [`crate::CurioService`].

pub mod health;
pub mod products;
pub mod search;
pub mod sessions;
pub mod settings;
pub mod storage;
pub mod training;

pub use health::health_routes;
