//! Upload an image, let Gemini describe it and find similar images on the web.

pub mod codec;
pub mod config;
pub mod error;
pub mod gemini;
pub mod routes;
pub mod session;
pub mod state;
pub mod views;

pub use config::Config;
pub use routes::{router, AppState};
