//! HTTP server detecting helmets and seatbelts on uploaded images and webcam frames.

pub mod app;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod endpoints;
pub mod error;
pub mod meter;
pub mod models;
pub mod nn;
pub mod normalize;
pub mod pipeline;
pub mod render;
