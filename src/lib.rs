//! Tracks the latest position of selected vessels from the aisstream.io feed

pub mod codec;
pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod sink;
pub mod stream;
pub mod subscription;
