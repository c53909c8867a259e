pub mod actions;
pub mod ask;
pub mod batch;
pub mod classifier;
pub mod client;
pub mod config;
pub mod export;
pub mod logging;
pub mod parser;
pub mod progress;
pub mod report;
pub mod room;
pub mod sdk;
pub mod service;
