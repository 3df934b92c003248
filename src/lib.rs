pub mod config;
pub mod error;
pub mod fetcher;
pub mod format;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod storage;
