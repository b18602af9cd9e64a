pub mod api;
pub mod config;
pub mod detector;
pub mod humanize;
pub mod media;
pub mod observability;
pub mod pipeline;
pub mod storage;
