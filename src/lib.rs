#![forbid(unsafe_code)]

pub mod banner;
pub mod book;
pub mod cli;
pub mod config;
pub mod cover;
pub mod error;
pub mod http;
pub mod isbn;
pub mod logging;
pub mod metadata;
pub mod notify;
pub mod pipeline;
pub mod storage;
pub mod store;
pub mod updater;
