//! Detects posts written by blacklisted forum users and keeps them hidden in a
//! live, mutating page document.

pub mod app;
pub mod cli;
pub mod config;
pub mod content;
pub mod domain;
pub mod host;
pub mod infrastructure;
pub mod messaging;
pub mod page;
pub mod storage;
pub mod tasks;
