//! Library half of the `todod` daemon.

pub mod config;
