pub mod analysis;
pub mod commands;
pub mod config;
pub mod engine;
pub mod indicators;
pub mod key_levels;
pub mod models;
pub mod param_utils;
pub mod patterns;
pub mod performance;
pub mod signals;
pub mod snapshot;
