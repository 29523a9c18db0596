pub mod config;
pub mod controller;
pub mod display;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod telemetry;
pub mod wireless;
