#[macro_use]
extern crate failure;

pub mod api;
pub mod cancel;
pub mod config;
pub mod dataset;
pub mod error;
pub mod plate;
pub mod poller;
pub mod prediction;
pub mod types;
pub mod view;
