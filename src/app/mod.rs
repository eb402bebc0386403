pub mod ports;
pub mod run_service;
