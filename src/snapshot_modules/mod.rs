pub mod assembler;
pub mod config;
pub mod container_memory;
pub mod error;
pub mod host_memory;
pub mod runner;
pub mod units;
pub mod writer;
