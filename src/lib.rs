pub mod config;
pub mod error;
pub mod index;
pub mod session;
pub mod storage;
pub mod utils;
