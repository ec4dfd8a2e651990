// src/process/mod.rs

pub mod convert;
pub mod filter;
pub mod profile;
pub mod raw_table;
pub mod tidy;
pub mod utils;
