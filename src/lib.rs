pub mod config;
pub mod db;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod schema;
