pub mod aggregate;
pub mod collectors;
pub mod config;
pub mod error;
pub mod logging;
pub mod render;
pub mod sink;
pub mod top;
pub mod transport;
