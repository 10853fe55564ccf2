//! Connection driver
//!
//! - [`EnvironConnection`]: reads a client connection and yields one environment
//!   per request until the client closes the connection or sends a malformed request

mod environ_connection;

pub use environ_connection::EnvironConnection;
