//! Core types of the request environment.
//!
//! # Architecture
//!
//! - **Environment** ([`environ`]): the finished mapping handed to applications
//!   - [`Environ`]: request entries layered over the base snapshot
//!   - [`EnvValue`]: a single entry value
//!   - [`Input`]: the request body stream
//!
//! - **Base environment** ([`base`]): process-wide entries
//!   - [`BaseEnviron`]: immutable snapshot, swapped on reconfiguration
//!   - [`initialize`]: refreshes `SERVER_NAME` / `SERVER_PORT`
//!
//! - **Keys** ([`header`]): literal keys and header name normalization
//!
//! - **Error Handling** ([`error`]):
//!   - [`ErrorCode`]: terminal state of a request
//!   - [`ParseError`]: tokenizer and builder failures
//!   - [`RequestError`]: decoder and connection errors

mod environ;
pub use environ::EnvKey;
pub use environ::EnvValue;
pub use environ::Environ;
pub use environ::ErrorStream;
pub use environ::Input;
pub use environ::Iter;

mod base;
pub use base::BaseEnviron;
pub use base::ServerConfig;
pub use base::base_environ;
pub use base::initialize;
pub use base::initialize_with;

mod error;
pub use error::ErrorCode;
pub use error::ParseError;
pub use error::RequestError;

pub mod header;
pub use header::normalize_header_name;
