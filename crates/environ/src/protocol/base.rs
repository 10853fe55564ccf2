//! The process-wide, request independent part of every environment.
//!
//! The snapshot is immutable; reconfiguration builds a new one and swaps it in, so
//! requests completing concurrently with [`initialize`] see either the old or the
//! new snapshot, never a mix.

use std::borrow::Cow;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::protocol::header::{
    SERVER_NAME, SERVER_PORT, WSGI_ERRORS, WSGI_MULTIPROCESS, WSGI_MULTITHREAD, WSGI_RUN_ONCE, WSGI_URL_SCHEME,
    WSGI_VERSION,
};
use crate::protocol::{EnvKey, EnvValue, ErrorStream};

static BASE_ENVIRON: Lazy<ArcSwap<BaseEnviron>> =
    Lazy::new(|| ArcSwap::from_pointee(BaseEnviron::new(&ServerConfig::default())));

/// Host and port announced as `SERVER_NAME` and `SERVER_PORT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("localhost", 80)
    }
}

/// Immutable snapshot of the base environment entries.
#[derive(Debug, Clone)]
pub struct BaseEnviron {
    entries: Vec<(EnvKey, EnvValue)>,
}

impl BaseEnviron {
    pub fn new(config: &ServerConfig) -> Self {
        let entries = vec![
            (Cow::Borrowed(WSGI_VERSION), EnvValue::Version(1, 0)),
            // no tls support, the scheme is fixed
            (Cow::Borrowed(WSGI_URL_SCHEME), EnvValue::from_static("http")),
            (Cow::Borrowed(WSGI_ERRORS), EnvValue::Errors(ErrorStream)),
            (Cow::Borrowed(WSGI_MULTITHREAD), EnvValue::Bool(true)),
            (Cow::Borrowed(WSGI_MULTIPROCESS), EnvValue::Bool(true)),
            (Cow::Borrowed(WSGI_RUN_ONCE), EnvValue::Bool(false)),
            (Cow::Borrowed(SERVER_NAME), EnvValue::Str(Bytes::from(config.host.clone()))),
            (Cow::Borrowed(SERVER_PORT), EnvValue::Str(Bytes::from(config.port.to_string()))),
        ];

        Self { entries }
    }

    /// Returns a copy with `SERVER_NAME` and `SERVER_PORT` replaced, every other entry kept.
    pub fn with_server(&self, config: &ServerConfig) -> Self {
        let mut base = self.clone();
        for (key, value) in &mut base.entries {
            match &**key {
                SERVER_NAME => *value = EnvValue::Str(Bytes::from(config.host.clone())),
                SERVER_PORT => *value = EnvValue::Str(Bytes::from(config.port.to_string())),
                _ => {}
            }
        }
        base
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, value)| value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (EnvKey, EnvValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Refreshes `SERVER_NAME` and `SERVER_PORT` of the process-wide base environment.
///
/// Safe to call repeatedly; the fixed entries are left as they are.
pub fn initialize(server_host: &str, server_port: u16) {
    initialize_with(&ServerConfig::new(server_host, server_port));
}

pub fn initialize_with(config: &ServerConfig) {
    BASE_ENVIRON.rcu(|current| current.with_server(config));
    debug!(host = config.host(), port = config.port(), "base environ initialized");
}

/// The current process-wide snapshot.
pub fn base_environ() -> Arc<BaseEnviron> {
    BASE_ENVIRON.load_full()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_entries() {
        let base = BaseEnviron::new(&ServerConfig::default());

        assert_eq!(base.len(), 8);
        assert!(matches!(base.get(WSGI_VERSION), Some(EnvValue::Version(1, 0))));
        assert_eq!(base.get(WSGI_URL_SCHEME).unwrap(), &"http");
        assert!(matches!(base.get(WSGI_ERRORS), Some(EnvValue::Errors(_))));
        assert_eq!(base.get(WSGI_MULTITHREAD).and_then(EnvValue::as_bool), Some(true));
        assert_eq!(base.get(WSGI_MULTIPROCESS).and_then(EnvValue::as_bool), Some(true));
        assert_eq!(base.get(WSGI_RUN_ONCE).and_then(EnvValue::as_bool), Some(false));
        assert_eq!(base.get(SERVER_NAME).unwrap(), &"localhost");
        assert_eq!(base.get(SERVER_PORT).unwrap(), &"80");
    }

    #[test]
    fn with_server_only_touches_server_entries() {
        let base = BaseEnviron::new(&ServerConfig::default());
        let updated = base.with_server(&ServerConfig::new("0.0.0.0", 8080));

        assert_eq!(updated.len(), base.len());
        assert_eq!(updated.get(SERVER_NAME).unwrap(), &"0.0.0.0");
        assert_eq!(updated.get(SERVER_PORT).unwrap(), &"8080");
        assert_eq!(updated.get(WSGI_URL_SCHEME).unwrap(), &"http");

        // the old snapshot is untouched
        assert_eq!(base.get(SERVER_PORT).unwrap(), &"80");
    }

    #[test]
    fn initialize_swaps_snapshot() {
        let before = base_environ();
        initialize("example.com", 9000);
        let after = base_environ();

        assert_eq!(after.get(SERVER_NAME).unwrap(), &"example.com");
        assert_eq!(after.get(SERVER_PORT).unwrap(), &"9000");
        assert_eq!(after.len(), before.len());
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
