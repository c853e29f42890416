//! Core library for the berth CLI
//!
//! Container identity, lifecycle hook orchestration, the create-vs-start
//! gate, and interactive exec sessions, on top of a container runtime port.

pub mod config;
pub mod container;
pub mod container_lifecycle;
pub mod docker;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod terminal;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
