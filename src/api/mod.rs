pub mod graphql;
pub mod rest;

use crate::domain::host_store::MemoryHostStore;
use crate::domain::system_service::SystemService;
use crate::transport::HttpNodeTransport;

/// The facade as wired by the daemon.
pub type DaemonSystem = SystemService<HttpNodeTransport, MemoryHostStore>;
