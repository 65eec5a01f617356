pub mod aggregator;
pub mod host;
pub mod host_store;
pub mod keypair;
pub mod node_client;
pub mod registry;
pub mod system_service;
pub mod types;
