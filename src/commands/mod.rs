pub mod daemon;
pub mod host;
pub mod keygen;
pub mod query;
