use std::path::PathBuf;

use anyhow::Result;

use crate::config;

pub fn run(
    http_addr: Option<String>,
    log_level: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = config::load(config_path.as_deref())?;

    // CLI flags override file and environment
    if let Some(addr) = http_addr {
        config.daemon.http_addr = addr;
    }
    if let Some(level) = log_level {
        config.daemon.log_level = level;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(config))
}
