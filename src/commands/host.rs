//! `realityctl host check` — validate a host definition offline.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config;
use crate::domain::host::{HostDraft, HostView};

pub fn check(file: &Path, config_path: Option<&Path>) -> Result<()> {
    let policy = config::load(config_path)?.fingerprint_policy();

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let draft: HostDraft = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing {}", file.display()))?;

    let host = match draft.build() {
        Ok(host) => host,
        Err(e) => {
            println!("{} {}", "invalid".red().bold(), e);
            anyhow::bail!("host definition {} is invalid", file.display());
        }
    };

    let view = HostView::new(host, &policy);
    println!("{} {}", "valid".green().bold(), view.host.remark);
    println!(
        "  endpoint:     {}:{} ({})",
        view.host.address, view.host.port, view.host.security_layer
    );
    println!(
        "  sni:          {}",
        view.effective_sni.as_deref().unwrap_or("-")
    );
    println!(
        "  fingerprint:  {}",
        view.effective_fingerprint.as_deref().unwrap_or("-")
    );
    let alpn = view.host.alpn_protocols();
    if !alpn.is_empty() {
        println!("  alpn:         {}", alpn.join(", "));
    }
    let routable = if view.routable {
        "yes".green()
    } else {
        "no".yellow()
    };
    println!("  routable:     {}", routable);
    Ok(())
}
