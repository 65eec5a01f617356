//! `realityctl keygen` — local x25519 keypair generation, no daemon needed.

use anyhow::Result;
use colored::Colorize;

use crate::domain::keypair::{self, EncodedKeyPair, MAX_BATCH};

pub fn run(count: usize, format: &str) -> Result<()> {
    if count > MAX_BATCH {
        eprintln!(
            "{} capping batch at {} keypairs",
            "::".yellow().bold(),
            MAX_BATCH
        );
    }
    let pairs: Vec<EncodedKeyPair> = keypair::generate_batch(count)?
        .iter()
        .map(EncodedKeyPair::from)
        .collect();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&pairs)?);
        return Ok(());
    }

    for (i, pair) in pairs.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{} {}", "Private key:".bold(), pair.private_key);
        println!("{} {}", "Public key: ".bold(), pair.public_key);
    }
    Ok(())
}

/// Print the public half of an existing private key.
pub fn derive(private_key: &str) -> Result<()> {
    let public = keypair::public_from_private(private_key)?;
    println!("{} {}", "Public key:".bold(), public);
    Ok(())
}
