//! Service configuration loaded from environment variables.

use serde::Serialize;
use std::env;

/// Header carrying the shared webhook secret.
pub const SECRET_HEADER: &str = "x-webhook-secret";

/// On-chain addresses the surrounding dashboard reads. This service only
/// carries and echoes them; it never contacts the chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub registry_address: String,
    pub nft_address: String,
    pub admin_address: String,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g. "0.0.0.0:3000")
    pub bind_address: String,

    /// Shared secret the webhook producer must present. Unset or empty
    /// disables the check entirely ("open mode").
    pub webhook_secret: Option<String>,

    pub chain: ChainConfig,
}

impl Config {
    /// Load configuration from environment variables. Every variable has a
    /// default, so this cannot fail.
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            chain: ChainConfig {
                rpc_url: env::var("CHAIN_RPC_URL")
                    .unwrap_or_else(|_| "https://rpc-amoy.polygon.technology".into()),
                registry_address: env::var("REGISTRY_ADDRESS")
                    .unwrap_or_else(|_| "0x804FC2756e69EE020667520C758b75A208655968".into()),
                nft_address: env::var("NFT_ADDRESS")
                    .unwrap_or_else(|_| "0xB1FEd5f9963893C4f7232e0A96A61eE460439D9c".into()),
                admin_address: env::var("ADMIN_ADDRESS")
                    .unwrap_or_else(|_| "0xc277f4d2b4a84486a51c1ffcad9f091a11301286".into()),
            },
        }
    }

    /// Create a default configuration for testing: open mode, local chain.
    #[cfg(test)]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".into(),
            webhook_secret: None,
            chain: ChainConfig {
                rpc_url: "http://localhost:8545".into(),
                registry_address: "0x0000000000000000000000000000000000000001".into(),
                nft_address: "0x0000000000000000000000000000000000000002".into(),
                admin_address: "0x0000000000000000000000000000000000000003".into(),
            },
        }
    }
}
