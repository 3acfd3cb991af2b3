//! Key generation through `ceph-authtool`

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::domain::ports::KeyGenerator;
use crate::error::{Error, Result};

pub const DEFAULT_AUTHTOOL: &str = "ceph-authtool";

/// Shells out to `ceph-authtool --gen-print-key`
#[derive(Debug, Clone)]
pub struct AuthtoolKeyGenerator {
    binary: PathBuf,
}

impl Default for AuthtoolKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHTOOL)
    }
}

impl AuthtoolKeyGenerator {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl KeyGenerator for AuthtoolKeyGenerator {
    async fn generate_key(&self, name: &str) -> Result<String> {
        debug!(name = %name, binary = %self.binary.display(), "generating key");
        let output = Command::new(&self.binary)
            .arg("--gen-print-key")
            .output()
            .await
            .map_err(|e| Error::KeyGeneration {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::KeyGeneration {
                name: name.to_string(),
                reason: format!(
                    "exit status {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if key.is_empty() {
            return Err(Error::KeyGeneration {
                name: name.to_string(),
                reason: "empty key".into(),
            });
        }
        Ok(key)
    }
}

/// Pull the secret out of keyring text (`key = <secret>`)
pub fn extract_key(contents: &str) -> Result<String> {
    contents
        .lines()
        .filter(|l| l.contains("key"))
        .filter_map(|l| l.split_whitespace().nth(2))
        .next()
        .map(str::to_string)
        .ok_or_else(|| Error::KeyGeneration {
            name: "keyring".into(),
            reason: "failed to parse secret".into(),
        })
}
