//! LUKS encrypted-volume support.
//!
//! Encrypted volumes are formatted as LUKS2 and activated into
//! `/dev/mapper/<name>` before the filesystem is created on the mapping.
//! The [`LuksService`] trait is the seam the node state machine drives; the
//! real implementation shells out to `blkid` and `cryptsetup`.

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Volume-context key enabling encryption for a volume.
pub const LUKS_ENCRYPTED_ATTRIBUTE: &str = "linodebs.csi.linode.com/luks-encrypted";
/// Volume-context key carrying the LUKS cipher specification.
pub const LUKS_CIPHER_ATTRIBUTE: &str = "linodebs.csi.linode.com/luks-cipher";
/// Volume-context key carrying the LUKS key size in bits.
pub const LUKS_KEY_SIZE_ATTRIBUTE: &str = "linodebs.csi.linode.com/luks-key-size";
/// Secret key carrying the encryption passphrase.
pub const LUKS_KEY_SECRET: &str = "luksKey";

const MAPPER_DIR: &str = "/dev/mapper";

/// Errors from the encryption engine.
#[derive(Debug, Error)]
pub enum LuksError {
    #[error("invalid LUKS volume configuration: {0}")]
    InvalidContext(String),

    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// Encryption parameters for one volume, assembled from the volume context
/// and the stage secrets.
#[derive(Debug, Clone)]
pub struct LuksContext {
    pub enabled: bool,
    pub key: String,
    pub cipher: String,
    pub key_size: String,
    pub mapped_name: String,
}

impl LuksContext {
    /// Assemble the context for a volume. `mapped_name` is the mapper name
    /// the activated device will appear under.
    pub fn new(
        volume_context: &std::collections::HashMap<String, String>,
        secrets: &std::collections::HashMap<String, String>,
        mapped_name: &str,
    ) -> Self {
        let enabled = volume_context
            .get(LUKS_ENCRYPTED_ATTRIBUTE)
            .map(|v| v == "true")
            .unwrap_or(false);

        Self {
            enabled,
            key: secrets.get(LUKS_KEY_SECRET).cloned().unwrap_or_default(),
            cipher: volume_context
                .get(LUKS_CIPHER_ATTRIBUTE)
                .cloned()
                .unwrap_or_default(),
            key_size: volume_context
                .get(LUKS_KEY_SIZE_ATTRIBUTE)
                .cloned()
                .unwrap_or_default(),
            mapped_name: mapped_name.to_string(),
        }
    }

    /// Check that every required field is present, aggregating all
    /// violations into one error.
    pub fn validate(&self) -> Result<(), LuksError> {
        let mut missing = Vec::new();
        if self.key.is_empty() {
            missing.push("no key provided");
        }
        if self.cipher.is_empty() {
            missing.push("no cipher provided");
        }
        if self.key_size.is_empty() {
            missing.push("no key size provided");
        }
        if self.mapped_name.is_empty() {
            missing.push("no volume name provided");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LuksError::InvalidContext(missing.join("; ")))
        }
    }

    /// Key size in bits.
    pub fn key_size_bits(&self) -> Result<u32, LuksError> {
        self.key_size.parse().map_err(|_| {
            LuksError::InvalidContext(format!("key size '{}' is not a number", self.key_size))
        })
    }

    /// Mapper path the volume activates into.
    pub fn mapper_path(&self) -> PathBuf {
        PathBuf::from(MAPPER_DIR).join(&self.mapped_name)
    }
}

/// Split a cipher specification into cipher and mode on the first `-`.
///
/// `aes-xts-plain64` yields `("aes", "xts-plain64")`; modes like
/// `cbc-essiv:sha256` pass through verbatim.
pub fn split_cipher(spec: &str) -> Result<(&str, &str), LuksError> {
    spec.split_once('-')
        .filter(|(cipher, mode)| !cipher.is_empty() && !mode.is_empty())
        .ok_or_else(|| {
            LuksError::InvalidContext(format!(
                "cipher '{}' is not of the form '<cipher>-<mode>'",
                spec
            ))
        })
}

/// LUKS lifecycle operations the node service depends on.
#[tonic::async_trait]
pub trait LuksService: Send + Sync + 'static {
    /// Format (if needed) and activate the volume; returns the mapper path.
    async fn prepare(&self, ctx: &LuksContext, device: &str) -> Result<PathBuf, LuksError>;

    /// Deactivate a mapping. An unknown mapping is success.
    async fn close(&self, name: &str) -> Result<(), LuksError>;

    /// Mapper name behind `source` when it is an active LUKS mapping.
    async fn is_luks_mapping(&self, source: &str) -> Result<Option<String>, LuksError>;

    /// Grow an active mapping to the size of its backing device.
    async fn resize(&self, name: &str) -> Result<(), LuksError>;
}

/// `cryptsetup`-backed engine.
#[derive(Debug, Clone, Default)]
pub struct CryptSetup;

impl CryptSetup {
    pub fn new() -> Self {
        Self
    }

    async fn run(command: &str, args: &[&str]) -> Result<std::process::Output, LuksError> {
        Command::new(command)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LuksError::Spawn {
                command: command.to_string(),
                source: e,
            })
    }

    /// Run `cryptsetup` feeding the key on stdin.
    async fn run_with_key(args: &[&str], key: &str) -> Result<std::process::Output, LuksError> {
        let spawn_err = |e| LuksError::Spawn {
            command: "cryptsetup".to_string(),
            source: e,
        };

        let mut child = Command::new("cryptsetup")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(key.as_bytes()).await.map_err(spawn_err)?;
            // Closing stdin signals end of passphrase
            drop(stdin);
        }

        child.wait_with_output().await.map_err(spawn_err)
    }

    /// Whether the device carries a LUKS header.
    ///
    /// `blkid` exits 2 when it finds no recognizable signature; any other
    /// non-zero exit is a fault.
    async fn is_luks_header_present(device: &str) -> Result<bool, LuksError> {
        let output = Self::run("blkid", &["-p", "-n", "crypto_LUKS", device]).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(2) => Ok(false),
            _ => Err(LuksError::CommandFailed {
                command: format!("blkid {}", device),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn format(ctx: &LuksContext, device: &str) -> Result<(), LuksError> {
        ctx.validate()?;
        let (cipher, mode) = split_cipher(&ctx.cipher)?;
        let key_size = ctx.key_size_bits()?.to_string();
        let cipher_spec = format!("{}-{}", cipher, mode);

        info!(device = %device, cipher = %cipher_spec, "formatting LUKS2 volume");

        let output = Self::run_with_key(
            &[
                "-q",
                "luksFormat",
                "--type",
                "luks2",
                "--sector-size",
                "512",
                "--cipher",
                &cipher_spec,
                "--key-size",
                &key_size,
                device,
                "-",
            ],
            &ctx.key,
        )
        .await?;

        if !output.status.success() {
            return Err(LuksError::CommandFailed {
                command: format!("cryptsetup luksFormat {}", device),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn activate(ctx: &LuksContext, device: &str) -> Result<PathBuf, LuksError> {
        let mapper_path = ctx.mapper_path();
        debug!(device = %device, name = %ctx.mapped_name, "activating LUKS mapping");

        let output = Self::run_with_key(
            &["luksOpen", "--key-file", "-", device, &ctx.mapped_name],
            &ctx.key,
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // Another stage already activated the mapping
            if stderr.contains("already exists") || stderr.contains("already in use") {
                info!(name = %ctx.mapped_name, "LUKS mapping already active");
                return Ok(mapper_path);
            }
            return Err(LuksError::CommandFailed {
                command: format!("cryptsetup luksOpen {}", device),
                stderr,
            });
        }
        Ok(mapper_path)
    }
}

#[tonic::async_trait]
impl LuksService for CryptSetup {
    async fn prepare(&self, ctx: &LuksContext, device: &str) -> Result<PathBuf, LuksError> {
        if !Self::is_luks_header_present(device).await? {
            Self::format(ctx, device).await?;
        }
        Self::activate(ctx, device).await
    }

    async fn close(&self, name: &str) -> Result<(), LuksError> {
        info!(name = %name, "deactivating LUKS mapping");

        let output = Self::run("cryptsetup", &["luksClose", name]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("not active") || stderr.contains("doesn't exist") {
                warn!(name = %name, "LUKS mapping already closed");
                return Ok(());
            }
            return Err(LuksError::CommandFailed {
                command: format!("cryptsetup luksClose {}", name),
                stderr,
            });
        }
        Ok(())
    }

    async fn is_luks_mapping(&self, source: &str) -> Result<Option<String>, LuksError> {
        let Some(name) = source
            .strip_prefix(MAPPER_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return Ok(None);
        };

        let output = Self::run("cryptsetup", &["status", name]).await?;
        if !output.status.success() {
            // Inactive or unknown mapping
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let is_luks = stdout
            .lines()
            .any(|line| line.trim_start().starts_with("type:") && line.contains("LUKS"));
        Ok(is_luks.then(|| name.to_string()))
    }

    async fn resize(&self, name: &str) -> Result<(), LuksError> {
        info!(name = %name, "growing LUKS mapping");

        let output = Self::run("cryptsetup", &["resize", name]).await?;
        if !output.status.success() {
            return Err(LuksError::CommandFailed {
                command: format!("cryptsetup resize {}", name),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
