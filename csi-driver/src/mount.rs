//! Host mount stack.
//!
//! Formatting, mounting and mount-table inspection on the node, behind the
//! [`Mounter`] trait so the node state machine can be driven with fakes.
//! The real implementation shells out to the standard Linux tools and never
//! caches mount state; every decision re-reads the host mount table, which
//! keeps the driver immune to drift after a crash.

use std::path::{Path, PathBuf};

use proc_mounts::MountIter;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Errors from the host mount stack.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Host mount operations the node service depends on.
#[tonic::async_trait]
pub trait Mounter: Send + Sync + 'static {
    /// Whether `target` is (likely) not a mountpoint.
    ///
    /// A missing path is reported as [`MountError::NotFound`] so callers
    /// can create it.
    async fn is_likely_not_mount_point(&self, target: &Path) -> Result<bool, MountError>;

    /// Format `source` if it carries no filesystem, then mount it.
    async fn format_and_mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), MountError>;

    /// Bind-mount `source` onto `target`.
    async fn bind_mount(
        &self,
        source: &Path,
        target: &Path,
        options: &[String],
    ) -> Result<(), MountError>;

    /// Unmount `target`. Not being mounted is success.
    async fn unmount(&self, target: &Path) -> Result<(), MountError>;

    /// Sources of every mount whose destination is `target`.
    fn mount_sources(&self, target: &Path) -> Result<Vec<String>, MountError>;

    /// Grow the filesystem on `device`, mounted at `target`, to the device
    /// size.
    async fn resize_fs(&self, device: &Path, target: &Path) -> Result<(), MountError>;
}

/// Run a host tool and capture its output.
async fn run(command: &str, args: &[&str]) -> Result<std::process::Output, MountError> {
    Command::new(command)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| MountError::Spawn {
            command: command.to_string(),
            source: e,
        })
}

/// Run a host tool and fail on a non-zero exit.
async fn run_checked(command: &str, args: &[&str]) -> Result<(), MountError> {
    let output = run(command, args).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(MountError::CommandFailed {
            command: format!("{} {}", command, args.join(" ")),
            stderr,
        });
    }
    Ok(())
}

/// Mounter backed by the host tools (`blkid`, `mkfs.*`, `mount`, `umount`,
/// `resize2fs`, `xfs_growfs`) and the kernel mount table.
#[derive(Debug, Clone)]
pub struct SystemMounter {
    mounts_path: PathBuf,
}

impl SystemMounter {
    pub fn new() -> Self {
        Self {
            mounts_path: PathBuf::from("/proc/self/mounts"),
        }
    }

    pub fn with_mounts_path(mounts_path: impl Into<PathBuf>) -> Self {
        Self {
            mounts_path: mounts_path.into(),
        }
    }

    fn mounts_at(&self, target: &Path) -> Result<Vec<String>, MountError> {
        let iter = MountIter::new_from_file(&self.mounts_path).map_err(|e| MountError::Io {
            path: self.mounts_path.clone(),
            source: e,
        })?;

        let mut sources = Vec::new();
        for mount in iter {
            let mount = mount.map_err(|e| MountError::Io {
                path: self.mounts_path.clone(),
                source: e,
            })?;
            if mount.dest == target {
                sources.push(mount.source.to_string_lossy().to_string());
            }
        }
        Ok(sources)
    }

    /// Whether the device already carries a filesystem signature.
    async fn has_filesystem(device: &Path) -> Result<bool, MountError> {
        let device = device.to_string_lossy();
        let output = run("blkid", &["-p", "-s", "TYPE", "-o", "value", device.as_ref()]).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            // blkid exits 2 when it finds no recognizable signature
            Some(2) => Ok(false),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                Err(MountError::CommandFailed {
                    command: format!("blkid {}", device),
                    stderr,
                })
            }
        }
    }

    async fn format(device: &Path, fs_type: &str) -> Result<(), MountError> {
        let device = device.to_string_lossy();
        info!(device = %device, fs_type = %fs_type, "formatting device");

        let mkfs = format!("mkfs.{}", fs_type);
        match fs_type {
            "ext2" | "ext3" | "ext4" => {
                run_checked(&mkfs, &["-F", "-m0", device.as_ref()]).await
            }
            "xfs" => run_checked(&mkfs, &["-f", device.as_ref()]).await,
            _ => run_checked(&mkfs, &[device.as_ref()]).await,
        }
    }

    /// Filesystem type of a mounted device, from its superblock.
    async fn fs_type_of(device: &Path) -> Result<String, MountError> {
        let device_str = device.to_string_lossy();
        let output = run(
            "blkid",
            &["-p", "-s", "TYPE", "-o", "value", device_str.as_ref()],
        )
        .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(MountError::CommandFailed {
                command: format!("blkid {}", device_str),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self::new()
    }
}

#[tonic::async_trait]
impl Mounter for SystemMounter {
    async fn is_likely_not_mount_point(&self, target: &Path) -> Result<bool, MountError> {
        if let Err(e) = std::fs::symlink_metadata(target) {
            return match e.kind() {
                std::io::ErrorKind::NotFound => Err(MountError::NotFound(target.to_path_buf())),
                _ => Err(MountError::Io {
                    path: target.to_path_buf(),
                    source: e,
                }),
            };
        }
        Ok(self.mounts_at(target)?.is_empty())
    }

    async fn format_and_mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), MountError> {
        if !Self::has_filesystem(source).await? {
            Self::format(source, fs_type).await?;
        }

        let source_str = source.to_string_lossy();
        let target_str = target.to_string_lossy();
        info!(
            source = %source_str,
            target = %target_str,
            fs_type = %fs_type,
            options = ?options,
            "mounting device"
        );

        let joined = options.join(",");
        let mut args = vec!["-t", fs_type];
        if !options.is_empty() {
            args.extend(["-o", joined.as_str()]);
        }
        args.extend([source_str.as_ref(), target_str.as_ref()]);
        run_checked("mount", &args).await
    }

    async fn bind_mount(
        &self,
        source: &Path,
        target: &Path,
        options: &[String],
    ) -> Result<(), MountError> {
        let source_str = source.to_string_lossy();
        let target_str = target.to_string_lossy();
        info!(source = %source_str, target = %target_str, options = ?options, "bind mounting");

        let mut flags = String::from("bind");
        for option in options {
            flags.push(',');
            flags.push_str(option);
        }
        run_checked(
            "mount",
            &["-o", &flags, source_str.as_ref(), target_str.as_ref()],
        )
        .await
    }

    async fn unmount(&self, target: &Path) -> Result<(), MountError> {
        if self.mounts_at(target)?.is_empty() {
            debug!(target = %target.display(), "path is not mounted, skipping unmount");
            return Ok(());
        }

        let target_str = target.to_string_lossy();
        info!(target = %target_str, "unmounting");

        let output = run("umount", &[target_str.as_ref()]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("not mounted") || stderr.contains("not a mount point") {
                warn!(target = %target_str, "path was not mounted");
                return Ok(());
            }
            return Err(MountError::CommandFailed {
                command: format!("umount {}", target_str),
                stderr,
            });
        }
        Ok(())
    }

    fn mount_sources(&self, target: &Path) -> Result<Vec<String>, MountError> {
        self.mounts_at(target)
    }

    async fn resize_fs(&self, device: &Path, target: &Path) -> Result<(), MountError> {
        let fs_type = Self::fs_type_of(device).await?;
        let device_str = device.to_string_lossy();
        let target_str = target.to_string_lossy();
        info!(device = %device_str, fs_type = %fs_type, "growing filesystem");

        match fs_type.as_str() {
            "ext2" | "ext3" | "ext4" => run_checked("resize2fs", &[device_str.as_ref()]).await,
            "xfs" => run_checked("xfs_growfs", &[target_str.as_ref()]).await,
            other => Err(MountError::CommandFailed {
                command: format!("resize {}", device_str),
                stderr: format!("unsupported filesystem type '{}'", other),
            }),
        }
    }
}
