//! Run configuration: which VM, which tools, which files.
//!
//! Everything the pipeline touches on the host is named here once and
//! passed down, with defaults matching a stock boot2docker install on
//! macOS.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tracing::debug;

use crate::exec::StepPolicy;

/// VM name boot2docker creates by default.
pub const DEFAULT_VM: &str = "boot2docker-vm";
/// The host export table.
pub const DEFAULT_EXPORTS: &str = "/etc/exports";
/// Seconds to give nfsd after a restart before querying it.
pub const DEFAULT_SETTLE_SECS: u64 = 2;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        /// Executable name of the VirtualBox manager.
        pub const VBOX_MANAGE: &str = "VBoxManage.exe";
    } else {
        /// Executable name of the VirtualBox manager.
        pub const VBOX_MANAGE: &str = "VBoxManage";
    }
}

/// Everything the pipeline needs to know about the host and the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the VirtualBox VM.
    pub vm: String,
    /// `VBoxManage` executable.
    pub vbox_manage: String,
    /// `boot2docker` executable.
    pub boot2docker: String,
    /// Privilege escalation helper.
    pub sudo: String,
    /// NFS server control program, run through `sudo`.
    pub nfsd: String,
    /// Host export table.
    pub exports_file: Utf8PathBuf,
    /// Pause after restarting nfsd.
    pub settle_delay: Duration,
    /// Abort on the first failing command instead of carrying on.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vm: DEFAULT_VM.to_owned(),
            vbox_manage: VBOX_MANAGE.to_owned(),
            boot2docker: "boot2docker".to_owned(),
            sudo: "sudo".to_owned(),
            nfsd: "nfsd".to_owned(),
            exports_file: DEFAULT_EXPORTS.into(),
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_SECS),
            strict: false,
        }
    }
}

impl Config {
    /// Policy for commands whose failure the tool historically ignored.
    pub fn policy(&self) -> StepPolicy {
        if self.strict {
            StepPolicy::Checked
        } else {
            StepPolicy::Unchecked
        }
    }
}

/// Command-line and environment overrides for [`Config`].
#[derive(Debug, Clone, Parser)]
pub struct ConfigOpts {
    /// Name of the boot2docker virtual machine
    #[clap(long, global = true, env = "BOOT2DOCKER_VM", default_value = DEFAULT_VM)]
    pub vm: String,

    /// Path to VBoxManage (defaults to the one on PATH, then $VBOX_INSTALL_PATH)
    #[clap(long, global = true, env = "BOOT2DOCKER_VBM")]
    pub vbox_manage: Option<String>,

    /// Path to the boot2docker CLI
    #[clap(long, global = true, env = "B2D_NFS_BOOT2DOCKER", default_value = "boot2docker")]
    pub boot2docker: String,

    /// Privilege escalation helper used for host changes
    #[clap(long, global = true, env = "B2D_NFS_SUDO", default_value = "sudo")]
    pub sudo: String,

    /// NFS server control program
    #[clap(long, global = true, env = "B2D_NFS_NFSD", default_value = "nfsd")]
    pub nfsd: String,

    /// NFS export table to update
    #[clap(long, global = true, env = "B2D_NFS_EXPORTS", default_value = DEFAULT_EXPORTS)]
    pub exports_file: Utf8PathBuf,

    /// Seconds to wait for nfsd after restarting it
    #[clap(long, global = true, default_value_t = DEFAULT_SETTLE_SECS)]
    pub settle_delay: u64,

    /// Stop at the first failing host or guest command
    #[clap(long, global = true)]
    pub strict: bool,
}

impl ConfigOpts {
    /// Resolve the options into a [`Config`].
    pub fn into_config(self) -> Config {
        let vbox_manage = self.vbox_manage.unwrap_or_else(|| {
            locate_vbox_manage(std::env::var("VBOX_INSTALL_PATH").ok().as_deref())
        });
        Config {
            vm: self.vm,
            vbox_manage,
            boot2docker: self.boot2docker,
            sudo: self.sudo,
            nfsd: self.nfsd,
            exports_file: self.exports_file,
            settle_delay: Duration::from_secs(self.settle_delay),
            strict: self.strict,
        }
    }
}

/// Find `VBoxManage`: on `PATH` if it is there, otherwise inside
/// `install_dir` (VirtualBox's `VBOX_INSTALL_PATH`) if it exists there.
///
/// Falls back to the bare name so the spawn error names the program.
pub fn locate_vbox_manage(install_dir: Option<&str>) -> String {
    if which::which(VBOX_MANAGE).is_ok() {
        return VBOX_MANAGE.to_owned();
    }
    if let Some(candidate) = install_dir
        .map(|dir| Utf8Path::new(dir).join(VBOX_MANAGE))
        .filter(|p| p.is_file())
    {
        debug!("Using {candidate} from VBOX_INSTALL_PATH");
        return candidate.into_string();
    }
    VBOX_MANAGE.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ConfigOpts {
        ConfigOpts::try_parse_from(std::iter::once("b2d-nfs").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let opts = parse(&["--vbox-manage", "VBoxManage"]);
        let config = opts.into_config();
        // The environment may override the VM name.
        if std::env::var_os("BOOT2DOCKER_VM").is_none() {
            assert_eq!(config.vm, DEFAULT_VM);
        }
        assert_eq!(config.vbox_manage, "VBoxManage");
        assert_eq!(config.settle_delay, Duration::from_secs(2));
        assert_eq!(config.policy(), StepPolicy::Unchecked);
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--vm",
            "dev",
            "--vbox-manage",
            "/opt/vbox/VBoxManage",
            "--exports-file",
            "/tmp/exports",
            "--settle-delay",
            "0",
            "--strict",
        ])
        .into_config();
        assert_eq!(config.vm, "dev");
        assert_eq!(config.vbox_manage, "/opt/vbox/VBoxManage");
        assert_eq!(config.exports_file, "/tmp/exports");
        assert!(config.settle_delay.is_zero());
        assert_eq!(config.policy(), StepPolicy::Checked);
    }

    #[test]
    fn test_locate_vbox_manage_in_install_dir() {
        if which::which(VBOX_MANAGE).is_ok() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        assert_eq!(locate_vbox_manage(Some(dir_str)), VBOX_MANAGE);

        std::fs::write(dir.path().join(VBOX_MANAGE), "").unwrap();
        let found = locate_vbox_manage(Some(dir_str));
        assert_eq!(found, format!("{dir_str}/{VBOX_MANAGE}"));
    }
}
