//! Registering the guest in the host's NFS export table.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use camino::Utf8Path;
use color_eyre::eyre::Context;
use color_eyre::Result;
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::exec::{run_step, CommandOutput, CommandRunner, HostCommand, StepPolicy};

/// Host directory shared with the guest.
pub const SHARED_DIR: &str = "/Users";

/// One line of `/etc/exports` granting a client access to [`SHARED_DIR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRule {
    /// The guest allowed to mount the share.
    pub client: Ipv4Addr,
}

impl fmt::Display for ExportRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SHARED_DIR} {} -alldirs -maproot=root", self.client)
    }
}

/// Keep the first occurrence of every line, in order.
///
/// Lines are split on `\n` alone and compared as raw bytes, so a `\r`
/// or a non-UTF-8 byte is part of the line. Blank lines are lines too,
/// so only the first one survives. Every kept line ends in `\n`.
pub fn dedup_lines(table: &[u8]) -> Vec<u8> {
    if table.is_empty() {
        return Vec::new();
    }
    let body = table.strip_suffix(b"\n").unwrap_or(table);
    body.split(|&b| b == b'\n')
        .unique()
        .flat_map(|line| line.iter().copied().chain(Some(b'\n')))
        .collect()
}

fn count_lines(table: &[u8]) -> usize {
    table.iter().filter(|&&b| b == b'\n').count()
}

/// Appends, deduplicates and reloads the host export table.
#[derive(Debug)]
pub struct ExportRegistrar<'r, R> {
    runner: &'r R,
    sudo: &'r str,
    nfsd: &'r str,
    exports: &'r Utf8Path,
    settle_delay: Duration,
    policy: StepPolicy,
}

impl<'r, R: CommandRunner> ExportRegistrar<'r, R> {
    /// Operate on `exports`, escalating with `sudo` and reloading through `nfsd`.
    pub fn new(runner: &'r R, sudo: &'r str, nfsd: &'r str, exports: &'r Utf8Path) -> Self {
        Self {
            runner,
            sudo,
            nfsd,
            exports,
            settle_delay: Duration::from_secs(2),
            policy: StepPolicy::Unchecked,
        }
    }

    /// How long to wait after restarting the NFS server.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Policy for the privileged writes and service commands.
    pub fn policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn privileged<const N: usize>(&self, args: [&str; N]) -> HostCommand {
        HostCommand::new(self.sudo).args(args)
    }

    /// Append `rule`, preceded by a blank line.
    pub fn append(&self, rule: &ExportRule) -> Result<()> {
        let cmd = self
            .privileged(["tee", "-a", self.exports.as_str()])
            .stdin(format!("\n{rule}\n"));
        run_step(self.runner, &cmd, self.policy)?;
        Ok(())
    }

    /// Rewrite the table without duplicate lines.
    pub fn dedup(&self) -> Result<()> {
        let table = match std::fs::read(self.exports)
            .with_context(|| format!("Reading {}", self.exports))
        {
            Ok(table) => table,
            Err(e) if self.policy == StepPolicy::Unchecked => {
                warn!("Skipping deduplication: {e:#}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let deduped = dedup_lines(&table);
        debug!(
            "Export table: {} lines, {} after dedup",
            count_lines(&table),
            count_lines(&deduped)
        );
        let cmd = self
            .privileged(["tee", self.exports.as_str()])
            .stdin(deduped);
        run_step(self.runner, &cmd, self.policy)?;
        Ok(())
    }

    /// Restart the NFS server, let it settle, and return what
    /// `nfsd checkexports` reports.
    pub fn reload(&self) -> Result<Option<CommandOutput>> {
        run_step(self.runner, &self.privileged([self.nfsd, "restart"]), self.policy)?;
        if !self.settle_delay.is_zero() {
            debug!("Waiting {:?} for nfsd to settle", self.settle_delay);
            std::thread::sleep(self.settle_delay);
        }
        run_step(
            self.runner,
            &self.privileged([self.nfsd, "checkexports"]),
            self.policy,
        )
    }

    /// Append the rule for `guest`, deduplicate and reload.
    pub fn register(&self, guest: Ipv4Addr) -> Result<(ExportRule, Option<CommandOutput>)> {
        let rule = ExportRule { client: guest };
        info!("Registering export: {rule}");
        self.append(&rule)?;
        self.dedup()?;
        let check = self.reload()?;
        Ok((rule, check))
    }
}
