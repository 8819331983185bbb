//! Driving the `boot2docker` CLI: guest address, remote commands, restart.

use std::net::Ipv4Addr;

use color_eyre::Result;
use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::exec::{run_step, CommandOutput, CommandRunner, HostCommand, StepPolicy};
use crate::vbox::parse_ipv4;

/// Environment variable the boot2docker CLI reads the VM name from.
pub const VM_ENV: &str = "BOOT2DOCKER_VM";

/// Handle on the `boot2docker` CLI for one VM.
#[derive(Debug)]
pub struct Boot2Docker<'r, R> {
    runner: &'r R,
    program: &'r str,
    vm: &'r str,
}

impl<'r, R: CommandRunner> Boot2Docker<'r, R> {
    /// Drive `program` against the VM named `vm`.
    pub fn new(runner: &'r R, program: &'r str, vm: &'r str) -> Self {
        Self { runner, program, vm }
    }

    fn command<const N: usize>(&self, args: [&str; N]) -> HostCommand {
        HostCommand::new(self.program)
            .args(args)
            .env(VM_ENV, self.vm)
    }

    /// The guest's own IPv4 address, from `boot2docker ip`.
    ///
    /// Newer CLIs print a banner before the address, so the last non-empty
    /// line of stdout is taken.
    pub fn ip(&self) -> Result<Ipv4Addr> {
        let cmd = self.command(["ip"]);
        let out = self.runner.run(&cmd)?;
        if !out.success() {
            warn!("{cmd} failed: {}", out.stderr.trim());
        }
        let value = out
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| ResolutionError::GuestAddress(self.vm.to_owned()))?;
        debug!("Guest {} has address {value}", self.vm);
        Ok(parse_ipv4("guest address", value)?)
    }

    /// Run `command` inside the guest through `boot2docker ssh`.
    pub fn ssh(&self, command: &str, policy: StepPolicy) -> Result<Option<CommandOutput>> {
        run_step(self.runner, &self.command(["ssh", command]), policy)
    }

    /// `boot2docker restart`.
    pub fn restart(&self, policy: StepPolicy) -> Result<Option<CommandOutput>> {
        run_step(self.runner, &self.command(["restart"]), policy)
    }
}
