//! Resolving the VM's host-only adapter and its address through `VBoxManage`.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use color_eyre::Result;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::exec::{CommandRunner, HostCommand};
use crate::records::{parse_colon_blocks, parse_machine_readable, Record};

/// `hostonlyadapter` optionally followed by the NIC index.
static HOSTONLY_ADAPTER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^hostonlyadapter\d*$").expect("valid regex"));

/// The value of the first `hostonlyadapter<N>` field, in output order.
///
/// `None` when there is no such field or the first one is empty; later
/// fields are not consulted.
pub fn find_hostonly_adapter(vminfo: &Record) -> Option<&str> {
    vminfo
        .iter()
        .find(|(k, _)| HOSTONLY_ADAPTER_KEY.is_match(k))
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

/// The `IPAddress` of the first interface block whose `Name` is `adapter`.
pub fn find_adapter_address<'a>(interfaces: &'a [Record], adapter: &str) -> Option<&'a str> {
    interfaces
        .iter()
        .find(|block| block.get("Name") == Some(adapter))
        .and_then(|block| block.get("IPAddress"))
        .filter(|v| !v.is_empty())
}

/// Parse a resolved address, naming `what` in the error.
pub(crate) fn parse_ipv4(what: &'static str, value: &str) -> Result<Ipv4Addr, ResolutionError> {
    value
        .parse()
        .map_err(|_| ResolutionError::InvalidAddress {
            what,
            value: value.to_owned(),
        })
}

/// Handle on the `VBoxManage` tool.
#[derive(Debug)]
pub struct VBoxManage<'r, R> {
    runner: &'r R,
    program: &'r str,
}

impl<'r, R: CommandRunner> VBoxManage<'r, R> {
    /// Use `program` as the `VBoxManage` executable.
    pub fn new(runner: &'r R, program: &'r str) -> Self {
        Self { runner, program }
    }

    /// Run a query and return its stdout.
    ///
    /// A non-zero exit is not fatal by itself; empty output surfaces as a
    /// [`ResolutionError`] from the caller.
    fn query<const N: usize>(&self, args: [&str; N]) -> Result<String> {
        let cmd = HostCommand::new(self.program).args(args);
        let out = self.runner.run(&cmd)?;
        if !out.success() {
            warn!("{cmd} failed: {}", out.stderr.trim());
        }
        Ok(out.stdout)
    }

    /// `VBoxManage showvminfo <vm> --machinereadable`.
    pub fn show_vm_info(&self, vm: &str) -> Result<Record> {
        let out = self.query(["showvminfo", vm, "--machinereadable"])?;
        Ok(parse_machine_readable(&out))
    }

    /// `VBoxManage list hostonlyifs`.
    pub fn list_hostonly_ifs(&self) -> Result<Vec<Record>> {
        let out = self.query(["list", "hostonlyifs"])?;
        Ok(parse_colon_blocks(&out))
    }

    /// Name of the host-only adapter attached to `vm`.
    pub fn resolve_adapter(&self, vm: &str) -> Result<String> {
        let info = self.show_vm_info(vm)?;
        let adapter = find_hostonly_adapter(&info).ok_or(ResolutionError::AdapterName)?;
        debug!("VM {vm} uses host-only adapter {adapter}");
        Ok(adapter.to_owned())
    }

    /// IPv4 address of the host side of `adapter`.
    pub fn resolve_adapter_address(&self, adapter: &str) -> Result<Ipv4Addr> {
        let interfaces = self.list_hostonly_ifs()?;
        debug!("Found {} host-only interfaces", interfaces.len());
        let value = find_adapter_address(&interfaces, adapter)
            .ok_or_else(|| ResolutionError::AdapterAddress(adapter.to_owned()))?;
        Ok(parse_ipv4("adapter address", value)?)
    }
}
