//! The end-to-end switch from vboxsf to NFS.
//!
//! The run is a single forward path:
//!
//! ```text
//! start -> adapter-resolved -> address-resolved -> export-registered
//!       -> script-rendered -> script-transferred -> permissions-set
//!       -> guest-restarted -> done
//! ```
//!
//! Resolution failures end the run before the host export table or the
//! guest filesystem is touched. Failures of later commands follow the
//! configured [`StepPolicy`](crate::exec::StepPolicy).

use std::net::Ipv4Addr;

use color_eyre::Result;
use tracing::{debug, info, instrument};

use crate::boot2docker::Boot2Docker;
use crate::bootlocal::{render_boot_script, GuestProvisioner};
use crate::config::Config;
use crate::exec::CommandRunner;
use crate::exports::{ExportRegistrar, ExportRule};
use crate::vbox::VBoxManage;

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    /// Nothing has happened yet.
    Start,
    /// The host-only adapter name is known.
    AdapterResolved,
    /// The adapter's host address is known.
    AddressResolved,
    /// The export table holds the guest's rule and nfsd was reloaded.
    ExportRegistered,
    /// The boot script text exists.
    ScriptRendered,
    /// The boot script was written into the guest.
    ScriptTransferred,
    /// The boot script is executable.
    PermissionsSet,
    /// The guest was restarted.
    GuestRestarted,
    /// Finished.
    Done,
}

/// The host-only network the guest reaches the host through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOnlyNetwork {
    /// Adapter name, e.g. `vboxnet0`.
    pub adapter: String,
    /// The host's address on that adapter; the NFS server address.
    pub address: Ipv4Addr,
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The resolved host-only network.
    pub network: HostOnlyNetwork,
    /// The guest's own address.
    pub guest: Ipv4Addr,
    /// The export line registered for the guest.
    pub rule: ExportRule,
    /// The boot script written into the guest.
    pub script: String,
}

/// One run of the NFS switch against a single VM.
#[derive(Debug)]
pub struct Pipeline<'a, R> {
    config: &'a Config,
    runner: &'a R,
    stage: Stage,
}

impl<'a, R: CommandRunner> Pipeline<'a, R> {
    /// Prepare a run; nothing is executed until [`Pipeline::run`].
    pub fn new(config: &'a Config, runner: &'a R) -> Self {
        Self {
            config,
            runner,
            stage: Stage::Start,
        }
    }

    /// The last stage reached.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug!("{} -> {next}", self.stage);
        self.stage = next;
    }

    /// Find the VM's host-only adapter and the host's address on it.
    #[instrument(skip(self), fields(vm = %self.config.vm))]
    pub fn resolve(&mut self) -> Result<HostOnlyNetwork> {
        let config = self.config;
        let vbm = VBoxManage::new(self.runner, &config.vbox_manage);
        let adapter = vbm.resolve_adapter(&config.vm)?;
        self.advance(Stage::AdapterResolved);
        let address = vbm.resolve_adapter_address(&adapter)?;
        self.advance(Stage::AddressResolved);
        Ok(HostOnlyNetwork { adapter, address })
    }

    /// Run every stage in order.
    pub fn run(&mut self) -> Result<Outcome> {
        let (config, runner) = (self.config, self.runner);
        debug!("Host and guest commands are {}", config.policy());
        print!("Get vboxnet ip address ...");
        let network = self.resolve()?;
        println!(" {}", network.address);

        let b2d = Boot2Docker::new(runner, &config.boot2docker, &config.vm);
        let guest = b2d.ip()?;
        println!("Update {} ...", config.exports_file);
        let registrar =
            ExportRegistrar::new(runner, &config.sudo, &config.nfsd, &config.exports_file)
                .settle_delay(config.settle_delay)
                .policy(config.policy());
        let (rule, check) = registrar.register(guest)?;
        if let Some(check) = check {
            print!("{}", check.stdout);
            eprint!("{}", check.stderr);
        }
        self.advance(Stage::ExportRegistered);

        println!("Update boot2docker virtual machine ...");
        let script = render_boot_script(network.address);
        self.advance(Stage::ScriptRendered);
        let provisioner = GuestProvisioner::new(&b2d, config.policy());
        provisioner.upload(&script)?;
        self.advance(Stage::ScriptTransferred);
        provisioner.make_executable()?;
        self.advance(Stage::PermissionsSet);

        println!("Restart ...");
        provisioner.restart()?;
        self.advance(Stage::GuestRestarted);

        info!("{} now mounts {}:/Users", config.vm, network.address);
        self.advance(Stage::Done);
        Ok(Outcome {
            network,
            guest,
            rule,
            script,
        })
    }
}
