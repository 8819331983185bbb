//! The guest boot script that mounts the host share over NFS, and
//! getting it into the VM.
//!
//! boot2docker runs `/var/lib/boot2docker/bootlocal.sh` at the end of
//! every boot; the script replaces the vboxsf mount of `/Users` with an
//! NFS mount served by the host side of the host-only adapter. There is
//! no file copy channel into the guest, so the script is written one line
//! at a time through `boot2docker ssh`.

use std::net::Ipv4Addr;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use indoc::formatdoc;
use tracing::{debug, instrument};

use crate::boot2docker::Boot2Docker;
use crate::exec::{CommandRunner, StepPolicy};

/// Where boot2docker looks for the local boot script.
pub const BOOT_SCRIPT_PATH: &str = "/var/lib/boot2docker/bootlocal.sh";

/// Render the boot script for an NFS server at `adapter_ip`.
pub fn render_boot_script(adapter_ip: Ipv4Addr) -> String {
    formatdoc! {"
        #/bin/bash
        sudo umount /Users
        sudo /usr/local/etc/init.d/nfs-client start
        sudo mount -t nfs -o noacl,async {adapter_ip}:/Users /Users
    "}
}

/// Guest commands that write `script` to `path`, one per line.
///
/// The first truncates the file, the rest append to it.
pub fn transfer_commands(script: &str, path: &str) -> Result<Vec<String>> {
    let quoted_path =
        shlex::try_quote(path).map_err(|e| eyre!("Cannot quote guest path {path:?}: {e}"))?;
    script
        .lines()
        .enumerate()
        .map(|(i, line)| {
            let quoted = shlex::try_quote(line)
                .map_err(|e| eyre!("Cannot quote boot script line {line:?}: {e}"))?;
            let append = if i == 0 { "" } else { " -a" };
            Ok(format!("echo {quoted} | sudo tee{append} {quoted_path}"))
        })
        .collect()
}

/// Writes the boot script into the guest and reboots it.
#[derive(Debug)]
pub struct GuestProvisioner<'a, 'r, R> {
    boot2docker: &'a Boot2Docker<'r, R>,
    path: &'a str,
    policy: StepPolicy,
}

impl<'a, 'r, R: CommandRunner> GuestProvisioner<'a, 'r, R> {
    /// Provision through `boot2docker`, applying `policy` to every guest command.
    pub fn new(boot2docker: &'a Boot2Docker<'r, R>, policy: StepPolicy) -> Self {
        Self {
            boot2docker,
            path: BOOT_SCRIPT_PATH,
            policy,
        }
    }

    /// Write `script` into the guest, one remote command per line.
    ///
    /// A failure partway leaves a partially written file behind.
    #[instrument(skip_all)]
    pub fn upload(&self, script: &str) -> Result<()> {
        let commands = transfer_commands(script, self.path)?;
        debug!("Writing {} lines to {}", commands.len(), self.path);
        for command in &commands {
            self.boot2docker.ssh(command, self.policy)?;
        }
        Ok(())
    }

    /// `chmod +x` the uploaded script.
    pub fn make_executable(&self) -> Result<()> {
        self.boot2docker
            .ssh(&format!("sudo chmod +x {}", self.path), self.policy)?;
        Ok(())
    }

    /// Reboot the guest so the script runs.
    pub fn restart(&self) -> Result<()> {
        self.boot2docker.restart(self.policy)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testutil::FakeRunner;
    use crate::exec::CommandOutput;

    const EXPECTED: &str = "#/bin/bash
sudo umount /Users
sudo /usr/local/etc/init.d/nfs-client start
sudo mount -t nfs -o noacl,async 192.168.56.1:/Users /Users
";

    #[test]
    fn test_render_boot_script() {
        let script = render_boot_script(Ipv4Addr::new(192, 168, 56, 1));
        similar_asserts::assert_eq!(script, EXPECTED);
        assert_eq!(script, render_boot_script(Ipv4Addr::new(192, 168, 56, 1)));
    }

    #[test]
    fn test_single_substitution_point() {
        let a = render_boot_script(Ipv4Addr::new(10, 1, 2, 3));
        let b = render_boot_script(Ipv4Addr::new(172, 16, 0, 9));
        assert_eq!(a.matches("10.1.2.3").count(), 1);
        let differing: Vec<_> = a
            .lines()
            .zip(b.lines())
            .filter(|(x, y)| x != y)
            .collect();
        assert_eq!(
            differing,
            [(
                "sudo mount -t nfs -o noacl,async 10.1.2.3:/Users /Users",
                "sudo mount -t nfs -o noacl,async 172.16.0.9:/Users /Users"
            )]
        );
    }

    #[test]
    fn test_transfer_commands() {
        let commands = transfer_commands(EXPECTED, BOOT_SCRIPT_PATH).unwrap();
        assert_eq!(commands.len(), 4);
        for (i, (command, line)) in commands.iter().zip(EXPECTED.lines()).enumerate() {
            let words = shlex::split(command).unwrap();
            let mut expected = vec!["echo", line, "|", "sudo", "tee"];
            if i > 0 {
                expected.push("-a");
            }
            expected.push(BOOT_SCRIPT_PATH);
            assert_eq!(words, expected, "{command}");
        }
    }

    #[test]
    fn test_provisioner_sequence() {
        let runner = FakeRunner::new(|_| Ok(CommandOutput::ok("")));
        let b2d = Boot2Docker::new(&runner, "boot2docker", "boot2docker-vm");
        let provisioner = GuestProvisioner::new(&b2d, StepPolicy::Unchecked);
        provisioner.upload(EXPECTED).unwrap();
        provisioner.make_executable().unwrap();
        provisioner.restart().unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 6);
        assert!(calls[..4].iter().all(|c| c.args[0] == "ssh"));
        assert!(calls[0].args[1].contains("sudo tee /var/lib/boot2docker/bootlocal.sh"));
        assert!(calls[3].args[1].contains("sudo tee -a /var/lib/boot2docker/bootlocal.sh"));
        assert_eq!(calls[4].args, ["ssh", "sudo chmod +x /var/lib/boot2docker/bootlocal.sh"]);
        assert_eq!(calls[5].args, ["restart"]);
    }

    #[test]
    fn test_checked_upload_stops_at_first_failure() {
        let runner = FakeRunner::new(|_| Ok(CommandOutput::failed(255, "ssh: connect refused")));
        let b2d = Boot2Docker::new(&runner, "boot2docker", "boot2docker-vm");
        let provisioner = GuestProvisioner::new(&b2d, StepPolicy::Checked);
        assert!(provisioner.upload(EXPECTED).is_err());
        assert_eq!(runner.calls().len(), 1);
    }
}
