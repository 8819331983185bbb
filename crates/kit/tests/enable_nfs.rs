//! Runs the `b2d-nfs` binary against shell-script stand-ins for
//! `VBoxManage`, `boot2docker`, `sudo` and `nfsd`.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const RULE: &str = "/Users 192.168.56.101 -alldirs -maproot=root";

const HOSTONLYIFS: &str = "Name:            vboxnet0
IPAddress:       192.168.59.3

Name:            vboxnet3
IPAddress:       192.168.56.1";

struct FakeHost {
    dir: TempDir,
}

impl FakeHost {
    /// A host whose `VBoxManage showvminfo` prints `vminfo`.
    fn new(vminfo: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let host = Self { dir };
        let log = host.log();
        host.script(
            "VBoxManage",
            &format!(
                r#"case "$1" in
  showvminfo) printf '%s\n' '{vminfo}' ;;
  list) printf '%s\n' '{HOSTONLYIFS}' ;;
esac
"#
            ),
        );
        host.script(
            "boot2docker",
            &format!(
                r#"printf '%s|%s\n' "$BOOT2DOCKER_VM" "$*" >> '{log}'
if [ "$1" = ip ]; then echo 192.168.56.101; fi
"#,
                log = log.display()
            ),
        );
        host.script("sudo", "exec \"$@\"\n");
        host.script(
            "nfsd",
            &format!(
                r#"printf 'nfsd %s\n' "$*" >> '{log}'
if [ "$1" = checkexports ]; then echo 'exports ok'; fi
"#,
                log = log.display()
            ),
        );
        host
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn log(&self) -> PathBuf {
        self.path("calls.log")
    }

    fn exports(&self) -> PathBuf {
        self.path("exports")
    }

    fn script(&self, name: &str, body: &str) {
        let path = self.path(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn run(&self) -> Output {
        let arg = |p: PathBuf| p.into_os_string();
        Command::new(env!("CARGO_BIN_EXE_b2d-nfs"))
            .arg("--vm")
            .arg("test-vm")
            .arg("--vbox-manage")
            .arg(arg(self.path("VBoxManage")))
            .arg("--boot2docker")
            .arg(arg(self.path("boot2docker")))
            .arg("--sudo")
            .arg(arg(self.path("sudo")))
            .arg("--nfsd")
            .arg(arg(self.path("nfsd")))
            .arg("--exports-file")
            .arg(arg(self.exports()))
            .arg("--settle-delay")
            .arg("0")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn test_enable_end_to_end() {
    let host = FakeHost::new("nic2=\"hostonly\"\nhostonlyadapter2=\"vboxnet3\"");
    std::fs::write(host.exports(), format!("/opt -ro\n{RULE}\n")).unwrap();

    let out = host.run();
    let stdout = String::from_utf8_lossy(&out.stdout);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "stdout: {stdout}\nstderr: {stderr}");
    assert!(stdout.contains("Get vboxnet ip address ... 192.168.56.1"), "{stdout}");
    assert!(stdout.contains("exports ok"), "{stdout}");
    assert!(stdout.contains("'192.168.56.1:/Users [...] /Users'"), "{stdout}");

    similar_asserts::assert_eq!(read(&host.exports()), format!("/opt -ro\n{RULE}\n\n"));

    let log = read(&host.log());
    let calls: Vec<&str> = log.lines().collect();
    assert_eq!(calls.len(), 9, "{log}");
    assert_eq!(calls[0], "test-vm|ip");
    assert_eq!(calls[1], "nfsd restart");
    assert_eq!(calls[2], "nfsd checkexports");
    assert!(calls[3].starts_with("test-vm|ssh echo "), "{}", calls[3]);
    assert!(calls[3].ends_with("| sudo tee /var/lib/boot2docker/bootlocal.sh"));
    for call in &calls[4..7] {
        assert!(call.ends_with("| sudo tee -a /var/lib/boot2docker/bootlocal.sh"), "{call}");
    }
    assert!(calls[6].contains("192.168.56.1:/Users"));
    assert_eq!(calls[7], "test-vm|ssh sudo chmod +x /var/lib/boot2docker/bootlocal.sh");
    assert_eq!(calls[8], "test-vm|restart");
}

#[test]
fn test_missing_adapter_exits_without_changes() {
    let host = FakeHost::new("name=\"test-vm\"\nnic1=\"nat\"");
    std::fs::write(host.exports(), format!("{RULE}\n")).unwrap();

    let out = host.run();
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error: unable to find name of vboxnet"), "{stderr}");

    assert_eq!(read(&host.exports()), format!("{RULE}\n"));
    assert!(!host.log().exists());
}
