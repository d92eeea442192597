//! Artifact sink
//!
//! Challenge files and deployed certificates both land on a [`Destination`]:
//! a local path, or a path on a remote host reached over ssh. The sink is the
//! one place that dispatches on that distinction.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use certsmith_common::{Destination, ReloadCommand};
use tracing::{debug, info};

use crate::acme::AcmeError;

/// Copies and commands on remote hosts
pub trait RemoteTransfer: Send + Sync {
    /// Copy a local file to `host:remote`
    fn copy(&self, local: &Path, host: &str, remote: &Path) -> Result<(), AcmeError>;
    /// Delete `host:remote`
    fn remove(&self, host: &str, remote: &Path) -> Result<(), AcmeError>;
    /// Run a shell command on `host`
    fn exec(&self, host: &str, command: &str) -> Result<(), AcmeError>;
}

/// Spawns the system `scp` and `ssh` clients, non-interactively
#[derive(Debug, Clone)]
pub struct SshTransfer {
    scp: String,
    ssh: String,
}

impl Default for SshTransfer {
    fn default() -> Self {
        Self {
            scp: "scp".to_string(),
            ssh: "ssh".to_string(),
        }
    }
}

impl SshTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, mut command: Command, what: &str) -> Result<(), AcmeError> {
        debug!(command = ?command, "Running remote transfer");
        let output = command
            .output()
            .map_err(|e| AcmeError::Deployment(format!("{}: cannot spawn: {}", what, e)))?;
        if !output.status.success() {
            return Err(AcmeError::Deployment(format!(
                "{}: exited with {}: {}",
                what,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl RemoteTransfer for SshTransfer {
    fn copy(&self, local: &Path, host: &str, remote: &Path) -> Result<(), AcmeError> {
        let mut command = Command::new(&self.scp);
        command
            .args(["-q", "-o", "BatchMode=yes"])
            .arg(local)
            .arg(format!("{}:{}", host, remote.display()));
        self.run(command, &format!("scp to {}:{}", host, remote.display()))
    }

    fn remove(&self, host: &str, remote: &Path) -> Result<(), AcmeError> {
        let mut command = Command::new(&self.ssh);
        command
            .args(["-o", "BatchMode=yes", host])
            .arg(remove_command(remote));
        self.run(command, &format!("rm on {}:{}", host, remote.display()))
    }

    fn exec(&self, host: &str, remote_command: &str) -> Result<(), AcmeError> {
        let mut command = Command::new(&self.ssh);
        command.args(["-o", "BatchMode=yes", host, remote_command]);
        self.run(command, &format!("'{}' on {}", remote_command, host))
    }
}

/// The remote shell joins ssh arguments into one line, so the path is quoted
fn remove_command(remote: &Path) -> String {
    format!("rm -f -- {}", shell_quote(&remote.to_string_lossy()))
}

/// POSIX single quoting
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Puts files on destinations and runs reload commands
#[derive(Clone)]
pub struct ArtifactSink {
    remote: Arc<dyn RemoteTransfer>,
}

impl ArtifactSink {
    pub fn new(remote: Arc<dyn RemoteTransfer>) -> Self {
        Self { remote }
    }

    /// Copy `source` to `destination`, creating local parent directories
    pub fn put(&self, source: &Path, destination: &Destination) -> Result<(), AcmeError> {
        match destination {
            Destination::Local(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(|e| {
                        AcmeError::Deployment(format!("cannot create {}: {}", parent.display(), e))
                    })?;
                }
                fs::copy(source, path).map_err(|e| {
                    AcmeError::Deployment(format!(
                        "cannot copy {} to {}: {}",
                        source.display(),
                        path.display(),
                        e
                    ))
                })?;
            }
            Destination::Remote { host, path } => self.remote.copy(source, host, path)?,
        }

        debug!(source = %source.display(), destination = %destination, "Copied artifact");
        Ok(())
    }

    /// Delete the file at `destination`; a missing local file is not an error
    pub fn remove(&self, destination: &Destination) -> Result<(), AcmeError> {
        match destination {
            Destination::Local(path) => match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(AcmeError::Deployment(format!(
                        "cannot remove {}: {}",
                        path.display(),
                        e
                    )))
                }
            },
            Destination::Remote { host, path } => self.remote.remove(host, path)?,
        }

        debug!(destination = %destination, "Removed artifact");
        Ok(())
    }

    /// Run a reload command locally through `sh -c`, or on its remote host
    pub fn run(&self, command: &ReloadCommand) -> Result<(), AcmeError> {
        match command {
            ReloadCommand::Local(script) => {
                let output = Command::new("sh")
                    .arg("-c")
                    .arg(script)
                    .output()
                    .map_err(|e| AcmeError::Deployment(format!("cannot run '{}': {}", script, e)))?;
                if !output.status.success() {
                    return Err(AcmeError::Deployment(format!(
                        "'{}' exited with {}: {}",
                        script,
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }
            }
            ReloadCommand::Remote { host, command } => self.remote.exec(host, command)?,
        }

        info!(command = %command, "Reload command completed");
        Ok(())
    }
}

impl std::fmt::Debug for ArtifactSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::testing::{RecordingTransfer, RemoteOp};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup_sink() -> (TempDir, Arc<RecordingTransfer>, ArtifactSink) {
        let temp_dir = TempDir::new().unwrap();
        let remote = Arc::new(RecordingTransfer::default());
        let sink = ArtifactSink::new(remote.clone());
        (temp_dir, remote, sink)
    }

    #[test]
    fn test_remote_remove_quotes_path() {
        assert_eq!(
            remove_command(Path::new("/var/www/acme/tok1")),
            "rm -f -- '/var/www/acme/tok1'"
        );
        assert_eq!(
            remove_command(Path::new("/srv/my site/x; rm -rf ~")),
            "rm -f -- '/srv/my site/x; rm -rf ~'"
        );
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_put_local_creates_parents() {
        let (temp_dir, _remote, sink) = setup_sink();
        let source = temp_dir.path().join("src.crt");
        fs::write(&source, "PEM").unwrap();

        let target = temp_dir.path().join("etc/ssl/site.crt");
        sink.put(&source, &Destination::Local(target.clone())).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "PEM");

        sink.remove(&Destination::Local(target.clone())).unwrap();
        assert!(!target.exists());
        sink.remove(&Destination::Local(target)).unwrap();
    }

    #[test]
    fn test_put_remote_goes_through_transfer() {
        let (temp_dir, remote, sink) = setup_sink();
        let source = temp_dir.path().join("token");
        fs::write(&source, "tok.thumb").unwrap();

        let destination = Destination::parse("ssh:web1:/srv/acme/token").unwrap();
        sink.put(&source, &destination).unwrap();
        sink.remove(&destination).unwrap();

        assert_eq!(
            remote.ops(),
            vec![
                RemoteOp::Copy {
                    host: "web1".to_string(),
                    remote: PathBuf::from("/srv/acme/token"),
                    contents: b"tok.thumb".to_vec(),
                },
                RemoteOp::Remove {
                    host: "web1".to_string(),
                    remote: PathBuf::from("/srv/acme/token"),
                },
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_commands() {
        let (temp_dir, remote, sink) = setup_sink();
        let marker = temp_dir.path().join("reloaded");

        sink.run(&ReloadCommand::Local(format!("touch {}", marker.display())))
            .unwrap();
        assert!(marker.exists());

        let err = sink.run(&ReloadCommand::Local("exit 1".to_string())).unwrap_err();
        assert_eq!(err.kind(), "deployment");

        sink.run(&ReloadCommand::parse("ssh:web1:systemctl reload nginx").unwrap())
            .unwrap();
        assert_eq!(
            remote.ops(),
            vec![RemoteOp::Exec {
                host: "web1".to_string(),
                command: "systemctl reload nginx".to_string(),
            }]
        );
    }
}
