use anyhow::{Context, Error};
use serde_json::Value;
use tokio::process::Command;

use rbdbkp_tools::run_command_async;

/// Where an `rbd`/`ceph` invocation executes: on the backup host itself, or
/// on the source cluster via the ssh transport (`proxmox_ssh_user@server`).
///
/// This is the "remote shell transport" from the design: a plain
/// bidirectional byte pipe, here realized as an `ssh` child process. Its
/// mechanics (host key handling, multiplexing, ...) are out of scope; only
/// the argv wrapping is this crate's concern.
#[derive(Debug, Clone)]
pub enum Shell {
    Local,
    Remote { user: String, host: String },
}

impl Shell {
    pub fn remote(user: impl Into<String>, host: impl Into<String>) -> Self {
        Shell::Remote {
            user: user.into(),
            host: host.into(),
        }
    }

    /// `ssh user@host -T -o Compression=no -x`, the exact transport options
    /// the orchestration engine shells out a full export/import pipeline
    /// through (see `transport::run_stream`).
    pub fn ssh_prefix(&self) -> Option<String> {
        match self {
            Shell::Local => None,
            Shell::Remote { user, host } => Some(format!(
                "ssh {user}@{host} -T -o Compression=no -x",
            )),
        }
    }

    fn build(&self, argv: &[String]) -> Command {
        match self {
            Shell::Local => {
                let mut cmd = Command::new(&argv[0]);
                cmd.args(&argv[1..]);
                cmd
            }
            Shell::Remote { user, host } => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-T", "-o", "Compression=no", "-x"])
                    .arg(format!("{user}@{host}"))
                    .arg("--")
                    .arg(shell_join(argv));
                cmd
            }
        }
    }

    pub async fn run(&self, argv: &[String]) -> Result<String, Error> {
        let cmd = self.build(argv);
        run_command_async(cmd, None)
            .await
            .with_context(|| format!("command failed: {}", shell_join(argv)))
    }

    pub async fn run_json(&self, argv: &[String]) -> Result<Value, Error> {
        let raw = self.run(argv).await?;
        serde_json::from_str(raw.trim())
            .with_context(|| format!("expected JSON output from: {}", shell_join(argv)))
    }

    /// Run a raw shell pipeline (e.g. `export | pv | import`) via `bash -c`.
    /// Only used by the streaming transport, where several external tools
    /// must be wired together by the host's own pipe plumbing.
    pub async fn run_pipeline(&self, script: &str) -> Result<(), Error> {
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(script);
        run_command_async(cmd, None)
            .await
            .map(|_| ())
            .with_context(|| "streaming pipeline failed".to_string())
    }
}

/// Minimal POSIX shell quoting: wrap in single quotes, escaping embedded
/// single quotes. Good enough for the argv rbd-backup ever builds (pool and
/// image names, snapshot names, paths); never fed user shell syntax.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:@".contains(c)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn shell_join(argv: &[String]) -> String {
    argv.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(shell_quote("rbd"), "rbd");
        assert_eq!(shell_quote("vm-100-disk-0"), "vm-100-disk-0");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn local_prefix_is_none() {
        assert!(Shell::Local.ssh_prefix().is_none());
    }

    #[test]
    fn remote_prefix_matches_transport_contract() {
        let shell = Shell::remote("root", "pve1.example.invalid");
        assert_eq!(
            shell.ssh_prefix().unwrap(),
            "ssh root@pve1.example.invalid -T -o Compression=no -x"
        );
    }

    #[tokio::test]
    async fn local_run_captures_stdout() {
        let out = Shell::Local
            .run(&["echo".to_string(), "hello".to_string()])
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn local_run_surfaces_nonzero_exit() {
        let err = Shell::Local.run(&["false".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("command failed"));
    }
}
