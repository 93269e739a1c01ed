//! `ipa_kinit`: a Kerberos ticket for a user in the local credential cache.
//!
//! The only kind that does not talk to the API. State is probed live with
//! `klist -l` on every read, tickets are obtained with `kinit` (password on
//! stdin) and dropped with `kdestroy -p`.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::config::Secret;
use crate::context::Scope;
use crate::error::{ReconcileError, Result};
use crate::model::{Desired, Instance, InstanceTable, Properties};
use crate::reconciler::{Provider, Transition};

/// Process execution seam.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` to completion and return its stdout. A non-zero exit is
    /// a [`ReconcileError::Command`].
    async fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(%command, "Running");

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            feed_stdin(&mut pipe, input).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ReconcileError::Command {
                command,
                message: if stderr.is_empty() {
                    output.status.to_string()
                } else {
                    stderr
                },
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Write `input` and a newline. A child that exits without reading closes
/// the pipe; its exit status and stderr are reported by the caller instead.
async fn feed_stdin<W: AsyncWrite + Unpin>(pipe: &mut W, input: &str) -> std::io::Result<()> {
    let written = async {
        pipe.write_all(input.as_bytes()).await?;
        pipe.write_all(b"\n").await?;
        pipe.shutdown().await
    }
    .await;
    match written {
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!("Child closed stdin early");
            Ok(())
        }
        other => other,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinitProps {
    /// Narrows `klist` matching; upper-cased.
    #[serde(
        deserialize_with = "deserialize_realm",
        skip_serializing_if = "Option::is_none"
    )]
    pub realm: Option<String>,

    /// Full principal found in the cache.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub principal_name: Option<String>,

    #[serde(skip_serializing)]
    pub password: Option<Secret>,
}

impl Properties for KinitProps {
    fn sync_from(&mut self, _desired: &Self) -> Vec<&'static str> {
        Vec::new()
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match &self.password {
            Some(_) => Ok(()),
            None => Err("password is required to obtain a ticket".to_string()),
        }
    }
}

fn deserialize_realm<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(|realm| realm.to_uppercase()))
}

/// Live principals from `klist -l` output, header and expired tickets skipped.
pub fn principals(klist_output: &str) -> Vec<String> {
    klist_output
        .lines()
        .filter(|line| !line.to_lowercase().starts_with("principal name"))
        .filter(|line| !line.starts_with("-----"))
        .filter(|line| !line.to_lowercase().contains("(expired)"))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

fn split_principal(principal: &str) -> (&str, Option<&str>) {
    match principal.split_once('@') {
        Some((user, realm)) => (user, Some(realm)),
        None => (principal, None),
    }
}

pub struct KinitProvider<R = SystemCommandRunner> {
    runner: R,
}

impl Default for KinitProvider {
    fn default() -> Self {
        Self::new(SystemCommandRunner)
    }
}

impl<R: CommandRunner> KinitProvider<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn klist(&self) -> Option<String> {
        match self.runner.run("klist", &["-l"], None).await {
            Ok(output) => Some(output),
            Err(err) => {
                debug!(error = %err, "klist failed; treating cache as empty");
                None
            }
        }
    }

    fn matching(output: &str, desired: &Desired<KinitProps>) -> Option<Instance<KinitProps>> {
        principals(output).into_iter().find_map(|principal| {
            let (user, realm) = split_principal(&principal);
            if user != desired.name {
                return None;
            }
            if let Some(wanted) = &desired.props.realm {
                if realm != Some(wanted.as_str()) {
                    return None;
                }
            }
            let props = KinitProps {
                realm: desired.props.realm.clone(),
                principal_name: Some(principal.clone()),
                password: None,
            };
            Some(Instance::present(user, props))
        })
    }

    fn principal_for(desired: &Desired<KinitProps>) -> String {
        match &desired.props.realm {
            Some(realm) => format!("{}@{}", desired.name, realm),
            None => desired.name.clone(),
        }
    }
}

#[async_trait]
impl<R: CommandRunner> Provider for KinitProvider<R> {
    type Props = KinitProps;

    fn kind(&self) -> &'static str {
        "ipa_kinit"
    }

    /// Every live principal in the cache, keyed by user.
    async fn read_all(&self, _scope: &mut Scope<'_>) -> Result<InstanceTable<KinitProps>> {
        let mut table = InstanceTable::new();
        let Some(output) = self.klist().await else {
            return Ok(table);
        };
        for principal in principals(&output) {
            let (user, realm) = split_principal(&principal);
            let props = KinitProps {
                realm: realm.map(str::to_string),
                principal_name: Some(principal.clone()),
                password: None,
            };
            table
                .entry(user.to_string())
                .or_insert_with(|| Instance::present(user, props));
        }
        Ok(table)
    }

    /// Always probes `klist`; the credential cache changes outside this run.
    async fn read_one(
        &self,
        _scope: &mut Scope<'_>,
        desired: &Desired<KinitProps>,
        _fresh: bool,
    ) -> Result<Instance<KinitProps>> {
        let instance = self
            .klist()
            .await
            .and_then(|output| Self::matching(&output, desired))
            .unwrap_or_else(|| Instance::absent(desired.name.as_str()));
        debug!(name = %desired.name, present = instance.is_present(), "Probed ticket cache");
        Ok(instance)
    }

    async fn write(
        &self,
        _scope: &mut Scope<'_>,
        transition: Transition,
        desired: &Desired<KinitProps>,
        cached: &Instance<KinitProps>,
    ) -> Result<()> {
        match transition {
            Transition::Add => {
                let password = desired.props.password.as_ref().ok_or_else(|| {
                    ReconcileError::invalid(self.kind(), &desired.name, "password is required")
                })?;
                let principal = Self::principal_for(desired);
                self.runner
                    .run("kinit", &[principal.as_str()], Some(password.expose()))
                    .await?;
            }
            Transition::Delete => {
                let principal = cached
                    .props
                    .principal_name
                    .clone()
                    .unwrap_or_else(|| Self::principal_for(desired));
                self.runner
                    .run("kdestroy", &["-p", principal.as_str()], None)
                    .await?;
            }
            Transition::Modify => {}
        }
        Ok(())
    }
}
