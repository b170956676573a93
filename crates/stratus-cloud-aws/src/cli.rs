//! aws CLI wrapper
//!
//! Runs `aws <service> <operation> ...` with the configured region and
//! profile and JSON output, and turns failures into [`AwsError`].

use crate::error::{AwsError, Result};
use serde::de::DeserializeOwned;
use std::process::Stdio;
use tokio::process::Command;

/// aws CLI wrapper
#[derive(Debug, Clone)]
pub struct AwsCli {
    region: String,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(region: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            region: region.into(),
            profile,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Check that the aws binary is on PATH
    pub async fn ensure_installed(&self) -> Result<()> {
        let which = Command::new("which").arg("aws").output().await?;
        if !which.status.success() {
            return Err(AwsError::CliNotFound);
        }
        Ok(())
    }

    /// Run an aws command and return stdout
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("aws");
        cmd.args(args);
        cmd.arg("--region").arg(&self.region);
        if let Some(profile) = &self.profile {
            cmd.arg("--profile").arg(profile);
        }
        cmd.arg("--output").arg("json");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let command = describe_command(args);
        tracing::debug!("Running: aws {} --region {}", command, self.region);

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AwsError::CliNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::CommandFailed {
                command,
                code: error_code(&stderr),
                message: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run and parse stdout as JSON
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run(args).await?;
        parse_output(&describe_command(args), &output)
    }

    /// Like [`run_json`](Self::run_json), but empty output yields `T::default()`
    pub async fn run_json_or_default<T: DeserializeOwned + Default>(
        &self,
        args: &[&str],
    ) -> Result<T> {
        let output = self.run(args).await?;
        if output.trim().is_empty() {
            return Ok(T::default());
        }
        parse_output(&describe_command(args), &output)
    }

    /// Run and treat any of `missing` error codes as "not there"
    pub async fn run_json_optional<T: DeserializeOwned>(
        &self,
        args: &[&str],
        missing: &[&str],
    ) -> Result<Option<T>> {
        match self.run_json(args).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_code(missing) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// `service operation` for logs and errors
fn describe_command(args: &[&str]) -> String {
    args.iter().take(2).copied().collect::<Vec<_>>().join(" ")
}

fn parse_output<T: DeserializeOwned>(command: &str, output: &str) -> Result<T> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(AwsError::UnexpectedOutput {
            command: command.to_string(),
            detail: "empty output".to_string(),
        });
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Extract `Code` from `An error occurred (Code) when calling ...`
pub(crate) fn error_code(stderr: &str) -> Option<String> {
    let start = stderr.find("An error occurred (")? + "An error occurred (".len();
    let end = stderr[start..].find(')')? + start;
    let code = &stderr[start..end];
    (!code.is_empty()).then(|| code.to_string())
}

/// `Key=Name,Value=<name>` tag specification for EC2 create calls
pub(crate) fn tag_specification(resource_type: &str, name: &str) -> String {
    format!(
        "ResourceType={},Tags=[{{Key=Name,Value={}}},{{Key=managed-by,Value=stratus}}]",
        resource_type, name
    )
}
