//! AWS provider error types

use stratus_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: https://aws.amazon.com/cli/")]
    CliNotFound,

    #[error("aws {command} failed: {message}")]
    CommandFailed {
        command: String,
        /// Service error code such as `NoSuchEntity`, when the CLI printed one
        code: Option<String>,
        message: String,
    },

    #[error("Unexpected output from aws {command}: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AwsError {
    /// Service error code of a failed command
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::CommandFailed { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the command failed with one of `codes`
    pub fn is_code(&self, codes: &[&str]) -> bool {
        self.code().is_some_and(|c| codes.contains(&c))
    }
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::CliNotFound => CloudError::prerequisite(err.to_string()),
            AwsError::CommandFailed {
                command, message, ..
            } => CloudError::api(command, message),
            AwsError::UnexpectedOutput { command, detail } => CloudError::api(command, detail),
            AwsError::JsonError(e) => CloudError::Json(e),
            AwsError::IoError(e) => CloudError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
