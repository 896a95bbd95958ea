use serde::{Deserialize, Serialize};

/// Failure of a single external source call.
///
/// Workspace and window queries hand these to their callers. The cosmetic
/// indicators (media, power, network) only use them internally before
/// falling back to a displayable default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum AdapterError {
    #[error("{name} was not found on this system")]
    BinaryNotFound { name: String },

    #[error("process exited with {}: {stderr}", fmt_exit(*.exit_code))]
    ProcessError {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("could not parse output: {raw:?}")]
    ParseError { raw: String },

    #[error("probe timed out")]
    ProbeTimeout,

    #[error("script failed: {0}")]
    ScriptError(String),
}

fn fmt_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (killed by signal)".to_owned(),
    }
}

impl AdapterError {
    pub(crate) fn parse(raw: impl AsRef<[u8]>) -> Self {
        Self::ParseError {
            raw: String::from_utf8_lossy(raw.as_ref()).into_owned(),
        }
    }

    pub(crate) fn process(status: std::process::ExitStatus, stderr: &[u8]) -> Self {
        Self::ProcessError {
            exit_code: status.code(),
            stderr: String::from_utf8_lossy(stderr).trim().to_owned(),
        }
    }

    pub fn is_binary_not_found(&self) -> bool {
        matches!(self, Self::BinaryNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = AdapterError::ProcessError {
            exit_code: Some(2),
            stderr: "Can't connect to AeroSpace server".into(),
        };
        assert_eq!(
            err.to_string(),
            "process exited with exit code 2: Can't connect to AeroSpace server"
        );
        assert_eq!(
            AdapterError::BinaryNotFound {
                name: "aerospace".into()
            }
            .to_string(),
            "aerospace was not found on this system"
        );
    }
}
