use std::{path::PathBuf, sync::Arc};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::{
    clients::SourceAdapter,
    data::{WindowDescriptor, WorkspaceDescriptor, WorkspaceId},
    error::AdapterError,
    exec::{BinaryResolver, CommandRunner},
};

const LIST_ALL: &[&str] = &["list-workspaces", "--all", "--json"];
const LIST_FOCUSED: &[&str] = &["list-workspaces", "--focused", "--json"];
const FOCUSED_WINDOW: &[&str] = &["list-windows", "--focused", "--json"];

/// Talks to the workspace manager's command line interface.
pub struct AerospaceClient {
    binary: String,
    runner: Arc<dyn CommandRunner>,
    resolver: BinaryResolver,
}
impl AerospaceClient {
    pub fn new(binary: String, runner: Arc<dyn CommandRunner>, resolver: BinaryResolver) -> Self {
        Self {
            binary,
            runner,
            resolver,
        }
    }

    // Resolved on every call so installing the binary while the bar runs
    // is picked up by the next tick.
    async fn locate(&self) -> Result<PathBuf, AdapterError> {
        self.resolver
            .resolve(&self.binary, &*self.runner)
            .await
            .ok_or_else(|| AdapterError::BinaryNotFound {
                name: self.binary.clone(),
            })
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, AdapterError> {
        let program = self.locate().await?;
        let output = self.runner.run(&program, args).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AdapterError::BinaryNotFound {
                    name: self.binary.clone(),
                }
            } else {
                AdapterError::ProcessError {
                    exit_code: None,
                    stderr: err.to_string(),
                }
            }
        })?;
        if !output.status.success() {
            return Err(AdapterError::process(output.status, &output.stderr));
        }
        Ok(output.stdout)
    }

    async fn query<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>, AdapterError> {
        let stdout = self.run(args).await?;
        parse_json_list(&stdout)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<WorkspaceDescriptor>, AdapterError> {
        self.query(LIST_ALL).await
    }

    pub async fn focused_workspace(&self) -> Result<Vec<WorkspaceDescriptor>, AdapterError> {
        self.query(LIST_FOCUSED).await
    }

    pub async fn focused_window(&self) -> Result<Vec<WindowDescriptor>, AdapterError> {
        self.query(FOCUSED_WINDOW).await
    }

    pub async fn switch_workspace(&self, id: &WorkspaceId) -> Result<(), AdapterError> {
        self.run(&["workspace", id.as_str()]).await.map(drop)
    }

    pub async fn focus_window(&self, window_id: &str) -> Result<(), AdapterError> {
        self.run(&["focus", "--window-id", window_id]).await.map(drop)
    }
}

/// Empty output is a parse failure, not an empty list: the binary always
/// prints `[]` when there is nothing to report.
fn parse_json_list<T: DeserializeOwned>(stdout: &[u8]) -> Result<Vec<T>, AdapterError> {
    let trimmed = String::from_utf8_lossy(stdout);
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return Err(AdapterError::parse(trimmed));
    }
    serde_json::from_str(trimmed).map_err(|err| {
        log::debug!("Malformed workspace binary output: {err}");
        AdapterError::parse(trimmed)
    })
}

macro_rules! query_adapter {
    ($name:ident, $label:literal, $method:ident, $out:ty) => {
        pub struct $name(pub Arc<AerospaceClient>);
        impl SourceAdapter for $name {
            type Output = $out;
            fn name(&self) -> &'static str {
                $label
            }
            fn fetch(&self) -> BoxFuture<'_, Result<$out, AdapterError>> {
                Box::pin(self.0.$method())
            }
        }
    };
}
query_adapter!(AllWorkspaces, "get-spaces", list_workspaces, Vec<WorkspaceDescriptor>);
query_adapter!(FocusedWorkspace, "get-active-space", focused_workspace, Vec<WorkspaceDescriptor>);
query_adapter!(FocusedWindow, "get-active-window", focused_window, Vec<WindowDescriptor>);
