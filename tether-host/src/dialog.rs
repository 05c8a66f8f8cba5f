//! File dialog endpoint.

use crate::error::{remote, HostError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tether_protocol::endpoint::file_dialog::{DialogSelection, FileDialogCall, OpenDialogOptions};
use tether_protocol::RemoteError;
use tether_rpc::{reply, Service};

/// One open-dialog request as handed to the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogRequest {
    pub options: OpenDialogOptions,
    /// Directory the dialog starts in.
    pub default_path: Option<PathBuf>,
}

/// The platform's file picker.
#[async_trait]
pub trait NativeDialog: Send + Sync + 'static {
    /// Shows an open dialog. An empty list means the user cancelled.
    async fn show_open_dialog(&self, request: DialogRequest) -> Result<Vec<String>, HostError>;
}

/// Dialog that answers every request from a fixed selection.
///
/// Paths not matching the request's filters are left out, as a native picker
/// would never offer them.
#[derive(Default)]
pub struct PresetDialog {
    selection: Vec<String>,
    last_request: Mutex<Option<DialogRequest>>,
}

impl PresetDialog {
    pub fn new(selection: Vec<String>) -> Self {
        Self {
            selection,
            last_request: Mutex::new(None),
        }
    }

    /// A dialog the user always cancels.
    pub fn cancelled() -> Self {
        Self::default()
    }

    /// The most recent request shown.
    pub fn last_request(&self) -> Option<DialogRequest> {
        self.last_request.lock().clone()
    }
}

fn matches_filters(path: &str, options: &OpenDialogOptions) -> bool {
    let Some(filters) = &options.filters else {
        return true;
    };
    if filters.is_empty() {
        return true;
    }
    let extension = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    filters.iter().flat_map(|f| f.extensions.iter()).any(|allowed| {
        allowed == "*" || extension.as_deref() == Some(allowed.to_ascii_lowercase().as_str())
    })
}

#[async_trait]
impl NativeDialog for PresetDialog {
    async fn show_open_dialog(&self, request: DialogRequest) -> Result<Vec<String>, HostError> {
        let paths = self
            .selection
            .iter()
            .filter(|path| matches_filters(path, &request.options))
            .cloned()
            .collect();
        *self.last_request.lock() = Some(request);
        Ok(paths)
    }
}

/// Serves `showOpenDialog`.
#[derive(Clone)]
pub struct FileDialogService {
    dialog: Arc<dyn NativeDialog>,
    models_dir: Option<PathBuf>,
}

impl FileDialogService {
    pub fn new(dialog: Arc<dyn NativeDialog>, models_dir: Option<PathBuf>) -> Self {
        Self { dialog, models_dir }
    }

    /// Shows the dialog. `None` when the user picked nothing.
    pub async fn open(&self, options: OpenDialogOptions) -> Result<Option<DialogSelection>, HostError> {
        let default_path = self.models_dir.clone().filter(|dir| dir.is_dir());
        let multiple = options.is_multiple();
        let paths = self
            .dialog
            .show_open_dialog(DialogRequest {
                options,
                default_path,
            })
            .await?;
        tracing::debug!("open dialog returned {} paths", paths.len());
        Ok(DialogSelection::from_paths(paths, multiple))
    }
}

#[async_trait]
impl Service for FileDialogService {
    type Call = FileDialogCall;

    async fn handle(&self, call: FileDialogCall) -> Result<Value, RemoteError> {
        match call {
            FileDialogCall::ShowOpenDialog(options) => {
                let selection = self.open(options).await.map_err(remote)?;
                reply(&selection)
            }
        }
    }
}
