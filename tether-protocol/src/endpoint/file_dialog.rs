//! File dialog endpoint.

use super::ChannelPair;
use crate::error::ProtocolError;
use crate::procedure::{arg, Args, Procedure};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HOST: ChannelPair = ChannelPair::new("fileDialogRpc", "fileDialogRpc");
pub const RENDERER: ChannelPair = HOST.reversed();

/// A named group of file extensions offered by the dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Options accepted by `showOpenDialog`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDialogOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FileFilter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple: Option<bool>,
}

impl OpenDialogOptions {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: FileFilter) -> Self {
        self.filters.get_or_insert_with(Vec::new).push(filter);
        self
    }

    pub fn allow_multiple(mut self) -> Self {
        self.multiple = Some(true);
        self
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple.unwrap_or(false)
    }
}

/// Paths picked in the dialog: one path, or all of them when `multiple` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DialogSelection {
    One(String),
    Many(Vec<String>),
}

impl DialogSelection {
    /// Builds the reply for a dialog that returned `paths`.
    ///
    /// Returns `None` when nothing was picked.
    pub fn from_paths(mut paths: Vec<String>, multiple: bool) -> Option<Self> {
        if paths.is_empty() {
            return None;
        }
        if multiple {
            Some(DialogSelection::Many(paths))
        } else {
            Some(DialogSelection::One(paths.swap_remove(0)))
        }
    }

    /// Returns the first picked path.
    pub fn first(&self) -> Option<&str> {
        match self {
            DialogSelection::One(path) => Some(path),
            DialogSelection::Many(paths) => paths.first().map(String::as_str),
        }
    }

    pub fn into_paths(self) -> Vec<String> {
        match self {
            DialogSelection::One(path) => vec![path],
            DialogSelection::Many(paths) => paths,
        }
    }
}

/// Operations served by the host on the file dialog channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDialogCall {
    ShowOpenDialog(OpenDialogOptions),
}

impl Procedure for FileDialogCall {
    fn method(&self) -> &'static str {
        match self {
            FileDialogCall::ShowOpenDialog(_) => "showOpenDialog",
        }
    }

    fn into_args(self) -> Result<Vec<Value>, ProtocolError> {
        match self {
            FileDialogCall::ShowOpenDialog(options) => Ok(vec![arg(&options)?]),
        }
    }

    fn from_call(method: &str, args: Vec<Value>) -> Result<Self, ProtocolError> {
        let mut args = Args::new(method, args);
        match method {
            "showOpenDialog" => Ok(FileDialogCall::ShowOpenDialog(args.next_or_default()?)),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}
