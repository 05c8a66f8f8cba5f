//! Settings endpoint: pull snapshot plus push patches.

use super::ChannelPair;
use crate::error::ProtocolError;
use crate::procedure::Procedure;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const HOST: ChannelPair = ChannelPair::new("settingsRpc", "settingsRpc");
pub const RENDERER: ChannelPair = HOST.reversed();

/// UI color scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
    #[default]
    System,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Dark => write!(f, "dark"),
            Theme::Light => write!(f, "light"),
            Theme::System => write!(f, "system"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            "system" => Ok(Theme::System),
            other => Err(format!("unknown theme: {}", other)),
        }
    }
}

/// Full settings snapshot returned by `settings-get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub theme: Theme,
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            language: "en".to_string(),
        }
    }
}

impl Settings {
    /// Applies a patch. Absent fields are left unchanged.
    ///
    /// Returns `true` if anything changed.
    pub fn apply(&mut self, patch: &SettingsPatch) -> bool {
        let mut changed = false;
        if let Some(theme) = patch.theme {
            changed |= self.theme != theme;
            self.theme = theme;
        }
        if let Some(language) = &patch.language {
            changed |= &self.language != language;
            self.language = language.clone();
        }
        changed
    }
}

/// Partial settings update pushed on `settings-updated`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SettingsPatch {
    pub fn theme(theme: Theme) -> Self {
        Self {
            theme: Some(theme),
            language: None,
        }
    }

    pub fn language(language: impl Into<String>) -> Self {
        Self {
            theme: None,
            language: Some(language.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.theme.is_none() && self.language.is_none()
    }
}

/// Operations served by the host on the settings channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsCall {
    Get,
}

impl Procedure for SettingsCall {
    fn method(&self) -> &'static str {
        match self {
            SettingsCall::Get => "settings-get",
        }
    }

    fn into_args(self) -> Result<Vec<Value>, ProtocolError> {
        Ok(Vec::new())
    }

    fn from_call(method: &str, _args: Vec<Value>) -> Result<Self, ProtocolError> {
        match method {
            "settings-get" => Ok(SettingsCall::Get),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}
