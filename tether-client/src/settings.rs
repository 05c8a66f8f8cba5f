//! Renderer side of settings sync.
//!
//! The renderer holds no authoritative copy. It pulls one snapshot with
//! `settings-get`, then applies `settings-updated` patches in arrival order.
//! Patches received before the snapshot are buffered and applied after it.

use crate::client::Client;
use crate::error::ClientError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tether_protocol::endpoint::settings::{Settings, SettingsPatch, Theme};
use tether_protocol::endpoint::SETTINGS_UPDATED;
use tether_protocol::Codec;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Languages written right to left.
pub const RTL_LANGUAGES: [&str; 5] = ["ar", "fa", "he", "ps", "ur"];

/// Text direction of a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Direction {
    /// Direction of a language tag such as `ar`, `ar-EG` or `zh_CN`.
    pub fn for_language(language: &str) -> Self {
        let primary = language.split(['-', '_']).next().unwrap_or_default();
        if RTL_LANGUAGES.iter().any(|rtl| rtl.eq_ignore_ascii_case(primary)) {
            Direction::Rtl
        } else {
            Direction::Ltr
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ltr => "ltr",
            Direction::Rtl => "rtl",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The renderer's localization and theming.
pub trait LocaleSink: Send + Sync + 'static {
    fn language_changed(&self, language: &str, direction: Direction);

    fn theme_changed(&self, _theme: Theme) {}
}

/// A sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocale;

impl LocaleSink for NoLocale {
    fn language_changed(&self, _language: &str, _direction: Direction) {}
}

/// Best-effort settings copy.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsState {
    /// No snapshot yet. Patches wait here in arrival order.
    Uninitialized { pending: Vec<SettingsPatch> },
    Initialized(Settings),
}

impl Default for SettingsState {
    fn default() -> Self {
        SettingsState::Uninitialized { pending: Vec::new() }
    }
}

impl SettingsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self, SettingsState::Initialized(_))
    }

    pub fn settings(&self) -> Option<&Settings> {
        match self {
            SettingsState::Initialized(settings) => Some(settings),
            SettingsState::Uninitialized { .. } => None,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.settings().map(|s| Direction::for_language(&s.language))
    }

    /// Installs a snapshot and applies any buffered patches on top of it.
    pub fn initialize(&mut self, snapshot: Settings) -> &Settings {
        let pending = match std::mem::replace(self, SettingsState::Initialized(snapshot)) {
            SettingsState::Uninitialized { pending } => pending,
            SettingsState::Initialized(_) => Vec::new(),
        };
        if !pending.is_empty() {
            tracing::debug!("applying {} buffered settings patches", pending.len());
        }
        match self {
            SettingsState::Initialized(settings) => {
                for patch in &pending {
                    settings.apply(patch);
                }
                settings
            }
            SettingsState::Uninitialized { .. } => unreachable!("state was just initialized"),
        }
    }

    /// Applies a patch. Returns the fields that changed, or `None` when the
    /// patch was buffered or changed nothing.
    pub fn apply(&mut self, patch: &SettingsPatch) -> Option<SettingsPatch> {
        match self {
            SettingsState::Uninitialized { pending } => {
                pending.push(patch.clone());
                None
            }
            SettingsState::Initialized(settings) => {
                let changed = SettingsPatch {
                    theme: patch.theme.filter(|theme| *theme != settings.theme),
                    language: patch
                        .language
                        .clone()
                        .filter(|language| *language != settings.language),
                };
                settings.apply(patch);
                (!changed.is_empty()).then_some(changed)
            }
        }
    }
}

struct SyncShared {
    state: Mutex<SettingsState>,
    sink: Arc<dyn LocaleSink>,
    changes: watch::Sender<Option<Settings>>,
}

impl SyncShared {
    fn receive(&self, patch: &SettingsPatch) {
        let (changed, current) = {
            let mut state = self.state.lock();
            let changed = state.apply(patch);
            (changed, state.settings().cloned())
        };
        match changed {
            Some(changed) => {
                self.notify(&changed);
                self.changes.send_replace(current);
            }
            None => tracing::trace!("settings patch buffered or unchanged"),
        }
    }

    fn notify(&self, changed: &SettingsPatch) {
        if let Some(theme) = changed.theme {
            self.sink.theme_changed(theme);
        }
        if let Some(language) = &changed.language {
            self.sink
                .language_changed(language, Direction::for_language(language));
        }
    }
}

/// Keeps a renderer's settings in step with the host.
///
/// Dropping it stops listening for pushes.
pub struct SettingsSync {
    shared: Arc<SyncShared>,
    listener: JoinHandle<()>,
}

impl SettingsSync {
    /// Subscribes to `settings-updated`, pulls the snapshot and initializes.
    pub async fn start(client: &Client, sink: Arc<dyn LocaleSink>) -> Result<Self, ClientError> {
        let mut pushes = client.transport().on(SETTINGS_UPDATED)?;
        let shared = Arc::new(SyncShared {
            state: Mutex::new(SettingsState::new()),
            sink,
            changes: watch::channel(None).0,
        });

        let listener = tokio::spawn({
            let shared = shared.clone();
            async move {
                while let Some(inbound) = pushes.recv().await {
                    match Codec::decode_push::<SettingsPatch>(&inbound.payload) {
                        Ok(patch) => shared.receive(&patch),
                        Err(e) => tracing::warn!("dropping malformed settings push: {}", e),
                    }
                }
                tracing::debug!("settings push channel ended");
            }
        });
        let sync = Self { shared, listener };

        let snapshot = client.get_settings().await?;
        let initial = sync.shared.state.lock().initialize(snapshot).clone();
        tracing::info!(
            "Settings initialized: theme={} language={}",
            initial.theme,
            initial.language
        );
        sync.shared.sink.theme_changed(initial.theme);
        sync.shared
            .sink
            .language_changed(&initial.language, Direction::for_language(&initial.language));
        sync.shared.changes.send_replace(Some(initial));

        Ok(sync)
    }

    /// Current settings, once initialized.
    pub fn settings(&self) -> Option<Settings> {
        self.shared.state.lock().settings().cloned()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.shared.state.lock().direction()
    }

    /// Observes the settings after every change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Settings>> {
        self.shared.changes.subscribe()
    }

    /// Applies a change made locally in the renderer.
    pub fn apply_local(&self, patch: &SettingsPatch) {
        self.shared.receive(patch);
    }
}

impl Drop for SettingsSync {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        languages: Mutex<Vec<(String, Direction)>>,
        themes: Mutex<Vec<Theme>>,
    }

    impl LocaleSink for RecordingSink {
        fn language_changed(&self, language: &str, direction: Direction) {
            self.languages.lock().push((language.to_string(), direction));
        }

        fn theme_changed(&self, theme: Theme) {
            self.themes.lock().push(theme);
        }
    }

    fn settings(theme: Theme, language: &str) -> Settings {
        Settings {
            theme,
            language: language.into(),
        }
    }

    #[test]
    fn test_direction() {
        assert_eq!(Direction::for_language("ar"), Direction::Rtl);
        assert_eq!(Direction::for_language("he-IL"), Direction::Rtl);
        assert_eq!(Direction::for_language("UR"), Direction::Rtl);
        assert_eq!(Direction::for_language("fr"), Direction::Ltr);
        assert_eq!(Direction::for_language("zh_CN"), Direction::Ltr);
        assert_eq!(Direction::Rtl.to_string(), "rtl");
    }

    #[test]
    fn test_language_patch_leaves_theme() {
        let mut state = SettingsState::new();
        state.initialize(settings(Theme::Dark, "en"));

        let changed = state.apply(&SettingsPatch::language("fr"));
        assert_eq!(changed, Some(SettingsPatch::language("fr")));
        assert_eq!(state.settings(), Some(&settings(Theme::Dark, "fr")));
    }

    #[test]
    fn test_theme_patch_leaves_language() {
        let mut state = SettingsState::new();
        state.initialize(settings(Theme::Light, "ar"));

        state.apply(&SettingsPatch::theme(Theme::Dark));
        assert_eq!(state.settings(), Some(&settings(Theme::Dark, "ar")));
        assert_eq!(state.direction(), Some(Direction::Rtl));
    }

    #[test]
    fn test_unchanged_patch_reports_nothing() {
        let mut state = SettingsState::new();
        state.initialize(settings(Theme::Dark, "en"));
        assert_eq!(state.apply(&SettingsPatch::theme(Theme::Dark)), None);
        assert_eq!(state.apply(&SettingsPatch::default()), None);
    }

    #[test]
    fn test_patches_before_snapshot_are_buffered() {
        let mut state = SettingsState::new();
        assert!(!state.is_initialized());
        assert_eq!(state.apply(&SettingsPatch::language("fr")), None);
        assert_eq!(state.apply(&SettingsPatch::theme(Theme::Light)), None);
        assert_eq!(state.apply(&SettingsPatch::language("ar")), None);
        assert_eq!(state.direction(), None);

        let current = state.initialize(settings(Theme::System, "en")).clone();
        assert_eq!(current, settings(Theme::Light, "ar"));
        assert!(state.is_initialized());
    }

    #[test]
    fn test_reinitialize_replaces_snapshot() {
        let mut state = SettingsState::new();
        state.initialize(settings(Theme::Dark, "en"));
        state.initialize(settings(Theme::Light, "fr"));
        assert_eq!(state.settings(), Some(&settings(Theme::Light, "fr")));
    }

    #[test]
    fn test_sink_sees_only_changes() {
        let sink = Arc::new(RecordingSink::default());
        let shared = SyncShared {
            state: Mutex::new(SettingsState::Initialized(settings(Theme::Dark, "en"))),
            sink: sink.clone(),
            changes: watch::channel(None).0,
        };

        shared.receive(&SettingsPatch::theme(Theme::Dark));
        shared.receive(&SettingsPatch::language("he"));
        shared.receive(&SettingsPatch::theme(Theme::Light));

        assert_eq!(*sink.languages.lock(), vec![("he".to_string(), Direction::Rtl)]);
        assert_eq!(*sink.themes.lock(), vec![Theme::Light]);
    }

    #[tokio::test]
    async fn test_sync_follows_host() {
        use std::time::Duration;
        use tether_host::{
            DatabaseService, EchoEngine, FileDialogService, Host, LlmService, PresetDialog, SettingsHub,
        };
        use tether_rpc::{MemoryHub, RpcConfig};
        use tether_store::Store;

        let dialog = FileDialogService::new(Arc::new(PresetDialog::cancelled()), None);
        let llm = LlmService::new(Arc::new(EchoEngine::new()), dialog.clone(), None);
        let host = Host::new(
            Arc::new(SettingsHub::new(settings(Theme::Dark, "en"))),
            dialog,
            llm,
            DatabaseService::new(Store::in_memory()),
            RpcConfig::host(),
        );

        let hub = MemoryHub::new();
        let window = hub.open_window();
        let client = Client::new(Arc::new(window.clone())).unwrap();
        let _session = host
            .attach_window(Arc::new(hub.host_port(window.id())), window.id())
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let sync = SettingsSync::start(&client, sink.clone()).await.unwrap();
        assert_eq!(sync.settings(), Some(settings(Theme::Dark, "en")));
        assert_eq!(sync.direction(), Some(Direction::Ltr));

        let mut changes = sync.subscribe();
        host.settings().set_language("ar-EG").unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            changes.wait_for(|s| s.as_ref().map(|s| s.language.as_str()) == Some("ar")),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(sync.settings(), Some(settings(Theme::Dark, "ar")));
        assert_eq!(sync.direction(), Some(Direction::Rtl));
        assert_eq!(
            sink.languages.lock().last(),
            Some(&("ar".to_string(), Direction::Rtl))
        );
        assert_eq!(*sink.themes.lock(), vec![Theme::Dark]);
    }
}
