//! Key dispatcher service.
//!
//! The seam between the capture layer and everything else. Owns the
//! navigator, consults the resolver for the active context's tree, and
//! performs the defensive capture health check before each dispatch.
//!
//! Only key-down events dispatch; key-up and flags-changed are dropped here
//! so the navigator sees one event per press.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capture::DualCapture;
use crate::commands::ExternalCommand;
use crate::config::Settings;
use crate::event::{KeyEventKind, Modifiers, RawKeyEvent};
use crate::executor::ActionRunner;
use crate::keymap;
use crate::navigation::{KeyOutcome, Navigator};
use crate::presentation::Presentation;
use crate::resolver::{ConfigResolver, ContextId, ResolvedConfig};
use crate::validator::Diagnostic;

/// Supplies the context to activate in, usually the frontmost application.
pub type ContextProvider = Box<dyn Fn() -> ContextId + Send + Sync>;

pub struct KeyDispatcher {
    resolver: Arc<ConfigResolver>,
    navigator: Mutex<Navigator>,
    capture: Mutex<Option<Arc<DualCapture>>>,
    context_provider: ContextProvider,
    force_physical_layout: bool,
}

impl KeyDispatcher {
    pub fn new(
        settings: &Settings,
        resolver: Arc<ConfigResolver>,
        presentation: Arc<dyn Presentation>,
        runner: Arc<dyn ActionRunner>,
        context_provider: ContextProvider,
    ) -> Arc<Self> {
        let navigator = Navigator::new(
            resolver.get_config(&ContextId::Global),
            settings,
            presentation,
            runner,
        );
        Arc::new(KeyDispatcher {
            resolver,
            navigator: Mutex::new(navigator),
            capture: Mutex::new(None),
            context_provider,
            force_physical_layout: settings.force_physical_layout,
        })
    }

    /// Wire the capture pair in once it is installed. Until then dispatch
    /// skips the health check (events can still arrive via stdin commands).
    pub fn attach_capture(&self, capture: Arc<DualCapture>) {
        *self.capture.lock() = Some(capture);
    }

    /// Open the overlay for the current context.
    pub fn activate(&self) {
        let context = (self.context_provider)();
        let config = self.resolver.get_config(&context);
        let mut navigator = self.navigator.lock();
        navigator.set_config(config);
        navigator.activate();
    }

    pub fn deactivate(&self) {
        self.navigator.lock().deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.navigator.lock().is_active()
    }

    /// Activation shortcut semantics: open when closed, close when open.
    pub fn toggle(&self) {
        if self.is_active() {
            self.deactivate();
        } else {
            self.activate();
        }
    }

    /// Entry point for raw events from the capture layer.
    pub fn handle_key_event(&self, raw: &RawKeyEvent) -> KeyOutcome {
        if raw.kind != KeyEventKind::Down {
            return KeyOutcome::Ignored;
        }
        if let Some(capture) = self.capture.lock().as_ref() {
            capture.check_and_failover();
        }

        let mut navigator = self.navigator.lock();
        if !navigator.is_active() {
            return KeyOutcome::Ignored;
        }
        match raw.keycode {
            keymap::KEY_ESCAPE => navigator.dismiss(),
            keymap::KEY_BACKSPACE => navigator.pop(),
            _ => match self.resolve_char(raw) {
                Some(key) => navigator.handle_key(key, raw.modifiers),
                None => KeyOutcome::Ignored,
            },
        }
    }

    /// Layout-resolved character, or the fixed physical table when the
    /// layout override is on.
    fn resolve_char(&self, raw: &RawKeyEvent) -> Option<char> {
        let shift = raw.modifiers.contains(Modifiers::SHIFT);
        if self.force_physical_layout {
            keymap::physical_char(raw.keycode, shift)
        } else {
            raw.character
                .or_else(|| keymap::physical_char(raw.keycode, shift))
        }
    }

    /// Open the overlay at the group named by a key path from the root.
    pub fn request_navigate(&self, target: &str) -> bool {
        let context = (self.context_provider)();
        let config = self.resolver.get_config(&context);
        let mut navigator = self.navigator.lock();
        navigator.set_config(config);
        let ok = navigator.navigate_to(target);
        if !ok {
            warn!(target, "Navigation target does not lead to a group");
            navigator.deactivate();
        }
        ok
    }

    /// Rebuild resolved state. An overlay open in a context that no longer
    /// exists falls back to the global default.
    pub fn reload(&self) {
        self.resolver.reload();
        let mut navigator = self.navigator.lock();
        let mut context = navigator.config().context.clone();
        if !self.resolver.context_exists(&context) {
            info!(context = %context, "Open context gone after reload, using global default");
            context = ContextId::Global;
        }
        navigator.set_config(self.resolver.get_config(&context));
    }

    pub fn validation_errors(&self) -> Vec<Diagnostic> {
        let context = self.navigator.lock().config().context.clone();
        self.resolver.diagnostics_for(&context)
    }

    pub fn get_config(&self, context: &ContextId) -> Arc<ResolvedConfig> {
        self.resolver.get_config(context)
    }

    /// Handle one external command from the stdin channel.
    pub fn handle_command(&self, command: ExternalCommand) {
        match command {
            ExternalCommand::Activate => self.activate(),
            ExternalCommand::Deactivate => self.deactivate(),
            ExternalCommand::Reload => self.reload(),
            ExternalCommand::Navigate { target } => {
                self.request_navigate(&target);
            }
            ExternalCommand::SimulateKey { key, modifiers } => {
                self.simulate_key(&key, &modifiers);
            }
            ExternalCommand::GetValidationErrors => {
                let diagnostics = self.validation_errors();
                if diagnostics.is_empty() {
                    info!("No validation errors");
                }
                for d in diagnostics {
                    info!(path = ?d.path, severity = ?d.severity, "{}", d.message);
                }
            }
        }
    }

    fn simulate_key(&self, key: &str, modifier_names: &[String]) {
        let mut modifiers = Modifiers::empty();
        for name in modifier_names {
            match Modifiers::parse_name(name) {
                Some(m) => modifiers |= m,
                None => warn!(modifier = %name, "Unknown modifier in simulateKey"),
            }
        }
        let (keycode, character) = match key {
            "escape" => (keymap::KEY_ESCAPE, None),
            "backspace" => (keymap::KEY_BACKSPACE, None),
            other => match other.chars().next() {
                Some(ch) if other.chars().count() == 1 => (0, Some(ch)),
                _ => {
                    warn!(key = other, "simulateKey expects a single character or a named key");
                    return;
                }
            },
        };
        let outcome = self.handle_key_event(&RawKeyEvent::down(keycode, character, modifiers));
        debug!(key, ?outcome, "Simulated key handled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TreeCacheConfig;
    use crate::executor::test_support::RecordingRunner;
    use crate::presentation::test_support::RecordingPresentation;
    use std::fs;
    use tempfile::TempDir;

    const DEFAULT_DOC: &str = r#"{"type":"group","actions":[
        {"key":"t","type":"application","value":"Terminal.app"},
        {"key":"o","type":"group","actions":[
            {"key":"s","type":"application","value":"Safari.app"},
            {"key":"e","type":"application","value":"Mail.app"}
        ]}
    ]}"#;

    struct Fixture {
        _dir: TempDir,
        dispatcher: Arc<KeyDispatcher>,
        runner: Arc<RecordingRunner>,
        presentation: Arc<RecordingPresentation>,
    }

    fn fixture() -> Fixture {
        fixture_with_settings(Settings::default())
    }

    fn fixture_with_settings(settings: Settings) -> Fixture {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("config.json"), DEFAULT_DOC).expect("write config");
        let presentation = RecordingPresentation::new();
        let runner = RecordingRunner::new();
        let resolver = Arc::new(ConfigResolver::new(
            dir.path().to_path_buf(),
            TreeCacheConfig::default(),
            Arc::clone(&presentation) as Arc<dyn Presentation>,
        ));
        let dispatcher = KeyDispatcher::new(
            &settings,
            resolver,
            Arc::clone(&presentation) as Arc<dyn Presentation>,
            Arc::clone(&runner) as Arc<dyn ActionRunner>,
            Box::new(|| ContextId::Global),
        );
        Fixture {
            _dir: dir,
            dispatcher,
            runner,
            presentation,
        }
    }

    fn key(ch: char) -> RawKeyEvent {
        RawKeyEvent::down(0, Some(ch), Modifiers::empty())
    }

    #[test]
    fn full_chain_dispatches_an_action() {
        let f = fixture();
        f.dispatcher.activate();

        assert_eq!(f.dispatcher.handle_key_event(&key('o')), KeyOutcome::Descended);
        assert_eq!(f.dispatcher.handle_key_event(&key('s')), KeyOutcome::Executed);
        assert_eq!(f.runner.values(), vec!["Safari.app"]);
        assert!(!f.dispatcher.is_active());
    }

    #[test]
    fn events_while_inactive_are_ignored() {
        let f = fixture();
        assert_eq!(f.dispatcher.handle_key_event(&key('t')), KeyOutcome::Ignored);
        assert!(f.runner.values().is_empty());
    }

    #[test]
    fn key_up_events_do_not_dispatch() {
        let f = fixture();
        f.dispatcher.activate();
        let up = RawKeyEvent {
            kind: KeyEventKind::Up,
            keycode: 0,
            character: Some('t'),
            modifiers: Modifiers::empty(),
        };
        assert_eq!(f.dispatcher.handle_key_event(&up), KeyOutcome::Ignored);
        assert!(f.dispatcher.is_active());
    }

    #[test]
    fn escape_keycode_dismisses() {
        let f = fixture();
        f.dispatcher.activate();
        let esc = RawKeyEvent::down(keymap::KEY_ESCAPE, None, Modifiers::empty());
        assert_eq!(f.dispatcher.handle_key_event(&esc), KeyOutcome::Dismissed);
        assert!(!f.dispatcher.is_active());
    }

    #[test]
    fn backspace_keycode_pops() {
        let f = fixture();
        f.dispatcher.activate();
        f.dispatcher.handle_key_event(&key('o'));
        let backspace = RawKeyEvent::down(keymap::KEY_BACKSPACE, None, Modifiers::empty());
        assert_eq!(f.dispatcher.handle_key_event(&backspace), KeyOutcome::Popped);
        assert!(f.dispatcher.is_active());
    }

    #[test]
    fn toggle_flips_activation() {
        let f = fixture();
        f.dispatcher.toggle();
        assert!(f.dispatcher.is_active());
        f.dispatcher.toggle();
        assert!(!f.dispatcher.is_active());
    }

    #[test]
    fn physical_layout_override_ignores_reported_character() {
        let settings = Settings {
            force_physical_layout: true,
            ..Settings::default()
        };
        let f = fixture_with_settings(settings);
        f.dispatcher.activate();

        // Keycode 0x1F is physical 'o' regardless of what the layout said.
        let event = RawKeyEvent::down(0x1F, Some('ö'), Modifiers::empty());
        assert_eq!(f.dispatcher.handle_key_event(&event), KeyOutcome::Descended);
    }

    #[test]
    fn navigate_command_opens_overlay_at_target() {
        let f = fixture();
        f.dispatcher.handle_command(ExternalCommand::Navigate {
            target: "o".to_string(),
        });
        assert!(f.dispatcher.is_active());
        assert_eq!(f.dispatcher.handle_key_event(&key('e')), KeyOutcome::Executed);
        assert_eq!(f.runner.values(), vec!["Mail.app"]);
    }

    #[test]
    fn failed_navigate_leaves_overlay_closed() {
        let f = fixture();
        assert!(!f.dispatcher.request_navigate("zz"));
        assert!(!f.dispatcher.is_active());
    }

    #[test]
    fn simulate_key_commands_drive_navigation() {
        let f = fixture();
        f.dispatcher.handle_command(ExternalCommand::Activate);
        f.dispatcher.handle_command(ExternalCommand::SimulateKey {
            key: "o".to_string(),
            modifiers: vec![],
        });
        f.dispatcher.handle_command(ExternalCommand::SimulateKey {
            key: "escape".to_string(),
            modifiers: vec![],
        });
        assert!(!f.dispatcher.is_active());
    }

    #[test]
    fn reload_rebuilds_and_keeps_overlay_usable() {
        let f = fixture();
        f.dispatcher.activate();
        f.dispatcher.reload();
        assert!(f.dispatcher.is_active());
        f.dispatcher.handle_key_event(&key('t'));
        assert_eq!(f.runner.values(), vec!["Terminal.app"]);
    }

    #[test]
    fn unknown_key_feedback_flows_to_presentation() {
        let f = fixture();
        f.dispatcher.activate();
        f.presentation.take();
        f.dispatcher.handle_key_event(&key('z'));
        assert_eq!(f.presentation.take(), vec!["not_found:z".to_string()]);
    }
}
