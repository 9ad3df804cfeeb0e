//! Navigation state machine.
//!
//! Consumes resolved key characters while the overlay is active, walks the
//! current tree, and hands off execution. States: `Idle` (overlay hidden),
//! `Displaying` (walking a group), `Sticky` (inside a sticky-mode group,
//! where executing an action keeps the overlay open).
//!
//! Modifier roles come from settings: the sticky modifier keeps the overlay
//! open across a single execution per the configured policy, the
//! run-as-sequence modifier turns a group key into "run everything inside".

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Settings, StickyPolicy};
use crate::event::Modifiers;
use crate::executor::ActionRunner;
use crate::logging;
use crate::presentation::Presentation;
use crate::resolver::ResolvedConfig;
use crate::tree::{Group, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Displaying,
    Sticky,
}

/// What a single key press did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Overlay not active; the key was not for us.
    Ignored,
    NotFound,
    Descended,
    Executed,
    /// A group was expanded and every action inside it ran.
    SequenceExecuted,
    Popped,
    Dismissed,
}

pub struct Navigator {
    config: Arc<ResolvedConfig>,
    state: NavState,
    /// Index path from the root to the group currently shown.
    path: Vec<usize>,
    presentation: Arc<dyn Presentation>,
    runner: Arc<dyn ActionRunner>,
    sticky_policy: StickyPolicy,
    sticky_modifier: Modifiers,
    sequence_modifier: Modifiers,
}

impl Navigator {
    pub fn new(
        config: Arc<ResolvedConfig>,
        settings: &Settings,
        presentation: Arc<dyn Presentation>,
        runner: Arc<dyn ActionRunner>,
    ) -> Self {
        Navigator {
            config,
            state: NavState::Idle,
            path: Vec::new(),
            presentation,
            runner,
            sticky_policy: settings.sticky_policy,
            sticky_modifier: settings.sticky_modifier_flags(),
            sequence_modifier: settings.sequence_modifier_flags(),
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn current_path(&self) -> &[usize] {
        &self.path
    }

    pub fn config(&self) -> &Arc<ResolvedConfig> {
        &self.config
    }

    /// Swap in a newly resolved tree. Any in-flight chain is abandoned; index
    /// paths from the old tree must not be walked against the new one.
    pub fn set_config(&mut self, config: Arc<ResolvedConfig>) {
        let was_active = self.state != NavState::Idle;
        self.config = config;
        self.path.clear();
        if was_active {
            self.enter_current_group();
        }
    }

    /// Open the overlay at the root.
    pub fn activate(&mut self) {
        self.path.clear();
        self.enter_current_group();
        info!(context = %self.config.context, "Navigation activated");
    }

    /// Close the overlay and clear all state.
    pub fn deactivate(&mut self) {
        if self.state != NavState::Idle {
            self.presentation.hide();
        }
        self.state = NavState::Idle;
        self.path.clear();
    }

    pub fn is_active(&self) -> bool {
        self.state != NavState::Idle
    }

    /// One level up; at the root the overlay closes.
    pub fn pop(&mut self) -> KeyOutcome {
        if self.state == NavState::Idle {
            return KeyOutcome::Ignored;
        }
        if self.path.pop().is_none() {
            self.deactivate();
            return KeyOutcome::Dismissed;
        }
        self.enter_current_group();
        KeyOutcome::Popped
    }

    /// Escape: force `Idle` unconditionally.
    pub fn dismiss(&mut self) -> KeyOutcome {
        if self.state == NavState::Idle {
            return KeyOutcome::Ignored;
        }
        self.deactivate();
        KeyOutcome::Dismissed
    }

    /// Dispatch one resolved key character against the current group.
    pub fn handle_key(&mut self, key: char, modifiers: Modifiers) -> KeyOutcome {
        if self.state == NavState::Idle {
            return KeyOutcome::Ignored;
        }
        let Some(group) = self.config.tree.group_at(&self.path) else {
            // Tree swapped under a stale path; recover by closing.
            self.deactivate();
            return KeyOutcome::Dismissed;
        };

        let Some(child_idx) = self.config.key_index.lookup(group.id, key) else {
            debug!(key = %key, "No entry for key");
            logging::log_key_event(key, "not_found");
            self.presentation.not_found(key);
            return KeyOutcome::NotFound;
        };

        match &group.actions[child_idx] {
            Node::Action(action) => {
                let action = action.clone();
                logging::log_key_event(key, "execute");
                self.runner.execute(&action);
                self.after_execution(modifiers.contains(self.sticky_modifier));
                KeyOutcome::Executed
            }
            Node::Group(child) => {
                if modifiers.contains(self.sequence_modifier) {
                    logging::log_key_event(key, "sequence");
                    let count = run_sequence(self.runner.as_ref(), child);
                    info!(key = %key, actions = count, "Group executed as sequence");
                    // The sequence runs once; sticky only governs the overlay.
                    self.after_execution(modifiers.contains(self.sticky_modifier));
                    KeyOutcome::SequenceExecuted
                } else {
                    logging::log_key_event(key, "descend");
                    self.path.push(child_idx);
                    self.enter_current_group();
                    KeyOutcome::Descended
                }
            }
        }
    }

    /// Navigate to a group by key path from the root, opening the overlay
    /// there. Each character selects one level. Fails without changing state
    /// when the path does not lead to a group.
    pub fn navigate_to(&mut self, keys: &str) -> bool {
        let mut path = Vec::new();
        let mut group_id = self.config.tree.root.id;
        for key in keys.chars() {
            let Some(idx) = self.config.key_index.lookup(group_id, key) else {
                return false;
            };
            path.push(idx);
            match self.config.tree.group_at(&path) {
                Some(group) => group_id = group.id,
                None => return false,
            }
        }
        self.path = path;
        self.enter_current_group();
        true
    }

    fn after_execution(&mut self, sticky_held: bool) {
        let keep_open = sticky_held || self.state == NavState::Sticky;
        if !keep_open {
            self.deactivate();
            return;
        }
        match self.sticky_policy {
            StickyPolicy::Hide => self.deactivate(),
            StickyPolicy::ResetToRoot => {
                self.path.clear();
                self.enter_current_group();
            }
            StickyPolicy::DoNothing => {}
        }
    }

    /// Show the group at `self.path` and set the matching state.
    fn enter_current_group(&mut self) {
        let (label, sticky) = match self.config.tree.group_at(&self.path) {
            Some(group) => (group.label.clone(), self.config.key_index.sticky(group.id)),
            None => (None, false),
        };
        self.state = if sticky {
            NavState::Sticky
        } else {
            NavState::Displaying
        };
        self.presentation.show(label.as_deref());
    }
}

/// Execute every action in the group and its subgroups, document order.
fn run_sequence(runner: &dyn ActionRunner, group: &Group) -> usize {
    let mut count = 0;
    for child in &group.actions {
        match child {
            Node::Action(action) => {
                runner.execute(action);
                count += 1;
            }
            Node::Group(sub) => count += run_sequence(runner, sub),
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::KeyLookupCache;
    use crate::executor::test_support::RecordingRunner;
    use crate::presentation::test_support::RecordingPresentation;
    use crate::resolver::ContextId;
    use crate::tree::test_support::{app, group};
    use crate::tree::ActionTree;

    fn resolved(tree: ActionTree) -> Arc<ResolvedConfig> {
        let tree = Arc::new(tree);
        Arc::new(ResolvedConfig {
            context: ContextId::Global,
            key_index: KeyLookupCache::build(&tree),
            tree,
            display_name: None,
        })
    }

    fn sample_config() -> Arc<ResolvedConfig> {
        resolved(ActionTree::new(Group::new(
            None,
            vec![
                app("t", "Terminal.app"),
                group("o", vec![app("s", "Safari.app"), app("e", "Mail.app")]),
            ],
        )))
    }

    struct Fixture {
        navigator: Navigator,
        presentation: Arc<RecordingPresentation>,
        runner: Arc<RecordingRunner>,
    }

    fn fixture_with(config: Arc<ResolvedConfig>, settings: Settings) -> Fixture {
        let presentation = RecordingPresentation::new();
        let runner = RecordingRunner::new();
        let navigator = Navigator::new(
            config,
            &settings,
            Arc::clone(&presentation) as Arc<dyn Presentation>,
            Arc::clone(&runner) as Arc<dyn ActionRunner>,
        );
        Fixture {
            navigator,
            presentation,
            runner,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(sample_config(), Settings::default())
    }

    #[test]
    fn group_key_descends_and_keeps_overlay_open() {
        let mut f = fixture();
        f.navigator.activate();
        assert_eq!(f.navigator.state(), NavState::Displaying);

        let outcome = f.navigator.handle_key('o', Modifiers::empty());
        assert_eq!(outcome, KeyOutcome::Descended);
        assert_eq!(f.navigator.state(), NavState::Displaying);
        assert_eq!(f.navigator.current_path(), &[1]);
        assert!(f.runner.values().is_empty());
    }

    #[test]
    fn action_key_executes_and_clears_state() {
        let mut f = fixture();
        f.navigator.activate();
        f.navigator.handle_key('o', Modifiers::empty());

        let outcome = f.navigator.handle_key('s', Modifiers::empty());
        assert_eq!(outcome, KeyOutcome::Executed);
        assert_eq!(f.runner.values(), vec!["Safari.app"]);
        assert_eq!(f.navigator.state(), NavState::Idle);
        assert_eq!(f.presentation.take().last().map(String::as_str), Some("hide"));
    }

    #[test]
    fn unknown_key_reports_not_found_and_leaves_state_unchanged() {
        let mut f = fixture();
        f.navigator.activate();
        f.navigator.handle_key('o', Modifiers::empty());
        f.presentation.take();

        let outcome = f.navigator.handle_key('x', Modifiers::empty());
        assert_eq!(outcome, KeyOutcome::NotFound);
        assert_eq!(f.navigator.state(), NavState::Displaying);
        assert_eq!(f.navigator.current_path(), &[1]);
        assert_eq!(f.presentation.take(), vec!["not_found:x".to_string()]);
    }

    #[test]
    fn keys_are_ignored_while_idle() {
        let mut f = fixture();
        assert_eq!(
            f.navigator.handle_key('t', Modifiers::empty()),
            KeyOutcome::Ignored
        );
        assert!(f.runner.values().is_empty());
    }

    #[test]
    fn backspace_pops_one_level_then_dismisses() {
        let mut f = fixture();
        f.navigator.activate();
        f.navigator.handle_key('o', Modifiers::empty());

        assert_eq!(f.navigator.pop(), KeyOutcome::Popped);
        assert_eq!(f.navigator.current_path(), &[] as &[usize]);
        assert_eq!(f.navigator.state(), NavState::Displaying);

        assert_eq!(f.navigator.pop(), KeyOutcome::Dismissed);
        assert_eq!(f.navigator.state(), NavState::Idle);
    }

    #[test]
    fn escape_forces_idle_from_any_depth() {
        let mut f = fixture();
        f.navigator.activate();
        f.navigator.handle_key('o', Modifiers::empty());

        assert_eq!(f.navigator.dismiss(), KeyOutcome::Dismissed);
        assert_eq!(f.navigator.state(), NavState::Idle);
        assert_eq!(f.navigator.current_path(), &[] as &[usize]);
    }

    #[test]
    fn sticky_modifier_keeps_overlay_open_per_policy() {
        let settings = Settings {
            sticky_policy: StickyPolicy::DoNothing,
            ..Settings::default()
        };
        let mut f = fixture_with(sample_config(), settings);
        f.navigator.activate();
        f.navigator.handle_key('o', Modifiers::empty());

        f.navigator.handle_key('s', Modifiers::SHIFT);
        assert_eq!(f.runner.values(), vec!["Safari.app"]);
        // DoNothing leaves us inside the group for the next pick.
        assert_eq!(f.navigator.state(), NavState::Displaying);
        assert_eq!(f.navigator.current_path(), &[1]);
    }

    #[test]
    fn sticky_modifier_with_reset_policy_returns_to_root() {
        let settings = Settings {
            sticky_policy: StickyPolicy::ResetToRoot,
            ..Settings::default()
        };
        let mut f = fixture_with(sample_config(), settings);
        f.navigator.activate();
        f.navigator.handle_key('o', Modifiers::empty());

        f.navigator.handle_key('e', Modifiers::SHIFT);
        assert_eq!(f.runner.values(), vec!["Mail.app"]);
        assert_eq!(f.navigator.state(), NavState::Displaying);
        assert_eq!(f.navigator.current_path(), &[] as &[usize]);
    }

    #[test]
    fn sticky_modifier_with_hide_policy_still_closes() {
        let mut f = fixture();
        f.navigator.activate();
        f.navigator.handle_key('t', Modifiers::SHIFT);
        assert_eq!(f.navigator.state(), NavState::Idle);
    }

    #[test]
    fn sticky_group_keeps_overlay_open_without_modifier() {
        let mut sticky_group = Group::new(Some("o"), vec![app("s", "Safari.app")]);
        sticky_group.sticky_mode = Some(true);
        let config = resolved(ActionTree::new(Group::new(
            None,
            vec![Node::Group(sticky_group)],
        )));
        let settings = Settings {
            sticky_policy: StickyPolicy::DoNothing,
            ..Settings::default()
        };
        let mut f = fixture_with(config, settings);
        f.navigator.activate();

        f.navigator.handle_key('o', Modifiers::empty());
        assert_eq!(f.navigator.state(), NavState::Sticky);

        f.navigator.handle_key('s', Modifiers::empty());
        assert_eq!(f.runner.values(), vec!["Safari.app"]);
        assert_eq!(f.navigator.state(), NavState::Sticky);
    }

    #[test]
    fn sequence_modifier_runs_whole_group_in_document_order() {
        let config = resolved(ActionTree::new(Group::new(
            None,
            vec![group(
                "o",
                vec![
                    app("s", "Safari.app"),
                    group("m", vec![app("e", "Mail.app")]),
                    app("t", "Terminal.app"),
                ],
            )],
        )));
        let mut f = fixture_with(config, Settings::default());
        f.navigator.activate();

        let outcome = f.navigator.handle_key('o', Modifiers::CONTROL);
        assert_eq!(outcome, KeyOutcome::SequenceExecuted);
        assert_eq!(
            f.runner.values(),
            vec!["Safari.app", "Mail.app", "Terminal.app"]
        );
        assert_eq!(f.navigator.state(), NavState::Idle);
    }

    #[test]
    fn sticky_with_sequence_runs_once_then_applies_policy() {
        let config = resolved(ActionTree::new(Group::new(
            None,
            vec![group(
                "o",
                vec![app("s", "Safari.app"), app("e", "Mail.app")],
            )],
        )));
        let settings = Settings {
            sticky_policy: StickyPolicy::DoNothing,
            ..Settings::default()
        };
        let mut f = fixture_with(config, settings);
        f.navigator.activate();

        let outcome = f
            .navigator
            .handle_key('o', Modifiers::CONTROL | Modifiers::SHIFT);
        assert_eq!(outcome, KeyOutcome::SequenceExecuted);
        // Every action ran exactly once.
        assert_eq!(f.runner.values(), vec!["Safari.app", "Mail.app"]);
        // DoNothing keeps the overlay open where it was.
        assert_eq!(f.navigator.state(), NavState::Displaying);
        assert_eq!(f.navigator.current_path(), &[] as &[usize]);
    }

    #[test]
    fn sticky_with_sequence_and_hide_policy_closes() {
        let mut f = fixture();
        f.navigator.activate();

        let outcome = f
            .navigator
            .handle_key('o', Modifiers::CONTROL | Modifiers::SHIFT);
        assert_eq!(outcome, KeyOutcome::SequenceExecuted);
        assert_eq!(f.runner.values(), vec!["Safari.app", "Mail.app"]);
        assert_eq!(f.navigator.state(), NavState::Idle);
    }

    #[test]
    fn sequence_modifier_does_not_change_action_dispatch() {
        let mut f = fixture();
        f.navigator.activate();
        let outcome = f.navigator.handle_key('t', Modifiers::CONTROL);
        assert_eq!(outcome, KeyOutcome::Executed);
        assert_eq!(f.runner.values(), vec!["Terminal.app"]);
        assert_eq!(f.navigator.state(), NavState::Idle);
    }

    #[test]
    fn navigate_to_opens_overlay_at_key_path() {
        let mut f = fixture();
        assert!(f.navigator.navigate_to("o"));
        assert_eq!(f.navigator.state(), NavState::Displaying);
        assert_eq!(f.navigator.current_path(), &[1]);

        // 's' is an action, not a group.
        assert!(!f.navigator.navigate_to("os"));
        assert_eq!(f.navigator.current_path(), &[1]);

        assert!(!f.navigator.navigate_to("z"));
    }

    #[test]
    fn config_swap_abandons_stale_paths() {
        let mut f = fixture();
        f.navigator.activate();
        f.navigator.handle_key('o', Modifiers::empty());

        let replacement = resolved(ActionTree::new(Group::new(
            None,
            vec![app("q", "Notes.app")],
        )));
        f.navigator.set_config(replacement);
        assert_eq!(f.navigator.current_path(), &[] as &[usize]);
        assert!(f.navigator.is_active());

        f.navigator.handle_key('q', Modifiers::empty());
        assert_eq!(f.runner.values(), vec!["Notes.app"]);
    }
}
