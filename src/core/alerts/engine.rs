// Alert engine - matches requests against rules, delivers them through
// styles, and hands shown alerts to the tracker.

use std::sync::Arc;
use std::time::Instant;

use super::rules::{Placement, Rule, RuleOptions, RuleSet};
use super::styles::{RemoveFn, StyleDefinition, StyleRegistry, LOG_STYLE};
use super::tracker::{ActiveAlert, ActiveAlertTracker, AlertKey, FadePolicy, FadeReport};
use crate::core::config::Settings;
use crate::core::error::AlertError;
use crate::core::model::{AlertRequest, Info, StyleId};
use crate::core::probe::EnvironmentProbe;

/// What a single dispatch delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Styles notified through matching rules, in order
    pub delivered: Vec<StyleId>,
    /// Set when no rule matched and the default style was notified
    pub fallback: Option<StyleId>,
    /// Active alerts registered for fading/removal
    pub registered: Vec<AlertKey>,
    pub logged: bool,
}

impl DispatchOutcome {
    pub fn matched(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Owns the rule set, style registry and active alerts for one host.
pub struct AlertEngine {
    settings: Settings,
    styles: StyleRegistry,
    rules: RuleSet,
    tracker: ActiveAlertTracker,
    probe: Arc<dyn EnvironmentProbe>,
}

impl AlertEngine {
    pub fn new(settings: Settings, probe: Arc<dyn EnvironmentProbe>) -> Self {
        Self {
            settings,
            styles: StyleRegistry::new(),
            rules: RuleSet::new(),
            tracker: ActiveAlertTracker::new(),
            probe,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace settings. New thresholds apply to re-checks from now on.
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn probe(&self) -> &Arc<dyn EnvironmentProbe> {
        &self.probe
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn define_style(&mut self, style: StyleDefinition) {
        self.styles.insert(style);
    }

    /// Add a rule after all user rules; see [`Placement`] for ordering among added rules.
    pub fn add_rule(&mut self, rule: Rule, placement: Placement) {
        self.rules.add(rule, placement);
    }

    /// Rules that always run ahead of added rules, in the given order.
    pub fn set_user_rules(&mut self, rules: Vec<Rule>) {
        self.rules.set_user_rules(rules);
    }

    pub fn active_alerts(&self) -> impl Iterator<Item = &ActiveAlert> {
        self.tracker.iter()
    }

    pub fn tracker(&self) -> &ActiveAlertTracker {
        &self.tracker
    }

    /// Submit an alert with defaults for everything but the message.
    pub fn alert(&mut self, message: impl Into<String>) -> Result<DispatchOutcome, AlertError> {
        self.dispatch(AlertRequest::new(message))
    }

    pub fn dispatch(&mut self, request: AlertRequest) -> Result<DispatchOutcome, AlertError> {
        self.dispatch_at(request, Instant::now())
    }

    /// Dispatch with an explicit clock reading, used for fade deadlines.
    pub fn dispatch_at(
        &mut self,
        request: AlertRequest,
        now: Instant,
    ) -> Result<DispatchOutcome, AlertError> {
        let mut outcome = DispatchOutcome::default();
        let info = self.base_info(&request);

        // The log is a side channel; it sees every alert, hidden or not
        if self.settings.log_messages {
            let logger = self.styles.resolve(LOG_STYLE);
            notify(&logger, &info)?;
            outcome.logged = true;
        }

        if self.settings.hide_all_notifications {
            log::debug!("Notifications hidden, skipping delivery of '{}'", info.message);
            return Ok(outcome);
        }

        match &request.style {
            Some(forced) => self.deliver_forced(forced, &request, &info, now, &mut outcome)?,
            None => self.deliver_matching(&request, &info, now, &mut outcome)?,
        }

        if !outcome.matched() {
            if let Some(default_style) = self.settings.default_style.clone() {
                let style = self.styles.resolve(&default_style);
                notify(&style, &info)?;
                outcome.fallback = Some(default_style);
            }
        }

        Ok(outcome)
    }

    /// Build the dispatch record, filling request gaps from the probe.
    fn base_info(&self, request: &AlertRequest) -> Info {
        let context = request
            .context
            .clone()
            .unwrap_or_else(|| self.probe.current_context());
        let status = self
            .probe
            .status(&context, self.settings.reveal_idle_threshold());
        let title = request
            .title
            .clone()
            .unwrap_or_else(|| self.probe.display_name(&context));
        let mode = request
            .mode
            .clone()
            .or_else(|| self.probe.current_mode(&context));

        Info {
            message: request.message.clone(),
            severity: request.severity,
            title,
            category: request.category.clone(),
            mode,
            data: request.data.clone(),
            status,
            color: self
                .settings
                .severity_color(request.severity)
                .map(str::to_string),
            persistent: None,
            never_persist: None,
            context,
        }
    }

    /// A forced style takes the first rule as matched and stops there.
    /// With no rules at all it still delivers, with default options.
    fn deliver_forced(
        &mut self,
        forced: &str,
        request: &AlertRequest,
        info: &Info,
        now: Instant,
        outcome: &mut DispatchOutcome,
    ) -> Result<(), AlertError> {
        let (index, options) = match self.rules.first() {
            Some(rule) => (Some(0), rule.options.clone()),
            None => (None, RuleOptions::default()),
        };
        log::debug!("Style '{}' forced for '{}'", forced, info.message);
        self.deliver(forced, &options, index, request, info, now, outcome)
    }

    fn deliver_matching(
        &mut self,
        request: &AlertRequest,
        info: &Info,
        now: Instant,
        outcome: &mut DispatchOutcome,
    ) -> Result<(), AlertError> {
        // Snapshot so delivery can mutate the tracker while we walk the rules
        let rules: Vec<Rule> = self.rules.iter().cloned().collect();

        for (index, rule) in rules.iter().enumerate() {
            let matched = rule
                .matches(info)
                .map_err(|source| AlertError::ConditionEvaluation {
                    rule: Some(index),
                    source,
                })?;
            if !matched {
                continue;
            }

            log::debug!("Rule {} matched '{}' -> {}", index, info.message, rule.style);
            self.deliver(&rule.style, &rule.options, Some(index), request, info, now, outcome)?;

            let keep_going = rule
                .options
                .continue_matching
                .resolve(info)
                .map_err(|source| AlertError::ConditionEvaluation {
                    rule: Some(index),
                    source,
                })?;
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn deliver(
        &mut self,
        style_id: &str,
        options: &RuleOptions,
        rule: Option<usize>,
        request: &AlertRequest,
        info: &Info,
        now: Instant,
        outcome: &mut DispatchOutcome,
    ) -> Result<(), AlertError> {
        let evaluation_error = |source: anyhow::Error| AlertError::ConditionEvaluation { rule, source };

        let persistent = request
            .persistent
            .as_ref()
            .unwrap_or(&options.persistent)
            .resolve(info)
            .map_err(evaluation_error)?;
        let never_persist = request
            .never_persist
            .as_ref()
            .unwrap_or(&options.never_persist)
            .resolve(info)
            .map_err(evaluation_error)?;
        let resolved = info.with_persistence(persistent, never_persist);

        let style = self.styles.resolve(style_id);
        notify(&style, &resolved)?;
        outcome.delivered.push(style.id.clone());

        if let Some(remover) = style.remover.clone() {
            let key = self.register(style.id, resolved, remover, now);
            outcome.registered.push(key);
        }
        Ok(())
    }

    fn register(&mut self, style: StyleId, info: Info, remover: RemoveFn, now: Instant) -> AlertKey {
        let policy = FadePolicy::from(&self.settings);
        self.tracker.register(style, info, remover, &policy, now)
    }

    /// The user acted in `context`: take down everything shown there.
    pub fn handle_interaction(&mut self, context: &str) -> FadeReport {
        log::debug!("Interaction in '{}'", context);
        self.remove_alerts(context)
    }

    /// Take down every alert shown for `context` without an interaction.
    pub fn remove_alerts(&mut self, context: &str) -> FadeReport {
        self.tracker.remove_context(context)
    }

    /// Take down every active alert.
    pub fn clear(&mut self) -> FadeReport {
        self.tracker.remove_all()
    }

    /// Run fade re-checks due at `now`.
    pub fn tick(&mut self, now: Instant) -> FadeReport {
        let policy = FadePolicy::from(&self.settings);
        self.tracker.recheck_due(now, self.probe.as_ref(), &policy)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tracker.next_deadline()
    }
}

fn notify(style: &StyleDefinition, info: &Info) -> Result<(), AlertError> {
    style.notify(info).map_err(|source| AlertError::Notify {
        style: style.id.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::rules::Condition;
    use crate::core::alerts::tracker::AlertPhase;
    use crate::core::model::{Severity, Status};
    use crate::core::probe::ManualProbe;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every notifier and remover call as "<style>:<message>".
    #[derive(Clone, Default)]
    struct Recorder {
        notified: Arc<Mutex<Vec<Info>>>,
        calls: Arc<Mutex<Vec<String>>>,
        removed: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn style(&self, id: &str) -> StyleDefinition {
            let calls = self.calls.clone();
            let notified = self.notified.clone();
            let name = id.to_string();
            StyleDefinition::new(id, id, move |info| {
                calls.lock().unwrap().push(format!("{}:{}", name, info.message));
                notified.lock().unwrap().push(info.clone());
                Ok(())
            })
        }

        fn fading_style(&self, id: &str) -> StyleDefinition {
            let removed = self.removed.clone();
            let name = id.to_string();
            self.style(id).with_remover(move |info| {
                removed.lock().unwrap().push(format!("{}:{}", name, info.message));
                Ok(())
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn removed(&self) -> Vec<String> {
            self.removed.lock().unwrap().clone()
        }

        fn last(&self) -> Info {
            self.notified.lock().unwrap().last().cloned().unwrap()
        }
    }

    fn quiet_settings() -> Settings {
        Settings {
            log_messages: false,
            ..Settings::default()
        }
    }

    fn engine(settings: Settings) -> (AlertEngine, Arc<ManualProbe>, Recorder) {
        let probe = Arc::new(ManualProbe::new("editor"));
        let mut engine = AlertEngine::new(settings, probe.clone());
        let recorder = Recorder::default();
        for id in ["a", "b", "log"] {
            engine.define_style(recorder.style(id));
        }
        engine.define_style(recorder.fading_style("fade"));
        (engine, probe, recorder)
    }

    #[test]
    fn test_severity_rule_does_not_match_normal() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        engine.add_rule(
            Rule::new("a").when(Condition::severity(&[Severity::High, Severity::Urgent])),
            Placement::Prepend,
        );

        let outcome = engine.alert("hello").unwrap();
        assert!(!outcome.matched());
        assert!(recorder.calls().is_empty());

        let outcome = engine
            .dispatch(AlertRequest::new("fire").with_severity(Severity::Urgent))
            .unwrap();
        assert_eq!(outcome.delivered, vec!["a".to_string()]);
    }

    #[test]
    fn test_user_rules_win_unless_continued() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        engine.add_rule(Rule::new("b"), Placement::Prepend);
        engine.set_user_rules(vec![Rule::new("a")]);

        engine.alert("one").unwrap();
        assert_eq!(recorder.calls(), vec!["a:one"]);

        engine.set_user_rules(vec![Rule::new("a").continue_matching(true)]);
        engine.alert("two").unwrap();
        assert_eq!(recorder.calls(), vec!["a:one", "a:two", "b:two"]);
    }

    #[test]
    fn test_continue_predicate() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        engine.add_rule(Rule::new("b"), Placement::Append);
        engine.add_rule(
            Rule::new("a").continue_matching(crate::core::model::Flag::predicate(|info| {
                Ok(info.severity >= Severity::High)
            })),
            Placement::Prepend,
        );

        engine.alert("calm").unwrap();
        engine
            .dispatch(AlertRequest::new("loud").with_severity(Severity::High))
            .unwrap();
        assert_eq!(recorder.calls(), vec!["a:calm", "a:loud", "b:loud"]);
    }

    #[test]
    fn test_most_recent_rule_first() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        engine.add_rule(Rule::new("a"), Placement::Prepend);
        engine.add_rule(Rule::new("b"), Placement::Prepend);
        engine.alert("x").unwrap();
        assert_eq!(recorder.calls(), vec!["b:x"]);
    }

    #[test]
    fn test_default_style_gets_base_info() {
        let settings = Settings {
            default_style: Some("a".to_string()),
            ..quiet_settings()
        };
        let (mut engine, _, recorder) = engine(settings);
        engine.add_rule(
            Rule::new("b").when(Condition::category("^never$").unwrap()),
            Placement::Prepend,
        );

        let outcome = engine.alert("unmatched").unwrap();
        assert_eq!(outcome.fallback.as_deref(), Some("a"));
        assert_eq!(recorder.calls(), vec!["a:unmatched"]);
        let info = recorder.last();
        assert!(info.persistent.is_none());
        assert!(info.never_persist.is_none());
        assert!(outcome.registered.is_empty());
    }

    #[test]
    fn test_hide_all_still_logs() {
        let settings = Settings {
            hide_all_notifications: true,
            default_style: Some("a".to_string()),
            ..Settings::default()
        };
        let (mut engine, _, recorder) = engine(settings);
        engine.add_rule(Rule::new("fade"), Placement::Prepend);

        let outcome = engine.alert("shh").unwrap();
        assert!(outcome.logged);
        assert!(!outcome.matched());
        assert_eq!(recorder.calls(), vec!["log:shh"]);
        assert!(engine.tracker().is_empty());
    }

    #[test]
    fn test_log_happens_before_failing_predicate() {
        let (mut engine, _, recorder) = engine(Settings::default());
        engine.add_rule(
            Rule::new("a").when(Condition::predicate(|_| Err(anyhow::anyhow!("bad predicate")))),
            Placement::Prepend,
        );

        let err = engine.alert("audit me").unwrap_err();
        assert!(matches!(err, AlertError::ConditionEvaluation { rule: Some(0), .. }));
        assert_eq!(recorder.calls(), vec!["log:audit me"]);
    }

    #[test]
    fn test_failing_predicate_skips_fallback() {
        let settings = Settings {
            default_style: Some("b".to_string()),
            ..quiet_settings()
        };
        let (mut engine, _, recorder) = engine(settings);
        engine.add_rule(
            Rule::new("a").persistent(crate::core::model::Flag::predicate(|_| {
                Err(anyhow::anyhow!("persistence lookup failed"))
            })),
            Placement::Prepend,
        );

        assert!(engine.alert("x").is_err());
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_forced_style_skips_conditions() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        engine.add_rule(
            Rule::new("a")
                .when(Condition::predicate(|_| panic!("conditions must not run")))
                .continue_matching(true),
            Placement::Prepend,
        );
        engine.add_rule(Rule::new("b"), Placement::Append);

        let outcome = engine
            .dispatch(AlertRequest::new("forced").with_style("b"))
            .unwrap();
        assert_eq!(outcome.delivered, vec!["b".to_string()]);
        assert_eq!(recorder.calls(), vec!["b:forced"]);
    }

    #[test]
    fn test_forced_style_without_rules() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        let outcome = engine
            .dispatch(AlertRequest::new("solo").with_style("a"))
            .unwrap();
        assert!(outcome.matched());
        assert_eq!(recorder.calls(), vec!["a:solo"]);
    }

    #[test]
    fn test_unknown_style_is_noop() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        engine.add_rule(Rule::new("does-not-exist"), Placement::Prepend);
        let outcome = engine.alert("lost").unwrap();
        assert_eq!(outcome.delivered, vec!["does-not-exist".to_string()]);
        assert!(outcome.registered.is_empty());
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_notifier_error_propagates() {
        let (mut engine, _, _) = engine(quiet_settings());
        engine.define_style(StyleDefinition::new("broken", "Broken", |_| {
            Err(anyhow::anyhow!("no display"))
        }));
        engine.add_rule(Rule::new("broken"), Placement::Prepend);
        let err = engine.alert("x").unwrap_err();
        assert!(matches!(err, AlertError::Notify { ref style, .. } if style == "broken"));
    }

    #[test]
    fn test_defaults_filled_from_probe() {
        let (mut engine, probe, recorder) = engine(quiet_settings());
        probe.set_display_name("editor", "main.rs");
        probe.set_mode("editor", "rust-mode");
        engine.add_rule(
            Rule::new("a").when(Condition::mode("^rust").unwrap()),
            Placement::Prepend,
        );

        engine.alert("saved").unwrap();
        let info = recorder.last();
        assert_eq!(info.title, "main.rs");
        assert_eq!(info.context, "editor");
        assert_eq!(info.mode.as_deref(), Some("rust-mode"));
        assert_eq!(info.status, Status::Selected);
        assert_eq!(info.color.as_deref(), Some("green"));
        assert_eq!(info.persistent, Some(false));

        engine
            .dispatch(
                AlertRequest::new("bg")
                    .with_context("daemon")
                    .with_title("Daemon")
                    .with_mode("rust-daemon")
                    .with_data(serde_json::json!({"pid": 42})),
            )
            .unwrap();
        let info = recorder.last();
        assert_eq!(info.title, "Daemon");
        assert_eq!(info.status, Status::Buried);
        assert_eq!(info.data, Some(serde_json::json!({"pid": 42})));
    }

    #[test]
    fn test_status_condition_sees_idle() {
        let (mut engine, probe, recorder) = engine(quiet_settings());
        engine.add_rule(
            Rule::new("a").when(Condition::status(&[Status::Idle, Status::Buried])),
            Placement::Prepend,
        );

        engine.alert("active").unwrap();
        probe.set_idle(Duration::from_secs(30));
        engine.alert("away").unwrap();
        assert_eq!(recorder.calls(), vec!["a:away"]);
    }

    #[test]
    fn test_request_persistence_overrides_rule() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        engine.add_rule(Rule::new("fade").persistent(true), Placement::Prepend);

        let start = Instant::now();
        let sticky = engine.dispatch_at(AlertRequest::new("sticky"), start).unwrap();
        let forced = engine
            .dispatch_at(AlertRequest::new("fleeting").persistent(false), start)
            .unwrap();
        let capped = engine
            .dispatch_at(AlertRequest::new("capped").never_persist(true), start)
            .unwrap();

        let phase = |key| engine.tracker().phase(key);
        assert_eq!(phase(sticky.registered[0]), Some(AlertPhase::Active));
        assert_eq!(phase(forced.registered[0]), Some(AlertPhase::Scheduled));
        assert_eq!(phase(capped.registered[0]), Some(AlertPhase::Scheduled));

        let report = engine.tick(start + Duration::from_secs(5));
        assert_eq!(report.removed.len(), 2);
        assert_eq!(recorder.removed(), vec!["fade:fleeting", "fade:capped"]);

        let report = engine.handle_interaction("editor");
        assert_eq!(report.removed, sticky.registered);
        assert_eq!(recorder.removed().len(), 3);
    }

    #[test]
    fn test_out_of_range_fade_time_keeps_alert() {
        let settings: Settings =
            serde_json::from_str(r#"{"log_messages": false, "fade_time_seconds": 18446744073709551615}"#)
                .unwrap();
        let (mut engine, _, recorder) = engine(settings);
        engine.add_rule(Rule::new("fade"), Placement::Prepend);

        let outcome = engine.dispatch(AlertRequest::new("slow")).unwrap();
        assert_eq!(recorder.calls(), vec!["fade:slow"]);
        assert_eq!(engine.tracker().phase(outcome.registered[0]), Some(AlertPhase::Active));
        assert!(engine.next_deadline().is_none());

        engine.handle_interaction("editor");
        assert_eq!(recorder.removed(), vec!["fade:slow"]);
    }

    #[test]
    fn test_remove_alerts_and_clear() {
        let (mut engine, _, recorder) = engine(quiet_settings());
        engine.add_rule(Rule::new("fade").persistent(true), Placement::Prepend);

        engine.dispatch(AlertRequest::new("one").with_context("editor")).unwrap();
        engine.dispatch(AlertRequest::new("two").with_context("shell")).unwrap();
        engine.dispatch(AlertRequest::new("three").with_context("shell")).unwrap();

        let report = engine.remove_alerts("shell");
        assert_eq!(report.removed.len(), 2);
        assert_eq!(recorder.removed(), vec!["fade:two", "fade:three"]);

        let report = engine.clear();
        assert_eq!(report.removed.len(), 1);
        assert!(engine.tracker().is_empty());
        assert!(engine.clear().removed.is_empty());
    }
}
