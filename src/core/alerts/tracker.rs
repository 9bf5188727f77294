// Active alert tracking - fade re-checks and interaction-driven removal.
//
// Lifecycle of an entry: Active -> Scheduled -> (Scheduled | Active)* -> removed.
// Removal drops the entry and cancels its timer, so the remover runs at most
// once no matter which path (timer or interaction) gets there first.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::scheduler::{FadeScheduler, TimerHandle};
use super::styles::RemoveFn;
use crate::core::config::Settings;
use crate::core::error::AlertError;
use crate::core::model::{Info, StyleId};
use crate::core::probe::EnvironmentProbe;

/// Registration order key of an active alert.
pub type AlertKey = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPhase {
    /// Shown, no re-check pending
    Active,
    /// Shown, a fade re-check is pending
    Scheduled,
}

/// Timing thresholds the tracker works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadePolicy {
    pub fade_time: Duration,
    pub reveal_idle_threshold: Duration,
    pub persist_idle_threshold: Duration,
}

impl From<&Settings> for FadePolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            fade_time: settings.fade_time(),
            reveal_idle_threshold: settings.reveal_idle_threshold(),
            persist_idle_threshold: settings.persist_idle_threshold(),
        }
    }
}

pub struct ActiveAlert {
    pub key: AlertKey,
    pub style: StyleId,
    pub info: Info,
    remover: RemoveFn,
    timer: Option<TimerHandle>,
}

impl ActiveAlert {
    pub fn phase(&self) -> AlertPhase {
        if self.timer.is_some() {
            AlertPhase::Scheduled
        } else {
            AlertPhase::Active
        }
    }

    pub fn context(&self) -> &str {
        &self.info.context
    }

    fn remove(self) -> Result<(), AlertError> {
        log::debug!("Removing alert {} ({}) from '{}'", self.key, self.style, self.info.context);
        (self.remover)(&self.info).map_err(|source| AlertError::RemoverInvocation {
            style: self.style,
            source,
        })
    }
}

/// What a re-check pass or a removal did.
#[derive(Debug, Default)]
pub struct FadeReport {
    pub removed: Vec<AlertKey>,
    pub rescheduled: Vec<AlertKey>,
    /// Re-checked while the user was away; left in place with no timer
    pub held: Vec<AlertKey>,
    /// Remover failures; the entries are gone regardless
    pub errors: Vec<AlertError>,
}

impl FadeReport {
    fn record_removal(&mut self, alert: ActiveAlert) {
        let key = alert.key;
        if let Err(e) = alert.remove() {
            log::error!("{}", e);
            self.errors.push(e);
        }
        self.removed.push(key);
    }
}

/// Queue a re-check `fade_time` after `now`. A deadline past what `Instant`
/// can represent yields no timer; the alert then waits for an interaction.
fn schedule_recheck(
    timers: &mut FadeScheduler<AlertKey>,
    now: Instant,
    policy: &FadePolicy,
    key: AlertKey,
) -> Option<TimerHandle> {
    match now.checked_add(policy.fade_time) {
        Some(at) => Some(timers.schedule(at, key)),
        None => {
            log::warn!(
                "Fade time {:?} is out of range, alert {} will not fade",
                policy.fade_time,
                key
            );
            None
        }
    }
}

#[derive(Default)]
pub struct ActiveAlertTracker {
    next_key: AlertKey,
    alerts: BTreeMap<AlertKey, ActiveAlert>,
    timers: FadeScheduler<AlertKey>,
}

impl ActiveAlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a shown alert. Fading alerts get a re-check after `fade_time`;
    /// persistent ones stay until an interaction removes them.
    pub fn register(
        &mut self,
        style: StyleId,
        info: Info,
        remover: RemoveFn,
        policy: &FadePolicy,
        now: Instant,
    ) -> AlertKey {
        self.next_key += 1;
        let key = self.next_key;

        let timer = if info.fades() {
            schedule_recheck(&mut self.timers, now, policy, key)
        } else {
            None
        };
        log::debug!(
            "Tracking alert {} ({}) in '{}', fading: {}",
            key,
            style,
            info.context,
            timer.is_some()
        );

        self.alerts.insert(
            key,
            ActiveAlert {
                key,
                style,
                info,
                remover,
                timer,
            },
        );
        key
    }

    /// Run every re-check due at `now`.
    pub fn recheck_due(
        &mut self,
        now: Instant,
        probe: &dyn EnvironmentProbe,
        policy: &FadePolicy,
    ) -> FadeReport {
        let mut report = FadeReport::default();

        while let Some((handle, key)) = self.timers.pop_due(now) {
            let Some(alert) = self.alerts.get_mut(&key) else {
                continue;
            };
            if alert.timer != Some(handle) {
                continue;
            }
            alert.timer = None;

            let idle = probe.idle_duration();
            if idle >= policy.persist_idle_threshold {
                // User is away; leave it up until they come back and interact
                report.held.push(key);
            } else if idle >= policy.reveal_idle_threshold {
                alert.timer = schedule_recheck(&mut self.timers, now, policy, key);
                if alert.timer.is_some() {
                    report.rescheduled.push(key);
                } else {
                    report.held.push(key);
                }
            } else if let Some(alert) = self.take(key) {
                report.record_removal(alert);
            }
        }

        report
    }

    /// Remove every alert shown for `context`, cancelling pending re-checks.
    pub fn remove_context(&mut self, context: &str) -> FadeReport {
        let keys: Vec<AlertKey> = self
            .alerts
            .values()
            .filter(|alert| alert.context() == context)
            .map(|alert| alert.key)
            .collect();
        self.remove_keys(keys)
    }

    pub fn remove_all(&mut self) -> FadeReport {
        let keys: Vec<AlertKey> = self.alerts.keys().copied().collect();
        self.remove_keys(keys)
    }

    fn remove_keys(&mut self, keys: Vec<AlertKey>) -> FadeReport {
        let mut report = FadeReport::default();
        for key in keys {
            if let Some(alert) = self.take(key) {
                report.record_removal(alert);
            }
        }
        report
    }

    fn take(&mut self, key: AlertKey) -> Option<ActiveAlert> {
        let alert = self.alerts.remove(&key)?;
        if let Some(handle) = alert.timer {
            self.timers.cancel(handle);
        }
        Some(alert)
    }

    pub fn get(&self, key: AlertKey) -> Option<&ActiveAlert> {
        self.alerts.get(&key)
    }

    pub fn phase(&self, key: AlertKey) -> Option<AlertPhase> {
        self.get(key).map(ActiveAlert::phase)
    }

    /// Active alerts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveAlert> {
        self.alerts.values()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
