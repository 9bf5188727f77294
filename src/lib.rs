#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
pub mod core;

pub use crate::core::alerts::engine::{AlertEngine, DispatchOutcome};
pub use crate::core::alerts::rules::{Condition, Placement, Rule, RuleOptions, RuleSet};
pub use crate::core::alerts::styles::{StyleDefinition, StyleRegistry, IGNORE_STYLE, LOG_STYLE};
pub use crate::core::alerts::tracker::{AlertPhase, FadeReport};
pub use crate::core::config::{ConfigManager, Settings};
pub use crate::core::error::AlertError;
pub use crate::core::model::{AlertRequest, ContextId, Flag, Info, Severity, Status, StyleId};
pub use crate::core::probe::{EnvironmentProbe, ManualProbe};
pub use crate::core::service::{AlertHandle, AlertService};
