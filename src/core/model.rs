use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::AlertError;

/// Opaque identifier of the context (session, window group, ...) an alert belongs to.
pub type ContextId = String;
/// Key of a registered delivery style.
pub type StyleId = String;

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trivial,
    Low,
    #[default]
    Normal,
    Moderate,
    High,
    Urgent,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// All severities, most severe first.
    pub fn all() -> &'static [Severity] {
        &[
            Self::Urgent,
            Self::High,
            Self::Moderate,
            Self::Normal,
            Self::Low,
            Self::Trivial,
        ]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| AlertError::UnknownSeverity(s.to_string()))
    }
}

/// Where a context sits relative to the user's attention at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not shown anywhere
    Buried,
    /// Shown, but not the selected context
    Visible,
    /// Shown and selected, user active
    Selected,
    /// Shown and selected, user idle past the reveal threshold
    Idle,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buried => "buried",
            Self::Visible => "visible",
            Self::Selected => "selected",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buried" => Ok(Self::Buried),
            "visible" => Ok(Self::Visible),
            "selected" => Ok(Self::Selected),
            "idle" => Ok(Self::Idle),
            other => Err(AlertError::UnknownStatus(other.to_string())),
        }
    }
}

/// Host-supplied test over a dispatch record.
pub type Predicate = Arc<dyn Fn(&Info) -> anyhow::Result<bool> + Send + Sync>;

/// An option that is either fixed or computed per alert.
#[derive(Clone)]
pub enum Flag {
    Bool(bool),
    Predicate(Predicate),
}

impl Flag {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Info) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn resolve(&self, info: &Info) -> anyhow::Result<bool> {
        match self {
            Self::Bool(value) => Ok(*value),
            Self::Predicate(f) => f(info),
        }
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::Bool(false)
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A request to show an alert. Everything but the message is optional;
/// omitted fields are filled in from the environment at dispatch time.
#[derive(Debug, Clone, Default)]
pub struct AlertRequest {
    pub message: String,
    pub severity: Severity,
    /// Defaults to the context's display name
    pub title: Option<String>,
    pub category: Option<String>,
    /// Defaults to the probe's current context
    pub context: Option<ContextId>,
    /// Defaults to the context's current mode
    pub mode: Option<String>,
    /// Passed through to notifiers untouched
    pub data: Option<serde_json::Value>,
    /// Forces a style and bypasses rule conditions
    pub style: Option<StyleId>,
    pub persistent: Option<Flag>,
    pub never_persist: Option<Flag>,
}

impl AlertRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<ContextId>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_style(mut self, style: impl Into<StyleId>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn persistent(mut self, flag: impl Into<Flag>) -> Self {
        self.persistent = Some(flag.into());
        self
    }

    pub fn never_persist(mut self, flag: impl Into<Flag>) -> Self {
        self.never_persist = Some(flag.into());
        self
    }
}

/// The record handed to notifiers and removers.
///
/// Built once per dispatch from an [`AlertRequest`]; persistence fields are
/// only present after a rule resolved them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Info {
    pub message: String,
    pub severity: Severity,
    pub title: String,
    pub category: Option<String>,
    pub context: ContextId,
    pub mode: Option<String>,
    pub data: Option<serde_json::Value>,
    pub status: Status,
    /// Presentation hint from `Settings::severity_colors`
    pub color: Option<String>,
    pub persistent: Option<bool>,
    pub never_persist: Option<bool>,
}

impl Info {
    /// Copy of this record with persistence resolved.
    pub fn with_persistence(&self, persistent: bool, never_persist: bool) -> Self {
        Self {
            persistent: Some(persistent),
            never_persist: Some(never_persist),
            ..self.clone()
        }
    }

    /// Whether this alert should fade on its own once shown.
    pub fn fades(&self) -> bool {
        let persistent = self.persistent.unwrap_or(false);
        let never_persist = self.never_persist.unwrap_or(false);
        !persistent || never_persist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> Info {
        Info {
            message: "build failed".to_string(),
            severity: Severity::Urgent,
            title: "ci".to_string(),
            category: None,
            context: "ci".to_string(),
            mode: None,
            data: None,
            status: Status::Buried,
            color: None,
            persistent: None,
            never_persist: None,
        }
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Urgent > Severity::High);
        assert!(Severity::High > Severity::Moderate);
        assert!(Severity::Moderate > Severity::Normal);
        assert!(Severity::Normal > Severity::Low);
        assert!(Severity::Low > Severity::Trivial);
        assert_eq!(Severity::default(), Severity::Normal);
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert!(matches!(
            "catastrophic".parse::<Severity>(),
            Err(AlertError::UnknownSeverity(_))
        ));
        assert_eq!("idle".parse::<Status>().unwrap(), Status::Idle);
        assert!(matches!(
            "hidden".parse::<Status>(),
            Err(AlertError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_severity_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Moderate).unwrap(), "\"moderate\"");
        let parsed: Severity = serde_json::from_str("\"trivial\"").unwrap();
        assert_eq!(parsed, Severity::Trivial);
    }

    #[test]
    fn test_flag_resolution() {
        let info = sample_info();
        assert!(Flag::from(true).resolve(&info).unwrap());
        let urgent_only = Flag::predicate(|i| Ok(i.severity == Severity::Urgent));
        assert!(urgent_only.resolve(&info).unwrap());
        let failing = Flag::predicate(|_| Err(anyhow::anyhow!("boom")));
        assert!(failing.resolve(&info).is_err());
    }

    #[test]
    fn test_fades() {
        let info = sample_info();
        assert!(info.fades());
        assert!(info.with_persistence(false, false).fades());
        assert!(!info.with_persistence(true, false).fades());
        assert!(info.with_persistence(true, true).fades());
    }

    #[test]
    fn test_request_builder() {
        let req = AlertRequest::new("disk full")
            .with_severity(Severity::High)
            .with_category("storage")
            .persistent(true);
        assert_eq!(req.message, "disk full");
        assert_eq!(req.severity, Severity::High);
        assert_eq!(req.category.as_deref(), Some("storage"));
        assert!(matches!(req.persistent, Some(Flag::Bool(true))));
        assert!(req.style.is_none());
    }
}
