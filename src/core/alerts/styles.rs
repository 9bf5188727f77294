// Style registry - named delivery backends.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Local;

use crate::core::model::{Info, StyleId};

/// Shows an alert.
pub type NotifyFn = Arc<dyn Fn(&Info) -> anyhow::Result<()> + Send + Sync>;
/// Takes a shown alert down again.
pub type RemoveFn = Arc<dyn Fn(&Info) -> anyhow::Result<()> + Send + Sync>;

pub const IGNORE_STYLE: &str = "ignore";
pub const LOG_STYLE: &str = "log";

#[derive(Clone)]
pub struct StyleDefinition {
    pub id: StyleId,
    pub title: String,
    pub notifier: Option<NotifyFn>,
    pub remover: Option<RemoveFn>,
}

impl StyleDefinition {
    pub fn new<F>(id: impl Into<StyleId>, title: impl Into<String>, notifier: F) -> Self
    where
        F: Fn(&Info) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            title: title.into(),
            notifier: Some(Arc::new(notifier)),
            remover: None,
        }
    }

    pub fn with_remover<F>(mut self, remover: F) -> Self
    where
        F: Fn(&Info) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.remover = Some(Arc::new(remover));
        self
    }

    /// A style that does nothing when notified and has nothing to remove.
    pub fn silent(id: impl Into<StyleId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            notifier: None,
            remover: None,
        }
    }

    pub fn notify(&self, info: &Info) -> anyhow::Result<()> {
        match &self.notifier {
            Some(notifier) => notifier(info),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for StyleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleDefinition")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("notifier", &self.notifier.is_some())
            .field("remover", &self.remover.is_some())
            .finish()
    }
}

/// Line written by the built-in log style.
pub fn format_log_line(info: &Info) -> String {
    format!(
        "{} [{}] {}: {}",
        Local::now().format("%H:%M:%S"),
        info.severity,
        info.title,
        info.message
    )
}

fn log_notify(info: &Info) -> anyhow::Result<()> {
    log::info!(target: "alert", "{}", format_log_line(info));
    Ok(())
}

/// Registered styles keyed by id. Re-registering an id replaces it.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    styles: BTreeMap<StyleId, StyleDefinition>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleRegistry {
    /// Registry holding the built-in `ignore` and `log` styles.
    pub fn new() -> Self {
        let mut registry = Self {
            styles: BTreeMap::new(),
        };
        registry.insert(StyleDefinition::silent(IGNORE_STYLE, "Ignore alert"));
        registry.insert(StyleDefinition::new(LOG_STYLE, "Log to alert log", log_notify));
        registry
    }

    pub fn register<F>(
        &mut self,
        id: impl Into<StyleId>,
        title: impl Into<String>,
        notifier: F,
        remover: Option<RemoveFn>,
    ) where
        F: Fn(&Info) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut style = StyleDefinition::new(id, title, notifier);
        style.remover = remover;
        self.insert(style);
    }

    pub fn insert(&mut self, style: StyleDefinition) {
        if self.styles.contains_key(&style.id) {
            log::debug!("Replacing style '{}'", style.id);
        }
        self.styles.insert(style.id.clone(), style);
    }

    pub fn lookup(&self, id: &str) -> Option<&StyleDefinition> {
        self.styles.get(id)
    }

    /// Like `lookup`, but an unknown id degrades to a silent style of that name.
    pub fn resolve(&self, id: &str) -> StyleDefinition {
        match self.lookup(id) {
            Some(style) => style.clone(),
            None => {
                log::debug!("Unknown style '{}', treating as silent", id);
                StyleDefinition::silent(id, id)
            }
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}
