// Rule model - conditions, outcome options and evaluation order.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::core::error::AlertError;
use crate::core::model::{Flag, Info, Predicate, Severity, Status, StyleId};

/// One test a rule applies to an alert. Patterns are searched, not anchored.
#[derive(Clone)]
pub enum Condition {
    Severity(Vec<Severity>),
    Status(Vec<Status>),
    Mode(Regex),
    Category(Regex),
    Title(Regex),
    Message(Regex),
    Predicate(Predicate),
}

fn compile(pattern: &str) -> Result<Regex, AlertError> {
    Regex::new(pattern).map_err(|source| AlertError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl Condition {
    pub fn severity(levels: &[Severity]) -> Self {
        Self::Severity(levels.to_vec())
    }

    pub fn status(statuses: &[Status]) -> Self {
        Self::Status(statuses.to_vec())
    }

    pub fn mode(pattern: &str) -> Result<Self, AlertError> {
        compile(pattern).map(Self::Mode)
    }

    pub fn category(pattern: &str) -> Result<Self, AlertError> {
        compile(pattern).map(Self::Category)
    }

    pub fn title(pattern: &str) -> Result<Self, AlertError> {
        compile(pattern).map(Self::Title)
    }

    pub fn message(pattern: &str) -> Result<Self, AlertError> {
        compile(pattern).map(Self::Message)
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Info) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, info: &Info) -> anyhow::Result<bool> {
        let matched = match self {
            Self::Severity(levels) => levels.contains(&info.severity),
            Self::Status(statuses) => statuses.contains(&info.status),
            // An absent field never matches a pattern
            Self::Mode(re) => info.mode.as_deref().is_some_and(|m| re.is_match(m)),
            Self::Category(re) => info.category.as_deref().is_some_and(|c| re.is_match(c)),
            Self::Title(re) => re.is_match(&info.title),
            Self::Message(re) => re.is_match(&info.message),
            Self::Predicate(f) => return f(info),
        };
        Ok(matched)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Severity(levels) => f.debug_tuple("Severity").field(levels).finish(),
            Self::Status(statuses) => f.debug_tuple("Status").field(statuses).finish(),
            Self::Mode(re) => f.debug_tuple("Mode").field(&re.as_str()).finish(),
            Self::Category(re) => f.debug_tuple("Category").field(&re.as_str()).finish(),
            Self::Title(re) => f.debug_tuple("Title").field(&re.as_str()).finish(),
            Self::Message(re) => f.debug_tuple("Message").field(&re.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// What happens once a rule matched.
#[derive(Debug, Clone, Default)]
pub struct RuleOptions {
    pub persistent: Flag,
    pub never_persist: Flag,
    /// Keep scanning later rules after this one matched
    pub continue_matching: Flag,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub conditions: Vec<Condition>,
    pub style: StyleId,
    pub options: RuleOptions,
}

impl Rule {
    /// A rule with no conditions; it matches every alert until narrowed with `when`.
    pub fn new(style: impl Into<StyleId>) -> Self {
        Self {
            conditions: Vec::new(),
            style: style.into(),
            options: RuleOptions::default(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn persistent(mut self, flag: impl Into<Flag>) -> Self {
        self.options.persistent = flag.into();
        self
    }

    pub fn never_persist(mut self, flag: impl Into<Flag>) -> Self {
        self.options.never_persist = flag.into();
        self
    }

    pub fn continue_matching(mut self, flag: impl Into<Flag>) -> Self {
        self.options.continue_matching = flag.into();
        self
    }

    /// All conditions hold. Stops at the first failing or erroring condition.
    pub fn matches(&self, info: &Info) -> anyhow::Result<bool> {
        for condition in &self.conditions {
            if !condition.matches(info)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Where `RuleSet::add` puts a rule among the other added rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Ahead of previously added rules
    #[default]
    Prepend,
    /// Behind previously added rules
    Append,
}

/// User-configured rules followed by rules added at runtime.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    user: Vec<Rule>,
    added: VecDeque<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user_rules(&mut self, rules: Vec<Rule>) {
        self.user = rules;
    }

    pub fn add(&mut self, rule: Rule, placement: Placement) {
        match placement {
            Placement::Prepend => self.added.push_front(rule),
            Placement::Append => self.added.push_back(rule),
        }
    }

    /// Rules in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.user.iter().chain(self.added.iter())
    }

    pub fn first(&self) -> Option<&Rule> {
        self.iter().next()
    }

    pub fn len(&self) -> usize {
        self.user.len() + self.added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
