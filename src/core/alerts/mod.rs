// Alert routing: rules pick a style, styles deliver, the tracker takes alerts down again.
//
// Architecture:
// - styles.rs: Style registry and the built-in ignore/log styles
// - rules.rs: Conditions, rules and their evaluation order
// - engine.rs: Matches requests against rules and delivers them
// - scheduler.rs: Cancellable timer queue for fade re-checks
// - tracker.rs: Active alerts and their removal

pub mod engine;
pub mod rules;
pub mod scheduler;
pub mod styles;
pub mod tracker;
