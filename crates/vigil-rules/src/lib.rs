//! Rule base for the vigil analysis engine.
//!
//! A rule is a predicate-with-state over the event stream of one program.
//! Rules are installed into a per-program [`rule_set::RuleSet`] and
//! evaluated concurrently for each incoming event, so every rule guards
//! its own evaluation state internally. Built-in rule types cover error
//! bursts ([`rules::threshold_window::ThresholdWindowRule`]) and excessive
//! gaps between successive operations
//! ([`rules::operation_gap::OperationGapRule`]).

pub mod rule_set;
pub mod rules;
pub mod storage;


use tokio::sync::mpsc::UnboundedSender;
use vigil_common::types::{AlarmLevel, AlarmMessage, SystemEvent};

/// A stateful evaluator over the event stream of a single program.
///
/// Implementations are owned by one program's analyzer and evaluated in
/// parallel with their sibling rules for every matching event, so all
/// evaluation state must sit behind the rule's own lock. Timer-driven
/// variants additionally touch that state from a timer task; the same lock
/// serialises both paths.
pub trait AnalyzeRule: Send + Sync {
    /// Name of this rule, unique within its program.
    fn rule_name(&self) -> &str;

    /// The program this rule belongs to. A rule instance belongs to
    /// exactly one program for its whole life.
    fn program_name(&self) -> &str;

    /// Operation filter; the empty string matches every operation of the
    /// program.
    fn operation_name(&self) -> &str;

    /// Level assigned to alarms raised by this rule.
    fn alarm_level(&self) -> AlarmLevel;

    /// Human-readable summary attached to raised alarms.
    fn alarm_message(&self) -> &str;

    /// Whether the event falls under this rule's program and operation
    /// filter.
    fn matches(&self, event: &SystemEvent) -> bool {
        event.program_name == self.program_name()
            && (self.operation_name().is_empty()
                || event.operation_name == self.operation_name())
    }

    /// Consume one matching event, update internal state, and report
    /// whether the rule is now triggered.
    fn add_and_check(&self, event: &SystemEvent) -> bool;

    /// Clear all evaluation state and cancel any pending timer.
    fn reset(&self);

    /// Hand the rule a channel for alarms it raises on its own schedule
    /// (timer expiry). Event-driven rules ignore this.
    fn attach_observer(&self, _observer: UnboundedSender<AlarmMessage>) {}
}
