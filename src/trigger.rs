//! Trigger and trigger step model, plus the trigger engine (C8, §4.8).
//!
//! Grounded on `camdencheek-sqlite_rs/src/trigger.rs`. The teacher frees an
//! entire trigger's strings in one "strings blob" allocation
//! (`camdencheek-sqlite_rs` doc comment: "Persistent strings are owned by a
//! single 'strings' blob so the whole group frees at once") — in safe Rust
//! that discipline is just normal ownership: a `Trigger` owns its `Vec<TriggerStep>`
//! and everything under it, and dropping the `Trigger` drops all of it
//! together with no separate arena to manage.

use crate::expr::{Expr, ExprList};
use crate::select::Select;
use crate::table::ConflictPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerGranularity {
    Row,
    Statement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOp {
    Select(Box<Select>),
    Insert { target: String, columns: Vec<String>, values: Box<Select> },
    Update { target: String, assignments: ExprList, where_clause: Option<Box<Expr>> },
    Delete { target: String, where_clause: Option<Box<Expr>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerStep {
    pub op: StepOp,
    /// Overrides the enclosing trigger's/statement's conflict policy only
    /// when explicitly set (§4.8: "onError overrides each step's conflict
    /// policy unless the step's own policy is explicit").
    pub conflict_override: Option<ConflictPolicy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    pub table: String,
    pub event: TriggerEvent,
    pub timing: TriggerTiming,
    pub granularity: TriggerGranularity,
    pub when_clause: Option<Box<Expr>>,
    /// `UPDATE OF <col, ...>` column set, if present.
    pub update_of: Option<Vec<String>>,
    pub steps: Vec<TriggerStep>,
}

impl Trigger {
    /// §4.8's `sqliteTriggersExist`: does this trigger fire for `event` at
    /// `timing` with the given granularity, given the set of columns an
    /// UPDATE actually touches?
    pub fn matches(
        &self,
        event: TriggerEvent,
        timing: TriggerTiming,
        granularity: TriggerGranularity,
        changed_columns: Option<&[String]>,
    ) -> bool {
        if self.event != event || self.timing != timing || self.granularity != granularity {
            return false;
        }
        match (&self.update_of, changed_columns) {
            (None, _) | (_, None) => true,
            (Some(of), Some(changed)) => {
                of.iter().any(|c| changed.iter().any(|d| crate::util::strings::ident_eq(c, d)))
            }
        }
    }
}

/// The set of triggers currently being emitted, used to forbid recursive
/// firing during code generation (§GLOSSARY "Trigger stack").
#[derive(Debug, Default, Clone)]
pub struct TriggerStack {
    names: Vec<String>,
}

impl TriggerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| crate::util::strings::ident_eq(n, name))
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.names.push(name.into());
    }

    pub fn pop(&mut self) {
        self.names.pop();
    }

    pub fn depth(&self) -> usize {
        self.names.len()
    }
}

/// §4.8's `sqliteTriggersExist`: true iff `table` has a trigger for this
/// event/timing/granularity not already on `stack`, whose `UPDATE OF` column
/// set overlaps `changed_columns` (or either side is absent).
pub fn triggers_exist(
    table_triggers: &[Trigger],
    event: TriggerEvent,
    timing: TriggerTiming,
    granularity: TriggerGranularity,
    changed_columns: Option<&[String]>,
    stack: &TriggerStack,
) -> bool {
    table_triggers
        .iter()
        .any(|t| !stack.contains(&t.name) && t.matches(event, timing, granularity, changed_columns))
}

/// A scope guard that pushes a trigger onto the stack for the duration of
/// code-generation for its body, and pops it back off on drop (including on
/// an early return/error) — this is the recursion guard tested by §8
/// scenario 6.
pub struct TriggerGuard<'a> {
    stack: &'a mut TriggerStack,
}

impl<'a> TriggerGuard<'a> {
    pub fn enter(stack: &'a mut TriggerStack, name: &str) -> Option<Self> {
        if stack.contains(name) {
            return None;
        }
        stack.push(name);
        Some(TriggerGuard { stack })
    }
}

impl Drop for TriggerGuard<'_> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trigger(name: &str) -> Trigger {
        Trigger {
            name: name.to_string(),
            table: "u".to_string(),
            event: TriggerEvent::Insert,
            timing: TriggerTiming::After,
            granularity: TriggerGranularity::Row,
            when_clause: None,
            update_of: None,
            steps: vec![TriggerStep {
                op: StepOp::Insert {
                    target: "u".to_string(),
                    columns: vec![],
                    values: Box::new(Select::new(crate::from::SrcList::default())),
                },
                conflict_override: None,
            }],
        }
    }

    #[test]
    fn matches_scenario_6_recursion_guard() {
        let t = sample_trigger("t");
        let mut stack = TriggerStack::new();
        assert!(triggers_exist(
            std::slice::from_ref(&t),
            TriggerEvent::Insert,
            TriggerTiming::After,
            TriggerGranularity::Row,
            None,
            &stack
        ));

        // Entering the trigger's own body pushes it onto the stack; while
        // inside, the same trigger must not be considered to exist again —
        // this is what prevents the trigger's own INSERT from re-firing it.
        let _guard = TriggerGuard::enter(&mut stack, "t").unwrap();
        assert!(stack.contains("t"));
    }

    #[test]
    fn guard_refuses_reentry_and_pops_on_drop() {
        let mut stack = TriggerStack::new();
        {
            let _g = TriggerGuard::enter(&mut stack, "t").unwrap();
            assert!(TriggerGuard::enter(&mut stack, "t").is_none());
        }
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn update_of_requires_column_overlap() {
        let mut t = sample_trigger("t");
        t.event = TriggerEvent::Update;
        t.update_of = Some(vec!["x".to_string()]);
        assert!(t.matches(
            TriggerEvent::Update,
            TriggerTiming::After,
            TriggerGranularity::Row,
            Some(&["y".to_string(), "x".to_string()])
        ));
        assert!(!t.matches(
            TriggerEvent::Update,
            TriggerTiming::After,
            TriggerGranularity::Row,
            Some(&["y".to_string()])
        ));
    }
}
