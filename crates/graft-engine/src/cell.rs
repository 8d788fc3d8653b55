//! [`PropertyCell`]: one property value and its local meta-state.

use indexmap::IndexMap;
use smallvec::SmallVec;

use graft_core::{ChangeReason, ExecutionToken, PropertyDef, RuleId, RuleMessage, Value};

/// One property's value plus its messages, busy tokens, read-only flag
/// and self-modified flag.
///
/// Owned exclusively by its node. Messages are grouped by the id of the
/// rule that produced them, so each rule run replaces only its own
/// prior messages.
#[derive(Clone, Debug)]
pub struct PropertyCell {
    value: Value,
    messages: IndexMap<RuleId, Vec<RuleMessage>>,
    busy: SmallVec<[ExecutionToken; 2]>,
    read_only: bool,
    self_modified: bool,
}

impl PropertyCell {
    /// A cell holding the definition's default value.
    pub fn new(def: &PropertyDef) -> Self {
        Self {
            value: def.default.clone(),
            messages: IndexMap::new(),
            busy: SmallVec::new(),
            read_only: def.read_only,
            self_modified: false,
        }
    }

    /// Current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// User edit. Returns whether the value changed.
    ///
    /// Rejected (no-op) while the cell is read-only. An unequal value
    /// sets the self-modified flag.
    pub fn set_value(&mut self, value: Value) -> bool {
        self.write(value, &ChangeReason::User)
    }

    /// Write `value` for `reason`. Returns whether the value changed.
    ///
    /// Only user edits honour the read-only flag. Loads never set the
    /// self-modified flag.
    pub fn write(&mut self, value: Value, reason: &ChangeReason) -> bool {
        if self.read_only && *reason == ChangeReason::User {
            return false;
        }
        if self.value == value {
            return false;
        }
        self.value = value;
        if *reason != ChangeReason::Load {
            self.self_modified = true;
        }
        true
    }

    /// Replace the messages attributed to `rule`. Returns whether the
    /// cell's messages changed.
    ///
    /// An empty list clears the rule's prior messages. Messages of other
    /// rules are untouched.
    pub fn set_messages(&mut self, rule: &RuleId, list: Vec<RuleMessage>) -> bool {
        if list.is_empty() {
            return self.messages.shift_remove(rule).is_some();
        }
        match self.messages.get_mut(rule) {
            Some(existing) if *existing == list => false,
            Some(existing) => {
                *existing = list;
                true
            }
            None => {
                self.messages.insert(rule.clone(), list);
                true
            }
        }
    }

    /// All messages, grouped by rule in first-reported order.
    pub fn messages(&self) -> impl Iterator<Item = &RuleMessage> + '_ {
        self.messages.values().flatten()
    }

    /// Messages produced by one rule.
    pub fn messages_of(&self, rule: &RuleId) -> &[RuleMessage] {
        self.messages.get(rule).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any error-severity message is present.
    pub fn has_errors(&self) -> bool {
        self.messages().any(RuleMessage::is_error)
    }

    /// Mark the cell busy (or release it) for one execution token.
    /// Returns whether [`is_busy`](Self::is_busy) flipped.
    pub fn set_busy(&mut self, token: ExecutionToken, busy: bool) -> bool {
        let was = self.is_busy();
        if busy {
            if !self.busy.contains(&token) {
                self.busy.push(token);
            }
        } else {
            self.busy.retain(|t| *t != token);
        }
        was != self.is_busy()
    }

    /// Whether any execution holds the cell busy.
    pub fn is_busy(&self) -> bool {
        !self.busy.is_empty()
    }

    /// Number of executions holding the cell busy.
    pub fn busy_count(&self) -> usize {
        self.busy.len()
    }

    /// Whether user edits are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Toggle the read-only flag. Returns whether it changed.
    pub fn set_read_only(&mut self, read_only: bool) -> bool {
        let changed = self.read_only != read_only;
        self.read_only = read_only;
        changed
    }

    /// Whether the value was changed since the cell was last cleaned.
    pub fn is_self_modified(&self) -> bool {
        self.self_modified
    }

    /// Clear the self-modified flag. Returns whether it was set.
    pub fn mark_clean(&mut self) -> bool {
        std::mem::replace(&mut self.self_modified, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{PropertyId, Severity, ValueKind};

    fn cell() -> PropertyCell {
        PropertyCell::new(&PropertyDef::new("name", ValueKind::Text))
    }

    fn msg(rule: &str, severity: Severity, text: &str) -> RuleMessage {
        RuleMessage {
            rule: RuleId::from(rule),
            property: PropertyId(0),
            severity,
            text: text.to_owned(),
        }
    }

    #[test]
    fn set_value_marks_self_modified() {
        let mut c = cell();
        assert!(!c.set_value(Value::Null));
        assert!(!c.is_self_modified());
        assert!(c.set_value(Value::from("Ada")));
        assert!(c.is_self_modified());
        assert_eq!(c.value(), &Value::from("Ada"));
    }

    #[test]
    fn read_only_rejects_user_writes_only() {
        let mut c = cell();
        c.set_read_only(true);
        assert!(!c.set_value(Value::from("x")));
        assert_eq!(c.value(), &Value::Null);
        assert!(c.write(Value::from("derived"), &ChangeReason::Rule(RuleId::from("r"))));
        assert!(c.is_self_modified());
    }

    #[test]
    fn load_does_not_modify() {
        let mut c = cell();
        assert!(c.write(Value::from("loaded"), &ChangeReason::Load));
        assert!(!c.is_self_modified());
    }

    #[test]
    fn messages_replaced_per_rule() {
        let mut c = cell();
        let a = RuleId::from("a");
        let b = RuleId::from("b");
        assert!(c.set_messages(&a, vec![msg("a", Severity::Error, "bad")]));
        assert!(c.set_messages(&b, vec![msg("b", Severity::Warning, "meh")]));
        assert!(c.has_errors());
        assert!(!c.set_messages(&a, vec![msg("a", Severity::Error, "bad")]));

        assert!(c.set_messages(&a, Vec::new()));
        assert!(!c.has_errors());
        assert_eq!(c.messages().count(), 1);
        assert_eq!(c.messages_of(&b)[0].text, "meh");
        assert!(!c.set_messages(&a, Vec::new()));
    }

    #[test]
    fn busy_is_tracked_per_token() {
        let mut c = cell();
        let t1 = ExecutionToken::next();
        let t2 = ExecutionToken::next();
        assert!(c.set_busy(t1, true));
        assert!(!c.set_busy(t2, true));
        assert_eq!(c.busy_count(), 2);
        assert!(!c.set_busy(t1, false));
        assert!(c.is_busy());
        assert!(c.set_busy(t2, false));
        assert!(!c.is_busy());
    }

    #[test]
    fn mark_clean_reports_previous_flag() {
        let mut c = cell();
        c.set_value(Value::from("x"));
        assert!(c.mark_clean());
        assert!(!c.mark_clean());
    }
}
