//! Break/continue bookkeeping for loops, switches and selects.

use rustc_hash::FxHashMap;

use moonlift_core::ObjectId;

use crate::emit::CodeWriter;
use crate::machine::CaseTarget;

/// Where a `break` or `continue` goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Jump {
    /// A `goto` label inside a normally emitted construct.
    Label(String),
    /// A case of the enclosing flattened function.
    Case(CaseTarget),
}

/// Targets of one breakable construct.
///
/// For a flattened loop, `continue_to` and `break_to` are the begin and end
/// cases of the `[begin, end)` range the loop occupies, and `post` holds the
/// loop's post statement, which runs before every jump back to the test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowData {
    pub break_to: Jump,
    pub continue_to: Option<Jump>,
    pub post: Option<CodeWriter>,
}

impl FlowData {
    pub fn labels(break_label: String, continue_label: Option<String>) -> Self {
        Self {
            break_to: Jump::Label(break_label),
            continue_to: continue_label.map(Jump::Label),
            post: None,
        }
    }

    pub fn cases(begin: Option<CaseTarget>, end: CaseTarget, post: Option<CodeWriter>) -> Self {
        Self {
            break_to: Jump::Case(end),
            continue_to: begin.map(Jump::Case),
            post,
        }
    }
}

/// The constructs in scope, keyed by label (`None` for the innermost).
#[derive(Debug, Default)]
pub struct FlowTable {
    entries: FxHashMap<Option<ObjectId>, FlowData>,
}

/// Entries displaced by [`FlowTable::enter`], restored by
/// [`FlowTable::leave`].
#[derive(Debug)]
pub struct FlowScope(Vec<(Option<ObjectId>, Option<FlowData>)>);

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: Option<ObjectId>) -> Option<&FlowData> {
        self.entries.get(&label)
    }

    /// Register `data` as the innermost construct, and under `label` when
    /// the construct is labeled.
    ///
    /// Switches and selects have no `continue` of their own: they inherit the
    /// innermost loop's, so an unlabeled `continue` inside one still reaches
    /// the loop.
    pub fn enter(&mut self, label: Option<ObjectId>, mut data: FlowData) -> FlowScope {
        if data.continue_to.is_none() {
            if let Some(outer) = self.entries.get(&None) {
                data.continue_to = outer.continue_to.clone();
                data.post = outer.post.clone();
            }
        }
        let mut saved = Vec::with_capacity(2);
        if label.is_some() {
            saved.push((label, self.entries.insert(label, data.clone())));
        }
        saved.push((None, self.entries.insert(None, data)));
        FlowScope(saved)
    }

    pub fn leave(&mut self, scope: FlowScope) {
        for (key, previous) in scope.0.into_iter().rev() {
            match previous {
                Some(data) => {
                    self.entries.insert(key, data);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_and_labeled_entries() {
        let mut table = FlowTable::new();
        let outer_label = ObjectId::new(1);
        let outer = table.enter(
            Some(outer_label),
            FlowData::labels("__brk_1".into(), Some("__cont_1".into())),
        );
        let inner = table.enter(None, FlowData::labels("__brk_2".into(), Some("__cont_2".into())));

        assert_eq!(table.get(None).unwrap().break_to, Jump::Label("__brk_2".into()));
        assert_eq!(
            table.get(Some(outer_label)).unwrap().break_to,
            Jump::Label("__brk_1".into())
        );

        table.leave(inner);
        assert_eq!(table.get(None).unwrap().break_to, Jump::Label("__brk_1".into()));
        table.leave(outer);
        assert!(table.get(None).is_none());
        assert!(table.get(Some(outer_label)).is_none());
    }

    #[test]
    fn switch_inherits_loop_continue() {
        let mut table = FlowTable::new();
        let lp = table.enter(None, FlowData::labels("__brk_1".into(), Some("__cont_1".into())));
        let sw = table.enter(None, FlowData::labels("__brk_2".into(), None));
        let data = table.get(None).unwrap();
        assert_eq!(data.break_to, Jump::Label("__brk_2".into()));
        assert_eq!(data.continue_to, Some(Jump::Label("__cont_1".into())));
        table.leave(sw);
        table.leave(lp);
    }
}
