//! Atomicity scopes
//!
//! Every write in one scope shares a single retrieval timestamp. A scope is
//! a maximal run of consecutive fetch items with the same parameter, slice
//! family, mode and signature.

use fetchplan_model::{FetchPlanItem, TemporalMode};
use std::fmt;

/// Scope identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    /// Backing file id
    pub object_id: String,
    /// Slice family
    pub slice_family: String,
    /// Temporal mode
    pub mode: TemporalMode,
    /// Query signature
    pub query_signature: String,
}

impl ScopeKey {
    /// Scope of `item`
    #[must_use]
    pub fn of(item: &FetchPlanItem) -> Self {
        Self {
            object_id: item.object_id.clone(),
            slice_family: item.slice_family.clone(),
            mode: item.mode,
            query_signature: item.query_signature.clone(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.object_id, self.mode)?;
        if !self.slice_family.is_empty() {
            write!(f, ".{}", self.slice_family)?;
        }
        Ok(())
    }
}

/// Consecutive items sharing one scope
#[derive(Debug, Clone)]
pub struct Scope<'p> {
    /// Identity
    pub key: ScopeKey,
    /// Items in plan order
    pub items: Vec<&'p FetchPlanItem>,
}

/// Group `items` into scopes, preserving order
#[must_use]
pub fn group_scopes<'p, I>(items: I) -> Vec<Scope<'p>>
where
    I: IntoIterator<Item = &'p FetchPlanItem>,
{
    let mut scopes: Vec<Scope<'p>> = Vec::new();
    for item in items {
        let key = ScopeKey::of(item);
        match scopes.last_mut() {
            Some(last) if last.key == key => last.items.push(item),
            _ => scopes.push(Scope {
                key,
                items: vec![item],
            }),
        }
    }
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchplan_model::{DateRange, FetchWindow, ItemIdentity, SlotKind, WindowReason};

    fn item(object: &str, target: &str, slot: SlotKind) -> FetchPlanItem {
        let start = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        FetchPlanItem::fetch(
            ItemIdentity::parameter(object, target, slot, TemporalMode::Window).with_signature("s"),
            vec![FetchWindow::new(DateRange::single(start), WindowReason::Missing)],
        )
    }

    #[test]
    fn consecutive_items_share_scope() {
        let items = [
            item("p-a", "e1", SlotKind::Base),
            item("p-a", "e2", SlotKind::Base),
            item("p-b", "e3", SlotKind::Cost),
            item("p-a", "e4", SlotKind::Base),
        ];
        let scopes = group_scopes(items.iter());
        let sizes: Vec<usize> = scopes.iter().map(|s| s.items.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
        assert_eq!(scopes[0].key.to_string(), "p-a[window]");
    }
}
