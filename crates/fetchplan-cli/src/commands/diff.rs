//! `fetchplan diff`: semantic comparison of two plan files

use crate::input::read_structured;
use anyhow::Context;
use fetchplan_model::{plans_equal, FetchPlan};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

/// Item keys whose entries differ between `a` and `b`
#[must_use]
pub fn differing_items(a: &FetchPlan, b: &FetchPlan) -> Vec<String> {
    let keys: BTreeSet<&str> = a
        .items
        .iter()
        .chain(&b.items)
        .map(|i| i.item_key.as_str())
        .collect();
    keys.into_iter()
        .filter(|key| a.item(key) != b.item(key))
        .map(str::to_string)
        .collect()
}

/// Compare two plan files; exit status 1 when they differ
///
/// Creation time and diagnostics are ignored.
///
/// # Errors
/// Fails on unreadable or malformed plan files.
pub fn run(left: &Path, right: &Path, out: &mut dyn Write) -> anyhow::Result<u8> {
    let a: FetchPlan = read_structured(left).with_context(|| format!("loading plan {}", left.display()))?;
    let b: FetchPlan = read_structured(right).with_context(|| format!("loading plan {}", right.display()))?;
    let (a, b) = (a.canonicalise(), b.canonicalise());

    if plans_equal(&a, &b) {
        writeln!(out, "plans are equivalent ({} items)", a.items.len())?;
        return Ok(0);
    }

    writeln!(out, "plans differ")?;
    if a.version != b.version {
        writeln!(out, "  version: {} vs {}", a.version, b.version)?;
    }
    if a.reference_now != b.reference_now {
        writeln!(out, "  reference_now: {} vs {}", a.reference_now, b.reference_now)?;
    }
    if a.dsl != b.dsl {
        writeln!(out, "  dsl: {} vs {}", a.dsl, b.dsl)?;
    }
    for key in differing_items(&a, &b) {
        let side = match (a.item(&key), b.item(&key)) {
            (Some(_), None) => "only in first",
            (None, Some(_)) => "only in second",
            _ => "changed",
        };
        writeln!(out, "  {key}: {side}")?;
    }
    Ok(1)
}
