use crate::error::Result;
use crate::resolve::RewritePlan;
use crate::table::ResourceTable;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EditSummary {
    /// Pools visited.
    pub pools: usize,
    /// Strings replaced across all pools.
    pub strings_rewritten: usize,
}

/// Points every string equal to a planned duplicate path at its canonical
/// path, in every string pool of the table. Pool arity never changes, so
/// string indices held by other chunks stay valid.
pub fn apply_plan(table: &mut ResourceTable, plan: &RewritePlan) -> Result<EditSummary> {
    let mut summary = EditSummary::default();
    if plan.is_empty() {
        return Ok(summary);
    }

    for pool in table.string_pools_mut() {
        summary.strings_rewritten += pool.rewrite(|s| plan.canonical_for(s));
        summary.pools += 1;
    }

    tracing::debug!(
        pools = summary.pools,
        rewritten = summary.strings_rewritten,
        "resource table references updated"
    );
    Ok(summary)
}
