//! The result aggregator (spec §4.10): fingerprint dedup, cross-source
//! preference between direct and aggregate catalog sources, and
//! hierarchical system/branch summarization with availability ordering.

use std::collections::{HashMap, HashSet};

use libfed_domain::{BookHolding, BranchId, SystemId};

/// Availability totals shared by both system- and branch-level groups
/// (spec §4.10 "Grouping"): `copyCount ?? 1` for every sum that counts
/// copies, `holdCount` summed only over holdings that report one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub total_copies: u32,
    pub total_available: u32,
    pub checked_out_copies: u32,
    pub hold_count: u32,
}

impl Totals {
    fn accumulate(&mut self, holding: &BookHolding) {
        let copies = holding.copy_count.unwrap_or(1);
        self.total_copies += copies;
        match holding.status {
            libfed_domain::Status::Available => self.total_available += copies,
            libfed_domain::Status::CheckedOut => self.checked_out_copies += copies,
            _ => {}
        }
        if let Some(holds) = holding.hold_count {
            self.hold_count += holds;
        }
    }
}

#[derive(Debug, Clone)]
pub struct BranchGroup {
    pub branch_id: BranchId,
    pub branch_name: String,
    pub holdings: Vec<BookHolding>,
    pub totals: Totals,
}

#[derive(Debug, Clone)]
pub struct SystemGroup {
    pub system_id: SystemId,
    pub system_name: String,
    pub branches: Vec<BranchGroup>,
    pub totals: Totals,
}

#[derive(Debug, Clone)]
pub struct AggregatedResult {
    pub holdings: Vec<BookHolding>,
    pub systems: Vec<SystemGroup>,
    pub total_copies: u32,
    pub total_available: u32,
}

/// Run the full spec §4.10 pipeline: dedup, cross-source preference,
/// grouping, and ordering.
pub fn aggregate(holdings: Vec<BookHolding>) -> AggregatedResult {
    let deduped = dedup_by_fingerprint(holdings);
    let preferred = apply_cross_source_preference(deduped);
    let systems = group_and_order(&preferred);

    let total_copies = systems.iter().map(|s| s.totals.total_copies).sum();
    let total_available = systems.iter().map(|s| s.totals.total_available).sum();

    AggregatedResult {
        holdings: preferred,
        systems,
        total_copies,
        total_available,
    }
}

/// Keep the first occurrence of each fingerprint, discard the rest.
fn dedup_by_fingerprint(holdings: Vec<BookHolding>) -> Vec<BookHolding> {
    let mut seen = HashSet::new();
    holdings.into_iter().filter(|h| seen.insert(h.fingerprint.clone())).collect()
}

/// For each system with at least one direct-source holding, drop every
/// aggregate-source holding for that system (spec §4.10 "Cross-source
/// preference"). Systems with only aggregate-source holdings keep them.
fn apply_cross_source_preference(holdings: Vec<BookHolding>) -> Vec<BookHolding> {
    let mut has_direct: HashMap<SystemId, bool> = HashMap::new();
    for h in &holdings {
        if !h.is_aggregate_source() {
            has_direct.insert(h.system_id.clone(), true);
        }
    }

    holdings
        .into_iter()
        .filter(|h| !(h.is_aggregate_source() && has_direct.get(&h.system_id).copied().unwrap_or(false)))
        .collect()
}

/// Partition by system then branch, compute totals at both levels, and
/// order descending by `totalAvailable` / `totalCopies` / name ascending
/// (spec §4.10 "Ordering").
fn group_and_order(holdings: &[BookHolding]) -> Vec<SystemGroup> {
    let mut by_system: HashMap<SystemId, (String, Vec<BookHolding>)> = HashMap::new();
    for h in holdings {
        by_system.entry(h.system_id.clone()).or_insert_with(|| (h.system_name.clone(), Vec::new())).1.push(h.clone());
    }

    let mut systems: Vec<SystemGroup> = by_system
        .into_iter()
        .map(|(system_id, (system_name, system_holdings))| {
            let mut by_branch: HashMap<BranchId, (String, Vec<BookHolding>)> = HashMap::new();
            for h in &system_holdings {
                by_branch.entry(h.branch_id.clone()).or_insert_with(|| (h.branch_name.clone(), Vec::new())).1.push(h.clone());
            }

            let mut branches: Vec<BranchGroup> = by_branch
                .into_iter()
                .map(|(branch_id, (branch_name, branch_holdings))| {
                    let mut totals = Totals::default();
                    for h in &branch_holdings {
                        totals.accumulate(h);
                    }
                    BranchGroup {
                        branch_id,
                        branch_name,
                        holdings: branch_holdings,
                        totals,
                    }
                })
                .collect();
            branches.sort_by(branch_order);

            let mut totals = Totals::default();
            for h in &system_holdings {
                totals.accumulate(h);
            }

            SystemGroup {
                system_id,
                system_name,
                branches,
                totals,
            }
        })
        .collect();

    systems.sort_by(system_order);
    systems
}

fn system_order(a: &SystemGroup, b: &SystemGroup) -> std::cmp::Ordering {
    b.totals
        .total_available
        .cmp(&a.totals.total_available)
        .then_with(|| b.totals.total_copies.cmp(&a.totals.total_copies))
        .then_with(|| a.system_name.cmp(&b.system_name))
}

fn branch_order(a: &BranchGroup, b: &BranchGroup) -> std::cmp::Ordering {
    b.totals
        .total_available
        .cmp(&a.totals.total_available)
        .then_with(|| b.totals.total_copies.cmp(&a.totals.total_copies))
        .then_with(|| a.branch_name.cmp(&b.branch_name))
}
