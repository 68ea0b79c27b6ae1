// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Weak handles and their registry.
//!
//! A [`WeakHandle`] never keeps its target alive. The handle manager owns
//! the bookkeeping that lets the collector flip validity bits after a
//! sweep; handles themselves are freely clonable, and every clone shares
//! the same target and validity cells.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use aerojs_shared::sys::HANDLE_CLEANUP_INTERVAL;

use crate::context::Context;
use crate::object::ObjectKind;
use crate::value::ObjRef;

const NO_TARGET: u32 = u32::MAX;

/// A weak reference to a heap object: a target cell plus a validity bit.
///
/// The validity bit transitions true→false exactly once, at GC time, and
/// never back. The owning WeakRef/registry may additionally [`reset`] the
/// handle early.
///
/// [`reset`]: WeakHandle::reset
#[derive(Debug, Clone)]
pub struct WeakHandle {
    target: Arc<AtomicU32>,
    alive: Arc<AtomicBool>,
}

impl WeakHandle {
    fn dead() -> Self {
        WeakHandle {
            target: Arc::new(AtomicU32::new(NO_TARGET)),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cheap fast path: a relaxed-ordering atomic read.
    pub fn is_valid(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// The target, while it is still alive.
    pub fn target(&self) -> Option<ObjRef> {
        if !self.is_valid() {
            return None;
        }
        match self.target.load(Ordering::Acquire) {
            NO_TARGET => None,
            index => Some(ObjRef(index)),
        }
    }

    /// Drop the target early (used by `WeakRef` clearing). Idempotent.
    pub fn reset(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// A kind-specific post-GC notification hook. Registered once per weak-aware
/// kind (WeakRef, FinalizationRegistry, weak collections); the collector
/// calls it for every live object of that kind after validity bits settle.
pub type KindProvider = fn(&mut Context, ObjRef);

/// Counters exposed for diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleStats {
    pub registrations: u64,
    pub invalidations: u64,
    pub cleanups: u64,
    pub live: u64,
}

struct HandleSlot {
    target: Weak<AtomicU32>,
    alive: Weak<AtomicBool>,
}

/// Registry of live weak handles, owned by the context.
#[derive(Default)]
pub struct HandleManager {
    table: HashMap<ObjRef, Vec<HandleSlot>>,
    providers: Vec<(ObjectKind, KindProvider)>,
    /// Cache of recent target-validity answers; cleared at GC boundaries.
    cache: HashMap<ObjRef, bool>,
    stats: HandleStats,
    registrations_since_sweep: u64,
    invalidations_at_gc_start: u64,
}

impl HandleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a handle. A `None` target yields a handle that is already
    /// invalid. Never fails.
    pub fn create_weak_handle(&mut self, target: Option<ObjRef>) -> WeakHandle {
        self.stats.registrations += 1;
        let Some(target) = target else {
            return WeakHandle::dead();
        };

        let handle = WeakHandle {
            target: Arc::new(AtomicU32::new(target.0)),
            alive: Arc::new(AtomicBool::new(true)),
        };
        self.table.entry(target).or_default().push(HandleSlot {
            target: Arc::downgrade(&handle.target),
            alive: Arc::downgrade(&handle.alive),
        });
        self.stats.live += 1;

        self.registrations_since_sweep += 1;
        if self.registrations_since_sweep >= HANDLE_CLEANUP_INTERVAL {
            self.sweep_dropped();
        }
        handle
    }

    /// Install a post-GC notification hook for a kind. Re-registering a
    /// kind replaces the previous hook.
    pub fn register_provider(&mut self, kind: ObjectKind, provider: KindProvider) {
        match self.providers.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, slot)) => *slot = provider,
            None => self.providers.push((kind, provider)),
        }
    }

    pub(crate) fn providers(&self) -> Vec<(ObjectKind, KindProvider)> {
        self.providers.clone()
    }

    /// Cheap validity query. Unknown or dropped handles answer `false`.
    pub fn is_valid(&self, handle: &WeakHandle) -> bool {
        handle.is_valid()
    }

    /// Whether any live handle still points at `target`. Memoized until the
    /// next GC boundary.
    pub fn is_target_tracked(&mut self, target: ObjRef) -> bool {
        if let Some(&answer) = self.cache.get(&target) {
            return answer;
        }
        let answer = self
            .table
            .get(&target)
            .map(|slots| {
                slots.iter().any(|slot| {
                    slot.alive
                        .upgrade()
                        .is_some_and(|alive| alive.load(Ordering::Acquire))
                })
            })
            .unwrap_or(false);
        self.cache.insert(target, answer);
        answer
    }

    /// Called by the collector before a cycle starts.
    pub fn prepare_for_gc(&mut self) {
        self.cache.clear();
        self.invalidations_at_gc_start = self.stats.invalidations;
    }

    /// Called by the collector after sweep: every handle whose target was
    /// collected becomes invalid, exactly once.
    pub fn after_gc(&mut self, collected: &HashSet<ObjRef>) {
        for target in collected {
            let Some(slots) = self.table.remove(target) else {
                continue;
            };
            for slot in slots {
                if let Some(alive) = slot.alive.upgrade() {
                    if alive.swap(false, Ordering::AcqRel) {
                        self.stats.invalidations += 1;
                        self.stats.live = self.stats.live.saturating_sub(1);
                    }
                }
            }
        }
        self.cache.clear();
        log::trace!(
            "handle manager: {} invalidations this cycle, {} live",
            self.stats.invalidations - self.invalidations_at_gc_start,
            self.stats.live
        );
    }

    /// Rewrite handle targets after compaction moved objects.
    pub(crate) fn forward_targets(&mut self, moves: &HashMap<ObjRef, ObjRef>) {
        if moves.is_empty() {
            return;
        }
        let mut rebuilt: HashMap<ObjRef, Vec<HandleSlot>> = HashMap::with_capacity(self.table.len());
        for (target, slots) in self.table.drain() {
            let new_target = moves.get(&target).copied().unwrap_or(target);
            if new_target != target {
                for slot in &slots {
                    if let Some(cell) = slot.target.upgrade() {
                        cell.store(new_target.0, Ordering::Release);
                    }
                }
            }
            rebuilt.entry(new_target).or_default().extend(slots);
        }
        self.table = rebuilt;
        self.cache.clear();
    }

    /// Drop bookkeeping for handles whose owners went away.
    fn sweep_dropped(&mut self) {
        let mut removed = 0u64;
        self.table.retain(|_, slots| {
            slots.retain(|slot| {
                let live = slot.alive.upgrade().is_some();
                if !live {
                    removed += 1;
                }
                live
            });
            !slots.is_empty()
        });
        self.stats.cleanups += removed;
        self.stats.live = self.stats.live.saturating_sub(removed);
        self.registrations_since_sweep = 0;
    }

    pub fn stats(&self) -> HandleStats {
        self.stats
    }
}
