// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! The garbage collector.
//!
//! A cycle runs four phases in order: mark (tri-color, explicit stack),
//! sweep (into a per-cycle collected set), optional compaction (slot slide
//! plus reference forwarding), and the weak phase (handle invalidation,
//! then kind-provider callbacks, which enqueue finalization cleanups onto
//! the microtask queue — never inline, so script can't observe a half-swept
//! heap).
//!
//! Ordering guarantees kept here: handle registration snapshots happen
//! before any validity flip; every flip completes before any provider
//! callback observes the heap; cleanup jobs land on the queue in
//! per-registry registration order.

use std::collections::{HashMap, HashSet};

use aerojs_shared::{GcStrategy, Generation};
use rayon::prelude::*;

use crate::context::Context;
use crate::gc::heap::Mark;
use crate::value::ObjRef;

pub mod heap;
pub(crate) mod trace;

pub use heap::Heap;

/// Collector tuning. Apart from `strategy` these map one-to-one onto the
/// knobs the embedder can reach.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Scheduling strategy.
    ///
    /// DEFAULT: `Generational`
    pub strategy: GcStrategy,

    /// Sweep regions on the rayon pool.
    ///
    /// DEFAULT: `false`
    pub parallel: bool,

    /// Verify heap integrity after every cycle. Corruption is fatal.
    ///
    /// DEFAULT: `false`
    pub debug: bool,

    /// Allow the compaction phase at all.
    ///
    /// DEFAULT: `true`
    pub compaction: bool,

    /// Pause-time target, advisory.
    ///
    /// DEFAULT: 10ms
    pub target_pause_ms: u64,

    /// Mutator-time fraction target, advisory.
    ///
    /// DEFAULT: 0.95
    pub target_throughput: f64,

    /// Young-generation byte threshold that requests a collection at the
    /// next safepoint.
    ///
    /// DEFAULT: 1 MiB
    pub young_threshold: usize,

    /// DEFAULT: 8 MiB
    pub middle_threshold: usize,

    /// DEFAULT: 64 MiB
    pub old_threshold: usize,

    /// Cycles an object must survive before moving one generation up.
    ///
    /// DEFAULT: 5
    pub promotion_age: u32,

    /// Live-bytes fraction of the memory limit that requests a collection.
    ///
    /// DEFAULT: 0.8
    pub memory_pressure_threshold: f64,

    /// Free-slot fraction above which the compactor runs.
    ///
    /// DEFAULT: 0.3
    pub fragmentation_threshold: f64,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            strategy: GcStrategy::Generational,
            parallel: false,
            debug: false,
            compaction: true,
            target_pause_ms: 10,
            target_throughput: 0.95,
            young_threshold: 1 << 20,
            middle_threshold: 8 << 20,
            old_threshold: 64 << 20,
            promotion_age: 5,
            memory_pressure_threshold: 0.8,
            fragmentation_threshold: 0.3,
        }
    }
}

impl GcConfig {
    pub fn set_strategy(&mut self, strategy: GcStrategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    pub fn enable_parallel(&mut self) -> &mut Self {
        self.parallel = true;
        self
    }

    pub fn enable_debug(&mut self) -> &mut Self {
        self.debug = true;
        self
    }

    pub fn set_promotion_age(&mut self, age: u32) -> &mut Self {
        self.promotion_age = age;
        self
    }

    pub fn set_young_threshold(&mut self, bytes: usize) -> &mut Self {
        self.young_threshold = bytes;
        self
    }
}

/// Cycle and lifetime counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    pub collections: u64,
    pub objects_collected: u64,
    pub bytes_collected: u64,
    pub objects_promoted: u64,
    pub compactions: u64,
    pub last_objects_collected: u64,
    pub last_bytes_collected: u64,
    pub last_pause_ms: f64,
    pub total_pause_ms: f64,
}

/// Run one full collection cycle.
pub(crate) fn collect(ctx: &mut Context) {
    if ctx.gc_in_progress {
        return;
    }
    ctx.gc_in_progress = true;
    let started = minstant::Instant::now();

    // Pre-GC: snapshot the handle tables before any flip can happen.
    ctx.handles.prepare_for_gc();

    mark(ctx);
    let (collected, bytes_freed) = sweep(ctx);

    // Invalidate weak handles for everything the sweep collected. Dead
    // slots are detached from the handle tables here, which is what makes
    // the index reuse during compaction safe.
    ctx.handles.after_gc(&collected);

    maybe_compact(ctx);

    // Post-GC: kind providers observe the settled heap. WeakRefs update
    // their fast-path flags, registries enqueue cleanup microtasks, weak
    // collections drop dead entries.
    let providers = ctx.handles.providers();
    if !providers.is_empty() {
        let provider_of = |kind| {
            providers
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|&(_, provider)| provider)
        };
        let live: Vec<(ObjRef, crate::handle::KindProvider)> = ctx
            .heap
            .live_refs()
            .into_iter()
            .filter_map(|r| {
                let kind = ctx.heap.get(r).expect("live ref").kind;
                provider_of(kind).map(|p| (r, p))
            })
            .collect();
        for (obj, provider) in live {
            provider(ctx, obj);
        }
    }

    if ctx.config.gc.debug {
        verify_heap_integrity(ctx);
    }

    let pause_ms = started.elapsed().as_secs_f64() * 1e3;
    let stats = &mut ctx.gc_stats;
    stats.collections += 1;
    stats.last_objects_collected = collected.len() as u64;
    stats.last_bytes_collected = bytes_freed as u64;
    stats.objects_collected += collected.len() as u64;
    stats.bytes_collected += bytes_freed as u64;
    stats.last_pause_ms = pause_ms;
    stats.total_pause_ms += pause_ms;
    ctx.heap.bytes_since_collect = 0;
    ctx.limiter.set_heap_usage(ctx.heap.live_bytes());
    ctx.gc_in_progress = false;

    if pause_ms > ctx.config.gc.target_pause_ms as f64 {
        log::debug!(
            "gc cycle exceeded pause target: {:.2}ms > {}ms",
            pause_ms,
            ctx.config.gc.target_pause_ms
        );
    }
    log::trace!(
        "gc cycle: collected {} objects ({} bytes), {} live",
        collected.len(),
        bytes_freed,
        ctx.heap.live_objects()
    );
}

/// Tri-color mark from the root set.
fn mark(ctx: &mut Context) {
    for slot in &mut ctx.heap.slots {
        slot.meta.mark = Mark::White;
    }

    // Gather the root set: the explicit root and global-handle lists, the
    // scope chain, call-temporary values, intrinsics, pending rejections,
    // and everything reachable from queued microtasks.
    let mut roots: Vec<ObjRef> = Vec::new();
    roots.extend(ctx.roots.iter().copied());
    roots.extend(ctx.global_handles.iter().copied());
    roots.extend(ctx.scope_stack.iter().copied());
    roots.extend(ctx.temp_roots.iter().filter_map(|v| v.as_object()));
    roots.extend(ctx.intrinsics.iter());
    roots.extend(ctx.pending_rejections.iter().copied());
    ctx.microtasks.trace(|value| {
        if let Some(r) = value.as_object() {
            roots.push(r);
        }
    });
    // Permanent objects are never collected; treat them as roots so
    // whatever they reference stays live.
    for r in ctx.heap.live_refs() {
        if ctx.heap.meta(r).expect("live ref").generation == Generation::Permanent {
            roots.push(r);
        }
    }

    let mut gray: Vec<ObjRef> = Vec::new();
    for r in roots {
        if let Some(meta) = ctx.heap.meta_mut(r) {
            if meta.mark == Mark::White {
                meta.mark = Mark::Gray;
                gray.push(r);
            }
        }
    }

    while let Some(r) = gray.pop() {
        if let Some(meta) = ctx.heap.meta_mut(r) {
            meta.mark = Mark::Black;
        }
        let mut children = Vec::new();
        if let Some(obj) = ctx.heap.get(r) {
            trace::visit_children(obj, &mut |child| children.push(child));
        }
        for child in children {
            if let Some(meta) = ctx.heap.meta_mut(child) {
                if meta.mark == Mark::White {
                    meta.mark = Mark::Gray;
                    gray.push(child);
                }
            }
        }
    }
}

/// Free every unmarked object, aging and promoting survivors.
fn sweep(ctx: &mut Context) -> (HashSet<ObjRef>, usize) {
    let promotion_age = ctx.config.gc.promotion_age;
    let parallel = ctx.config.gc.parallel
        || ctx.config.gc.strategy == GcStrategy::Parallel
        || ctx.config.gc.strategy == GcStrategy::Concurrent;

    let dead_of = |(index, slot): (usize, &heap::Slot)| -> Option<ObjRef> {
        if slot.object.is_some()
            && slot.meta.mark == Mark::White
            && slot.meta.generation != Generation::Permanent
        {
            Some(ObjRef(index as u32))
        } else {
            None
        }
    };
    let dead: Vec<ObjRef> = if parallel {
        ctx.heap
            .slots
            .par_iter()
            .enumerate()
            .filter_map(dead_of)
            .collect()
    } else {
        ctx.heap.slots.iter().enumerate().filter_map(dead_of).collect()
    };

    let mut bytes_freed = 0usize;
    let mut collected = HashSet::with_capacity(dead.len());
    for r in dead {
        if let Some(size) = ctx.heap.free_slot(r) {
            bytes_freed += size;
            collected.insert(r);
        }
    }

    // Age the survivors.
    let mut promoted = 0u64;
    for r in ctx.heap.live_refs() {
        let meta = ctx.heap.meta_mut(r).expect("live ref");
        meta.age += 1;
        if meta.age > promotion_age && meta.generation != Generation::Permanent {
            let size = meta.size;
            let from = meta.generation;
            meta.generation = from.promoted();
            meta.age = 0;
            let to = meta.generation;
            ctx.heap.bytes_by_generation[from as usize] =
                ctx.heap.bytes_by_generation[from as usize].saturating_sub(size);
            ctx.heap.bytes_by_generation[to as usize] += size;
            promoted += 1;
        }
    }
    ctx.gc_stats.objects_promoted += promoted;

    (collected, bytes_freed)
}

/// Compact the arena when fragmentation crosses the configured threshold,
/// forwarding every reference through the move map.
fn maybe_compact(ctx: &mut Context) {
    let config = &ctx.config.gc;
    if !config.compaction || config.strategy == GcStrategy::Conservative {
        return;
    }
    if ctx.heap.fragmentation() <= config.fragmentation_threshold {
        return;
    }

    // Objects the embedder can hold by reference are pinned in place;
    // everything else may slide.
    let pinned: HashSet<ObjRef> = ctx
        .roots
        .iter()
        .chain(ctx.global_handles.iter())
        .chain(ctx.scope_stack.iter())
        .copied()
        .chain(ctx.temp_roots.iter().filter_map(|v| v.as_object()))
        .chain(ctx.intrinsics.iter())
        .collect();
    let moves_list = ctx.heap.compact(&pinned);
    if moves_list.is_empty() {
        return;
    }
    let moves: HashMap<ObjRef, ObjRef> = moves_list.into_iter().collect();
    let fwd = |r: ObjRef| moves.get(&r).copied().unwrap_or(r);

    for r in ctx.heap.live_refs() {
        let obj = ctx.heap.get_mut(r).expect("live ref");
        trace::forward_children(obj, &fwd);
    }
    for root in ctx.roots.iter_mut().chain(ctx.global_handles.iter_mut()) {
        *root = fwd(*root);
    }
    for scope in &mut ctx.scope_stack {
        *scope = fwd(*scope);
    }
    for value in &mut ctx.temp_roots {
        if let crate::value::Value::Object(r) = value {
            *r = fwd(*r);
        }
    }
    ctx.intrinsics.forward(&fwd);
    for p in &mut ctx.pending_rejections {
        *p = fwd(*p);
    }
    ctx.microtasks.forward(|value| {
        if let crate::value::Value::Object(r) = value {
            *r = fwd(*r);
        }
    });
    ctx.handles.forward_targets(&moves);

    ctx.gc_stats.compactions += 1;
    log::trace!("gc compaction moved {} objects", moves.len());
}

/// Walk the live graph checking that every edge lands on a live slot.
/// A broken edge means the heap is corrupt, which is not recoverable.
fn verify_heap_integrity(ctx: &Context) {
    for r in ctx.heap.live_refs() {
        let obj = ctx.heap.get(r).expect("live ref");
        let mut broken = None;
        trace::visit_children(obj, &mut |child| {
            if broken.is_none() && !ctx.heap.contains(child) {
                broken = Some(child);
            }
        });
        if let Some(child) = broken {
            log::error!("heap integrity violation: {r} references freed slot {child}");
            panic!("heap integrity violation: {r} references freed slot {child}");
        }
    }
}
