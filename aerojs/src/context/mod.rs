// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! The engine context: one value owning the heap, the collector state, the
//! handle manager, the intern tables and the microtask queue. Everything
//! that was a process-wide singleton in older engines is a field here.

use std::collections::HashMap;

use aerojs_shared::{ErrorKind, GcStrategy};
use derive_more::{Deref, DerefMut};
use num_bigint::BigInt;
use num_traits::Zero;

use crate::error::{ExecutionError, Result};
use crate::externs::{Externs, NoopExterns};
use crate::funcs::{FunctionPayload, NativeFn};
use crate::gc::{self, GcConfig, GcStats, Heap};
use crate::handle::{HandleManager, HandleStats};
use crate::limiter::{ExecutionLimits, LimitTracker};
use crate::microtask::{Job, MicrotaskQueue};
use crate::object::{Object, ObjectKind, Payload, PropertyDescriptor};
use crate::value::{BigIntId, ObjRef, StringId, SymbolId, Value};

mod bootstrap;
mod wasm_api;

pub use wasm_api::{GlobalDescriptor, MemoryDescriptor, TableDescriptor};

/// Engine-wide settings.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Collector tuning.
    pub gc: GcConfig,

    /// Execution resource caps.
    pub limits: ExecutionLimits,
}

/// Per-context settings: the engine-wide configuration plus context-local
/// toggles.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct ContextConfig {
    /// Engine-wide settings.
    #[deref]
    #[deref_mut]
    pub engine: EngineConfig,

    /// Evaluate scripts in strict mode by default.
    ///
    /// DEFAULT: `false`
    pub strict: bool,

    /// Locale tag handed to locale-sensitive builtins.
    ///
    /// DEFAULT: "en-US"
    pub locale: String,

    /// Permit shared-memory objects.
    ///
    /// DEFAULT: `false`
    pub shared_memory: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            engine: EngineConfig::default(),
            strict: false,
            locale: "en-US".to_string(),
            shared_memory: false,
        }
    }
}

impl ContextConfig {
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) -> &mut Self {
        self.locale = locale.into();
        self
    }

    pub fn enable_shared_memory(&mut self) -> &mut Self {
        self.shared_memory = true;
        self
    }
}

/// Append-only content-interned string storage.
#[derive(Debug, Default)]
pub(crate) struct StringTable {
    items: Vec<Box<str>>,
    index: HashMap<Box<str>, u32>,
}

impl StringTable {
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&i) = self.index.get(s) {
            return StringId(i);
        }
        let i = self.items.len() as u32;
        self.items.push(s.into());
        self.index.insert(s.into(), i);
        StringId(i)
    }

    pub fn get(&self, id: StringId) -> &str {
        &self.items[id.0 as usize]
    }

    /// Id of an already-interned string, without interning.
    pub fn lookup(&self, s: &str) -> Option<StringId> {
        self.index.get(s).map(|&i| StringId(i))
    }
}

#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    descriptions: Vec<Option<StringId>>,
}

impl SymbolTable {
    pub fn new_symbol(&mut self, description: Option<StringId>) -> SymbolId {
        self.descriptions.push(description);
        SymbolId((self.descriptions.len() - 1) as u32)
    }

    pub fn description(&self, id: SymbolId) -> Option<StringId> {
        self.descriptions.get(id.0 as usize).copied().flatten()
    }
}

#[derive(Debug, Default)]
pub(crate) struct BigIntTable {
    items: Vec<BigInt>,
}

impl BigIntTable {
    pub fn alloc(&mut self, value: BigInt) -> BigIntId {
        self.items.push(value);
        BigIntId((self.items.len() - 1) as u32)
    }

    pub fn get(&self, id: BigIntId) -> &BigInt {
        &self.items[id.0 as usize]
    }
}

/// The bootstrap-created prototype objects and the global object. All of
/// them are GC roots.
#[derive(Debug)]
pub struct Intrinsics {
    pub global: ObjRef,
    pub object_prototype: ObjRef,
    pub function_prototype: ObjRef,
    pub array_prototype: ObjRef,
    pub error_prototype: ObjRef,
    pub error_prototypes: [(ErrorKind, ObjRef); 7],
    pub promise_prototype: ObjRef,
    pub weakref_prototype: ObjRef,
    pub finalization_registry_prototype: ObjRef,
}

impl Intrinsics {
    fn placeholder() -> Self {
        let nil = ObjRef(0);
        Intrinsics {
            global: nil,
            object_prototype: nil,
            function_prototype: nil,
            array_prototype: nil,
            error_prototype: nil,
            error_prototypes: [
                (ErrorKind::Type, nil),
                (ErrorKind::Reference, nil),
                (ErrorKind::Syntax, nil),
                (ErrorKind::Range, nil),
                (ErrorKind::Uri, nil),
                (ErrorKind::Eval, nil),
                (ErrorKind::Aggregate, nil),
            ],
            promise_prototype: nil,
            weakref_prototype: nil,
            finalization_registry_prototype: nil,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = ObjRef> + '_ {
        [
            self.global,
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.error_prototype,
            self.promise_prototype,
            self.weakref_prototype,
            self.finalization_registry_prototype,
        ]
        .into_iter()
        .chain(self.error_prototypes.iter().map(|(_, r)| *r))
    }

    pub(crate) fn forward(&mut self, fwd: &impl Fn(ObjRef) -> ObjRef) {
        self.global = fwd(self.global);
        self.object_prototype = fwd(self.object_prototype);
        self.function_prototype = fwd(self.function_prototype);
        self.array_prototype = fwd(self.array_prototype);
        self.error_prototype = fwd(self.error_prototype);
        for (_, r) in &mut self.error_prototypes {
            *r = fwd(*r);
        }
        self.promise_prototype = fwd(self.promise_prototype);
        self.weakref_prototype = fwd(self.weakref_prototype);
        self.finalization_registry_prototype = fwd(self.finalization_registry_prototype);
    }

    pub(crate) fn error_prototype_for(&self, kind: ErrorKind) -> ObjRef {
        self.error_prototypes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, r)| *r)
            .unwrap_or(self.error_prototype)
    }
}

/// A JS execution context.
pub struct Context {
    pub(crate) config: ContextConfig,
    pub(crate) heap: Heap,
    pub(crate) handles: HandleManager,
    pub(crate) microtasks: MicrotaskQueue,
    pub(crate) strings: StringTable,
    pub(crate) symbols: SymbolTable,
    pub(crate) bigints: BigIntTable,
    pub(crate) roots: Vec<ObjRef>,
    pub(crate) global_handles: Vec<ObjRef>,
    pub(crate) scope_stack: Vec<ObjRef>,
    pub(crate) temp_roots: Vec<Value>,
    pub(crate) pending_rejections: Vec<ObjRef>,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) limiter: LimitTracker,
    pub(crate) externs: Box<dyn Externs>,
    pub(crate) gc_stats: GcStats,
    pub(crate) gc_in_progress: bool,
    pub(crate) gc_requested: bool,
    pub(crate) call_depth: u32,
}

impl Context {
    /// Create a context with the given configuration and host hooks.
    pub fn new(config: ContextConfig, externs: Box<dyn Externs>) -> Result<Self> {
        let limiter = LimitTracker::new(config.limits);
        let mut ctx = Context {
            config,
            heap: Heap::new(),
            handles: HandleManager::new(),
            microtasks: MicrotaskQueue::new(),
            strings: StringTable::default(),
            symbols: SymbolTable::default(),
            bigints: BigIntTable::default(),
            roots: Vec::new(),
            global_handles: Vec::new(),
            scope_stack: Vec::new(),
            temp_roots: Vec::new(),
            pending_rejections: Vec::new(),
            intrinsics: Intrinsics::placeholder(),
            limiter,
            externs,
            gc_stats: GcStats::default(),
            gc_in_progress: false,
            gc_requested: false,
            call_depth: 0,
        };
        bootstrap::init(&mut ctx)?;
        Ok(ctx)
    }

    /// Default configuration, no host hooks. The usual test entry point.
    pub fn with_defaults() -> Self {
        Self::new(ContextConfig::default(), Box::new(NoopExterns))
            .expect("default context bootstrap cannot exhaust limits")
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn global_object(&self) -> ObjRef {
        self.intrinsics.global
    }

    pub fn gc_stats(&self) -> GcStats {
        self.gc_stats
    }

    /// Live heap bytes by the coarse accounting estimate.
    pub fn heap_bytes(&self) -> usize {
        self.heap.live_bytes()
    }

    pub fn live_objects(&self) -> usize {
        self.heap.live_objects()
    }

    /// Kind tag of a live object.
    pub fn object_kind(&self, r: ObjRef) -> Option<ObjectKind> {
        self.heap.get(r).map(|o| o.kind)
    }

    /// Error subkind, for objects of kind Error.
    pub fn error_kind_of(&self, r: ObjRef) -> Option<ErrorKind> {
        match self.heap.get(r).map(|o| &o.payload) {
            Some(Payload::Error(kind)) => Some(*kind),
            _ => None,
        }
    }

    /// Generation a live object currently sits in.
    pub fn object_generation(&self, r: ObjRef) -> Option<aerojs_shared::Generation> {
        self.heap.meta(r).map(|m| m.generation)
    }

    pub fn handle_stats(&self) -> HandleStats {
        self.handles.stats()
    }

    // ---- allocation ----------------------------------------------------

    /// Allocate a heap object. On memory pressure one forced collection
    /// runs before the allocation is refused.
    pub(crate) fn alloc(&mut self, object: Object) -> Result<ObjRef> {
        let size = object.size_estimate();
        if self.limiter.charge_allocation(size).is_err() {
            gc::collect(self);
            self.limiter.charge_allocation(size)?;
        }
        let r = self.heap.allocate(object);
        if self.heap.bytes_since_collect > self.config.gc.young_threshold {
            // Collection is deferred to the next microtask-drain safepoint;
            // a turn never observes a collection it did not ask for.
            self.gc_requested = true;
        }
        Ok(r)
    }

    /// A plain `{}` object.
    pub fn new_object(&mut self) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        self.alloc(Object::ordinary(Some(proto)))
    }

    pub fn new_object_with_proto(&mut self, proto: Option<ObjRef>) -> Result<ObjRef> {
        self.alloc(Object::ordinary(proto))
    }

    pub fn new_array(&mut self, elements: Vec<Value>) -> Result<ObjRef> {
        let proto = self.intrinsics.array_prototype;
        let mut obj = Object::new(ObjectKind::Array, Some(proto), Payload::Array(elements));
        obj.class_name = Some("Array");
        self.alloc(obj)
    }

    pub fn new_function(
        &mut self,
        name: &str,
        arity: u32,
        native: NativeFn,
        captures: Vec<Value>,
    ) -> Result<ObjRef> {
        let name = self.intern(name);
        let proto = self.intrinsics.function_prototype;
        let payload = Payload::Function(FunctionPayload {
            name,
            arity,
            native,
            captures,
            bound: None,
        });
        let mut obj = Object::new(ObjectKind::Function, Some(proto), payload);
        obj.class_name = Some("Function");
        self.alloc(obj)
    }

    /// A proxy over `target` with the given trap handler.
    pub fn new_proxy(&mut self, target: ObjRef, handler: ObjRef) -> Result<ObjRef> {
        let proto = self.get_prototype(target);
        let obj = Object::new(ObjectKind::Proxy, proto, Payload::Proxy { target, handler });
        self.alloc(obj)
    }

    /// A Date carrying its epoch-milliseconds time value.
    pub fn new_date(&mut self, epoch_ms: f64) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(ObjectKind::Date, Some(proto), Payload::Date(epoch_ms));
        obj.class_name = Some("Date");
        self.alloc(obj)
    }

    /// A RegExp shell: pattern source and flags, matching left to the
    /// regexp tier.
    pub fn new_regexp(&mut self, source: &str, flags: &str) -> Result<ObjRef> {
        let source = self.intern(source);
        let flags = self.intern(flags);
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(ObjectKind::RegExp, Some(proto), Payload::RegExp { source, flags });
        obj.class_name = Some("RegExp");
        self.alloc(obj)
    }

    /// A primitive wrapper object (String/Number/Boolean).
    pub fn new_wrapper(&mut self, primitive: Value) -> Result<ObjRef> {
        let kind = match primitive {
            Value::String(_) => ObjectKind::StringWrapper,
            Value::Int32(_) | Value::Double(_) => ObjectKind::NumberWrapper,
            Value::Bool(_) => ObjectKind::BooleanWrapper,
            _ => return Err(self.type_error("value has no wrapper object kind")),
        };
        let proto = self.intrinsics.object_prototype;
        self.alloc(Object::new(kind, Some(proto), Payload::Wrapper(primitive)))
    }

    /// An error object of the given subkind, message installed as an own
    /// property, prototype chosen per subkind.
    pub fn new_error(&mut self, kind: ErrorKind, message: &str) -> Result<ObjRef> {
        let proto = self.intrinsics.error_prototype_for(kind);
        let mut obj = Object::new(ObjectKind::Error, Some(proto), Payload::Error(kind));
        obj.class_name = Some("Error");
        let message = self.str_value(message);
        let key = self.intern("message");
        obj.properties
            .insert(key, PropertyDescriptor::data(message, true, false, true));
        self.alloc(obj)
    }

    /// Build and return a thrown-error completion.
    pub fn raise(&mut self, kind: ErrorKind, message: &str) -> ExecutionError {
        match self.new_error(kind, message) {
            Ok(err) => ExecutionError::Thrown(Value::Object(err)),
            Err(alloc_failure) => alloc_failure,
        }
    }

    pub fn type_error(&mut self, message: &str) -> ExecutionError {
        self.raise(ErrorKind::Type, message)
    }

    pub fn range_error(&mut self, message: &str) -> ExecutionError {
        self.raise(ErrorKind::Range, message)
    }

    pub fn reference_error(&mut self, message: &str) -> ExecutionError {
        self.raise(ErrorKind::Reference, message)
    }

    pub fn syntax_error(&mut self, message: &str) -> ExecutionError {
        self.raise(ErrorKind::Syntax, message)
    }

    /// An AggregateError carrying `errors` in order.
    pub fn aggregate_error(&mut self, message: &str, errors: Vec<Value>) -> Result<ObjRef> {
        let err = self.new_error(ErrorKind::Aggregate, message)?;
        let list = self.new_array(errors)?;
        let key = self.intern("errors");
        self.heap
            .get_mut(err)
            .expect("freshly allocated")
            .properties
            .insert(
                key,
                PropertyDescriptor::data(Value::Object(list), true, false, true),
            );
        Ok(err)
    }

    // ---- values --------------------------------------------------------

    pub fn intern(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }

    pub fn str_value(&mut self, s: &str) -> Value {
        Value::String(self.intern(s))
    }

    pub fn string(&self, id: StringId) -> &str {
        self.strings.get(id)
    }

    pub fn new_symbol(&mut self, description: Option<&str>) -> Value {
        let description = description.map(|d| self.intern(d));
        Value::Symbol(self.symbols.new_symbol(description))
    }

    pub fn new_bigint(&mut self, value: BigInt) -> Value {
        Value::BigInt(self.bigints.alloc(value))
    }

    pub fn bigint(&self, id: BigIntId) -> &BigInt {
        self.bigints.get(id)
    }

    /// Canonical number construction: integral values in i32 range become
    /// the int arm.
    pub fn number(&self, v: f64) -> Value {
        if v.fract() == 0.0 && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) && v != 0.0 {
            Value::Int32(v as i32)
        } else if v == 0.0 && v.is_sign_positive() {
            Value::Int32(0)
        } else {
            Value::Double(v)
        }
    }

    /// Strict equality, widened over the heap tables (string ids are
    /// canonical by interning; bigints compare by value).
    pub fn strict_eq(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::BigInt(x), Value::BigInt(y)) => self.bigints.get(x) == self.bigints.get(y),
            _ => a.strict_eq(b),
        }
    }

    /// SameValue, widened like [`strict_eq`](Self::strict_eq).
    pub fn same_value(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::BigInt(x), Value::BigInt(y)) => self.bigints.get(x) == self.bigints.get(y),
            _ => a.same_value(b),
        }
    }

    pub fn to_boolean(&self, v: Value) -> bool {
        match v {
            Value::String(id) => !self.strings.get(id).is_empty(),
            Value::BigInt(id) => !self.bigints.get(id).is_zero(),
            other => other.to_boolean_raw().expect("non-table value"),
        }
    }

    /// Human-readable rendering for diagnostics and host hooks. Never runs
    /// script (getters are not invoked).
    pub fn display_value(&self, v: Value) -> String {
        match v {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int32(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::String(id) => self.strings.get(id).to_string(),
            Value::BigInt(id) => format!("{}n", self.bigints.get(id)),
            Value::Symbol(id) => match self.symbols.description(id) {
                Some(d) => format!("Symbol({})", self.strings.get(d)),
                None => "Symbol()".to_string(),
            },
            Value::Object(r) => match self.heap.get(r) {
                None => format!("[freed {r}]"),
                Some(obj) => match (&obj.payload, obj.kind) {
                    (Payload::Error(kind), _) => {
                        let message = self
                            .strings
                            .lookup("message")
                            .and_then(|key| obj.properties.get(key))
                            .and_then(|d| d.value)
                            .map(|m| self.display_value(m))
                            .unwrap_or_default();
                        if message.is_empty() {
                            kind.name().to_string()
                        } else {
                            format!("{}: {}", kind.name(), message)
                        }
                    }
                    (_, ObjectKind::Function) => "[function]".to_string(),
                    (_, kind) => format!("[object {:?}]", kind),
                },
            },
        }
    }

    // ---- roots and handles --------------------------------------------

    pub fn add_root(&mut self, root: ObjRef) {
        self.roots.push(root);
    }

    pub fn remove_root(&mut self, root: ObjRef) {
        if let Some(i) = self.roots.iter().position(|&r| r == root) {
            self.roots.swap_remove(i);
        }
    }

    pub fn add_global_handle(&mut self, handle: ObjRef) {
        self.global_handles.push(handle);
    }

    pub fn remove_global_handle(&mut self, handle: ObjRef) {
        if let Some(i) = self.global_handles.iter().position(|&r| r == handle) {
            self.global_handles.swap_remove(i);
        }
    }

    pub fn push_scope(&mut self, scope: ObjRef) {
        self.scope_stack.push(scope);
    }

    pub fn pop_scope(&mut self) -> Option<ObjRef> {
        self.scope_stack.pop()
    }

    // ---- collector -----------------------------------------------------

    /// Request a collection. Forced triggers run synchronously; unforced
    /// ones run only when thresholds say so.
    pub fn trigger_gc(&mut self, force: bool) {
        if !force && !self.should_collect() {
            return;
        }
        match self.config.gc.strategy {
            GcStrategy::Concurrent | GcStrategy::Incremental if !force => {
                // Cooperative build: the cycle runs at this safepoint in
                // full rather than split across helper threads.
                log::trace!("{:?} strategy: running cycle at safepoint", self.config.gc.strategy);
            }
            _ => {}
        }
        gc::collect(self);
        self.gc_requested = false;
    }

    fn should_collect(&self) -> bool {
        if self.gc_requested {
            return true;
        }
        if self.heap.bytes_since_collect > self.config.gc.young_threshold {
            return true;
        }
        if let Some(limit) = self.config.limits.memory_limit {
            let pressure = self.limiter.heap_usage() as f64 / limit as f64;
            if pressure > self.config.gc.memory_pressure_threshold {
                return true;
            }
        }
        false
    }

    /// Install the post-GC hook for WeakRef-like kinds. The bootstrap wires
    /// the builtin kinds; embedders with custom weak-aware kinds add theirs
    /// here.
    pub fn register_weakref_provider(&mut self, kind: ObjectKind, provider: crate::handle::KindProvider) {
        self.handles.register_provider(kind, provider);
    }

    /// Install the post-GC hook that drives finalization scanning.
    pub fn register_finalization_callback(&mut self, provider: crate::handle::KindProvider) {
        self.handles
            .register_provider(ObjectKind::FinalizationRegistry, provider);
    }

    // ---- microtasks ----------------------------------------------------

    /// Enqueue a plain callable as a microtask.
    pub fn enqueue_microtask(&mut self, func: Value, args: Vec<Value>) -> Result<()> {
        if !self.is_callable(func) {
            return Err(self.type_error("microtask callback is not callable"));
        }
        self.microtasks.enqueue(Job::Call {
            func,
            this: Value::Undefined,
            args,
        });
        Ok(())
    }

    pub fn microtask_queue_len(&self) -> usize {
        self.microtasks.len()
    }

    /// Drain the queue to empty. Jobs enqueued while draining run in the
    /// same drain; an empty drain is a no-op. The end of the drain is the
    /// hard safepoint where deferred collections run and unhandled
    /// rejections are reported.
    pub fn drain_microtasks(&mut self) -> Result<()> {
        while let Some(job) = self.microtasks.pop() {
            self.limiter.checkpoint()?;
            self.run_job(job)?;
        }
        self.report_unhandled_rejections();
        if self.should_collect() {
            gc::collect(self);
            self.gc_requested = false;
        }
        Ok(())
    }

    fn run_job(&mut self, job: Job) -> Result<()> {
        match job {
            Job::Call { func, this, args } => match self.call(func, this, &args) {
                Ok(_) => Ok(()),
                Err(ExecutionError::Thrown(v)) => {
                    log::warn!("host microtask threw: {}", self.display_value(v));
                    Ok(())
                }
                Err(other) => Err(other),
            },
            Job::Reaction {
                kind,
                handler,
                capability,
                argument,
            } => self.run_reaction_job(kind, handler, capability, argument),
            Job::ResolveThenable {
                promise,
                thenable,
                then,
            } => self.run_thenable_job(promise, thenable, then),
            Job::Cleanup { callback, held } => {
                match self.call(callback, Value::Undefined, &[held]) {
                    Ok(_) => Ok(()),
                    // A throwing cleanup callback is reported, the chain
                    // continues.
                    Err(ExecutionError::Thrown(v)) => {
                        log::warn!(
                            "finalization cleanup callback threw: {}",
                            self.display_value(v)
                        );
                        Ok(())
                    }
                    Err(other) => Err(other),
                }
            }
        }
    }

    fn report_unhandled_rejections(&mut self) {
        if self.pending_rejections.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_rejections);
        let mut externs: Box<dyn Externs> = std::mem::replace(&mut self.externs, Box::new(NoopExterns));
        for promise in pending {
            let unhandled_reason = match self.heap.get(promise).map(|o| &o.payload) {
                Some(Payload::Promise(p)) if !p.handled => Some(p.result),
                _ => None,
            };
            if let Some(reason) = unhandled_reason {
                externs.unhandled_rejection(self, promise, reason);
            }
        }
        self.externs = externs;
    }

    // ---- limits --------------------------------------------------------

    /// Arm the execution-time limit for subsequent turns.
    pub fn set_execution_time_limit(&mut self, limit: std::time::Duration) {
        self.limiter.arm_time_limit(limit);
    }

    pub fn clear_execution_time_limit(&mut self) {
        self.limiter.disarm_time_limit();
    }

    pub fn set_memory_limit(&mut self, limit: Option<usize>) {
        self.limiter.set_memory_limit(limit);
        self.config.engine.limits.memory_limit = limit;
    }

    /// Request an abort; honored at the next safepoint.
    pub fn abort(&self) {
        self.limiter.abort();
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.config.locale = locale.into();
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.config.strict = strict;
    }

    /// Safepoint poll, exposed for long-running host loops.
    pub fn checkpoint(&self) -> Result<()> {
        self.limiter.checkpoint()
    }

    // ---- evaluation seam ----------------------------------------------

    /// Evaluate script source through the attached evaluator tier.
    pub fn evaluate_script(&mut self, source: &str, filename: &str) -> Result<Value> {
        let mut externs: Box<dyn Externs> = std::mem::replace(&mut self.externs, Box::new(NoopExterns));
        let result = externs.evaluate_script(self, source, filename);
        self.externs = externs;
        result
    }

    /// Evaluate module source through the attached evaluator tier.
    pub fn evaluate_module(&mut self, source: &str, filename: &str) -> Result<Value> {
        let mut externs: Box<dyn Externs> = std::mem::replace(&mut self.externs, Box::new(NoopExterns));
        let result = externs.evaluate_module(self, source, filename);
        self.externs = externs;
        result
    }

    /// Resolve and evaluate an imported module.
    pub fn import_module(&mut self, specifier: &str) -> Result<Value> {
        let mut externs: Box<dyn Externs> = std::mem::replace(&mut self.externs, Box::new(NoopExterns));
        let result = match externs.resolve_module(specifier) {
            Ok(source) => externs.evaluate_module(self, &source, specifier),
            Err(e) => Err(ExecutionError::Fatal(e)),
        };
        self.externs = externs;
        result
    }
}
