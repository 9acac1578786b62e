// SPDX-License-Identifier: Apache-2.0
//! Lazy field materialization: walks a `FieldExprIR` recipe into a typed,
//! pooled buffer sized to its element domain (§4.3).
//!
//! Fields are recipes, not buffers, until something forces materialization
//! (a render sink or a signal opcode reducing a field to a scalar). The
//! walk draws intermediate buffers from a pool and returns them when it
//! completes, including on error paths, via an RAII guard — grounded on the
//! scoped-borrow-and-return discipline `warp-core::boaw::shard` uses for
//! per-shard working sets (acquire for the scope of one operation, release
//! unconditionally at the end).
use std::collections::HashMap;

use crate::error::LumenError;
use crate::ident::{BusIndex, FieldExprId, SigExprId, StateCellId};
use crate::ir::field::{ElementDomain, FieldExprIR};
use crate::ir::program::FieldBusCombineSpec;
use crate::registry::opcode::OpcodeRegistry;
use crate::registry::transform::TransformRegistry;
use crate::runtime::state_buffer::StateBuffer;
use crate::runtime::value_store::ValueStore;
use crate::transform::TransformStepSpec;
use crate::value::Value;

/// A materialized per-element buffer. Every element shares one storage
/// lane; mixed-lane fields are not representable (lowering guarantees a
/// `FieldExprIR` is uniformly typed before it reaches the materializer).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBuffer {
    /// Scalar-per-element buffer (`number`, `phase01`, `boolean`-as-0/1).
    F64(Vec<f64>),
    /// 2-component vector per element.
    Vec2(Vec<[f64; 2]>),
    /// 3-component vector per element.
    Vec3(Vec<[f64; 3]>),
    /// RGBA color per element.
    Color(Vec<[f64; 4]>),
}

impl FieldBuffer {
    /// Number of elements this buffer holds.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F64(v) => v.len(),
            Self::Vec2(v) => v.len(),
            Self::Vec3(v) => v.len(),
            Self::Color(v) => v.len(),
        }
    }

    /// Returns true if this buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lane_of(value: &Value) -> BufferLane {
        match value {
            Value::Object(crate::value::ObjectValue::Vec2(_)) => BufferLane::Vec2,
            Value::Object(crate::value::ObjectValue::Vec3(_)) => BufferLane::Vec3,
            Value::Object(crate::value::ObjectValue::Color(_)) => BufferLane::Color,
            _ => BufferLane::F64,
        }
    }

    fn element_at(&self, index: usize) -> Value {
        match self {
            Self::F64(v) => Value::F64(v.get(index).copied().unwrap_or(0.0)),
            Self::Vec2(v) => Value::Object(crate::value::ObjectValue::Vec2(v.get(index).copied().unwrap_or([0.0; 2]))),
            Self::Vec3(v) => Value::Object(crate::value::ObjectValue::Vec3(v.get(index).copied().unwrap_or([0.0; 3]))),
            Self::Color(v) => Value::Object(crate::value::ObjectValue::Color(v.get(index).copied().unwrap_or([0.0; 4]))),
        }
    }

    fn push_value(&mut self, value: Value) {
        match (self, value) {
            (Self::F64(v), val) => v.push(val.as_f64().unwrap_or(0.0)),
            (Self::Vec2(v), Value::Object(crate::value::ObjectValue::Vec2(x))) => v.push(x),
            (Self::Vec3(v), Value::Object(crate::value::ObjectValue::Vec3(x))) => v.push(x),
            (Self::Color(v), Value::Object(crate::value::ObjectValue::Color(x))) => v.push(x),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BufferLane {
    F64,
    Vec2,
    Vec3,
    Color,
}

fn empty_buffer(lane: BufferLane, capacity: usize) -> FieldBuffer {
    match lane {
        BufferLane::F64 => FieldBuffer::F64(Vec::with_capacity(capacity)),
        BufferLane::Vec2 => FieldBuffer::Vec2(Vec::with_capacity(capacity)),
        BufferLane::Vec3 => FieldBuffer::Vec3(Vec::with_capacity(capacity)),
        BufferLane::Color => FieldBuffer::Color(Vec::with_capacity(capacity)),
    }
}

/// Typed buffer pool: one free list per lane, keyed by the capacity it was
/// last sized for. Buffers are cleared (length reset to zero, capacity
/// retained) on return, so steady-state materialization allocates nothing
/// (invariant 6).
#[derive(Debug, Default)]
pub struct BufferPool {
    free: HashMap<BufferLane, Vec<FieldBuffer>>,
}

impl BufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn checkout(&mut self, lane: BufferLane, capacity: usize) -> FieldBuffer {
        if let Some(mut buf) = self.free.get_mut(&lane).and_then(Vec::pop) {
            truncate_to_empty(&mut buf);
            return buf;
        }
        empty_buffer(lane, capacity)
    }

    fn checkin(&mut self, lane: BufferLane, buffer: FieldBuffer) {
        self.free.entry(lane).or_default().push(buffer);
    }

    /// Total number of buffers currently idle in the pool, across all lanes.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}

fn truncate_to_empty(buffer: &mut FieldBuffer) {
    match buffer {
        FieldBuffer::F64(v) => v.clear(),
        FieldBuffer::Vec2(v) => v.clear(),
        FieldBuffer::Vec3(v) => v.clear(),
        FieldBuffer::Color(v) => v.clear(),
    }
}

/// RAII guard returning a checked-out intermediate buffer to the pool when
/// dropped, on every exit path including early returns from a failed walk.
struct PooledGuard<'a> {
    pool: &'a mut BufferPool,
    lane: BufferLane,
    buffer: Option<FieldBuffer>,
}

impl<'a> PooledGuard<'a> {
    fn checkout(pool: &'a mut BufferPool, lane: BufferLane, capacity: usize) -> Self {
        let buffer = pool.checkout(lane, capacity);
        Self {
            pool,
            lane,
            buffer: Some(buffer),
        }
    }

    fn take(mut self) -> FieldBuffer {
        self.buffer.take().unwrap_or_else(|| empty_buffer(self.lane, 0))
    }
}

impl Drop for PooledGuard<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.checkin(self.lane, buffer);
        }
    }
}

/// Materialization cache key: `(FieldExprId, domain-version, upstream-slot-
/// versions)` per §4.3. `upstream_version` is a caller-supplied fold over
/// whatever slot generations feed this field (the executor increments it
/// whenever any input this field reads has changed since the last frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterializeKey {
    /// The field recipe being materialized.
    pub expr: FieldExprId,
    /// The domain-authoring block's element-count/identity version.
    pub domain_version: u64,
    /// Fold of upstream slot versions feeding this recipe.
    pub upstream_version: u64,
}

/// Per-frame and cross-frame materialization cache (§4.3: "not rematerialized
/// within the same frame for the same key; between frames, invalidated for
/// any key whose dependencies changed").
#[derive(Debug, Default)]
pub struct MaterializeCache {
    entries: HashMap<MaterializeKey, FieldBuffer>,
    hits: u64,
    misses: u64,
}

impl MaterializeCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all cached entries, e.g. on hot-swap (§4.9 step 4).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cache hit count since the last [`MaterializeCache::clear`], used by
    /// telemetry and the S1 test scenario's hit-ratio assertion.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Cache miss count since the last [`MaterializeCache::clear`].
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Walks a `FieldExprIR` recipe into a materialized buffer sized to
/// `domain.element_count`, consulting and populating `cache` by
/// [`MaterializeKey`].
///
/// # Errors
/// Returns [`LumenError::UninitializedSlot`] if the recipe reads an
/// `InputSlot` that has not been written yet this frame.
#[allow(clippy::too_many_arguments)]
pub fn materialize(
    key: MaterializeKey,
    field_exprs: &[FieldExprIR],
    domain: &ElementDomain,
    values: &ValueStore,
    registry: &OpcodeRegistry,
    transforms: &TransformRegistry,
    const_pool: &[Value],
    state: &mut StateBuffer,
    pool: &mut BufferPool,
    cache: &mut MaterializeCache,
    dt_ms: f64,
    transform_chains: &[Vec<TransformStepSpec>],
    transform_state_cells: &[Vec<Option<StateCellId>>],
    field_bus_combines: &std::collections::BTreeMap<BusIndex, FieldBusCombineSpec>,
) -> Result<FieldBuffer, LumenError> {
    if let Some(cached) = cache.entries.get(&key) {
        cache.hits += 1;
        return Ok(cached.clone());
    }
    cache.misses += 1;
    let buffer = walk(
        key.expr,
        field_exprs,
        domain,
        values,
        registry,
        transforms,
        const_pool,
        state,
        pool,
        dt_ms,
        transform_chains,
        transform_state_cells,
        field_bus_combines,
    )?;
    cache.entries.insert(key, buffer.clone());
    Ok(buffer)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    expr: FieldExprId,
    field_exprs: &[FieldExprIR],
    domain: &ElementDomain,
    values: &ValueStore,
    registry: &OpcodeRegistry,
    transforms: &TransformRegistry,
    const_pool: &[Value],
    state: &mut StateBuffer,
    pool: &mut BufferPool,
    dt_ms: f64,
    transform_chains: &[Vec<TransformStepSpec>],
    transform_state_cells: &[Vec<Option<StateCellId>>],
    field_bus_combines: &std::collections::BTreeMap<BusIndex, FieldBusCombineSpec>,
) -> Result<FieldBuffer, LumenError> {
    let count = domain.element_count as usize;
    let Some(node) = field_exprs.get(expr.index()) else {
        // An out-of-range node id is a lowering invariant violation, never a
        // reachable runtime condition; fall back to the zero buffer rather
        // than invent an error variant for something that should be caught
        // by link_resolution before a program is ever loaded.
        return Ok(FieldBuffer::F64(vec![0.0; count]));
    };

    match node {
        FieldExprIR::Const(value) => {
            let lane = FieldBuffer::lane_of(value);
            let mut guard = PooledGuard::checkout(pool, lane, count);
            if let Some(buf) = guard.buffer.as_mut() {
                for _ in 0..count {
                    buf.push_value(value.clone());
                }
            }
            Ok(guard.take())
        }
        FieldExprIR::InputSlot(slot) => {
            let value = values.read(*slot)?.clone();
            let lane = FieldBuffer::lane_of(&value);
            let mut guard = PooledGuard::checkout(pool, lane, count);
            if let Some(buf) = guard.buffer.as_mut() {
                for _ in 0..count {
                    buf.push_value(value.clone());
                }
            }
            Ok(guard.take())
        }
        FieldExprIR::SampleSignal(sig_expr) => {
            // Reduction to a scalar is the executor's job; by the time a
            // field recipe reaches this node the corresponding SignalExprIR
            // has already been evaluated into a reserved slot this frame
            // (broadcastScalarToField / sampleSignal, §4.6). The field
            // materializer only broadcasts it across the domain.
            let _ = sig_expr;
            broadcast_signal_slot(*sig_expr, values, count, pool)
        }
        FieldExprIR::Map { opcode, inputs } => {
            let operands: Vec<FieldBuffer> = inputs
                .iter()
                .map(|id| {
                    walk(
                        *id,
                        field_exprs,
                        domain,
                        values,
                        registry,
                        transforms,
                        const_pool,
                        state,
                        pool,
                        dt_ms,
                        transform_chains,
                        transform_state_cells,
                        field_bus_combines,
                    )
                })
                .collect::<Result<_, _>>()?;
            map_elementwise(opcode, &operands, registry, state, pool, count, dt_ms)
        }
        FieldExprIR::Zip { opcode, inputs } => {
            let a = walk(
                inputs[0],
                field_exprs,
                domain,
                values,
                registry,
                transforms,
                const_pool,
                state,
                pool,
                dt_ms,
                transform_chains,
                transform_state_cells,
                field_bus_combines,
            )?;
            let b = walk(
                inputs[1],
                field_exprs,
                domain,
                values,
                registry,
                transforms,
                const_pool,
                state,
                pool,
                dt_ms,
                transform_chains,
                transform_state_cells,
                field_bus_combines,
            )?;
            map_elementwise(opcode, &[a, b], registry, state, pool, count, dt_ms)
        }
        FieldExprIR::Select { condition, a, b } => {
            let cond = walk(
                *condition,
                field_exprs,
                domain,
                values,
                registry,
                transforms,
                const_pool,
                state,
                pool,
                dt_ms,
                transform_chains,
                transform_state_cells,
                field_bus_combines,
            )?;
            let va = walk(
                *a,
                field_exprs,
                domain,
                values,
                registry,
                transforms,
                const_pool,
                state,
                pool,
                dt_ms,
                transform_chains,
                transform_state_cells,
                field_bus_combines,
            )?;
            let vb = walk(
                *b,
                field_exprs,
                domain,
                values,
                registry,
                transforms,
                const_pool,
                state,
                pool,
                dt_ms,
                transform_chains,
                transform_state_cells,
                field_bus_combines,
            )?;
            let lane = FieldBuffer::lane_of(&va.element_at(0));
            let mut guard = PooledGuard::checkout(pool, lane, count);
            if let Some(buf) = guard.buffer.as_mut() {
                for i in 0..count {
                    let c = cond.element_at(i).as_bool().unwrap_or(false);
                    buf.push_value(if c { va.element_at(i) } else { vb.element_at(i) });
                }
            }
            Ok(guard.take())
        }
        FieldExprIR::Transform { chain, input } => {
            let base = walk(
                *input,
                field_exprs,
                domain,
                values,
                registry,
                transforms,
                const_pool,
                state,
                pool,
                dt_ms,
                transform_chains,
                transform_state_cells,
                field_bus_combines,
            )?;
            let empty_chain = Vec::new();
            let empty_cells = Vec::new();
            let steps = transform_chains.get(chain.index()).unwrap_or(&empty_chain);
            let cells = transform_state_cells.get(chain.index()).unwrap_or(&empty_cells);
            if steps.is_empty() {
                return Ok(base);
            }
            // One shared state cell per stateful step is used across every
            // element in the field, rather than one per element: the wire
            // this chain lowered from carries a single authored state-cell
            // identity (`ident::transform_state_identity`), not one per
            // element instance.
            let lane = FieldBuffer::lane_of(&base.element_at(0));
            let mut guard = PooledGuard::checkout(pool, lane, count);
            if let Some(buf) = guard.buffer.as_mut() {
                for i in 0..count {
                    let value = crate::transform::apply_transforms(
                        transforms,
                        base.element_at(i),
                        steps,
                        cells,
                        state,
                        dt_ms,
                    )
                    .unwrap_or_else(|_| base.element_at(i));
                    buf.push_value(value);
                }
            }
            Ok(guard.take())
        }
        FieldExprIR::BusCombine(bus) => {
            let Some(spec) = field_bus_combines.get(bus) else {
                let guard = PooledGuard::checkout(pool, BufferLane::F64, count);
                return Ok(guard.take());
            };
            let operands: Vec<FieldBuffer> = spec
                .operands
                .iter()
                .map(|id| {
                    walk(
                        *id,
                        field_exprs,
                        domain,
                        values,
                        registry,
                        transforms,
                        const_pool,
                        state,
                        pool,
                        dt_ms,
                        transform_chains,
                        transform_state_cells,
                        field_bus_combines,
                    )
                })
                .collect::<Result<_, _>>()?;
            let first = operands.first().map(|b| b.element_at(0)).unwrap_or(Value::F64(0.0));
            let lane = FieldBuffer::lane_of(&first);
            let mut guard = PooledGuard::checkout(pool, lane, count);
            if let Some(buf) = guard.buffer.as_mut() {
                for i in 0..count {
                    let inputs: Vec<Value> = operands.iter().map(|b| b.element_at(i)).collect();
                    let folded = crate::bus::fold_values(spec.combine, &inputs).unwrap_or(Value::F64(0.0));
                    buf.push_value(folded);
                }
            }
            Ok(guard.take())
        }
        FieldExprIR::GridPositions { rows, cols, spacing } => {
            Ok(grid_positions(*rows, *cols, *spacing, count, pool))
        }
    }
}

/// Materializes a centered, row-major grid of `vec2` positions, per
/// [`FieldExprIR::GridPositions`]. Element `count` is driven by the domain
/// rather than `rows * cols` directly, so a domain smaller than the
/// declared grid shape truncates and a larger one pads with the last row's
/// trailing position; lowering guarantees the two agree in practice.
fn grid_positions(rows: u32, cols: u32, spacing: f64, count: usize, pool: &mut BufferPool) -> FieldBuffer {
    let cols = cols.max(1);
    let mut guard = PooledGuard::checkout(pool, BufferLane::Vec2, count);
    if let Some(buf) = guard.buffer.as_mut() {
        let row_offset = (f64::from(rows) - 1.0) / 2.0;
        let col_offset = (f64::from(cols) - 1.0) / 2.0;
        for index in 0..count {
            let index_u32 = u32::try_from(index).unwrap_or(u32::MAX);
            let row = index_u32 / cols;
            let col = index_u32 % cols;
            let x = (f64::from(col) - col_offset) * spacing;
            let y = (f64::from(row) - row_offset) * spacing;
            buf.push_value(Value::Object(crate::value::ObjectValue::Vec2([x, y])));
        }
    }
    guard.take()
}

fn broadcast_signal_slot(
    sig_expr: SigExprId,
    values: &ValueStore,
    count: usize,
    pool: &mut BufferPool,
) -> Result<FieldBuffer, LumenError> {
    // The sampled signal value lives in a reserved slot; `sig_expr`'s index
    // doubles as that slot index by lowering convention for sampleSignal
    // nodes (pass 6 always co-allocates them together).
    let slot = crate::ident::ValueSlot(sig_expr.0);
    let value = values.read(slot).ok().cloned().unwrap_or(Value::F64(0.0));
    let lane = FieldBuffer::lane_of(&value);
    let mut guard = PooledGuard::checkout(pool, lane, count);
    if let Some(buf) = guard.buffer.as_mut() {
        for _ in 0..count {
            buf.push_value(value.clone());
        }
    }
    Ok(guard.take())
}


fn map_elementwise(
    opcode: &str,
    operands: &[FieldBuffer],
    registry: &OpcodeRegistry,
    state: &mut StateBuffer,
    pool: &mut BufferPool,
    count: usize,
    dt_ms: f64,
) -> Result<FieldBuffer, LumenError> {
    let Some(descriptor) = registry.get(opcode) else {
        let mut guard = PooledGuard::checkout(pool, BufferLane::F64, count);
        return Ok(guard.take());
    };
    let first = operands.first().map(|b| b.element_at(0)).unwrap_or(Value::F64(0.0));
    let lane = FieldBuffer::lane_of(&first);
    let mut guard = PooledGuard::checkout(pool, lane, count);
    if let Some(buf) = guard.buffer.as_mut() {
        for i in 0..count {
            let inputs: Vec<Value> = operands.iter().map(|b| b.element_at(i)).collect();
            let mut ctx = crate::ir::signal::EvalCtx::new(state, None, dt_ms);
            let result = (descriptor.evaluator)(&inputs, &mut ctx);
            buf.push_value(result);
        }
    }
    Ok(guard.take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::field::FieldExprIR;

    #[test]
    fn const_field_broadcasts_to_every_element() {
        let exprs = vec![FieldExprIR::Const(Value::F64(0.5))];
        let domain = ElementDomain::new(4);
        let values = ValueStore::new(0);
        let registry = OpcodeRegistry::with_builtins();
        let transforms_reg = TransformRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let mut pool = BufferPool::new();
        let mut cache = MaterializeCache::new();
        let key = MaterializeKey {
            expr: FieldExprId(0),
            domain_version: domain.version,
            upstream_version: 0,
        };
        let buffer = materialize(
            key, &exprs, &domain, &values, &registry, &transforms_reg, &[], &mut state, &mut pool, &mut cache, 16.0, &[], &[],
            &std::collections::BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(buffer.len(), 4);
        if let FieldBuffer::F64(v) = buffer {
            assert!(v.iter().all(|x| (*x - 0.5).abs() < 1e-12));
        } else {
            panic!("expected f64 buffer");
        }
    }

    #[test]
    fn repeated_materialize_with_same_key_is_a_cache_hit() {
        let exprs = vec![FieldExprIR::Const(Value::F64(1.0))];
        let domain = ElementDomain::new(2);
        let values = ValueStore::new(0);
        let registry = OpcodeRegistry::with_builtins();
        let transforms_reg = TransformRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let mut pool = BufferPool::new();
        let mut cache = MaterializeCache::new();
        let key = MaterializeKey {
            expr: FieldExprId(0),
            domain_version: 0,
            upstream_version: 0,
        };
        materialize(key, &exprs, &domain, &values, &registry, &transforms_reg, &[], &mut state, &mut pool, &mut cache, 16.0, &[], &[], &std::collections::BTreeMap::new()).unwrap();
        materialize(key, &exprs, &domain, &values, &registry, &transforms_reg, &[], &mut state, &mut pool, &mut cache, 16.0, &[], &[], &std::collections::BTreeMap::new()).unwrap();
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn grid_positions_centers_a_two_by_two_grid() {
        let exprs = vec![FieldExprIR::GridPositions {
            rows: 2,
            cols: 2,
            spacing: 10.0,
        }];
        let domain = ElementDomain::new(4);
        let values = ValueStore::new(0);
        let registry = OpcodeRegistry::with_builtins();
        let transforms_reg = TransformRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let mut pool = BufferPool::new();
        let mut cache = MaterializeCache::new();
        let key = MaterializeKey {
            expr: FieldExprId(0),
            domain_version: 0,
            upstream_version: 0,
        };
        let buffer = materialize(key, &exprs, &domain, &values, &registry, &transforms_reg, &[], &mut state, &mut pool, &mut cache, 16.0, &[], &[], &std::collections::BTreeMap::new()).unwrap();
        let FieldBuffer::Vec2(positions) = buffer else {
            panic!("expected vec2 buffer");
        };
        assert_eq!(positions, vec![[-5.0, -5.0], [5.0, -5.0], [-5.0, 5.0], [5.0, 5.0]]);
    }

    #[test]
    fn zero_element_domain_returns_empty_buffer_without_touching_pool() {
        let exprs = vec![FieldExprIR::Const(Value::F64(1.0))];
        let domain = ElementDomain::new(0);
        let values = ValueStore::new(0);
        let registry = OpcodeRegistry::with_builtins();
        let transforms_reg = TransformRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let mut pool = BufferPool::new();
        let mut cache = MaterializeCache::new();
        let key = MaterializeKey {
            expr: FieldExprId(0),
            domain_version: 0,
            upstream_version: 0,
        };
        let buffer = materialize(key, &exprs, &domain, &values, &registry, &transforms_reg, &[], &mut state, &mut pool, &mut cache, 16.0, &[], &[], &std::collections::BTreeMap::new()).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn transform_field_applies_its_chain_to_every_element() {
        use crate::transform::TransformStepSpec;
        use std::collections::BTreeMap;

        let exprs = vec![
            FieldExprIR::Const(Value::F64(3.0)),
            FieldExprIR::Transform {
                chain: crate::ident::TransformChainId(0),
                input: FieldExprId(0),
            },
        ];
        let domain = ElementDomain::new(3);
        let values = ValueStore::new(0);
        let registry = OpcodeRegistry::with_builtins();
        let transforms_reg = TransformRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let mut pool = BufferPool::new();
        let mut cache = MaterializeCache::new();
        let chains = vec![vec![TransformStepSpec {
            id: "scale".to_string(),
            enabled: true,
            params: BTreeMap::from([("factor".to_string(), Value::F64(2.0))]),
        }]];
        let cells = vec![vec![None]];
        let key = MaterializeKey {
            expr: FieldExprId(1),
            domain_version: 0,
            upstream_version: 0,
        };
        let buffer = materialize(
            key, &exprs, &domain, &values, &registry, &transforms_reg, &[], &mut state, &mut pool, &mut cache, 16.0,
            &chains, &cells, &std::collections::BTreeMap::new(),
        )
        .unwrap();
        let FieldBuffer::F64(values) = buffer else {
            panic!("expected f64 buffer");
        };
        assert_eq!(values, vec![6.0, 6.0, 6.0]);
    }
}
