// SPDX-License-Identifier: Apache-2.0
//! Runtime value representation and the storage classes backing `ValueSlot`s.
//!
//! `slotMeta.storage` (§3) is one of `f64|f32|i32|u32|object`; composite
//! domains (`vec2`, `vec3`, `color`) are carried in the `object` lane as a
//! fixed little-endian `f64` tuple, the same raw-bytes convention
//! `materialization::frame` uses for typed buffer payloads, rather than
//! inventing dedicated storage classes the spec does not name.

use crate::types::ValueDomain;

/// Backing storage class for a [`crate::ident::ValueSlot`], per `slotMeta.storage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageClass {
    /// 64-bit float lane (default numeric lane).
    F64,
    /// 32-bit float lane.
    F32,
    /// 32-bit signed integer lane.
    I32,
    /// 32-bit unsigned integer lane.
    U32,
    /// Opaque object lane: composite values (`vec2`, `vec3`, `color`) and
    /// engine-internal values (`domain`, `renderFrame`) that do not fit a
    /// scalar numeric lane.
    Object,
}

impl StorageClass {
    /// Returns the natural storage class for a [`ValueDomain`].
    #[must_use]
    pub const fn for_domain(domain: ValueDomain) -> Self {
        match domain {
            ValueDomain::Number | ValueDomain::Phase01 | ValueDomain::TimeMs => Self::F64,
            ValueDomain::Boolean => Self::I32,
            ValueDomain::Vec2
            | ValueDomain::Vec3
            | ValueDomain::Color
            | ValueDomain::DomainRef
            | ValueDomain::RenderFrame => Self::Object,
        }
    }
}

/// A runtime value tagged by its storage class.
///
/// `Value` is the unit exchanged between IR evaluators, the value store, and
/// the field materializer. Composite domains are represented as fixed-length
/// little-endian `f64` tuples inside [`Value::Object`] via [`ObjectValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `f64` storage lane.
    F64(f64),
    /// `f32` storage lane.
    F32(f32),
    /// `i32` storage lane (also used for booleans: 0 = false, nonzero = true).
    I32(i32),
    /// `u32` storage lane.
    U32(u32),
    /// Opaque object lane.
    Object(ObjectValue),
}

/// Tagged payload carried in the `object` storage lane.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectValue {
    /// A 2-component vector, `[x, y]`.
    Vec2([f64; 2]),
    /// A 3-component vector, `[x, y, z]`.
    Vec3([f64; 3]),
    /// Linear RGBA color in `[0, 1]`.
    Color([f64; 4]),
    /// A handle to a materialized element domain (element count only; the
    /// identity/seed data lives in the domain authoring block's own state).
    DomainRef {
        /// Number of elements in the referenced domain.
        element_count: u32,
        /// Monotonic version bumped when element count or identity seeds change.
        domain_version: u64,
    },
    /// An opaque, json-encodable constant value used by block parameters that
    /// are neither numeric nor one of the recognized composite domains.
    Json(Vec<u8>),
}

impl Value {
    /// Returns the storage class this value occupies.
    #[must_use]
    pub const fn storage_class(&self) -> StorageClass {
        match self {
            Self::F64(_) => StorageClass::F64,
            Self::F32(_) => StorageClass::F32,
            Self::I32(_) => StorageClass::I32,
            Self::U32(_) => StorageClass::U32,
            Self::Object(_) => StorageClass::Object,
        }
    }

    /// Returns the value as `f64` if it occupies a numeric lane.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            Self::F32(v) => Some(f64::from(*v)),
            Self::I32(v) => Some(f64::from(*v)),
            Self::U32(v) => Some(f64::from(*v)),
            Self::Object(_) => None,
        }
    }

    /// Returns the value as a boolean, treating any nonzero numeric lane as
    /// `true`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.as_f64().map(|v| v != 0.0)
    }

    /// The type-safe zero/default value for a storage class, used to clamp
    /// runtime anomalies to a safe default (§7).
    #[must_use]
    pub fn safe_default(class: StorageClass) -> Self {
        match class {
            StorageClass::F64 => Self::F64(0.0),
            StorageClass::F32 => Self::F32(0.0),
            StorageClass::I32 => Self::I32(0),
            StorageClass::U32 => Self::U32(0),
            StorageClass::Object => Self::Object(ObjectValue::DomainRef {
                element_count: 0,
                domain_version: 0,
            }),
        }
    }

    /// Returns true if this value is finite (numeric lanes only; object
    /// values are always considered finite).
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::F64(v) => v.is_finite(),
            Self::F32(v) => v.is_finite(),
            Self::I32(_) | Self::U32(_) | Self::Object(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_class_matches_domain_lane() {
        assert_eq!(StorageClass::for_domain(ValueDomain::Number), StorageClass::F64);
        assert_eq!(StorageClass::for_domain(ValueDomain::Boolean), StorageClass::I32);
        assert_eq!(StorageClass::for_domain(ValueDomain::Vec2), StorageClass::Object);
    }

    #[test]
    fn non_finite_division_is_detected() {
        let v = Value::F64(1.0 / 0.0);
        assert!(!v.is_finite());
    }
}
