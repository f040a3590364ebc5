//! Byte-level field offset resolution.
//!
//! Similar to a compiled field accessor, but constructed at run time given an
//! instance of an aggregate and a reference to one of its fields. Resolution
//! scans the aggregate's in-memory representation for the unique offset whose
//! bytes match the field's own bytes.
//!
//! This only works when field values have distinguishable representations at
//! the moment of inspection. That is a known fragility rather than a general
//! guarantee; it holds for the containers this crate cares about because
//! their handles are heap pointers, unique per instance. When it fails, the
//! failure is reported and callers fall back to structural traversal; nothing
//! is ever silently skipped.

use thiserror::Error;

/// Why offset resolution failed for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OffsetError {
    /// No window of the aggregate's bytes matched the field value.
    #[error("no offset matches the field's byte image")]
    NoMatch,
    /// More than one window matched, so the field cannot be identified.
    #[error("{0} offsets match the field's byte image")]
    Ambiguous(usize),
}

/// A resolved field position within one aggregate type.
///
/// Only meaningful together with the `TypeId` of the aggregate it was
/// resolved against; the updater cache keys entries accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOffset {
    /// Byte offset of the field within the aggregate.
    pub offset: usize,
    /// Size of the field in bytes.
    pub size: usize,
}

impl FieldOffset {
    /// Resolves the offset of `field` within `base`.
    ///
    /// Scans in strides of the field's alignment, byte-comparing a window of
    /// the field's size against the field value's own byte image, and
    /// collecting every offset that matches exactly. Resolution succeeds only
    /// when exactly one offset matches.
    ///
    /// Zero-sized fields match everywhere and therefore always fail as
    /// ambiguous.
    ///
    /// # Safety
    /// `base` must point to `base_size` readable bytes and `field` to `size`
    /// readable bytes for the duration of the call.
    pub unsafe fn resolve(
        base: *const u8,
        base_size: usize,
        field: *const u8,
        size: usize,
        alignment: usize,
    ) -> Result<FieldOffset, OffsetError> {
        if size == 0 {
            // An empty window matches at every stride.
            return Err(OffsetError::Ambiguous(base_size / alignment.max(1) + 1));
        }
        if size > base_size {
            return Err(OffsetError::NoMatch);
        }

        let mut matches = 0;
        let mut found = 0;
        let mut index = 0;
        while index + size <= base_size {
            if bytes_equal(base.add(index), field, size) {
                matches += 1;
                found = index;
            }
            index += alignment;
        }

        match matches {
            0 => Err(OffsetError::NoMatch),
            1 => Ok(FieldOffset {
                offset: found,
                size,
            }),
            n => Err(OffsetError::Ambiguous(n)),
        }
    }

    /// Returns a pointer to this field within `base`.
    ///
    /// # Safety
    /// `base` must point to an instance of the aggregate type this offset was
    /// resolved against.
    pub unsafe fn field_ptr(&self, base: *const u8) -> *const u8 {
        base.add(self.offset)
    }
}

/// Compares `len` raw bytes. Padding inside the window is compared too.
unsafe fn bytes_equal(a: *const u8, b: *const u8, len: usize) -> bool {
    for i in 0..len {
        if a.add(i).read() != b.add(i).read() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    fn resolve_field<B, F>(base: &B, field: &F) -> Result<FieldOffset, OffsetError> {
        unsafe {
            FieldOffset::resolve(
                base as *const B as *const u8,
                mem::size_of::<B>(),
                field as *const F as *const u8,
                mem::size_of::<F>(),
                mem::align_of::<F>(),
            )
        }
    }

    #[test]
    fn resolves_distinct_fields() {
        struct Base {
            a: u64,
            b: u64,
        }
        let base = Base {
            a: 0x1111_1111_1111_1111,
            b: 0x2222_2222_2222_2222,
        };

        let a = resolve_field(&base, &base.a).unwrap();
        let b = resolve_field(&base, &base.b).unwrap();
        assert_ne!(a.offset, b.offset);
        assert_eq!(a.size, 8);

        // Offsets are a property of the type: a second instance with
        // different (still distinct) values resolves identically.
        let other = Base {
            a: 0x3333_3333_3333_3333,
            b: 0x4444_4444_4444_4444,
        };
        assert_eq!(resolve_field(&other, &other.a).unwrap().offset, a.offset);
        assert_eq!(resolve_field(&other, &other.b).unwrap().offset, b.offset);
    }

    #[test]
    fn identical_byte_patterns_are_ambiguous() {
        struct Base {
            a: u32,
            _b: u32,
        }
        let base = Base { a: 7, _b: 7 };
        assert_eq!(resolve_field(&base, &base.a), Err(OffsetError::Ambiguous(2)));
    }

    #[test]
    fn unrelated_value_has_no_match() {
        let base: u64 = 0xdead_beef;
        let needle: u32 = 0x1234_5678;
        assert_eq!(resolve_field(&base, &needle), Err(OffsetError::NoMatch));
    }

    #[test]
    fn arc_handles_are_unique_per_field() {
        use std::sync::Arc;
        // The practical case: container handles are heap pointers, which are
        // unique per instance even when the pointed-to values are equal.
        struct Base {
            a: Arc<i32>,
            b: Arc<i32>,
        }
        let base = Base {
            a: Arc::new(1),
            b: Arc::new(1),
        };
        let a = resolve_field(&base, &base.a).unwrap();
        let b = resolve_field(&base, &base.b).unwrap();
        assert_ne!(a.offset, b.offset);
    }
}
