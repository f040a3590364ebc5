//! Dynamic property updates.
//!
//! Before every evaluation of a view or app body, each of the aggregate's
//! reactive fields must be refreshed with its counterpart from the previous
//! aggregate instance and the current environment, without the caller
//! enumerating fields by hand.
//!
//! The first time a type is updated, its declared fields are resolved to byte
//! offsets ([`FieldOffset`]); if every field resolves, the type gets a cached
//! list of [`UpdaterEntry`] and subsequent updates read fields straight out of
//! both instances at the cached offsets. If any field fails to resolve, the
//! type permanently falls back to structural traversal on every call. The
//! fallback is correctness-preserving but drastically slower, so it is
//! reported once per type as a diagnostic warning, not an error.

use crate::environment::Environment;
use crate::state::offset::FieldOffset;
use crate::state::property::{DynamicProperties, PropertyCollector};
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::mem;
use std::ptr;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// One field's cached refresh operation.
#[derive(Clone, Copy)]
pub(crate) struct UpdaterEntry {
    /// Where the field lives within the aggregate.
    pub(crate) offset: FieldOffset,
    /// Monomorphized refresh invoking the field's own update contract.
    pub(crate) update: unsafe fn(*const u8, *const u8, &Environment),
}

#[derive(Clone)]
enum TypeEntry {
    /// Every field resolved; updates go through cached offsets.
    Fast(Arc<Vec<UpdaterEntry>>),
    /// Offset resolution failed; every update traverses structurally.
    Fallback,
}

/// Process-wide cache of per-aggregate-type update strategies.
///
/// One instance lives for the process lifetime (see [`UpdaterCache::global`]);
/// tests that need isolation can construct their own.
pub struct UpdaterCache {
    types: Mutex<HashMap<TypeId, TypeEntry>>,
}

impl UpdaterCache {
    /// Creates an empty cache.
    pub fn new() -> UpdaterCache {
        UpdaterCache {
            types: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide cache.
    pub fn global() -> &'static UpdaterCache {
        static GLOBAL: OnceLock<UpdaterCache> = OnceLock::new();
        GLOBAL.get_or_init(UpdaterCache::new)
    }

    /// Refreshes every reactive field of `value`, giving each field its
    /// counterpart from `previous` (when present and of the same type).
    pub fn update(
        &self,
        value: &dyn DynamicProperties,
        previous: Option<&dyn DynamicProperties>,
        environment: &Environment,
    ) {
        let any = value.as_any();
        // A zero-sized aggregate has no reactive fields to inspect.
        if mem::size_of_val(any) == 0 {
            return;
        }

        let type_id = any.type_id();
        let previous = previous.filter(|p| p.as_any().type_id() == type_id);

        let entry = self.types.lock().get(&type_id).cloned();
        match entry {
            Some(TypeEntry::Fast(entries)) => {
                run_fast(&entries, value, previous, environment);
            }
            Some(TypeEntry::Fallback) => {
                run_fallback(value, previous, environment);
            }
            None => {
                let mut entries = Vec::new();
                let mut failure = None;
                let mut collector = PropertyCollector::resolver(
                    any,
                    value.type_name(),
                    &mut entries,
                    &mut failure,
                );
                value.visit_properties(&mut collector);

                if failure.is_none() {
                    let entries = Arc::new(entries);
                    self.types
                        .lock()
                        .insert(type_id, TypeEntry::Fast(Arc::clone(&entries)));
                    run_fast(&entries, value, previous, environment);
                } else {
                    warn!(
                        aggregate = value.type_name(),
                        "property offsets could not be resolved; falling back to \
                         structural property updates for this type"
                    );
                    self.types.lock().insert(type_id, TypeEntry::Fallback);
                    run_fallback(value, previous, environment);
                }
            }
        }
    }
}

impl Default for UpdaterCache {
    fn default() -> Self {
        UpdaterCache::new()
    }
}

/// Fast path: read both instances at cached offsets.
fn run_fast(
    entries: &[UpdaterEntry],
    value: &dyn DynamicProperties,
    previous: Option<&dyn DynamicProperties>,
    environment: &Environment,
) {
    let new_base = value.as_any() as *const dyn std::any::Any as *const u8;
    let old_base = previous.map(|p| p.as_any() as *const dyn std::any::Any as *const u8);
    for entry in entries {
        unsafe {
            let new_field = entry.offset.field_ptr(new_base);
            let old_field = old_base.map_or(ptr::null(), |base| entry.offset.field_ptr(base));
            (entry.update)(new_field, old_field, environment);
        }
    }
}

/// Fallback path: record the previous instance's fields, then traverse the
/// new instance pairing fields by declaration order.
fn run_fallback(
    value: &dyn DynamicProperties,
    previous: Option<&dyn DynamicProperties>,
    environment: &Environment,
) {
    let mut recorded = Vec::new();
    if let Some(previous) = previous {
        let mut recorder = PropertyCollector::recorder(&mut recorded);
        previous.visit_properties(&mut recorder);
    }

    let previous_fields = previous.is_some().then_some(recorded.as_slice());
    let mut updater =
        PropertyCollector::updater(previous_fields, environment, value.type_name());
    value.visit_properties(&mut updater);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic_properties;
    use crate::state::property::DynamicProperty;
    use std::cell::RefCell;
    use std::sync::Arc as StdArc;

    thread_local! {
        static UPDATE_LOG: RefCell<Vec<(u64, Option<u64>)>> = RefCell::new(Vec::new());
    }

    fn take_log() -> Vec<(u64, Option<u64>)> {
        UPDATE_LOG.with(|log| log.borrow_mut().drain(..).collect())
    }

    /// A property whose byte image is a unique heap pointer, like the real
    /// containers.
    #[derive(Debug)]
    struct Unique {
        handle: StdArc<u64>,
    }

    impl Unique {
        fn new(id: u64) -> Unique {
            Unique {
                handle: StdArc::new(id),
            }
        }
    }

    impl DynamicProperty for Unique {
        fn update(&self, previous: Option<&Self>, _environment: &Environment) {
            UPDATE_LOG.with(|log| {
                log.borrow_mut()
                    .push((*self.handle, previous.map(|p| *p.handle)));
            });
        }
    }

    /// A property engineered to share its byte image with its neighbor.
    #[derive(Debug)]
    struct Dup(u64);

    impl DynamicProperty for Dup {
        fn update(&self, previous: Option<&Self>, _environment: &Environment) {
            UPDATE_LOG.with(|log| {
                log.borrow_mut().push((self.0, previous.map(|p| p.0)));
            });
        }
    }

    #[derive(Debug)]
    struct TwoFields {
        first: Unique,
        second: Unique,
    }
    dynamic_properties!(TwoFields { first, second });

    #[derive(Debug)]
    struct Ambiguous {
        left: Dup,
        right: Dup,
    }
    dynamic_properties!(Ambiguous { left, right });

    #[derive(Debug)]
    struct NoFields;
    dynamic_properties!(NoFields);

    #[test]
    fn fast_path_pairs_old_and_new_fields() {
        let cache = UpdaterCache::new();
        let environment = Environment::new();

        let old = TwoFields {
            first: Unique::new(1),
            second: Unique::new(2),
        };
        cache.update(&old, None, &environment);
        assert_eq!(take_log(), vec![(1, None), (2, None)]);

        let new = TwoFields {
            first: Unique::new(3),
            second: Unique::new(4),
        };
        cache.update(&new, Some(&old), &environment);
        assert_eq!(take_log(), vec![(3, Some(1)), (4, Some(2))]);
    }

    #[test]
    fn ambiguous_fields_fall_back_but_skip_nothing() {
        let cache = UpdaterCache::new();
        let environment = Environment::new();

        let old = Ambiguous {
            left: Dup(7),
            right: Dup(7),
        };
        cache.update(&old, None, &environment);
        assert_eq!(take_log(), vec![(7, None), (7, None)]);

        let new = Ambiguous {
            left: Dup(8),
            right: Dup(9),
        };
        cache.update(&new, Some(&old), &environment);
        assert_eq!(take_log(), vec![(8, Some(7)), (9, Some(7))]);
    }

    #[test]
    fn previous_of_different_type_is_ignored() {
        let cache = UpdaterCache::new();
        let environment = Environment::new();

        let other = Ambiguous {
            left: Dup(1),
            right: Dup(2),
        };
        let value = TwoFields {
            first: Unique::new(5),
            second: Unique::new(6),
        };
        cache.update(&value, Some(&other), &environment);
        assert_eq!(take_log(), vec![(5, None), (6, None)]);
    }

    #[test]
    fn zero_sized_aggregate_short_circuits() {
        let cache = UpdaterCache::new();
        let environment = Environment::new();
        cache.update(&NoFields, None, &environment);
        assert!(take_log().is_empty());
    }
}
