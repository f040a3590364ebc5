//! Reactive property contracts and field visitation.
//!
//! An *aggregate* (a view or app value) carries zero or more reactive
//! fields: containers such as [`State`](crate::state::State) whose changes
//! should trigger recomputation. Aggregates declare their fields once, in stable
//! order, via [`dynamic_properties!`]; the updater uses that visitation to
//! resolve byte offsets on first contact and to traverse structurally when
//! resolution fails.

use crate::environment::Environment;
use crate::state::offset::{FieldOffset, OffsetError};
use crate::state::publisher::Publisher;
use crate::state::updater::UpdaterEntry;
use std::any::{Any, TypeId};
use std::mem;
use tracing::warn;

/// A field whose value changes should trigger downstream recomputation.
///
/// Implemented by the state containers; the contract is invoked before every
/// re-evaluation of the enclosing aggregate's body so that a freshly
/// constructed aggregate value can adopt the persistent storage of its
/// predecessor.
pub trait DynamicProperty: 'static {
    /// Refreshes this property from its counterpart on the previous aggregate
    /// instance (if one exists) and the current environment.
    fn update(&self, previous: Option<&Self>, environment: &Environment)
    where
        Self: Sized;

    /// The publisher of this property's changes, if it is observable.
    fn did_change(&self) -> Option<Publisher> {
        None
    }
}

/// An aggregate with declared reactive fields.
///
/// Usually implemented with [`dynamic_properties!`] rather than by hand.
pub trait DynamicProperties: Any {
    /// For downcasting and byte-level inspection.
    fn as_any(&self) -> &dyn Any;

    /// The aggregate's type name, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Visits every reactive field, in declaration order.
    fn visit_properties(&self, collector: &mut PropertyCollector<'_>);
}

/// Implements [`DynamicProperties`] for a type, declaring its reactive
/// fields.
///
/// The field list assigns each reactive field a stable identity (its position
/// in the list), which is what the update machinery keys on.
///
/// ```
/// use perch::{dynamic_properties, State};
///
/// #[derive(Debug)]
/// struct Settings {
///     volume: State<i32>,
///     muted: State<bool>,
/// }
/// dynamic_properties!(Settings { volume, muted });
///
/// #[derive(Debug)]
/// struct Plain;
/// dynamic_properties!(Plain);
/// ```
#[macro_export]
macro_rules! dynamic_properties {
    ($ty:ty) => {
        impl $crate::DynamicProperties for $ty {
            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }
            fn type_name(&self) -> &'static str {
                ::core::any::type_name::<$ty>()
            }
            fn visit_properties(&self, _collector: &mut $crate::PropertyCollector<'_>) {}
        }
    };
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::DynamicProperties for $ty {
            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }
            fn type_name(&self) -> &'static str {
                ::core::any::type_name::<$ty>()
            }
            fn visit_properties(&self, collector: &mut $crate::PropertyCollector<'_>) {
                $(collector.visit(stringify!($field), &self.$field);)+
            }
        }
    };
}

/// A field of a previous aggregate instance, recorded for the fallback path.
pub(crate) struct RecordedField {
    type_id: TypeId,
    ptr: *const u8,
}

enum Mode<'a> {
    /// Resolving byte offsets for every field of a newly seen aggregate type.
    Resolve {
        base: *const u8,
        base_size: usize,
        type_name: &'static str,
        entries: &'a mut Vec<UpdaterEntry>,
        failure: &'a mut Option<OffsetError>,
    },
    /// Recording the previous instance's fields for a structural update.
    Record { fields: &'a mut Vec<RecordedField> },
    /// Structurally updating each field against the recorded previous fields.
    Update {
        previous: Option<&'a [RecordedField]>,
        index: usize,
        environment: &'a Environment,
        type_name: &'static str,
    },
    /// Collecting the publishers of all observable fields.
    Publishers { out: &'a mut Vec<Publisher> },
}

/// Receives an aggregate's reactive fields during visitation.
///
/// The collector is always constructed by the update machinery; aggregate
/// implementations only ever call [`visit`](Self::visit) on it.
pub struct PropertyCollector<'a> {
    mode: Mode<'a>,
}

impl<'a> PropertyCollector<'a> {
    pub(crate) fn resolver(
        base: &dyn Any,
        type_name: &'static str,
        entries: &'a mut Vec<UpdaterEntry>,
        failure: &'a mut Option<OffsetError>,
    ) -> PropertyCollector<'a> {
        PropertyCollector {
            mode: Mode::Resolve {
                base_size: mem::size_of_val(base),
                base: base as *const dyn Any as *const u8,
                type_name,
                entries,
                failure,
            },
        }
    }

    pub(crate) fn recorder(fields: &'a mut Vec<RecordedField>) -> PropertyCollector<'a> {
        PropertyCollector {
            mode: Mode::Record { fields },
        }
    }

    pub(crate) fn updater(
        previous: Option<&'a [RecordedField]>,
        environment: &'a Environment,
        type_name: &'static str,
    ) -> PropertyCollector<'a> {
        PropertyCollector {
            mode: Mode::Update {
                previous,
                index: 0,
                environment,
                type_name,
            },
        }
    }

    pub(crate) fn publishers(out: &'a mut Vec<Publisher>) -> PropertyCollector<'a> {
        PropertyCollector {
            mode: Mode::Publishers { out },
        }
    }

    /// Visits one reactive field.
    pub fn visit<P: DynamicProperty>(&mut self, label: &str, field: &P) {
        match &mut self.mode {
            Mode::Resolve {
                base,
                base_size,
                type_name,
                entries,
                failure,
            } => {
                // One failed field fails the whole type; remaining fields
                // will be handled structurally anyway.
                if failure.is_some() {
                    return;
                }
                let resolved = unsafe {
                    FieldOffset::resolve(
                        *base,
                        *base_size,
                        field as *const P as *const u8,
                        mem::size_of::<P>(),
                        mem::align_of::<P>(),
                    )
                };
                match resolved {
                    Ok(offset) => entries.push(UpdaterEntry {
                        offset,
                        update: update_field_raw::<P>,
                    }),
                    Err(error) => {
                        warn!(
                            aggregate = *type_name,
                            field = label,
                            %error,
                            "failed to resolve property offset"
                        );
                        **failure = Some(error);
                    }
                }
            }
            Mode::Record { fields } => fields.push(RecordedField {
                type_id: TypeId::of::<P>(),
                ptr: field as *const P as *const u8,
            }),
            Mode::Update {
                previous,
                index,
                environment,
                type_name,
            } => {
                let counterpart = previous.and_then(|fields| fields.get(*index));
                let previous_field = match counterpart {
                    Some(recorded) if recorded.type_id == TypeId::of::<P>() => {
                        Some(unsafe { &*recorded.ptr.cast::<P>() })
                    }
                    Some(_) => {
                        // A field changed type between evaluations of the
                        // same aggregate type; treat it as brand new.
                        warn!(
                            aggregate = *type_name,
                            field = label,
                            "previous property has a different type; not restoring it"
                        );
                        None
                    }
                    None => None,
                };
                field.update(previous_field, environment);
                *index += 1;
            }
            Mode::Publishers { out } => {
                if let Some(publisher) = field.did_change() {
                    out.push(publisher);
                }
            }
        }
    }
}

/// Monomorphized raw-field update, stored per [`UpdaterEntry`].
///
/// # Safety
/// `new` (and `old`, when non-null) must point to a `P` within an aggregate
/// of the type the entry was resolved for.
unsafe fn update_field_raw<P: DynamicProperty>(
    new: *const u8,
    old: *const u8,
    environment: &Environment,
) {
    let new = &*new.cast::<P>();
    let old = if old.is_null() {
        None
    } else {
        Some(&*old.cast::<P>())
    };
    new.update(old, environment);
}

/// Collects the publishers of every observable reactive field of `value`.
pub fn collect_publishers(value: &dyn DynamicProperties) -> Vec<Publisher> {
    let mut out = Vec::new();
    let mut collector = PropertyCollector::publishers(&mut out);
    value.visit_properties(&mut collector);
    out
}
