//! Pure transformations that advance a local collection after a confirmed
//! remote write.
//!
//! Each function returns a new collection and leaves its input untouched, so
//! a caller that never calls them (because the write failed) keeps exactly
//! the state it had.

use rollcall_core::{record_id, Collection, Record, RecordId};

fn has_id(record: &Record, id_field: &str, id: &RecordId) -> bool {
    record.get(id_field).is_some_and(|value| id.matches(value))
}

/// Shallow-merge `patch` into the record whose `id_field` equals `id`.
pub fn apply_update(
    collection: &[Record],
    id_field: &str,
    id: &RecordId,
    patch: &Record,
) -> Collection {
    collection
        .iter()
        .map(|record| {
            if has_id(record, id_field, id) {
                let mut merged = record.clone();
                for (key, value) in patch {
                    merged.insert(key.clone(), value.clone());
                }
                merged
            } else {
                record.clone()
            }
        })
        .collect()
}

pub fn apply_removal(collection: &[Record], id_field: &str, id: &RecordId) -> Collection {
    collection
        .iter()
        .filter(|record| !has_id(record, id_field, id))
        .cloned()
        .collect()
}

/// Append `item`, or replace in place the record that already has its id.
pub fn apply_insertion(collection: &[Record], id_field: &str, item: Record) -> Collection {
    let mut out = collection.to_vec();
    upsert(&mut out, id_field, item);
    out
}

/// [`apply_insertion`] for each item, in arrival order.
pub fn apply_bulk_insertion(
    collection: &[Record],
    id_field: &str,
    items: Vec<Record>,
) -> Collection {
    let mut out = collection.to_vec();
    for item in items {
        upsert(&mut out, id_field, item);
    }
    out
}

fn upsert(collection: &mut Collection, id_field: &str, item: Record) {
    let existing = record_id(&item, id_field)
        .and_then(|id| collection.iter().position(|record| has_id(record, id_field, &id)));
    match existing {
        Some(index) => collection[index] = item,
        None => collection.push(item),
    }
}
