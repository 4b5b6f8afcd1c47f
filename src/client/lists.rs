//! Local list updates applied after a successful create, update or delete,
//! so a list view stays in step with the detail view without a refetch.

use crate::models::Identified;

/// Put `item` at the front, dropping any entry with the same id.
pub fn add_to_list<T: Identified>(list: &mut Vec<T>, item: T) {
    list.retain(|existing| existing.id() != item.id());
    list.insert(0, item);
}

/// Drop the entry with `id`. Returns whether anything was removed.
pub fn remove_from_list<T: Identified>(list: &mut Vec<T>, id: &str) -> bool {
    let before = list.len();
    list.retain(|existing| existing.id() != id);
    list.len() != before
}

/// Swap in `item` where its id already sits. Returns `false` and leaves the
/// list alone when the id is absent.
pub fn replace_in_list<T: Identified>(list: &mut [T], item: T) -> bool {
    match list.iter_mut().find(|existing| existing.id() == item.id()) {
        Some(slot) => {
            *slot = item;
            true
        }
        None => false,
    }
}
