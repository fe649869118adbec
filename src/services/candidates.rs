use crate::models::Product;

/// Ids probed when checking whether a user owns `product`.
///
/// The product itself comes first, then its parent when it is a variation,
/// otherwise all of its variation children. Grants may have been recorded
/// against any of them. Duplicates and non-positive ids are dropped.
pub fn candidate_ids(product: &Product) -> Vec<i64> {
    let mut ids = vec![product.id];

    match product.parent() {
        Some(parent_id) => ids.push(parent_id),
        None if !product.is_variation() => ids.extend(product.children.iter().copied()),
        None => {}
    }

    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if id > 0 && !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
