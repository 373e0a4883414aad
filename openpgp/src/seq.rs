//! Small `Vec`-based helpers standing in for onak's generic linked
//! list (`ll.c`): `lladd`/`llfind`/`lldel` become plain slice
//! operations once the storage is a `Vec<T>` rather than a hand-rolled
//! list. Shared by `graph` and `store` as well as this crate.

/// Finds the first element satisfying `pred`, mirroring `llfind`'s
/// linear scan with a caller-supplied comparator.
pub fn find_by<T>(items: &[T], pred: impl Fn(&T) -> bool) -> Option<&T> {
    items.iter().find(|item| pred(item))
}

/// Appends `item` to `items`, mirroring `lladd`'s head-insert -- order
/// doesn't matter to any caller in this crate, so this simply pushes.
pub fn append<T>(items: &mut Vec<T>, item: T) {
    items.push(item);
}

/// Removes the first element equal to `key` under `key_fn`, mirroring
/// `lldel`. Returns the removed element, if any.
pub fn remove_by_key<T, K: PartialEq>(items: &mut Vec<T>, key: &K, key_fn: impl Fn(&T) -> K) -> Option<T> {
    let pos = items.iter().position(|item| key_fn(item) == *key)?;
    Some(items.remove(pos))
}

/// Deduplicates `items` by `key_fn`, keeping the first occurrence of
/// each key, mirroring the de-dup-before-insert pattern `llfind`
/// callers use ahead of `lladd`.
pub fn dedup_by_key<T, K: PartialEq>(items: Vec<T>, key_fn: impl Fn(&T) -> K) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let k = key_fn(&item);
        if !out.iter().any(|existing| key_fn(existing) == k) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_returns_first_match() {
        let items = vec![1, 2, 3, 4];
        assert_eq!(find_by(&items, |&x| x % 2 == 0), Some(&2));
    }

    #[test]
    fn remove_by_key_removes_one_match() {
        let mut items = vec![("a", 1), ("b", 2), ("c", 1)];
        let removed = remove_by_key(&mut items, &1, |&(_, v)| v);
        assert_eq!(removed, Some(("a", 1)));
        assert_eq!(items, vec![("b", 2), ("c", 1)]);
    }

    #[test]
    fn dedup_by_key_keeps_first_occurrence() {
        let items = vec![(1, "a"), (2, "b"), (1, "c")];
        let deduped = dedup_by_key(items, |&(k, _)| k);
        assert_eq!(deduped, vec![(1, "a"), (2, "b")]);
    }
}
