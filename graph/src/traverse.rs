//! BFS primitives over the [`SigCache`] (spec.md §4.12), grounded in
//! `stats.c`'s `findpath`/`furthestkey` and `sixdegrees.c`'s
//! `countdegree`/`sixdegrees`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use onak_openpgp::KeyId;

use crate::cache::{EdgeSource, SigCache};

/// A process-wide cancellation flag, polled between BFS frontier
/// levels (spec.md §5 "Cancellation"). A signal handler installed by
/// the binary sets this; traversals never install their own handler.
pub type Cancel = Arc<AtomicBool>;

/// Creates a fresh, unset cancellation flag.
pub fn new_cancel() -> Cancel {
    Arc::new(AtomicBool::new(false))
}

fn is_cancelled(cancel: &Cancel) -> bool {
    cancel.load(Ordering::Relaxed)
}

/// Single-source BFS from `want` over the "who signed this key" edge,
/// looking for `have` (spec.md §4.12's `find_path`, `findpath` in the
/// source).
///
/// Stops as soon as `have` is coloured or the frontier is exhausted.
/// Returns the number of keys examined (not including `want` itself).
/// The path itself can be reconstructed afterwards by walking
/// `parent` pointers from `have` back to `want`.
pub fn find_path(
    cache: &mut SigCache,
    source: &mut impl EdgeSource,
    have: KeyId,
    want: KeyId,
    cancel: &Cancel,
) -> usize {
    let mut examined = 0;
    let mut frontier = vec![want];
    let mut depth = 1u32;

    while !frontier.is_empty() && cache.get(have).map(|k| k.colour).unwrap_or(0) == 0 {
        if is_cancelled(cancel) {
            break;
        }
        let mut next = Vec::new();
        for node in frontier {
            cache.ensure_edges(node, source);
            let signers = cache.get(node).map(|k| k.sigs.clone()).unwrap_or_default();
            for signer in signers {
                if cache.get(signer).map(|k| k.colour).unwrap_or(0) == 0 {
                    examined += 1;
                    cache.set_colour(signer, depth, Some(node));
                    next.push(signer);
                }
                if cache.get(have).map(|k| k.colour).unwrap_or(0) != 0 {
                    break;
                }
            }
            if cache.get(have).map(|k| k.colour).unwrap_or(0) != 0 {
                break;
            }
        }
        frontier = next;
        depth += 1;
    }

    examined
}

/// Walks `parent` pointers from `target` back to the BFS root,
/// returning the path root-first. Only meaningful immediately after a
/// traversal that coloured `target`.
pub fn reconstruct_path(cache: &SigCache, mut target: KeyId) -> Vec<KeyId> {
    let mut path = vec![target];
    while let Some(parent) = cache.get(target).and_then(|k| k.parent) {
        path.push(parent);
        target = parent;
    }
    path.reverse();
    path
}

/// BFS from `root`; returns the key with the greatest colour (BFS
/// depth) seen, i.e. the most distant key reachable via the "who
/// signed this key" edge (spec.md §4.12's `furthest_key`,
/// `furthestkey` in the source).
pub fn furthest_key(cache: &mut SigCache, source: &mut impl EdgeSource, root: KeyId, cancel: &Cancel) -> KeyId {
    let mut furthest = root;
    let mut furthest_depth = 0u32;
    let mut frontier = vec![root];
    let mut depth = 1u32;

    while !frontier.is_empty() {
        if is_cancelled(cancel) {
            break;
        }
        let mut next = Vec::new();
        for node in frontier {
            cache.ensure_edges(node, source);
            let signers = cache.get(node).map(|k| k.sigs.clone()).unwrap_or_default();
            for signer in signers {
                if cache.get(signer).map(|k| k.colour).unwrap_or(0) == 0 {
                    cache.set_colour(signer, depth, Some(node));
                    if depth > furthest_depth {
                        furthest_depth = depth;
                        furthest = signer;
                    }
                    next.push(signer);
                }
            }
        }
        frontier = next;
        depth += 1;
    }

    furthest
}

/// BFS from `root`, counting distinct keys coloured at depth `<=
/// max_depth` (spec.md §4.12's `count_degree`, `countdegree` in the
/// source). Callers must [`SigCache::initcolour`] first if they want
/// a traversal independent of any prior one.
pub fn count_degree(
    cache: &mut SigCache,
    source: &mut impl EdgeSource,
    root: KeyId,
    max_depth: u32,
    cancel: &Cancel,
) -> usize {
    let mut count = 0;
    let mut frontier = vec![root];
    let mut depth = 1u32;

    while !frontier.is_empty() && depth <= max_depth {
        if is_cancelled(cancel) {
            break;
        }
        let mut next = Vec::new();
        for node in frontier {
            cache.ensure_edges(node, source);
            let signers = cache.get(node).map(|k| k.sigs.clone()).unwrap_or_default();
            for signer in signers {
                if cache.get(signer).map(|k| k.colour).unwrap_or(0) == 0 {
                    count += 1;
                    cache.set_colour(signer, depth, Some(node));
                    next.push(signer);
                }
            }
        }
        frontier = next;
        depth += 1;
    }

    count
}

/// For depths 1..=6 (the "six degrees of trust" query), resets colour
/// and recomputes [`count_degree`] from scratch at each depth,
/// returning `(depth, count)` pairs (`sixdegrees.c`'s `sixdegrees`,
/// generalised to a caller-chosen `max_depth` rather than the
/// hardcoded 6).
pub fn degree_histogram(
    cache: &mut SigCache,
    source: &mut impl EdgeSource,
    root: KeyId,
    max_depth: u32,
    cancel: &Cancel,
) -> Vec<(u32, usize)> {
    let mut histogram = Vec::with_capacity(max_depth as usize);
    for depth in 1..=max_depth {
        cache.initcolour(false);
        let count = count_degree(cache, source, root, depth, cancel);
        histogram.push((depth, count));
        if is_cancelled(cancel) {
            break;
        }
    }
    histogram
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_source() -> impl FnMut(KeyId) -> Vec<KeyId> {
        // 1 signed by 2, 2 signed by 3, 3 signed by 4.
        |keyid: KeyId| match keyid.0 {
            1 => vec![KeyId(2)],
            2 => vec![KeyId(3)],
            3 => vec![KeyId(4)],
            _ => vec![],
        }
    }

    #[test]
    fn find_path_reaches_a_reachable_key() {
        let mut cache = SigCache::new();
        let mut source = chain_source();
        let cancel = new_cancel();
        find_path(&mut cache, &mut source, KeyId(4), KeyId(1), &cancel);
        assert_eq!(cache.get(KeyId(4)).unwrap().colour, 3);
        assert_eq!(reconstruct_path(&cache, KeyId(4)), vec![KeyId(1), KeyId(2), KeyId(3), KeyId(4)]);
    }

    #[test]
    fn find_path_stops_when_unreachable() {
        let mut cache = SigCache::new();
        let mut source = chain_source();
        let cancel = new_cancel();
        find_path(&mut cache, &mut source, KeyId(99), KeyId(1), &cancel);
        assert_eq!(cache.get(KeyId(99)), None);
    }

    #[test]
    fn furthest_key_finds_the_deepest_node() {
        let mut cache = SigCache::new();
        let mut source = chain_source();
        let cancel = new_cancel();
        let furthest = furthest_key(&mut cache, &mut source, KeyId(1), &cancel);
        assert_eq!(furthest, KeyId(4));
    }

    #[test]
    fn count_degree_respects_max_depth() {
        let mut cache = SigCache::new();
        let mut source = chain_source();
        let cancel = new_cancel();
        assert_eq!(count_degree(&mut cache, &mut source, KeyId(1), 1, &cancel), 1);
        cache.initcolour(false);
        assert_eq!(count_degree(&mut cache, &mut source, KeyId(1), 2, &cancel), 2);
    }

    #[test]
    fn degree_histogram_is_monotonic() {
        let mut cache = SigCache::new();
        let mut source = chain_source();
        let cancel = new_cancel();
        let histogram = degree_histogram(&mut cache, &mut source, KeyId(1), 4, &cancel);
        assert_eq!(histogram, vec![(1, 1), (2, 2), (3, 3), (4, 3)]);
    }

    #[test]
    fn cancellation_stops_traversal_early() {
        let mut cache = SigCache::new();
        let mut source = chain_source();
        let cancel = new_cancel();
        cancel.store(true, Ordering::Relaxed);
        let examined = find_path(&mut cache, &mut source, KeyId(4), KeyId(1), &cancel);
        assert_eq!(examined, 0);
    }
}
