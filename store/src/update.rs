//! The generic add/merge routine shared by every backend (spec.md
//! §4.8), built once on top of the [`crate::api::Storage`] trait
//! rather than duplicated per backend.

use onak_openpgp::merge::merge;
use onak_openpgp::{key, Fingerprint, PublicKey};

use crate::api::Storage;
use crate::Result;

/// Adds or merges each of `keys` into `storage`.
///
/// For each key: blacklisted fingerprints are skipped outright; an
/// absent key is skipped when `update_only` is set (no fresh key
/// creation from e.g. a passive sync feed); otherwise the incoming key
/// is merged with whatever is already stored (or stored as-is if
/// nothing was), within its own transaction.
///
/// Each element of `keys` is rewritten in place to hold only its own
/// delta against what was already stored -- the minimum set of packets
/// a caller (e.g. a mail-announce or peer-sync feature) needs to
/// propagate further. Returns the number of keys that were new to
/// `storage`.
pub fn update_keys(
    storage: &mut dyn Storage,
    keys: &mut Vec<PublicKey>,
    blacklist: &[Fingerprint],
    update_only: bool,
) -> Result<usize> {
    let mut new_count = 0;

    for key in keys.iter_mut() {
        let fp = match key::fingerprint_of_key(key) {
            Ok(fp) => fp,
            Err(_) => continue,
        };
        if blacklist.iter().any(|b| b.as_bytes() == fp.as_bytes()) {
            continue;
        }

        storage.begin_tx()?;
        let existing = storage.fetch_by_fingerprint(&fp)?;

        if existing.is_none() && update_only {
            storage.end_tx(false)?;
            continue;
        }

        let result = match &existing {
            Some(old) => merge(old, key),
            None => Ok(onak_openpgp::merge::MergeResult {
                merged: key.clone(),
                delta: key.clone(),
            }),
        };

        let result = match result {
            Ok(result) => result,
            Err(err) => {
                storage.end_tx(false)?;
                return Err(err.into());
            }
        };

        let delta_is_empty = result.delta.revocations.is_empty()
            && result.delta.uids.is_empty()
            && result.delta.subkeys.is_empty();
        if !delta_is_empty {
            if let Err(err) = storage.store(&result.merged, true, existing.is_some()) {
                storage.end_tx(false)?;
                return Err(err);
            }
        }
        storage.end_tx(true)?;

        if existing.is_none() {
            new_count += 1;
        }
        *key = result.delta;
    }

    Ok(new_count)
}
