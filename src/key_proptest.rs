//! Property-based tests for cache key construction.

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use crate::key::{build_key, RepositoryIdentity};

    fn sha_strategy() -> impl Strategy<Value = String> {
        "[0-9a-f]{40}"
    }

    fn identity() -> RepositoryIdentity {
        RepositoryIdentity::new("https://git.example.com", "platform", "infra").unwrap()
    }

    proptest! {
        /// Property: any permutation of the overlay commits yields the same key
        #[test]
        fn key_ignores_overlay_order(
            base in sha_strategy(),
            overlays in prop::collection::vec(sha_strategy(), 0..8).prop_shuffle(),
            seed in any::<u64>(),
        ) {
            let mut shuffled = overlays.clone();
            // Deterministic rotation plus reversal gives a second ordering
            if !shuffled.is_empty() {
                let len = shuffled.len();
                shuffled.rotate_left((seed as usize) % len);
                shuffled.reverse();
            }
            let k1 = build_key(&identity(), &base, &overlays).unwrap();
            let k2 = build_key(&identity(), &base, &shuffled).unwrap();
            prop_assert_eq!(k1.to_string(), k2.to_string());
            prop_assert_eq!(k1, k2);
        }

        /// Property: duplicated overlay commits collapse to one
        #[test]
        fn key_ignores_duplicates(base in sha_strategy(), overlays in prop::collection::vec(sha_strategy(), 1..6)) {
            let mut doubled = overlays.clone();
            doubled.extend(overlays.iter().cloned());
            let k1 = build_key(&identity(), &base, &overlays).unwrap();
            let k2 = build_key(&identity(), &base, &doubled).unwrap();
            prop_assert_eq!(k1, k2);
        }

        /// Property: adding one commit not already in the set changes the key
        #[test]
        fn key_changes_with_extra_overlay(
            base in sha_strategy(),
            overlays in prop::collection::btree_set(sha_strategy(), 0..6),
            extra in sha_strategy(),
        ) {
            prop_assume!(!overlays.contains(&extra));
            let overlays: Vec<String> = overlays.into_iter().collect();
            let mut extended = overlays.clone();
            extended.push(extra);
            let k1 = build_key(&identity(), &base, &overlays).unwrap();
            let k2 = build_key(&identity(), &base, &extended).unwrap();
            prop_assert_ne!(k1, k2);
        }

        /// Property: overlay commits in the key are always sorted and unique
        #[test]
        fn key_overlays_are_sorted(base in sha_strategy(), overlays in prop::collection::vec(sha_strategy(), 0..8)) {
            let key = build_key(&identity(), &base, &overlays).unwrap();
            let shas = key.overlay_shas();
            prop_assert!(shas.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
