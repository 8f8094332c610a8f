//! Equality and hashing of identities agree.

use proptest::prelude::*;
use spool_core::prelude::*;
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

fn hash_of<H: Hash>(value: &H) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

proptest! {
    #[test]
    fn named_ids_equal_iff_names_equal(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        let left = StreamId::<i32>::named(a.as_str());
        let right = StreamId::<i32>::named(b.as_str());

        prop_assert_eq!(left == right, a == b);
        if left == right {
            prop_assert_eq!(hash_of(&left), hash_of(&right));
        }
    }

    #[test]
    fn delayed_ids_follow_duration(name in "[a-z]{1,8}", a in 0u64..5_000, b in 0u64..5_000) {
        let source = StreamId::<i32>::named(name.as_str());
        let left = delayed(&source, Duration::from_millis(a));
        let right = delayed(&source, Duration::from_millis(b));

        prop_assert_eq!(left == right, a == b);
        if a == b {
            prop_assert_eq!(hash_of(&left), hash_of(&right));
        }
    }

    #[test]
    fn merged_ids_follow_sources(names in proptest::collection::vec("[a-z]{1,4}", 1..6)) {
        let ids: Vec<StreamId<i32>> =
            names.iter().map(|name| StreamId::named(name.as_str())).collect();
        let conversion = Conversion::new(|v: &i32| Some(*v));

        let left = mapped(&merged(&ids).unwrap(), &conversion);
        let right = mapped(&merged(ids.iter()).unwrap(), &conversion);

        prop_assert_eq!(&left, &right);
        prop_assert_eq!(hash_of(&left), hash_of(&right));
    }
}
