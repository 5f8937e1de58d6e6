//! Property tests for envelopes, key records and items.

use agilekeychain_core::crypto::{CryptoError, KeyDerivation, MasterKey, envelope};
use agilekeychain_core::vault::{EncryptionKey, KeychainItem, SecurityLevel};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde_json::{Map, Value};

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        ".{0,40}".prop_map(Value::from),
    ]
}

fn payload_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-zA-Z]{1,12}", json_leaf(), 0..8)
        .prop_map(|fields| fields.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_item_roundtrip(payload in payload_strategy(), seed in any::<u64>()) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let master = MasterKey::random(&mut rng);

        let mut item = KeychainItem::new("UUID", "KEY");
        item.set_private_contents(payload.clone());
        item.encrypt(&master, &mut rng).unwrap();
        prop_assert!(item.payload().is_none());

        item.decrypt(&master).unwrap();
        prop_assert_eq!(item.payload(), Some(&payload));
    }

    #[test]
    fn test_envelope_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..200),
                               secret in prop::collection::vec(any::<u8>(), 1..64),
                               seed in any::<u64>()) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let sealed = envelope::seal(&plaintext, &secret, KeyDerivation::Legacy, &mut rng).unwrap();
        prop_assert!(sealed.starts_with(envelope::MAGIC));
        prop_assert_eq!((sealed.len() - envelope::HEADER_LEN) % 16, 0);

        let opened = envelope::open(&sealed, &secret, KeyDerivation::Legacy).unwrap();
        prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_wrong_password_never_returns_a_key(wrong in "[a-z]{0,16}") {
        prop_assume!(wrong != "correct");
        let mut rng = ChaCha20Rng::seed_from_u64(17);
        let master = MasterKey::random(&mut rng);
        let key = EncryptionKey::create(
            "ID",
            SecurityLevel::Sl3,
            &master,
            b"correct",
            KeyDerivation::Legacy,
            &mut rng,
        )
        .unwrap();

        prop_assert!(matches!(
            key.decrypt(wrong.as_bytes()),
            Err(CryptoError::InvalidPassword)
        ));
    }

    #[test]
    fn test_truncated_envelope_is_rejected(cut in 1usize..32) {
        let mut rng = ChaCha20Rng::seed_from_u64(23);
        let sealed = envelope::seal(b"0123456789abcdef", b"k", KeyDerivation::Legacy, &mut rng).unwrap();
        let truncated = &sealed[..sealed.len() - cut];
        prop_assert!(envelope::open(truncated, b"k", KeyDerivation::Legacy).is_err());
    }
}
