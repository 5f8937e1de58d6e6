//! Vault creation, authentication, password rotation and item writes.

mod common;

use std::fs;

use agilekeychain_core::vault::{
    BUILD_NUMBER, DataSource, KeychainItem, KeysFormat, SecurityLevel, VaultError, VaultReader,
    new_identifier,
};
use common::*;
use serde_json::{Map, Value, json};

fn login_payload(password: &str) -> Map<String, Value> {
    match json!({
        "fields": [
            {"name": "username", "value": "bob", "designation": "username", "type": "T"},
            {"name": "password", "value": password, "designation": "password", "type": "P"}
        ]
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[test]
fn test_is_keychain_initialised_on_missing_folder() {
    assert!(!DataSource::new("nonexistingfolder").is_keychain_initialised());
}

#[test]
fn test_is_keychain_initialised_on_empty_path() {
    assert!(!DataSource::new("").is_keychain_initialised());
}

#[test]
fn test_fixture_is_initialised() {
    assert!(DataSource::new(fixture_path()).is_keychain_initialised());
}

#[test]
fn test_initialise_creates_layout() {
    init_tracing();
    let (_temp, source) = new_vault("password");
    let layout = source.layout();

    assert!(layout.keys_file(KeysFormat::Json).is_file());
    assert!(layout.keys_file(KeysFormat::Plist).is_file());
    assert_eq!(fs::read_to_string(layout.contents_file()).unwrap(), "[]");
    assert_eq!(
        fs::read_to_string(layout.build_number_file()).unwrap().trim(),
        BUILD_NUMBER
    );
    assert!(source.is_keychain_initialised());
}

#[test]
fn test_initialised_levels_share_master_key() {
    let (_temp, source) = new_vault("password");
    let sl3 = source.key_for_security_level(SecurityLevel::Sl3).unwrap().unwrap();
    let sl5 = source.key_for_security_level(SecurityLevel::Sl5).unwrap().unwrap();

    assert_ne!(sl3.identifier(), sl5.identifier());
    assert_ne!(sl3.encrypted_key(), sl5.encrypted_key());
    assert_eq!(
        sl3.decrypt(b"password").unwrap(),
        sl5.decrypt(b"password").unwrap()
    );
    assert!(source.verify_key_consistency("password").unwrap());
}

#[test]
fn test_fixture_levels_use_distinct_master_keys() {
    let source = DataSource::new(fixture_path());
    assert!(!source.verify_key_consistency(FIXTURE_PASSWORD).unwrap());
}

#[test]
fn test_verify_password() {
    let source = DataSource::new(fixture_path());
    assert!(source.verify_password(FIXTURE_PASSWORD));
    assert!(!source.verify_password("wrong password"));
    assert!(!source.verify_password(""));
}

#[test]
fn test_authenticate_prefers_sl5() {
    let source = DataSource::new(fixture_path());
    let master = source.authenticate(FIXTURE_PASSWORD).unwrap();
    let sl5 = source
        .key_for_security_level(SecurityLevel::Sl5)
        .unwrap()
        .unwrap()
        .decrypt(FIXTURE_PASSWORD.as_bytes())
        .unwrap();
    assert_eq!(master, sl5);
    assert!(matches!(
        source.authenticate("wrong password"),
        Err(VaultError::IncorrectPassword)
    ));
}

#[test]
fn test_set_password_rotates_every_record() {
    init_tracing();
    let (_temp, path) = fixture_copy();
    let source = DataSource::new(&path);
    let master_before = source.authenticate(FIXTURE_PASSWORD).unwrap();

    source
        .set_password(FIXTURE_PASSWORD, "rotated", &mut seeded_rng(2))
        .unwrap();

    assert!(!source.verify_password(FIXTURE_PASSWORD));
    assert!(source.verify_password("rotated"));
    assert_eq!(source.authenticate("rotated").unwrap(), master_before);

    // The generation-3 record was rotated too.
    let plist = source.repository().read_keys(KeysFormat::Plist).unwrap();
    for record in &plist.list {
        let key = agilekeychain_core::EncryptionKey::from_record(record).unwrap();
        assert!(key.decrypt(b"rotated").is_ok());
        assert!(key.decrypt(FIXTURE_PASSWORD.as_bytes()).is_err());
    }
}

#[test]
fn test_items_survive_password_rotation() {
    let (_temp, path) = fixture_copy();
    let source = DataSource::new(&path);

    source
        .set_password(FIXTURE_PASSWORD, "rotated", &mut seeded_rng(3))
        .unwrap();

    let mut item = source.item_by_id(FIXTURE_ITEM_ID).unwrap();
    let master = source
        .repository()
        .key_by_identifier(item.key_identifier())
        .unwrap()
        .unwrap()
        .decrypt(b"rotated")
        .unwrap();
    item.decrypt(&master).unwrap();
    assert_eq!(item.payload().unwrap()["notesPlain"], "fixture login");
}

#[test]
fn test_set_password_with_wrong_password_leaves_vault_untouched() {
    let (_temp, path) = fixture_copy();
    let source = DataSource::new(&path);
    let json_before = fs::read(source.layout().keys_file(KeysFormat::Json)).unwrap();
    let plist_before = fs::read(source.layout().keys_file(KeysFormat::Plist)).unwrap();

    assert!(matches!(
        source.set_password("wrong password", "rotated", &mut seeded_rng(4)),
        Err(VaultError::IncorrectPassword)
    ));
    assert_eq!(fs::read(source.layout().keys_file(KeysFormat::Json)).unwrap(), json_before);
    assert_eq!(fs::read(source.layout().keys_file(KeysFormat::Plist)).unwrap(), plist_before);
}

#[test]
fn test_add_item_and_read_back() {
    let (_temp, source) = new_vault("password");
    let mut rng = seeded_rng(5);
    let master = source.authenticate("password").unwrap();
    let sl5 = source.key_for_security_level(SecurityLevel::Sl5).unwrap().unwrap();

    let uuid = new_identifier(&mut rng);
    let mut item = KeychainItem::new(uuid.clone(), sl5.identifier());
    item.metadata_mut().title = Some("Bank".into());
    item.metadata_mut().type_name = Some("webforms.WebForm".into());
    item.set_private_contents(login_payload("s3cret"));
    item.encrypt(&master, &mut rng).unwrap();
    source.add_item(&item).unwrap();

    let mut stored = source.item_by_id(&uuid).unwrap();
    assert_eq!(stored.key_identifier(), sl5.identifier());
    stored.decrypt(&master).unwrap();
    assert_eq!(stored.payload(), Some(&login_payload("s3cret")));

    let contents = source.repository().contents().unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].uuid, uuid);
    assert_eq!(contents[0].title, "Bank");
}

#[test]
fn test_add_item_appends_to_existing_index() {
    let (_temp, path) = fixture_copy();
    let source = DataSource::new(&path);
    let mut rng = seeded_rng(6);
    let key = source.repository().key_by_identifier(SL3_KEY_ID).unwrap().unwrap();
    let master = key.decrypt(FIXTURE_PASSWORD.as_bytes()).unwrap();

    let mut item = KeychainItem::new(new_identifier(&mut rng), SL3_KEY_ID);
    item.set_private_contents(login_payload("other"));
    item.encrypt(&master, &mut rng).unwrap();
    source.add_item(&item).unwrap();

    let contents = source.repository().contents().unwrap();
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0].uuid, FIXTURE_ITEM_ID);
    assert_eq!(contents[1].uuid, item.uuid());
}

#[test]
fn test_add_item_refuses_duplicate() {
    let (_temp, path) = fixture_copy();
    let source = DataSource::new(&path);
    let original = fs::read(source.layout().item_file(FIXTURE_ITEM_ID).unwrap()).unwrap();

    let mut rng = seeded_rng(7);
    let master = source
        .repository()
        .key_by_identifier(SL3_KEY_ID)
        .unwrap()
        .unwrap()
        .decrypt(FIXTURE_PASSWORD.as_bytes())
        .unwrap();
    let mut item = KeychainItem::new(FIXTURE_ITEM_ID, SL3_KEY_ID);
    item.set_private_contents(login_payload("overwrite"));
    item.encrypt(&master, &mut rng).unwrap();

    assert!(matches!(
        source.add_item(&item),
        Err(VaultError::DuplicateItem(id)) if id == FIXTURE_ITEM_ID
    ));
    assert_eq!(
        fs::read(source.layout().item_file(FIXTURE_ITEM_ID).unwrap()).unwrap(),
        original
    );
    assert_eq!(source.repository().contents().unwrap().len(), 1);
}

#[test]
fn test_initialise_refuses_fixture() {
    let (_temp, path) = fixture_copy();
    assert!(matches!(
        DataSource::new(&path).initialise("password", &mut seeded_rng(8)),
        Err(VaultError::AlreadyInitialised(_))
    ));
}

#[test]
fn test_add_item_with_corrupt_index_leaves_no_item_file() {
    let (_temp, source) = new_vault("password");
    let mut rng = seeded_rng(10);
    let master = source.authenticate("password").unwrap();
    let sl5 = source.key_for_security_level(SecurityLevel::Sl5).unwrap().unwrap();

    let mut item = KeychainItem::new(new_identifier(&mut rng), sl5.identifier());
    item.set_private_contents(login_payload("pending"));
    item.encrypt(&master, &mut rng).unwrap();

    let contents_file = source.layout().contents_file();
    fs::write(&contents_file, r#"[["X"]]"#).unwrap();
    assert!(matches!(
        source.add_item(&item),
        Err(VaultError::InvalidVault { .. })
    ));
    assert!(!source.layout().item_file(item.uuid()).unwrap().exists());

    // Once the index is repaired the same item can be added.
    fs::write(&contents_file, "[]").unwrap();
    source.add_item(&item).unwrap();
    assert_eq!(source.item_by_id(item.uuid()).unwrap().uuid(), item.uuid());
    assert_eq!(source.repository().contents().unwrap().len(), 1);
}
