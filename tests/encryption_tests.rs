//! Transparent field encryption through the collection write/read paths,
//! plus the hash-field query contract.

#![cfg(feature = "aes256")]

use mainydb::{
    doc, AesKey, Document, EncryptionConfig, EncryptionManager, Error, Sha256Hasher, Store, Value,
};

fn encrypted_users(store: &Store) -> mainydb::Collection {
    let config = EncryptionConfig::create(&["password"], &["email"]);
    let manager = EncryptionManager::new(config, Some(AesKey::from("test_key"))).unwrap();
    store
        .database("secure")
        .create_collection_with_encryption("users", manager)
        .unwrap()
}

#[test]
fn test_stored_forms_and_transparent_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let users = encrypted_users(&store);

    users
        .insert_one(doc! { "username" => "john", "password" => "p", "email" => "e@x" })
        .unwrap();

    let found = users.find_one(doc! { "username" => "john" }).unwrap().unwrap();
    // Cipher-field comes back as plaintext
    assert_eq!(found.get_str("email"), Some("e@x"));
    // Hash-field stays in stored form, verifiable against the plaintext
    let password = found.get_document("password").unwrap();
    assert_eq!(password.get_str("algorithm"), Some("sha256"));
    assert!(Sha256Hasher::verify("p", password).unwrap());
    assert!(!Sha256Hasher::verify("q", password).unwrap());
}

#[test]
fn test_snapshot_file_holds_only_stored_forms() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let users = encrypted_users(&store);
    users
        .insert_one(doc! { "username" => "john", "password" => "p", "email" => "e@x" })
        .unwrap();
    store.save().unwrap();

    // Read the snapshot file directly: the persisted document must carry
    // the encrypted/hashed forms, never the plaintext
    let file = std::fs::File::open(dir.path().join("mainydb.mdb")).unwrap();
    let raw: Value = rmp_serde::from_read(file).unwrap();
    let stored = raw
        .as_document()
        .and_then(|dbs| dbs.get_document("secure"))
        .and_then(|db| db.get_document("users"))
        .and_then(|coll| coll.get_array("documents"))
        .and_then(|docs| docs[0].as_document())
        .expect("snapshot shape");

    let email = stored.get_document("email").expect("stored email form");
    assert_eq!(email.get_str("algorithm"), Some("aes256"));
    assert!(email.get_str("ciphertext").is_some());
    assert!(email.get_str("iv").is_some());

    let password = stored.get_document("password").expect("stored password form");
    assert_eq!(password.get_str("algorithm"), Some("sha256"));
    assert!(password.get_str("hash").is_some());
    assert!(password.get_str("salt").is_some());
}

#[test]
fn test_query_on_cipher_field_matches_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let users = encrypted_users(&store);
    users
        .insert_many(vec![
            doc! { "username" => "john", "email" => "john@example.com" },
            doc! { "username" => "jane", "email" => "jane@example.com" },
        ])
        .unwrap();

    // Candidate documents decrypt before predicate evaluation
    let found = users
        .find_one(doc! { "email" => "jane@example.com" })
        .unwrap()
        .unwrap();
    assert_eq!(found.get_str("username"), Some("jane"));

    let regex_hit = users
        .find_one(doc! { "email" => doc! { "$regex" => "^john@" } })
        .unwrap()
        .unwrap();
    assert_eq!(regex_hit.get_str("username"), Some("john"));
}

#[test]
fn test_equality_on_hash_field_matches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let users = encrypted_users(&store);
    users
        .insert_one(doc! { "username" => "john", "password" => "secret" })
        .unwrap();

    // The equality family compares plaintext with salted digests and is
    // defined to match nothing
    assert!(users.find_one(doc! { "password" => "secret" }).unwrap().is_none());
    assert!(users
        .find_one(doc! { "password" => doc! { "$eq" => "secret" } })
        .unwrap()
        .is_none());
    assert!(users
        .find_one(doc! { "password" => doc! { "$in" => vec!["secret"] } })
        .unwrap()
        .is_none());
    assert_eq!(users.count_documents(doc! { "password" => "secret" }).unwrap(), 0);

    // Structural operators evaluate against the stored form and still work
    assert!(users
        .find_one(doc! { "password" => doc! { "$exists" => true } })
        .unwrap()
        .is_some());
    assert!(users
        .find_one(doc! { "password" => doc! { "$type" => "object" } })
        .unwrap()
        .is_some());
    assert!(users
        .find_one(doc! { "password" => doc! { "$ne" => "secret" } })
        .unwrap()
        .is_some());

    // Other clauses still work
    assert!(users.find_one(doc! { "username" => "john" }).unwrap().is_some());
}

#[test]
fn test_update_reencrypts_changed_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let users = encrypted_users(&store);
    users
        .insert_one(doc! { "username" => "john", "password" => "old", "email" => "old@x" })
        .unwrap();

    users
        .update_one(
            doc! { "username" => "john" },
            doc! { "$set" => doc! { "password" => "new", "email" => "new@x" } },
        )
        .unwrap();

    let found = users.find_one(doc! { "username" => "john" }).unwrap().unwrap();
    assert_eq!(found.get_str("email"), Some("new@x"));
    let password = found.get_document("password").unwrap();
    assert!(Sha256Hasher::verify("new", password).unwrap());
    assert!(!Sha256Hasher::verify("old", password).unwrap());
}

#[test]
fn test_encrypted_roundtrip_through_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        let users = encrypted_users(&store);
        users
            .insert_one(doc! { "username" => "john", "password" => "pw", "email" => "persisted@x" })
            .unwrap();
        store.close().unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let db = store.database("secure");
    // Collections load without runtime key material; reading through the
    // bare handle shows the stored form…
    let raw = db
        .collection("users")
        .unwrap()
        .find_one(doc! { "username" => "john" })
        .unwrap()
        .unwrap();
    let stored_email = raw.get_document("email").unwrap().clone();
    assert_eq!(stored_email.get_str("algorithm"), Some("aes256"));

    // …and the same key still decrypts it directly
    let cipher = mainydb::Aes256Cipher::new(AesKey::from("test_key")).unwrap();
    assert_eq!(cipher.decrypt(&stored_email).unwrap(), "persisted@x");

    // Re-attaching a manager with the same key restores transparent reads
    // and plaintext cipher-field queries on the restored collection
    let config = EncryptionConfig::create(&["password"], &["email"]);
    let manager = EncryptionManager::new(config, Some(AesKey::from("test_key"))).unwrap();
    let users = db.create_collection_with_encryption("users", manager).unwrap();

    let found = users
        .find_one(doc! { "email" => "persisted@x" })
        .unwrap()
        .expect("cipher-field query matches plaintext again");
    assert_eq!(found.get_str("username"), Some("john"));
    assert_eq!(found.get_str("email"), Some("persisted@x"));
    assert!(Sha256Hasher::verify("pw", found.get_document("password").unwrap()).unwrap());

    // Hash-field equality is suppressed again too
    assert!(users.find_one(doc! { "password" => "pw" }).unwrap().is_none());

    // A second manager cannot displace the attached one
    let config = EncryptionConfig::create(&[], &["email"]);
    let manager = EncryptionManager::new(config, Some(AesKey::from("other"))).unwrap();
    assert!(matches!(
        db.create_collection_with_encryption("users", manager),
        Err(Error::BadQuery(_))
    ));
}

#[test]
fn test_unconfigured_fields_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let users = encrypted_users(&store);
    users
        .insert_one(doc! { "username" => "plain", "age" => 30, "nested" => doc! { "k" => "v" } })
        .unwrap();

    let found = users.find_one(doc! { "username" => "plain" }).unwrap().unwrap();
    assert_eq!(found.get_i64("age"), Some(30));
    assert_eq!(
        found.get_document("nested").map(Document::clone),
        Some(doc! { "k" => "v" })
    );
}
