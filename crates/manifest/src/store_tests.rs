use std::os::unix::fs::PermissionsExt;

use tempfile::tempdir;

use super::*;

fn write_manifest(dir: &std::path::Path, filename: &str, app: &str, exe: &std::path::Path) {
    let json = serde_json::json!({ "application": app, "execute": [exe.to_string_lossy()] });
    std::fs::write(dir.join(filename), serde_json::to_vec(&json).unwrap()).unwrap();
}

fn make_executable(dir: &std::path::Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn get_loads_from_common_directory() {
    let root = tempdir().unwrap();
    let common = root.path().join("common");
    let users = root.path().join("users");
    std::fs::create_dir_all(&common).unwrap();
    std::fs::create_dir_all(&users).unwrap();
    let exe = make_executable(root.path(), "app");
    write_manifest(&common, "app.manifest", "app", &exe);

    let store = Store::new(&common, &users, true);
    let manifest = store.get(Owner::Common, "app").unwrap();
    assert_eq!(manifest.package, "app");
}

#[test]
fn get_prefers_user_directory_over_common() {
    let root = tempdir().unwrap();
    let common = root.path().join("common");
    let users = root.path().join("users");
    let user_dir = users.join("alice");
    std::fs::create_dir_all(&common).unwrap();
    std::fs::create_dir_all(&user_dir).unwrap();

    let common_exe = make_executable(root.path(), "common-app");
    let user_exe = make_executable(root.path(), "user-app");
    write_manifest(&common, "app.manifest", "app", &common_exe);
    write_manifest(&user_dir, "app.manifest", "app", &user_exe);

    let store = Store::new(&common, &users, true);
    let manifest = store.get(Owner::User { uid: 1000, name: "alice".to_string() }, "app").unwrap();
    let app = manifest.application("app").unwrap();
    assert_eq!(app.execute[0], user_exe.to_string_lossy());
}

#[test]
fn get_missing_package_returns_not_found() {
    let root = tempdir().unwrap();
    let common = root.path().join("common");
    let users = root.path().join("users");
    std::fs::create_dir_all(&common).unwrap();
    std::fs::create_dir_all(&users).unwrap();

    let store = Store::new(&common, &users, true);
    let err = store.get(Owner::Common, "nope").unwrap_err();
    assert!(matches!(err, ManifestError::NotFound(_)));
}

#[test]
fn oversized_manifest_is_rejected() {
    let root = tempdir().unwrap();
    let common = root.path().join("common");
    let users = root.path().join("users");
    std::fs::create_dir_all(&common).unwrap();
    std::fs::create_dir_all(&users).unwrap();
    let padding = vec![b' '; MAX_MANIFEST_BYTES as usize + 1];
    std::fs::write(common.join("big.manifest"), padding).unwrap();

    let store = Store::new(&common, &users, true);
    let err = store.get(Owner::Common, "big").unwrap_err();
    assert!(matches!(err, ManifestError::TooLarge { .. }));
}

#[test]
fn caching_returns_the_same_allocation_while_a_handle_is_held() {
    let root = tempdir().unwrap();
    let common = root.path().join("common");
    let users = root.path().join("users");
    std::fs::create_dir_all(&common).unwrap();
    std::fs::create_dir_all(&users).unwrap();
    let exe = make_executable(root.path(), "app");
    write_manifest(&common, "app.manifest", "app", &exe);

    let store = Store::new(&common, &users, true);
    let first = store.get(Owner::Common, "app").unwrap();
    let second = store.get(Owner::Common, "app").unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(store.cached_len(), 1);
}

#[test]
fn dropping_every_handle_evicts_the_cache_entry() {
    let root = tempdir().unwrap();
    let common = root.path().join("common");
    let users = root.path().join("users");
    std::fs::create_dir_all(&common).unwrap();
    std::fs::create_dir_all(&users).unwrap();
    let exe = make_executable(root.path(), "app");
    write_manifest(&common, "app.manifest", "app", &exe);

    let store = Store::new(&common, &users, true);
    {
        let _handle = store.get(Owner::Common, "app").unwrap();
        assert_eq!(store.cached_len(), 1);
    }
    assert_eq!(store.cached_len(), 0);
}

#[test]
fn non_caching_store_reloads_from_disk_every_time() {
    let root = tempdir().unwrap();
    let common = root.path().join("common");
    let users = root.path().join("users");
    std::fs::create_dir_all(&common).unwrap();
    std::fs::create_dir_all(&users).unwrap();
    let exe = make_executable(root.path(), "app");
    write_manifest(&common, "app.manifest", "app", &exe);

    let store = Store::new(&common, &users, false);
    let first = store.get(Owner::Common, "app").unwrap();
    let second = store.get(Owner::Common, "app").unwrap();
    assert!(!Rc::ptr_eq(&first, &second));
    assert_eq!(store.cached_len(), 0);
}

#[test]
fn discover_finds_common_and_per_user_manifests() {
    let root = tempdir().unwrap();
    let common = root.path().join("common");
    let users = root.path().join("users");
    let user_dir = users.join("alice");
    std::fs::create_dir_all(&common).unwrap();
    std::fs::create_dir_all(&user_dir).unwrap();
    let exe = make_executable(root.path(), "app");
    write_manifest(&common, "sys.manifest", "sys", &exe);
    write_manifest(&user_dir, "personal.manifest", "personal", &exe);

    let store = Store::new(&common, &users, true);
    let mut found: Vec<String> = store.discover().into_iter().map(|(_, pkg)| pkg).collect();
    found.sort();
    assert_eq!(found, vec!["personal".to_string(), "sys".to_string()]);
}
