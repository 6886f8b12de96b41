use bucketsync::backends::{LocalStore, ObjectStat, RemoteStore};
use std::fs::{self, File};
use std::io::Write;
use tempfile::tempdir;

#[test]
fn test_localstore_create_and_exists() {
    let dir = tempdir().unwrap();
    let store = LocalStore::new(dir.path());

    // Should not exist yet
    assert!(!store.bucket_exists("photos").unwrap());

    store.create_bucket("photos", "us-west-2").unwrap();

    // Should exist now
    assert!(store.bucket_exists("photos").unwrap());
    assert!(dir.path().join("photos").is_dir());
}

#[test]
fn test_localstore_upload_and_stat() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("testfile.txt");
    let store = LocalStore::new(dir.path().join("store"));
    store.create_bucket("b", "us-west-2").unwrap();

    {
        let mut file = File::create(&src).unwrap();
        writeln!(file, "hello world").unwrap();
    }

    assert_eq!(store.stat("b", "nested/testfile.txt").unwrap(), ObjectStat::NotFound);
    store.upload("b", "nested/testfile.txt", &src).unwrap();

    match store.stat("b", "nested/testfile.txt").unwrap() {
        ObjectStat::Found(entry) => assert_eq!(entry.key, "nested/testfile.txt"),
        ObjectStat::NotFound => panic!("uploaded object missing"),
    }
    assert!(store.object_exists("b", "nested/testfile.txt").unwrap());
    assert_eq!(
        fs::read(dir.path().join("store").join("b").join("nested").join("testfile.txt")).unwrap(),
        b"hello world\n"
    );
}

#[test]
/// Verify that download replaces an existing local file.
fn test_localstore_download_overwrites() {
    let dir = tempdir().unwrap();
    let store = LocalStore::new(dir.path().join("store"));
    store.create_bucket("b", "us-west-2").unwrap();
    let src = dir.path().join("src.txt");
    fs::write(&src, b"from the bucket").unwrap();
    store.upload("b", "doc.txt", &src).unwrap();

    let dst = dir.path().join("dst.txt");
    fs::write(&dst, b"stale local copy").unwrap();
    store.download("b", "doc.txt", &dst).unwrap();
    assert_eq!(fs::read(&dst).unwrap(), b"from the bucket");
}

#[test]
fn test_localstore_list() {
    let dir = tempdir().unwrap();
    let bucket = dir.path().join("b");
    fs::create_dir_all(bucket.join("y")).unwrap();
    File::create(bucket.join("x.txt")).unwrap();
    File::create(bucket.join("y").join("z.txt")).unwrap();
    let store = LocalStore::new(dir.path());

    let mut keys: Vec<_> = store
        .list_all("b")
        .unwrap()
        .map(|entry| entry.unwrap().key)
        .collect();
    keys.sort();

    assert_eq!(keys, vec!["x.txt".to_string(), "y/z.txt".to_string()]);

    // Listing can be restarted
    assert_eq!(store.list_all("b").unwrap().count(), 2);
}

#[test]
fn test_localstore_list_missing_bucket_is_an_error() {
    let dir = tempdir().unwrap();
    let store = LocalStore::new(dir.path());
    assert!(store.list_all("absent").is_err());
}
