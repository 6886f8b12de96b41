use bucketsync::{
    run_backup, run_restore, Conflict, LocalStore, MemoryStore, PromptResolver, RemoteStore,
    SyncError, SyncOptions, DEFAULT_REGION,
};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const T: i64 = 1_600_000_000;

fn quiet() -> SyncOptions<'static> {
    SyncOptions {
        no_progress: true,
        ..SyncOptions::default()
    }
}

fn write_with_mtime(path: &Path, data: &[u8], secs: i64, nanos: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, data).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(secs, nanos)).unwrap();
}

fn never_asked(_: &Conflict<'_>) -> bool {
    panic!("no conflict expected")
}

#[test]
fn backup_uploads_files_but_not_directories() {
    let src = tempdir().unwrap();
    write_with_mtime(&src.path().join("a").join("b.txt"), b"b", T, 0);
    fs::create_dir_all(src.path().join("c")).unwrap();
    let store = Arc::new(MemoryStore::new());

    let report = run_backup(store.clone(), src.path(), "bkt", DEFAULT_REGION, &quiet()).unwrap();

    assert_eq!(report.transferred, 1);
    assert_eq!(store.keys("bkt"), vec!["a/b.txt"]);
    assert_eq!(store.object("bkt", "a/b.txt").unwrap().0, b"b");
}

#[test]
fn second_backup_transfers_nothing() {
    let src = tempdir().unwrap();
    write_with_mtime(&src.path().join("one.txt"), b"1", T, 0);
    write_with_mtime(&src.path().join("deep").join("er").join("two.txt"), b"2", T, 0);
    let store = Arc::new(MemoryStore::new());

    let first = run_backup(store.clone(), src.path(), "bkt", DEFAULT_REGION, &quiet()).unwrap();
    let second = run_backup(store.clone(), src.path(), "bkt", DEFAULT_REGION, &quiet()).unwrap();

    assert_eq!(first.transferred, 2);
    assert_eq!(second.transferred, 0);
    assert_eq!(second.skipped, 2);
}

#[test]
fn backup_uploads_only_strictly_newer_files() {
    let src = tempdir().unwrap();
    write_with_mtime(&src.path().join("newer.txt"), b"local", T, 0);
    write_with_mtime(&src.path().join("same.txt"), b"local", T, 0);
    write_with_mtime(&src.path().join("older.txt"), b"local", T, 0);
    // sub-second difference only; truncation makes it a tie
    write_with_mtime(&src.path().join("fraction.txt"), b"local", T, 900_000_000);

    let store = Arc::new(MemoryStore::new());
    store.insert("bkt", "newer.txt", b"remote", T - 1);
    store.insert("bkt", "same.txt", b"remote", T);
    store.insert("bkt", "older.txt", b"remote", T + 1);
    store.insert("bkt", "fraction.txt", b"remote", T);

    let report = run_backup(store.clone(), src.path(), "bkt", DEFAULT_REGION, &quiet()).unwrap();

    assert_eq!(report.transferred, 1);
    assert_eq!(report.skipped, 3);
    assert_eq!(store.object("bkt", "newer.txt").unwrap().0, b"local");
    assert_eq!(store.object("bkt", "same.txt").unwrap().0, b"remote");
    assert_eq!(store.object("bkt", "older.txt").unwrap().0, b"remote");
    assert_eq!(store.object("bkt", "fraction.txt").unwrap().0, b"remote");
}

#[test]
fn parallel_backup_counts_every_upload_once() {
    let src = tempdir().unwrap();
    for i in 0..25 {
        write_with_mtime(&src.path().join(format!("d{}", i % 4)).join(format!("f{i}.txt")), b"x", T, 0);
    }
    let store = Arc::new(MemoryStore::new());
    let options = SyncOptions {
        threads: 4,
        ..quiet()
    };

    let report = run_backup(store.clone(), src.path(), "bkt", DEFAULT_REGION, &options).unwrap();

    assert_eq!(report.transferred, 25);
    assert_eq!(store.keys("bkt").len(), 25);
}

#[test]
fn dry_run_backup_reports_without_uploading() {
    let src = tempdir().unwrap();
    write_with_mtime(&src.path().join("a.txt"), b"a", T, 0);
    let store = Arc::new(MemoryStore::new());
    let options = SyncOptions {
        dry_run: true,
        ..quiet()
    };

    let report = run_backup(store.clone(), src.path(), "bkt", DEFAULT_REGION, &options).unwrap();

    assert_eq!(report.transferred, 1);
    assert!(report.dry_run);
    assert!(!store.bucket_exists("bkt").unwrap());
}

#[test]
fn backup_rejects_a_missing_source() {
    let src = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let err = run_backup(store.clone(), &src.path().join("nope"), "bkt", DEFAULT_REGION, &quiet())
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidDirectory(_)));
    assert!(!store.bucket_exists("bkt").unwrap());
}

#[test]
fn restore_downloads_everything_into_an_empty_directory() {
    let store = Arc::new(MemoryStore::new());
    store.insert("bkt", "x.txt", b"x", T);
    store.insert("bkt", "y/z.txt", b"z", T + 5);
    let dst = tempdir().unwrap();
    let target = dst.path().join("restore");

    let report = run_restore(store, &target, "bkt", &mut never_asked, &quiet()).unwrap();

    assert_eq!(report.transferred, 2);
    assert!(target.join("y").is_dir());
    assert_eq!(fs::read(target.join("x.txt")).unwrap(), b"x");
    assert_eq!(fs::read(target.join("y").join("z.txt")).unwrap(), b"z");
}

#[test]
fn restore_skips_local_files_at_least_as_new() {
    let store = Arc::new(MemoryStore::new());
    store.insert("bkt", "same.txt", b"remote", T);
    store.insert("bkt", "local-newer.txt", b"remote", T);
    let dst = tempdir().unwrap();
    write_with_mtime(&dst.path().join("same.txt"), b"local", T, 0);
    write_with_mtime(&dst.path().join("local-newer.txt"), b"local", T + 1, 0);

    let report = run_restore(store, dst.path(), "bkt", &mut never_asked, &quiet()).unwrap();

    assert_eq!(report.transferred, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(fs::read(dst.path().join("same.txt")).unwrap(), b"local");
}

#[test]
fn restore_conflict_follows_the_answer() {
    for (answer, expected) in [(true, &b"remote"[..]), (false, &b"local"[..])] {
        let store = Arc::new(MemoryStore::new());
        store.insert("bkt", "notes/today.txt", b"remote", T + 60);
        let dst = tempdir().unwrap();
        let local = dst.path().join("notes").join("today.txt");
        write_with_mtime(&local, b"local", T, 0);

        let mut asked = Vec::new();
        let mut resolver = |c: &Conflict<'_>| {
            asked.push((c.key.to_string(), c.local_modified, c.remote_modified));
            answer
        };
        let report = run_restore(store, dst.path(), "bkt", &mut resolver, &quiet()).unwrap();

        assert_eq!(asked, vec![("notes/today.txt".to_string(), T, T + 60)]);
        assert_eq!(report.transferred, u64::from(answer));
        assert_eq!(fs::read(&local).unwrap(), expected);
    }
}

#[test]
fn restore_prompt_reasks_until_answered() {
    let store = Arc::new(MemoryStore::new());
    store.insert("bkt", "f.txt", b"remote", T + 60);
    let dst = tempdir().unwrap();
    write_with_mtime(&dst.path().join("f.txt"), b"local", T, 0);

    let mut prompt = PromptResolver::new(Cursor::new("sure\ny\n"), Vec::new());
    let report = run_restore(store, dst.path(), "bkt", &mut prompt, &quiet()).unwrap();

    assert_eq!(report.transferred, 1);
    assert_eq!(fs::read(dst.path().join("f.txt")).unwrap(), b"remote");
    let output = String::from_utf8(prompt.into_output()).unwrap();
    assert_eq!(output.matches("Please type y or n:").count(), 1);
}

#[test]
fn restore_requires_an_existing_bucket() {
    let store = Arc::new(MemoryStore::new());
    let dst = tempdir().unwrap();
    let err = run_restore(store, dst.path(), "missing", &mut never_asked, &quiet()).unwrap_err();
    assert!(matches!(err, SyncError::BucketNotFound(name) if name == "missing"));
}

#[test]
fn permission_denied_is_not_absence() {
    let store = Arc::new(MemoryStore::new());
    store.deny("locked");
    assert!(!store.bucket_exists("missing").unwrap());

    let dst = tempdir().unwrap();
    let err = run_restore(store, dst.path(), "locked", &mut never_asked, &quiet()).unwrap_err();
    assert!(matches!(err, SyncError::Store { code, .. } if code == "AccessDenied"));
}

#[test]
fn local_store_round_trip() {
    let scratch = tempdir().unwrap();
    let src = scratch.path().join("src");
    write_with_mtime(&src.join("a").join("b.txt"), b"b", T, 0);
    write_with_mtime(&src.join("top.txt"), b"top", T, 0);
    let store = Arc::new(LocalStore::new(scratch.path().join("buckets")));

    let backed_up = run_backup(store.clone(), &src, "bkt", DEFAULT_REGION, &quiet()).unwrap();
    assert_eq!(backed_up.transferred, 2);

    let target = scratch.path().join("restored");
    let restored = run_restore(store.clone(), &target, "bkt", &mut never_asked, &quiet()).unwrap();
    assert_eq!(restored.transferred, 2);
    assert_eq!(fs::read(target.join("a").join("b.txt")).unwrap(), b"b");

    // restored files are at least as new as their objects
    let again = run_restore(store, &target, "bkt", &mut never_asked, &quiet()).unwrap();
    assert_eq!(again.transferred, 0);
}
