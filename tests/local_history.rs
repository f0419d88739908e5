//! End-to-end local workflows: init/add/commit, ref updates, merges

use biogit::areas::refs::{UpdateRefOutcome, is_fast_forward};
use biogit::areas::repository::Repository;
use biogit::artifacts::objects::object_id::ObjectId;
use biogit::commands::porcelain::merge::MergeOutcome;
use std::path::{Path, PathBuf};

fn commit_file(repository: &mut Repository, dir: &Path, name: &str, content: &str, message: &str) -> ObjectId {
    std::fs::write(dir.join(name), content).unwrap();
    repository.add(&[PathBuf::from(name)]).unwrap();
    repository.commit(message).unwrap()
}

#[test]
fn initial_commit_produces_expected_tree() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();

    std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
    repository.add(&[PathBuf::from("a.txt")]).unwrap();
    let oid = repository.commit("c1").unwrap();

    // branch main exists and the commit is parentless
    assert_eq!(
        repository.refs().read_branch("main").unwrap(),
        Some(oid.clone())
    );
    let commit = repository.database().load_commit(&oid).unwrap();
    assert!(commit.parents().is_empty());

    // the tree holds exactly {100644, "a.txt", SHA1("blob 6\0hello\n")}
    let tree = repository.database().load_tree(commit.tree_oid()).unwrap();
    assert_eq!(tree.entries().len(), 1);
    assert_eq!(tree.entries()[0].name, "a.txt");
    assert_eq!(
        tree.entries()[0].oid.as_str(),
        "ce013625030ba8dba906f756967f9e9ca394464a"
    );

    // log prints exactly one commit
    assert_eq!(repository.log().unwrap().len(), 1);
}

#[test]
fn object_files_hash_to_their_own_names() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();
    std::fs::create_dir_all(dir.path().join("nested/dir")).unwrap();
    std::fs::write(dir.path().join("nested/dir/f.txt"), "payload\n").unwrap();
    repository.add(&[PathBuf::from(".")]).unwrap();
    repository.commit("c1").unwrap();

    let objects_dir = repository.biogit_dir().join("objects");
    for fan_out in std::fs::read_dir(&objects_dir).unwrap() {
        let fan_out = fan_out.unwrap();
        for object_file in std::fs::read_dir(fan_out.path()).unwrap() {
            let object_file = object_file.unwrap();
            let expected = format!(
                "{}{}",
                fan_out.file_name().to_string_lossy(),
                object_file.file_name().to_string_lossy()
            );
            let content = std::fs::read(object_file.path()).unwrap();
            let actual = biogit::artifacts::objects::object::hash_bytes(&content);
            assert_eq!(actual.as_str(), expected);
        }
    }
}

#[test]
fn update_ref_enforces_cas() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();
    let c1 = commit_file(&mut repository, dir.path(), "a.txt", "1\n", "c1");
    let c2 = commit_file(&mut repository, dir.path(), "b.txt", "2\n", "c2");

    // fast-forward with matching expected-old succeeds
    let outcome = repository.refs().update_ref(
        repository.database(),
        "refs/heads/main",
        c2.as_str(),
        Some(c1.as_str()),
        false,
    );
    assert_eq!(outcome, UpdateRefOutcome::Success);

    // replaying the same CAS now mismatches
    let outcome = repository.refs().update_ref(
        repository.database(),
        "refs/heads/main",
        c2.as_str(),
        Some(c1.as_str()),
        false,
    );
    assert_eq!(outcome, UpdateRefOutcome::OldHashMismatch);
}

#[test]
fn update_ref_rejects_non_fast_forward_unless_forced() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();
    let base = commit_file(&mut repository, dir.path(), "base.txt", "b\n", "base");

    // two sibling commits over the same parent
    repository.branch_create("sibling", None).unwrap();
    let c1 = commit_file(&mut repository, dir.path(), "one.txt", "1\n", "c1");
    repository.switch("sibling").unwrap();
    let c2 = commit_file(&mut repository, dir.path(), "two.txt", "2\n", "c2");

    assert!(is_fast_forward(repository.database(), &base, &c1));
    assert!(!is_fast_forward(repository.database(), &c1, &c2));

    // main currently points at c1; moving it to the sibling is not a ff
    repository.refs().write_branch("main", &c1).unwrap();
    let outcome = repository.refs().update_ref(
        repository.database(),
        "refs/heads/main",
        c2.as_str(),
        None,
        false,
    );
    assert_eq!(outcome, UpdateRefOutcome::NotFastForward);

    let outcome = repository.refs().update_ref(
        repository.database(),
        "refs/heads/main",
        c2.as_str(),
        None,
        true,
    );
    assert_eq!(outcome, UpdateRefOutcome::Success);
}

#[test]
fn update_ref_validates_names_and_commits() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();
    let c1 = commit_file(&mut repository, dir.path(), "a.txt", "x\n", "c1");

    let unknown = "f".repeat(40);
    assert_eq!(
        repository.refs().update_ref(
            repository.database(),
            "refs/heads/main",
            &unknown,
            None,
            false
        ),
        UpdateRefOutcome::NewCommitNotFound
    );
    assert_eq!(
        repository.refs().update_ref(
            repository.database(),
            "refs/heads/a..b",
            c1.as_str(),
            None,
            false
        ),
        UpdateRefOutcome::InvalidRefName
    );
    assert_eq!(
        repository.refs().update_ref(
            repository.database(),
            "refs/heads/ghost",
            c1.as_str(),
            Some(c1.as_str()),
            false
        ),
        UpdateRefOutcome::RefNotFoundForUpdate
    );
}

#[test]
fn conflicted_merge_then_resolving_commit() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();
    commit_file(&mut repository, dir.path(), "f", "x\n", "base");

    repository.branch_create("theirs", None).unwrap();
    repository.switch("theirs").unwrap();
    let their_tip = commit_file(&mut repository, dir.path(), "f", "x\ny-theirs\n", "their change");

    repository.switch("main").unwrap();
    let our_tip = commit_file(&mut repository, dir.path(), "f", "x\ny-ours\n", "our change");

    let outcome = repository.merge("theirs").unwrap();
    assert_eq!(outcome, MergeOutcome::Conflicts(vec![PathBuf::from("f")]));

    // merge state files exist and the file shows both sides
    assert!(repository.biogit_dir().join("MERGE_HEAD").is_file());
    let conflicts = std::fs::read_to_string(repository.biogit_dir().join("FILE_CONFLICTS")).unwrap();
    assert!(conflicts.lines().any(|line| line == "f"));

    let conflicted = std::fs::read_to_string(dir.path().join("f")).unwrap();
    assert!(conflicted.contains("<<<<<<<"));
    assert!(conflicted.contains("=======\n"));
    assert!(conflicted.contains(">>>>>>>"));
    assert!(conflicted.contains("y-ours"));
    assert!(conflicted.contains("y-theirs"));

    // resolve by hand, stage, and conclude the merge
    std::fs::write(dir.path().join("f"), "x\nresolved\n").unwrap();
    repository.add(&[PathBuf::from("f")]).unwrap();
    let merge_oid = repository.commit("m").unwrap();

    let merge_commit = repository.database().load_commit(&merge_oid).unwrap();
    assert_eq!(merge_commit.parents(), &[our_tip, their_tip]);
    assert!(!repository.biogit_dir().join("MERGE_HEAD").exists());
    assert!(!repository.biogit_dir().join("FILE_CONFLICTS").exists());
}

#[test]
fn switch_restores_exact_tree() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();
    commit_file(&mut repository, dir.path(), "keep.txt", "kept\n", "c1");

    repository.branch_create("wip", None).unwrap();
    repository.switch("wip").unwrap();
    commit_file(&mut repository, dir.path(), "extra.txt", "extra\n", "c2");

    repository.switch("main").unwrap();
    assert!(!dir.path().join("extra.txt").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("keep.txt")).unwrap(),
        "kept\n"
    );
    assert!(repository.is_workspace_clean().unwrap());
}

#[test]
fn log_caps_at_fifty_entries() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();

    for i in 0..55 {
        commit_file(
            &mut repository,
            dir.path(),
            "counter.txt",
            &format!("{}\n", i),
            &format!("commit {}", i),
        );
    }

    let entries = repository.log().unwrap();
    assert_eq!(entries.len(), 50);
    assert_eq!(entries[0].message, "commit 54");
}

#[test]
fn ancestor_search_is_symmetric() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut repository = Repository::init(dir.path()).unwrap();
    let base = commit_file(&mut repository, dir.path(), "b.txt", "b\n", "base");

    repository.branch_create("left", None).unwrap();
    let right = commit_file(&mut repository, dir.path(), "r.txt", "r\n", "right");
    repository.switch("left").unwrap();
    let left = commit_file(&mut repository, dir.path(), "l.txt", "l\n", "left");

    let a = biogit::artifacts::merge::find_common_ancestor(repository.database(), &left, &right)
        .unwrap();
    let b = biogit::artifacts::merge::find_common_ancestor(repository.database(), &right, &left)
        .unwrap();
    assert_eq!(a, Some(base.clone()));
    assert_eq!(b, Some(base));
}
