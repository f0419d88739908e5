//! Client/server end-to-end: auth, push, fetch, clone

use biogit::areas::repository::Repository;
use biogit::artifacts::objects::object_id::ObjectId;
use biogit::commands::porcelain::push::PushOutcome;
use biogit::remote::client::RemoteClient;
use biogit::server;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

struct TestServer {
    _root: tempfile::TempDir,
    addr: SocketAddr,
    root_path: PathBuf,
}

/// Start a server over a fresh repository root with one hosted repository
/// named `proj` and the standard users registered.
fn start_server() -> TestServer {
    let root = tempfile::tempdir().unwrap();
    Repository::init(&root.path().join("proj")).unwrap();

    let addr = server::spawn_ephemeral(root.path().to_path_buf(), "test-secret").unwrap();

    let mut client = RemoteClient::connect(&addr.ip().to_string(), addr.port()).unwrap();
    client.register_user("ada", "hunter2").unwrap();
    client.register_user("cloneuser", "clonepassword").unwrap();

    TestServer {
        root_path: root.path().to_path_buf(),
        _root: root,
        addr,
    }
}

fn login(server: &TestServer, user: &str, pass: &str) -> String {
    let mut client =
        RemoteClient::connect(&server.addr.ip().to_string(), server.addr.port()).unwrap();
    client.login_user(user, pass).unwrap().unwrap()
}

fn remote_url(server: &TestServer) -> String {
    format!("{}:{}/proj", server.addr.ip(), server.addr.port())
}

fn commit_file(repository: &mut Repository, dir: &Path, name: &str, content: &str, message: &str) -> ObjectId {
    std::fs::write(dir.join(name), content).unwrap();
    repository.add(&[PathBuf::from(name)]).unwrap();
    repository.commit(message).unwrap()
}

#[test]
fn login_rejects_bad_credentials() {
    let server = start_server();
    let mut client =
        RemoteClient::connect(&server.addr.ip().to_string(), server.addr.port()).unwrap();

    assert!(client.login_user("ada", "wrong").unwrap().is_err());
    assert!(client.login_user("nobody", "x").unwrap().is_err());
    assert!(client.login_user("ada", "hunter2").unwrap().is_ok());
}

#[test]
fn list_refs_requires_a_valid_token() {
    let server = start_server();
    let mut client =
        RemoteClient::connect(&server.addr.ip().to_string(), server.addr.port()).unwrap();
    client.target_repository("proj").unwrap();

    // a made-up token is answered with AUTH_REQUIRED
    let error = client.list_refs("ada:999:forged").unwrap_err();
    assert!(error.to_string().contains("authentication required"));

    // after a real login the same call streams the refs list
    let token = login(&server, "ada", "hunter2");
    let mut client =
        RemoteClient::connect(&server.addr.ip().to_string(), server.addr.port()).unwrap();
    client.target_repository("proj").unwrap();
    let refs = client.list_refs(&token).unwrap();
    assert_eq!(refs[0].0, "HEAD");
    assert_eq!(refs[0].1, "ref: refs/heads/main");
}

#[test]
fn repository_must_be_selected_before_repo_operations() {
    let server = start_server();
    let token = login(&server, "ada", "hunter2");
    let mut client =
        RemoteClient::connect(&server.addr.ip().to_string(), server.addr.port()).unwrap();

    let error = client.list_refs(&token).unwrap_err();
    assert!(error.to_string().contains("server error"));
}

#[test]
fn target_repo_rejects_traversal() {
    let server = start_server();
    let mut client =
        RemoteClient::connect(&server.addr.ip().to_string(), server.addr.port()).unwrap();

    assert!(client.target_repository("../outside").is_err());
    assert!(client.target_repository("no-such-repo").is_err());
    assert!(client.target_repository("proj").is_ok());
}

#[test]
fn push_new_branch_then_up_to_date() {
    let server = start_server();
    let token = login(&server, "ada", "hunter2");

    let local_dir = tempfile::tempdir().unwrap();
    let mut local = Repository::init(local_dir.path()).unwrap();
    commit_file(&mut local, local_dir.path(), "a.txt", "1\n", "c1");
    commit_file(&mut local, local_dir.path(), "b.txt", "2\n", "c2");
    let tip = commit_file(&mut local, local_dir.path(), "c.txt", "3\n", "c3");
    local.remote_add("origin", &remote_url(&server)).unwrap();

    let outcome = local.push("origin", "main", "main", false, &token).unwrap();
    match outcome {
        PushOutcome::Updated {
            ref_name,
            new_tip,
            uploaded_objects,
        } => {
            assert_eq!(ref_name, "refs/heads/main");
            assert_eq!(new_tip, tip);
            // 3 commits, 3 root trees, 3 blobs
            assert_eq!(uploaded_objects, 9);
        }
        other => panic!("expected an updated ref, got {:?}", other),
    }

    // the server-side repository now has the branch and the full closure
    let hosted = Repository::load(&server.root_path.join("proj")).unwrap();
    assert_eq!(hosted.refs().read_branch("main").unwrap(), Some(tip.clone()));
    let files = hosted.tree_map_of_commit(&tip).unwrap();
    assert_eq!(files.len(), 3);

    // pushing again with no changes reports up-to-date
    let outcome = local.push("origin", "main", "main", false, &token).unwrap();
    assert_eq!(outcome, PushOutcome::UpToDate);
}

#[test]
fn push_rejects_non_fast_forward_without_force() {
    let server = start_server();
    let token = login(&server, "ada", "hunter2");

    let dir_a = tempfile::tempdir().unwrap();
    let mut repo_a = Repository::init(dir_a.path()).unwrap();
    commit_file(&mut repo_a, dir_a.path(), "shared.txt", "base\n", "base");
    commit_file(&mut repo_a, dir_a.path(), "a.txt", "a\n", "a-side");
    repo_a.remote_add("origin", &remote_url(&server)).unwrap();
    repo_a.push("origin", "main", "main", false, &token).unwrap();

    // rewrite history locally: a sibling of the pushed tip
    let dir_b = tempfile::tempdir().unwrap();
    let mut repo_b = Repository::init(dir_b.path()).unwrap();
    commit_file(&mut repo_b, dir_b.path(), "other.txt", "b\n", "unrelated");
    repo_b.remote_add("origin", &remote_url(&server)).unwrap();

    let error = repo_b
        .push("origin", "main", "main", false, &token)
        .unwrap_err();
    assert!(error.to_string().contains("fast-forward"));

    // force pushes through
    let outcome = repo_b.push("origin", "main", "main", true, &token).unwrap();
    assert!(matches!(outcome, PushOutcome::Updated { .. }));
}

#[test]
fn fetch_is_idempotent_without_remote_changes() {
    let server = start_server();
    let token = login(&server, "ada", "hunter2");

    let source_dir = tempfile::tempdir().unwrap();
    let mut source = Repository::init(source_dir.path()).unwrap();
    commit_file(&mut source, source_dir.path(), "a.txt", "1\n", "c1");
    source.remote_add("origin", &remote_url(&server)).unwrap();
    source.push("origin", "main", "main", false, &token).unwrap();

    let sink_dir = tempfile::tempdir().unwrap();
    let mut sink = Repository::init(sink_dir.path()).unwrap();
    sink.remote_add("origin", &remote_url(&server)).unwrap();

    let first = sink.fetch("origin", &token, None).unwrap();
    assert_eq!(first.updated_refs.len(), 1);
    assert!(first.downloaded_objects > 0);

    let second = sink.fetch("origin", &token, None).unwrap();
    assert_eq!(second.updated_refs.len(), 0);
    assert_eq!(second.downloaded_objects, 0);
}

#[test]
fn clone_reproduces_refs_and_objects() {
    let server = start_server();
    let token = login(&server, "ada", "hunter2");

    let source_dir = tempfile::tempdir().unwrap();
    let mut source = Repository::init(source_dir.path()).unwrap();
    commit_file(&mut source, source_dir.path(), "a.txt", "alpha\n", "c1");
    std::fs::create_dir_all(source_dir.path().join("nested")).unwrap();
    let tip = commit_file(
        &mut source,
        source_dir.path(),
        "nested/b.txt",
        "beta\n",
        "c2",
    );
    source.remote_add("origin", &remote_url(&server)).unwrap();
    source.push("origin", "main", "main", false, &token).unwrap();

    // place a tag on the hosted repository so the clone picks it up
    let hosted = Repository::load(&server.root_path.join("proj")).unwrap();
    hosted.refs().create_tag("v1", &tip).unwrap();

    let clone_dir = tempfile::tempdir().unwrap();
    let clone_path = clone_dir.path().join("clone");
    let cloned = Repository::clone(&remote_url(&server), &clone_path).unwrap();

    // working tree, branch, tracking config and tags all materialized
    assert_eq!(
        std::fs::read_to_string(clone_path.join("a.txt")).unwrap(),
        "alpha\n"
    );
    assert_eq!(
        std::fs::read_to_string(clone_path.join("nested/b.txt")).unwrap(),
        "beta\n"
    );
    assert_eq!(cloned.refs().read_branch("main").unwrap(), Some(tip.clone()));
    assert_eq!(cloned.config().get("branch.main.remote"), Some("origin"));
    assert_eq!(
        cloned.config().get("branch.main.merge"),
        Some("refs/heads/main")
    );
    assert_eq!(cloned.refs().read_tag("v1").unwrap(), Some(tip.clone()));

    // the reachable object set matches the source repository
    let source_files = source.tree_map_of_commit(&tip).unwrap();
    let cloned_files = cloned.tree_map_of_commit(&tip).unwrap();
    assert_eq!(source_files, cloned_files);

    // the provisional clone credential is never persisted
    assert!(!cloned.biogit_dir().join("biogit_token").exists());
    assert!(cloned.is_workspace_clean().unwrap());
}

#[test]
fn pull_fast_forwards_a_stale_clone() {
    let server = start_server();
    let token = login(&server, "ada", "hunter2");

    let source_dir = tempfile::tempdir().unwrap();
    let mut source = Repository::init(source_dir.path()).unwrap();
    commit_file(&mut source, source_dir.path(), "a.txt", "v1\n", "c1");
    source.remote_add("origin", &remote_url(&server)).unwrap();
    source.push("origin", "main", "main", false, &token).unwrap();

    let clone_dir = tempfile::tempdir().unwrap();
    let clone_path = clone_dir.path().join("clone");
    let mut cloned = Repository::clone(&remote_url(&server), &clone_path).unwrap();

    // the source advances and pushes
    let new_tip = commit_file(&mut source, source_dir.path(), "a.txt", "v2\n", "c2");
    source.push("origin", "main", "main", false, &token).unwrap();

    let outcome = cloned.pull("origin", "main", &token).unwrap();
    assert_eq!(
        outcome,
        biogit::commands::porcelain::merge::MergeOutcome::FastForward(new_tip)
    );
    assert_eq!(
        std::fs::read_to_string(clone_path.join("a.txt")).unwrap(),
        "v2\n"
    );
}
