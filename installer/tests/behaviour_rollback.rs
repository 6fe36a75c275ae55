//! Behaviour-driven tests for nightly history and rollback.

use camino::Utf8PathBuf;
use nvup_common::CancelToken;
use nvup_installer::archive::ArchiveCodec;
use nvup_installer::config::Config;
use nvup_installer::error::{InstallerError, Result as InstallerResult};
use nvup_installer::history::{HistoryStore, short_hash};
use nvup_installer::layout::Layout;
use nvup_installer::manager::{Collaborators, VersionManager};
use nvup_installer::release::{NIGHTLY_TAG, Platform};
use nvup_installer::rollback::RollbackOutcome;
use nvup_installer::source_build::{BuildOutput, SourceBuilder};
use nvup_installer::test_utils::{
    StubDownloader, StubReleaseSource, nightly_release, release, serve_release,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const COMMITS: [&str; 4] = [
    "aaaaaaa000000000000000000000000000000001",
    "bbbbbbb000000000000000000000000000000002",
    "ccccccc000000000000000000000000000000003",
    "ddddddd000000000000000000000000000000004",
];

struct NoBuilds;

impl SourceBuilder for NoBuilds {
    fn build_from_commit(
        &self,
        reference: &str,
        _prefix: &Path,
        _cancel: &CancelToken,
    ) -> InstallerResult<BuildOutput> {
        Err(InstallerError::Build {
            reference: reference.to_owned(),
            reason: "source builds are disabled".to_owned(),
        })
    }
}

struct RollbackWorld {
    _temp: TempDir,
    layout: Layout,
    releases: StubReleaseSource,
    downloader: StubDownloader,
    history_limit: usize,
    outcome: Option<InstallerResult<RollbackOutcome>>,
}

impl RollbackWorld {
    fn manager(&self) -> VersionManager<'_> {
        let config = Config {
            lock_timeout_secs: 2,
            history_limit: self.history_limit,
            ..Config::default()
        };
        let collaborators = Collaborators {
            releases: &self.releases,
            downloader: &self.downloader,
            extractor: &ArchiveCodec,
            builder: &NoBuilds,
        };
        VersionManager::new(self.layout.clone(), &config, collaborators)
            .expect("valid config")
            .with_platform(Platform::new("linux", "x86_64"))
    }

    fn history_store(&self) -> HistoryStore<'_> {
        HistoryStore::new(&self.layout, self.history_limit, Duration::from_secs(2))
    }

    fn publish_nightly(&self, commit: &str) {
        let nightly = nightly_release(commit);
        serve_release(&self.downloader, &nightly, commit);
        self.releases
            .set_releases(vec![nightly, release("v0.10.0", false)]);
    }

    fn upgrade_to(&self, commit: &str) {
        self.publish_nightly(commit);
        self.manager()
            .upgrade(NIGHTLY_TAG, &CancelToken::new(), &mut |_, _| {})
            .expect("nightly upgrade");
    }

    fn history_hashes(&self) -> Vec<String> {
        self.history_store()
            .entries()
            .expect("history")
            .into_iter()
            .map(|entry| entry.commit_hash)
            .collect()
    }
}

#[fixture]
fn world() -> RollbackWorld {
    let temp = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8 temp dir");
    RollbackWorld {
        layout: Layout::new(root.join("data"), root.join("bin")),
        _temp: temp,
        releases: StubReleaseSource::default(),
        downloader: StubDownloader::new(),
        history_limit: Config::default().history_limit,
        outcome: None,
    }
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("an installed nightly with no history")]
fn given_fresh_nightly(world: &mut RollbackWorld) {
    world.upgrade_to(COMMITS[0]);
    assert!(world.history_hashes().is_empty());
}

#[given("an installed nightly upgraded twice")]
fn given_nightly_upgraded_twice(world: &mut RollbackWorld) {
    world.upgrade_to(COMMITS[0]);
    world.upgrade_to(COMMITS[1]);
    world.upgrade_to(COMMITS[2]);
    assert_eq!(world.history_hashes(), [COMMITS[1], COMMITS[0]]);
}

#[given("a history limit of {limit}")]
fn given_history_limit(world: &mut RollbackWorld, limit: usize) {
    world.history_limit = limit;
}

#[when("rollback to index {index} is requested")]
fn when_rollback(world: &mut RollbackWorld, index: usize) {
    let outcome = world.manager().rollback_to(index, &CancelToken::new());
    world.outcome = Some(outcome);
}

#[when("four nightly builds are recorded")]
fn when_four_recorded(world: &mut RollbackWorld) {
    let store = world.history_store();
    for commit in COMMITS {
        let backup = world.layout.backup_dir(short_hash(commit));
        fs::create_dir_all(&backup).expect("backup dir");
        store
            .record(commit, NIGHTLY_TAG, &CancelToken::new())
            .expect("record");
    }
}

#[then("nothing was rolled back")]
fn then_nothing_rolled_back(world: &mut RollbackWorld) {
    let outcome = world.outcome.take().expect("rollback requested");
    assert!(matches!(outcome, Ok(RollbackOutcome::NothingToRollBack)));
}

#[then("rollback fails naming \"{hint}\"")]
fn then_rollback_fails(world: &mut RollbackWorld, hint: String) {
    let outcome = world.outcome.take().expect("rollback requested");
    let err = outcome.expect_err("index is out of range");
    assert!(
        matches!(err, InstallerError::HistoryIndexOutOfRange { .. }),
        "got {err}"
    );
    assert!(err.to_string().contains(&hint), "got {err}");
}

#[then("the active nightly was built from the second commit")]
fn then_active_nightly_is_second(world: &mut RollbackWorld) {
    let outcome = world.outcome.take().expect("rollback requested");
    assert!(
        matches!(outcome, Ok(RollbackOutcome::RolledBack { .. })),
        "rollback should succeed"
    );
    let identifier = world
        .layout
        .read_identifier(NIGHTLY_TAG)
        .expect("read identifier");
    assert_eq!(identifier.as_deref(), Some(COMMITS[1]));
    let current = world.manager().current().expect("read current");
    assert_eq!(current.as_deref(), Some(NIGHTLY_TAG));
}

#[then("the displaced build heads the history")]
fn then_displaced_heads_history(world: &mut RollbackWorld) {
    let hashes = world.history_hashes();
    assert_eq!(hashes.first().map(String::as_str), Some(COMMITS[2]));
    assert!(world.layout.backup_dir(short_hash(COMMITS[2])).is_dir());
}

#[then("the history holds {count} entries")]
fn then_history_len(world: &mut RollbackWorld, count: usize) {
    assert_eq!(world.history_hashes().len(), count);
}

#[then("the newest entry comes first")]
fn then_newest_first(world: &mut RollbackWorld) {
    assert_eq!(world.history_hashes(), [COMMITS[3], COMMITS[2]]);
}

#[then("the evicted backups are deleted")]
fn then_evicted_deleted(world: &mut RollbackWorld) {
    for commit in &COMMITS[..2] {
        assert!(!world.layout.backup_dir(short_hash(commit)).exists());
    }
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[scenario(path = "tests/features/rollback.feature", index = 0)]
fn scenario_empty_history(world: RollbackWorld) {
    let _ = world;
}

#[cfg(unix)]
#[scenario(path = "tests/features/rollback.feature", index = 1)]
fn scenario_index_out_of_range(world: RollbackWorld) {
    let _ = world;
}

#[cfg(unix)]
#[scenario(path = "tests/features/rollback.feature", index = 2)]
fn scenario_rollback_restores(world: RollbackWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/rollback.feature", index = 3)]
fn scenario_history_limit(world: RollbackWorld) {
    let _ = world;
}
