//! Behaviour-driven tests for the release list cache and alias resolution.

use nvup_installer::error::InstallerError;
use nvup_installer::release::{Alias, Release, ReleaseCache, ReleaseResolver};
use nvup_installer::test_utils::{StubReleaseSource, nightly_release, release};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use semver::Version;
use std::time::Duration;
use tempfile::TempDir;

const NIGHTLY_COMMIT: &str = "aaaaaaa000000000000000000000000000000001";

struct ReleaseWorld {
    temp: TempDir,
    source: StubReleaseSource,
    resolved: Option<Result<Release, InstallerError>>,
}

impl ReleaseWorld {
    fn resolver(&self) -> ReleaseResolver<'_> {
        let cache = ReleaseCache::new(
            self.temp.path().join("releases.json"),
            Duration::from_secs(300),
        );
        ReleaseResolver::new(&self.source, cache, Some(Version::new(0, 5, 0)))
    }
}

#[fixture]
fn world() -> ReleaseWorld {
    ReleaseWorld {
        temp: tempfile::tempdir().expect("temp dir"),
        source: StubReleaseSource::default(),
        resolved: None,
    }
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("an upstream publishing v0.10.0 and v0.9.5")]
fn given_two_releases(world: &mut ReleaseWorld) {
    world.source.set_releases(vec![
        nightly_release(NIGHTLY_COMMIT),
        release("v0.10.0", false),
        release("v0.9.5", false),
    ]);
}

#[given("an upstream whose newest versioned release is a prerelease")]
fn given_prerelease_first(world: &mut ReleaseWorld) {
    world.source.set_releases(vec![
        nightly_release(NIGHTLY_COMMIT),
        release("v0.11.0", true),
        release("v0.10.0", false),
        release("v0.9.5", false),
    ]);
}

#[given("an upstream publishing v0.4.4 alongside v0.10.0")]
fn given_ancient_release(world: &mut ReleaseWorld) {
    world
        .source
        .set_releases(vec![release("v0.10.0", false), release("v0.4.4", false)]);
}

#[when("the release list is requested twice")]
fn when_requested_twice(world: &mut ReleaseWorld) {
    let resolver = world.resolver();
    let first = resolver.get_releases(false).expect("first fetch");
    let second = resolver.get_releases(false).expect("second fetch");
    assert_eq!(first, second);
}

#[when("the release list is requested and then refreshed")]
fn when_requested_then_refreshed(world: &mut ReleaseWorld) {
    let resolver = world.resolver();
    resolver.get_releases(false).expect("first fetch");
    resolver.get_releases(true).expect("forced refresh");
}

#[when("\"{alias}\" is resolved")]
fn when_alias_resolved(world: &mut ReleaseWorld, alias: String) {
    let alias: Alias = alias.parse().expect("valid alias");
    let resolved = world.resolver().resolve(&alias, false);
    world.resolved = Some(resolved);
}

#[then("upstream was asked once")]
fn then_asked_once(world: &mut ReleaseWorld) {
    assert_eq!(world.source.fetches(), 1);
}

#[then("upstream was asked twice")]
fn then_asked_twice(world: &mut ReleaseWorld) {
    assert_eq!(world.source.fetches(), 2);
}

#[then("the resolved tag is \"{tag}\"")]
fn then_resolved_tag(world: &mut ReleaseWorld, tag: String) {
    let resolved = world.resolved.take().expect("alias resolved");
    assert_eq!(resolved.expect("release found").tag, tag);
}

#[then("resolution fails because no release matches")]
fn then_not_found(world: &mut ReleaseWorld) {
    let resolved = world.resolved.take().expect("alias resolved");
    let err = resolved.expect_err("release should be filtered out");
    assert!(
        matches!(err, InstallerError::AliasNotFound { ref alias } if alias == "v0.4.4"),
        "got {err}"
    );
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/releases.feature", index = 0)]
fn scenario_cache_answers_repeats(world: ReleaseWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/releases.feature", index = 1)]
fn scenario_forced_refresh(world: ReleaseWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/releases.feature", index = 2)]
fn scenario_stable_skips_prereleases(world: ReleaseWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/releases.feature", index = 3)]
fn scenario_minimum_version_filter(world: ReleaseWorld) {
    let _ = world;
}
