//! Behaviour-driven tests for checksum manifests and custom publishers.
//!
//! Scenarios run the stages against a temporary dist directory. Publisher
//! commands go through a `RecordingExecutor`, so nothing is executed on the
//! host.
#![expect(
    clippy::expect_used,
    reason = "steps and fixtures panic with a message when the scenario setup is broken"
)]

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use shipwright::config::{ProjectConfig, PublisherConfig};
use shipwright::publish::env::FixedEnv;
use shipwright::test_utils::{RecordingExecutor, failure_output, success_output};
use shipwright::{
    Artifact, ArtifactType, ChecksumStage, Context, Outcome, PublishStage, ReleaseError, run_stage,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const MANIFEST: &str = "demo_1.0.0_checksums.txt";
const BINARY: &str = "demo_linux_amd64";
const PACKAGE: &str = "demo_1.0.0_amd64.deb";

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ReleaseWorld {
    temp_dir: Option<TempDir>,
    ctx: Option<Context>,
    failing: Option<(String, String)>,
    executor: Option<Arc<RecordingExecutor>>,
    outcome: Option<Outcome>,
    error: Option<ReleaseError>,
}

#[fixture]
fn world() -> ReleaseWorld {
    ReleaseWorld {
        temp_dir: Some(TempDir::new().expect("temp dir")),
        ..ReleaseWorld::default()
    }
}

fn dist(world: &ReleaseWorld) -> Utf8PathBuf {
    let path = world.temp_dir.as_ref().expect("temp_dir set").path();
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf-8 temp dir")
}

fn ctx(world: &mut ReleaseWorld) -> &mut Context {
    world.ctx.as_mut().expect("context set")
}

fn manifest_lines(world: &ReleaseWorld) -> Vec<String> {
    fs::read_to_string(dist(world).join(MANIFEST))
        .expect("read manifest")
        .lines()
        .map(str::to_owned)
        .collect()
}

fn calculate_checksums(world: &mut ReleaseWorld) {
    let outcome = run_stage(&ChecksumStage, ctx(world)).expect("checksums");
    world.outcome = Some(outcome);
}

fn sha256(contents: &str) -> String {
    use shipwright::digest::Algorithm;

    Algorithm::Sha256
        .digest_reader(contents.as_bytes())
        .expect("digest")
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[given("a dist directory with a binary and a linux package")]
fn given_dist(world: &mut ReleaseWorld) {
    let root = dist(world);
    let config = ProjectConfig {
        project_name: "demo".to_owned(),
        dist: root.clone(),
        parallelism: 2,
        ..ProjectConfig::default()
    };
    let ctx = Context::new(config, "1.0.0").expect("context");
    for (name, kind) in [
        (PACKAGE, ArtifactType::LinuxPackage),
        (BINARY, ArtifactType::Binary),
    ] {
        let path = root.join(name);
        fs::write(&path, name).expect("write artifact");
        ctx.artifacts
            .add(Artifact::new(name, path, kind).with_platform("linux", "amd64"));
    }
    world.ctx = Some(ctx);
}

#[given("checksums are calculated")]
fn given_checksums(world: &mut ReleaseWorld) {
    calculate_checksums(world);
}

#[given("a publisher uploading each artifact by name")]
fn given_publisher(world: &mut ReleaseWorld) {
    ctx(world).config.publishers.push(PublisherConfig {
        name: "uploader".to_owned(),
        cmd: "upload {{ .ArtifactName }}".to_owned(),
        ..PublisherConfig::default()
    });
}

#[given("the publisher is disabled for version \"{version}\"")]
fn given_disabled(world: &mut ReleaseWorld, version: String) {
    let publisher = ctx(world)
        .config
        .publishers
        .last_mut()
        .expect("publisher configured");
    publisher.disable = format!("{{{{ eq .Version \"{version}\" }}}}");
}

#[given("uploads of \"{name}\" fail with \"{message}\"")]
fn given_failing_upload(world: &mut ReleaseWorld, name: String, message: String) {
    world.failing = Some((name, message));
}

#[when("checksums are calculated")]
fn when_checksums(world: &mut ReleaseWorld) {
    calculate_checksums(world);
}

#[when("the binary is rewritten and the manifest refreshed")]
fn when_refreshed(world: &mut ReleaseWorld) {
    fs::write(dist(world).join(BINARY), "rebuilt").expect("rewrite binary");
    let manifests = ctx(world)
        .artifacts
        .filter(|artifact| artifact.kind() == ArtifactType::Checksum);
    for manifest in manifests {
        manifest.refresh().expect("refresh");
    }
}

#[when("the publishers run")]
fn when_publishers_run(world: &mut ReleaseWorld) {
    let executor = Arc::new(match world.failing.clone() {
        Some((name, message)) => RecordingExecutor::responding(move |invocation| {
            if invocation.args.contains(&name) {
                failure_output(&message)
            } else {
                success_output()
            }
        }),
        None => RecordingExecutor::succeeding(),
    });
    let stage = PublishStage::new()
        .with_executor(executor.clone())
        .with_env_lookup(Arc::new(FixedEnv::default()));
    world.executor = Some(executor);
    match run_stage(&stage, ctx(world)) {
        Ok(outcome) => world.outcome = Some(outcome),
        Err(err) => world.error = Some(err),
    }
}

#[then("the manifest lists {count:usize} files in name order")]
fn then_manifest_lists(world: &mut ReleaseWorld, count: usize) {
    let names: Vec<String> = manifest_lines(world)
        .iter()
        .filter_map(|line| line.split_once("  ").map(|(_, name)| name.to_owned()))
        .collect();
    assert_eq!(names.len(), count);
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[then("every listed artifact records its sha256 digest")]
fn then_digests_recorded(world: &mut ReleaseWorld) {
    for name in [BINARY, PACKAGE] {
        let artifact = ctx(world)
            .artifacts
            .filter(|artifact| artifact.name() == name)
            .pop()
            .expect("artifact registered");
        assert_eq!(artifact.checksum(), Some(format!("sha256:{}", sha256(name))));
    }
}

#[then("the manifest lists the new digest of the binary")]
fn then_new_digest(world: &mut ReleaseWorld) {
    let expected = format!("{}  {BINARY}", sha256("rebuilt"));
    assert!(
        manifest_lines(world).contains(&expected),
        "expected {expected} in the manifest"
    );
}

#[then("the publisher ran for \"{name}\"")]
fn then_ran_for(world: &mut ReleaseWorld, name: String) {
    let executor = world.executor.as_ref().expect("publishers ran");
    assert!(executor.argument_sets().contains(&vec![name]));
}

#[then("the publisher ran {count:usize} times")]
fn then_ran_times(world: &mut ReleaseWorld, count: usize) {
    let executor = world.executor.as_ref().expect("publishers ran");
    assert_eq!(executor.invocations().len(), count);
}

#[then("the publishing stage is skipped")]
fn then_skipped(world: &mut ReleaseWorld) {
    assert!(world.error.is_none());
    assert!(world.outcome.as_ref().is_some_and(Outcome::is_skipped));
}

#[then("publishing fails with \"{message}\"")]
fn then_fails_with(world: &mut ReleaseWorld, message: String) {
    let err = world.error.as_ref().expect("publishing failed");
    assert_eq!(err.to_string(), message);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/release.feature",
    name = "Checksum manifest lists every checksummable artifact"
)]
fn scenario_manifest(world: ReleaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/release.feature",
    name = "Refreshing the manifest picks up modified sources"
)]
fn scenario_refresh(world: ReleaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/release.feature",
    name = "Publisher runs once per publishable artifact"
)]
fn scenario_publish(world: ReleaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/release.feature",
    name = "Disabled publishers are skipped"
)]
fn scenario_disabled(world: ReleaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/release.feature",
    name = "A failing publisher reports its error"
)]
fn scenario_failure(world: ReleaseWorld) {
    let _ = world;
}
