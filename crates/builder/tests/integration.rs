//! End-to-end scheduler runs against real descriptors, shell steps, and a
//! real filesystem. Packages "build" by writing marker files so the tests
//! can observe exactly what ran.

use picopkg_builder::{BuildConfig, Scheduler};
use picopkg_types::{
    ActionName, ActionRef, PackageBuildState, PackageDescriptor, RunReport, SourceOption, Step,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

fn descriptor(id: &str) -> PackageDescriptor {
    PackageDescriptor::new(id)
}

fn set_of(descriptors: Vec<PackageDescriptor>) -> BTreeMap<String, PackageDescriptor> {
    descriptors.into_iter().map(|d| (d.id.clone(), d)).collect()
}

async fn run(
    root: &Path,
    cache: Option<&Path>,
    descriptors: &BTreeMap<String, PackageDescriptor>,
) -> RunReport {
    let (tx, rx) = picopkg_events::channel();
    drop(rx);
    let config = BuildConfig {
        max_concurrency: 4,
        build_root: root.to_path_buf(),
        cache_path: cache.map(Path::to_path_buf),
        command_timeout: None,
    };
    let scheduler = Scheduler::new(config, tx).unwrap();
    scheduler.run(descriptors).await.unwrap().report
}

#[tokio::test]
async fn dependency_order_is_respected() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("shared/first");

    let mut base = descriptor("base");
    base.build.push(Step::shell(format!(
        "mkdir -p {0} && touch {0}/first",
        dir.path().join("shared").display()
    )));

    let mut app = descriptor("app");
    app.depends.push("base".into());
    // Fails unless base already ran
    app.build
        .push(Step::shell(format!("test -f {}", marker.display())));

    let report = run(dir.path().join("work").as_path(), None, &set_of(vec![base, app])).await;
    assert!(report.success());
    assert_eq!(
        report.package("app").unwrap().outcome,
        PackageBuildState::Succeeded
    );
}

#[tokio::test]
async fn failure_blocks_all_transitive_dependents() {
    let dir = TempDir::new().unwrap();

    let mut broken = descriptor("broken");
    broken.build.push(Step::shell("exit 1"));

    let mut mid = descriptor("mid");
    mid.depends.push("broken".into());
    mid.build.push(Step::shell("touch mid-ran"));

    let mut leaf = descriptor("leaf");
    leaf.depends.push("mid".into());
    leaf.build.push(Step::shell("touch leaf-ran"));

    let mut unrelated = descriptor("unrelated");
    unrelated.build.push(Step::shell("true"));

    let report = run(
        dir.path(),
        None,
        &set_of(vec![broken, mid, leaf, unrelated]),
    )
    .await;

    assert!(!report.success());
    assert!(report.any_failed());
    assert_eq!(
        report.package("broken").unwrap().outcome,
        PackageBuildState::Failed
    );
    assert_eq!(
        report.package("mid").unwrap().outcome,
        PackageBuildState::Blocked
    );
    assert_eq!(
        report.package("leaf").unwrap().outcome,
        PackageBuildState::Blocked
    );
    // An independent package still builds
    assert_eq!(
        report.package("unrelated").unwrap().outcome,
        PackageBuildState::Succeeded
    );
    assert!(!dir.path().join("mid/mid-ran").exists());
    assert!(!dir.path().join("leaf/leaf-ran").exists());
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("cache.json");
    let counter = dir.path().join("builds");

    let mut pkg = descriptor("counted");
    pkg.build
        .push(Step::shell(format!("echo run >> {}", counter.display())));

    let descriptors = set_of(vec![pkg]);
    let first = run(dir.path(), Some(&cache), &descriptors).await;
    assert_eq!(
        first.package("counted").unwrap().outcome,
        PackageBuildState::Succeeded
    );

    let second = run(dir.path(), Some(&cache), &descriptors).await;
    let cached = second.package("counted").unwrap();
    assert_eq!(cached.outcome, PackageBuildState::Cached);
    assert!(cached.cache_hit);

    // Built exactly once
    let runs = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(runs.lines().count(), 1);
}

#[tokio::test]
async fn descriptor_edit_invalidates_the_cache() {
    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("cache.json");
    let counter = dir.path().join("builds");

    let mut pkg = descriptor("counted");
    pkg.build
        .push(Step::shell(format!("echo run >> {}", counter.display())));
    run(dir.path(), Some(&cache), &set_of(vec![pkg.clone()])).await;

    pkg.metadata.insert("version".into(), json!("2.0"));
    let report = run(dir.path(), Some(&cache), &set_of(vec![pkg])).await;
    assert_eq!(
        report.package("counted").unwrap().outcome,
        PackageBuildState::Succeeded
    );
    let runs = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(runs.lines().count(), 2);
}

#[tokio::test]
async fn dependency_change_rebuilds_dependents() {
    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("cache.json");
    let counter = dir.path().join("app-builds");

    let mut base = descriptor("base");
    base.build.push(Step::shell("true"));
    let mut app = descriptor("app");
    app.depends.push("base".into());
    app.build
        .push(Step::shell(format!("echo run >> {}", counter.display())));

    run(dir.path(), Some(&cache), &set_of(vec![base.clone(), app.clone()])).await;

    // Edit only the dependency; the dependent's own descriptor is untouched
    base.env.insert("CFLAGS".into(), "-O3".into());
    run(dir.path(), Some(&cache), &set_of(vec![base, app])).await;

    let runs = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(runs.lines().count(), 2);
}

#[tokio::test]
async fn always_actions_run_on_cache_hits() {
    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("cache.json");
    let built = dir.path().join("built");
    let installed = dir.path().join("installed");

    let mut pkg = descriptor("pkg");
    pkg.actions = vec![
        ActionRef::new(ActionName::Build),
        ActionRef {
            name: ActionName::Install,
            always: true,
        },
    ];
    pkg.build
        .push(Step::shell(format!("echo b >> {}", built.display())));
    pkg.install
        .push(Step::shell(format!("echo i >> {}", installed.display())));

    let descriptors = set_of(vec![pkg]);
    run(dir.path(), Some(&cache), &descriptors).await;
    let report = run(dir.path(), Some(&cache), &descriptors).await;
    assert_eq!(
        report.package("pkg").unwrap().outcome,
        PackageBuildState::Cached
    );

    // Build ran once, install ran both times
    assert_eq!(std::fs::read_to_string(&built).unwrap().lines().count(), 1);
    assert_eq!(
        std::fs::read_to_string(&installed).unwrap().lines().count(),
        2
    );
}

#[tokio::test]
async fn cross_package_variables_and_env_inheritance() {
    let dir = TempDir::new().unwrap();

    let mut icu = descriptor("icu");
    let mut options = BTreeMap::new();
    options.insert("path".to_string(), json!("prefix"));
    options.insert("set_path_to".to_string(), json!("prefix"));
    icu.config
        .push(Step::builtin_with("picopkg.make_folder", options));
    icu.env
        .insert("ICU_HOME".into(), "{metadata.prefix}".into());
    icu.build
        .push(Step::shell("touch {metadata.prefix}/libicu.a"));

    let mut boost = descriptor("boost");
    boost.depends.push("icu".into());
    boost.settings.inherit_build_env_from_depends = true;
    // Reads both a cross-package metadata reference and an inherited var
    boost.build.push(Step::shell(
        "test -f {icu.metadata.prefix}/libicu.a && test -n \"$ICU_HOME\"",
    ));

    let report = run(dir.path(), None, &set_of(vec![icu, boost])).await;
    assert!(report.success(), "{:?}", report.packages);
}

#[tokio::test]
async fn checksum_fallback_across_source_options() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bad.tar"), b"tampered bytes").unwrap();

    // A real tar archive, so extraction succeeds after the fallback
    let archive_path = dir.path().join("good.tar");
    {
        let file = std::fs::File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(file);
        let content = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "pkg-1.0/run.sh", content.as_slice())
            .unwrap();
        builder.finish().unwrap();
    }
    let good_sha256 = {
        use sha2::{Digest, Sha256};
        let data = std::fs::read(&archive_path).unwrap();
        hex::encode(Sha256::digest(&data))
    };

    let mut pkg = descriptor("pkg");
    pkg.metadata.insert("source_folder".into(), json!("pkg-1.0"));
    pkg.sources.push(SourceOption {
        archive: Some(dir.path().join("bad.tar")),
        sha256: Some(good_sha256.clone()),
        ..SourceOption::default()
    });
    pkg.sources.push(SourceOption {
        archive: Some(archive_path.clone()),
        sha256: Some(good_sha256),
        ..SourceOption::default()
    });
    pkg.download.push(Step::builtin("picopkg.download"));
    pkg.extract.push(Step::builtin("picopkg.extract"));
    // Runs inside the extracted source folder
    pkg.build.push(Step::shell("test -f run.sh"));
    // The saved archive is published run-wide
    pkg.install
        .push(Step::shell("test -f {persist.saved_archive}"));

    let report = run(dir.path().join("work").as_path(), None, &set_of(vec![pkg])).await;
    assert!(report.success(), "{:?}", report.packages);
}

#[tokio::test]
async fn finalized_overlays_survive_the_run() {
    let dir = TempDir::new().unwrap();

    let mut pkg = descriptor("pkg");
    let mut options = BTreeMap::new();
    options.insert("path".to_string(), json!("prefix"));
    options.insert("set_path_to".to_string(), json!("prefix"));
    pkg.config
        .push(Step::builtin_with("picopkg.make_folder", options));
    let mut set_opts = BTreeMap::new();
    set_opts.insert("key".to_string(), json!("marker"));
    set_opts.insert("value".to_string(), json!("done"));
    set_opts.insert("persist".to_string(), json!(true));
    pkg.install.push(Step::builtin_with("picopkg.set", set_opts));

    let (tx, rx) = picopkg_events::channel();
    drop(rx);
    let scheduler = Scheduler::new(
        BuildConfig {
            build_root: dir.path().to_path_buf(),
            ..BuildConfig::default()
        },
        tx,
    )
    .unwrap();
    let outcome = scheduler.run(&set_of(vec![pkg])).await.unwrap();
    assert!(outcome.report.success());

    // Computed metadata and persist writes stay readable after the run
    let overlay = outcome.context.overlay("pkg").unwrap();
    let prefix = overlay["metadata"]["prefix"].as_str().unwrap();
    assert!(Path::new(prefix).is_dir());
    assert_eq!(
        outcome.context.persist_snapshot()["marker"],
        json!("done")
    );
}

#[tokio::test]
async fn unknown_builtin_fails_the_package() {
    let dir = TempDir::new().unwrap();

    let mut pkg = descriptor("pkg");
    pkg.build.push(Step::builtin("picopkg.transmogrify"));

    let report = run(dir.path(), None, &set_of(vec![pkg])).await;
    let failed = report.package("pkg").unwrap();
    assert_eq!(failed.outcome, PackageBuildState::Failed);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .contains("picopkg.transmogrify"));
}

#[tokio::test]
async fn undeclared_dependency_reference_fails() {
    let dir = TempDir::new().unwrap();

    let mut other = descriptor("other");
    other.build.push(Step::shell("true"));

    let mut pkg = descriptor("pkg");
    // References `other` without depending on it
    pkg.build
        .push(Step::shell("echo {other.metadata.prefix}"));

    let report = run(dir.path(), None, &set_of(vec![other, pkg])).await;
    let failed = report.package("pkg").unwrap();
    assert_eq!(failed.outcome, PackageBuildState::Failed);
}

#[tokio::test]
async fn cycle_fails_the_whole_run() {
    let dir = TempDir::new().unwrap();

    let mut a = descriptor("a");
    a.depends.push("b".into());
    let mut b = descriptor("b");
    b.depends.push("a".into());

    let (tx, rx) = picopkg_events::channel();
    drop(rx);
    let scheduler = Scheduler::new(
        BuildConfig {
            build_root: dir.path().to_path_buf(),
            ..BuildConfig::default()
        },
        tx,
    )
    .unwrap();
    let err = scheduler.run(&set_of(vec![a, b])).await.unwrap_err();
    assert!(matches!(
        err,
        picopkg_errors::Error::Graph(picopkg_errors::GraphError::CyclicDependency { .. })
    ));
}

#[tokio::test]
async fn cancellation_blocks_unstarted_packages() {
    let dir = TempDir::new().unwrap();

    let mut slow = descriptor("slow");
    slow.build.push(Step::shell("sleep 10"));
    let mut next = descriptor("next");
    next.depends.push("slow".into());
    next.build.push(Step::shell("touch next-ran"));

    let (tx, rx) = picopkg_events::channel();
    drop(rx);
    let scheduler = Scheduler::new(
        BuildConfig {
            build_root: dir.path().to_path_buf(),
            ..BuildConfig::default()
        },
        tx,
    )
    .unwrap();
    let handle = scheduler.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.cancel();
    });

    let report = scheduler.run(&set_of(vec![slow, next])).await.unwrap().report;
    assert!(!report.success());
    assert_eq!(
        report.package("next").unwrap().outcome,
        PackageBuildState::Blocked
    );
    assert!(!dir.path().join("next/next-ran").exists());
}
