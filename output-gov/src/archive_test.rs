use std::fs::File;

use super::*;

fn write_files(dir: &Path, names: &[&str]) -> anyhow::Result<()> {
    for name in names {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("content of {}", name))?;
    }
    Ok(())
}

/// Regular-file entry paths of a tar container, in stored order.
fn file_entries(path: &Path) -> anyhow::Result<Vec<String>> {
    let mut archive = tar::Archive::new(File::open(path)?);
    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_file() {
            names.push(entry.path()?.to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

fn options() -> PackageOptions {
    PackageOptions::new("job-42", "ffmpeg", "mp4", "png")
}

// ============================================================================
// Naming
// ============================================================================

#[test]
fn test_archive_filename() {
    assert_eq!(archive_filename("result"), "result.tar");
    assert_eq!(archive_filename("result.tar"), "result.tar");
    assert_eq!(archive_filename("result.zip"), "result.tar");
    assert_eq!(archive_filename("result.tar.gz"), "result.tar");
    assert_eq!(archive_filename("result.TGZ"), "result.tar");
    assert_eq!(archive_filename("result.zip.tar.xz"), "result.tar");
    assert_eq!(archive_filename("result.cxpkg"), "result.tar");
    assert_eq!(archive_filename("frames.v2"), "frames.v2.tar");
    assert_eq!(archive_filename(".zip"), "output.tar");
    assert_eq!(archive_filename(""), "output.tar");
}

#[test]
fn test_filenames_are_idempotent() {
    for base in ["a", "a.tar", "a.7z", "a.tar.zst", "A.RAR", "x.y.bz2", "", ".tar"] {
        let once = archive_filename(base);
        assert_eq!(archive_filename(&once), once, "archive name of {:?}", base);
        let once = package_filename(base);
        assert_eq!(package_filename(&once), once, "package name of {:?}", base);
    }
}

#[test]
fn test_package_filename() {
    assert_eq!(package_filename("job-42"), "job-42.cxpkg");
    assert_eq!(package_filename("job-42.zip"), "job-42.cxpkg");
    assert_eq!(package_filename("job-42.tar"), "job-42.cxpkg");
}

#[test]
fn test_never_produces_forbidden_suffix() {
    for base in ["a.zip", "b.tar.gz", "c.gz", "d.tbz2", "e.txz"] {
        let name = archive_filename(base).to_ascii_lowercase();
        for suffix in FORBIDDEN_SUFFIXES {
            assert!(!name.ends_with(suffix), "{} ends with {}", name, suffix);
        }
    }
}

#[test]
fn test_is_archive_name() {
    assert!(is_archive_name("x.tar"));
    assert!(is_archive_name("x.TAR"));
    assert!(is_archive_name("x.cxpkg"));
    assert!(!is_archive_name("x.zip"));
    assert!(!is_archive_name("tar"));
    assert!(!is_archive_name("x.png"));
}

// ============================================================================
// Plain archives
// ============================================================================

#[test]
fn test_plain_archive_excludes_hidden_and_archives() -> anyhow::Result<()> {
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    write_files(src.path(), &["b.txt", "a.txt", "sub/c_10.txt", "sub/c_2.txt", ".hidden", "old.tar"])?;

    let packager = Packager::default();
    let out = packager.create_plain_archive(src.path(), &dst.path().join("bundle.zip"), None)?;

    assert_eq!(out, dst.path().join("bundle.tar"));
    assert!(!dst.path().join("bundle.zip").exists());
    assert_eq!(
        file_entries(&out)?,
        vec!["a.txt", "b.txt", "sub/c_2.txt", "sub/c_10.txt"]
    );
    Ok(())
}

#[test]
fn test_plain_archive_skips_itself() -> anyhow::Result<()> {
    let src = tempfile::tempdir()?;
    write_files(src.path(), &["x.txt"])?;

    let packager = Packager::default();
    let keep_all = |_: &Path| true;
    let out = packager.create_plain_archive(src.path(), &src.path().join("pack"), Some(&keep_all))?;
    assert_eq!(out, src.path().join("pack.tar"));
    assert_eq!(file_entries(&out)?, vec!["x.txt"]);

    // a second run sees the first archive as a regular file
    let out = packager.create_plain_archive(src.path(), &src.path().join("again"), Some(&keep_all))?;
    assert_eq!(file_entries(&out)?, vec!["pack.tar", "x.txt"]);
    Ok(())
}

#[test]
fn test_plain_archive_errors() -> anyhow::Result<()> {
    let src = tempfile::tempdir()?;
    write_files(src.path(), &["x.txt"])?;
    let packager = Packager::default();

    let err = packager
        .create_plain_archive(Path::new("/nonexistent/src"), &src.path().join("o"), None)
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Collect);

    let missing = src.path().join("no-such-dir").join("o.tar");
    let err = packager.create_plain_archive(src.path(), &missing, None).unwrap_err();
    assert_eq!(err.stage(), Stage::Serialize);
    assert!(!missing.exists());
    Ok(())
}

// ============================================================================
// Governed packages
// ============================================================================

#[test]
fn test_governed_package_layout() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    write_files(out.path(), &["c.png", "a.png", "b.png"])?;

    let packager = Packager::default();
    let outcome =
        packager.create_governed_package(out.path(), &dst.path().join("job-42.zip"), &options())?;

    assert_eq!(outcome.package_path, dst.path().join("job-42.cxpkg"));
    assert_eq!(
        file_entries(&outcome.package_path)?,
        vec![
            "manifest.json",
            "preview.png",
            "artifacts/a.png",
            "artifacts/b.png",
            "artifacts/c.png"
        ]
    );

    let manifest = Manifest::read_from_package(&outcome.package_path)?;
    assert_eq!(manifest, outcome.manifest);
    assert_eq!(manifest.artifact_count, 3);
    assert_eq!(manifest.job_id, "job-42");
    assert_eq!(manifest.preview, "preview.png");

    // staging is kept by default
    let staging = outcome.staging_dir.clone().expect("staging dir");
    assert_eq!(staging, dst.path().join(".job-42.staging"));
    assert!(staging.join("manifest.json").is_file());
    Ok(())
}

#[test]
fn test_staging_root_and_cleanup() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let staging_root = tempfile::tempdir()?;
    write_files(out.path(), &["p1.jpg", "p2.jpg"])?;

    let packager = Packager::new(PackagingConfig {
        staging_root: Some(staging_root.path().to_path_buf()),
        ..Default::default()
    });
    let mut outcome =
        packager.create_governed_package(out.path(), &out.path().join("bundle"), &options())?;
    let staging = outcome.staging_dir.clone().expect("staging dir");
    assert!(staging.starts_with(staging_root.path()));

    outcome.cleanup_staging()?;
    assert!(!staging.exists());
    assert!(outcome.staging_dir.is_none());
    // second cleanup is a no-op
    outcome.cleanup_staging()?;

    let packager = Packager::new(PackagingConfig {
        remove_staging: true,
        ..Default::default()
    });
    let outcome =
        packager.create_governed_package(out.path(), &out.path().join("bundle2"), &options())?;
    assert!(outcome.staging_dir.is_none());
    assert!(!out.path().join(".bundle2.staging").exists());
    Ok(())
}

#[test]
fn test_single_output_is_rejected() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    write_files(out.path(), &["only.pdf"])?;
    let target = out.path().join("job.cxpkg");

    let err = Packager::default()
        .create_governed_package(out.path(), &target, &options())
        .unwrap_err();
    assert!(matches!(err, PackagingError::NotMultiOutput { file_count: 1, .. }));
    assert_eq!(err.stage(), Stage::Classify);
    assert!(!target.exists());
    Ok(())
}

#[test]
fn test_details_recorded_when_configured() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    write_files(out.path(), &["a.webp", "b.webp"])?;

    let packager = Packager::new(PackagingConfig {
        record_artifact_details: true,
        remove_staging: true,
        ..Default::default()
    });
    let outcome = packager.create_governed_package(out.path(), &out.path().join("d"), &options())?;
    let details = outcome.manifest.artifact_details.expect("details");
    assert_eq!(details.len(), 2);
    assert_eq!(details[0].format, "webp");
    assert_eq!(details[1].size, "content of b.webp".len() as u64);
    Ok(())
}

#[test]
fn test_serialize_failure_keeps_staging() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let staging_root = tempfile::tempdir()?;
    write_files(out.path(), &["a.png", "b.png"])?;
    let target = out.path().join("no-such-dir").join("job.cxpkg");

    let packager = Packager::new(PackagingConfig {
        staging_root: Some(staging_root.path().to_path_buf()),
        remove_staging: true,
        ..Default::default()
    });
    let err = packager
        .create_governed_package(out.path(), &target, &options())
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Serialize);
    assert!(!target.exists());
    assert!(!out.path().join("no-such-dir").exists());

    // left in place for inspection even with remove_staging
    let staging = staging_root.path().join(".job.staging");
    assert!(staging.join("manifest.json").is_file());
    assert!(staging.join("artifacts").join("b.png").is_file());
    Ok(())
}

#[test]
fn test_materialize_failure_writes_no_package() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let scratch = tempfile::tempdir()?;
    write_files(out.path(), &["a.png", "b.png"])?;
    let not_a_dir = scratch.path().join("staging-root");
    std::fs::write(&not_a_dir, b"file")?;
    let target = out.path().join("job.cxpkg");

    let packager = Packager::new(PackagingConfig {
        staging_root: Some(not_a_dir.clone()),
        ..Default::default()
    });
    let err = packager
        .create_governed_package(out.path(), &target, &options())
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Materialize);
    assert!(!target.exists());
    assert!(not_a_dir.is_file());
    Ok(())
}

#[test]
fn test_missing_source_is_classify_error() {
    let err = Packager::default()
        .create_governed_package(
            Path::new("/nonexistent/convertx/job"),
            Path::new("/nonexistent/convertx/job.cxpkg"),
            &options(),
        )
        .unwrap_err();
    assert!(matches!(err, PackagingError::Io { .. }));
    assert_eq!(err.stage(), Stage::Classify);
}

#[cfg(unix)]
#[test]
fn test_plain_archive_skips_symlinks() -> anyhow::Result<()> {
    let src = tempfile::tempdir()?;
    let elsewhere = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    write_files(src.path(), &["a.txt"])?;
    write_files(elsewhere.path(), &["old.tar"])?;
    std::os::unix::fs::symlink(elsewhere.path().join("old.tar"), src.path().join("linked.tar"))?;
    std::os::unix::fs::symlink(src.path().join("gone.txt"), src.path().join("dangling.txt"))?;

    let out = Packager::default().create_plain_archive(src.path(), &dst.path().join("b"), None)?;
    assert_eq!(file_entries(&out)?, vec!["a.txt"]);
    Ok(())
}

// ============================================================================
// auto_package
// ============================================================================

#[test]
fn test_auto_package_single_is_none() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    write_files(out.path(), &["only.pdf"])?;
    assert!(Packager::default().auto_package(out.path(), &options())?.is_none());

    let empty = tempfile::tempdir()?;
    assert!(Packager::default().auto_package(empty.path(), &options())?.is_none());
    Ok(())
}

#[test]
fn test_auto_package_is_repeatable() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    write_files(out.path(), &["frame_0001.png", "frame_0002.png"])?;
    let packager = Packager::default();
    let opts = options().with_task_type(TaskType::Sequence);

    let first = packager.auto_package(out.path(), &opts)?.expect("package");
    assert_eq!(first.package_path, out.path().join("job-42.cxpkg"));
    assert_eq!(first.manifest.task_type, TaskType::Sequence);

    // the package and the hidden staging dir must not count as outputs
    let second = packager.auto_package(out.path(), &opts)?.expect("package");
    assert_eq!(second.manifest.artifact_count, 2);
    assert_eq!(second.manifest.artifacts, first.manifest.artifacts);
    Ok(())
}

#[test]
fn test_auto_package_sanitizes_job_id() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    write_files(out.path(), &["a.txt", "b.txt"])?;
    let opts = PackageOptions::new("../evil/id", "pandoc", "md", "txt");

    let outcome = Packager::default()
        .auto_package(out.path(), &opts)?
        .expect("package");
    assert_eq!(outcome.package_path.parent(), Some(out.path()));
    assert_eq!(
        outcome.package_path.file_name().map(|n| n.to_string_lossy().into_owned()),
        Some("_evil_id.cxpkg".to_string())
    );
    Ok(())
}
