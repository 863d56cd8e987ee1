use super::*;
use crate::manifest::TaskType;

fn source() -> ManifestSource<'static> {
    ManifestSource {
        job_id: "job-abc",
        engine: "ghostscript",
        source_format: "pdf",
        output_format: "png",
        task_type: None,
        metadata: None,
    }
}

fn write_files(dir: &Path, names: &[&str]) -> anyhow::Result<()> {
    for name in names {
        std::fs::write(dir.join(name), format!("content of {}", name))?;
    }
    Ok(())
}

#[test]
fn test_three_pngs() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    write_files(out.path(), &["c.png", "a.png", "b.png"])?;
    let root = staging.path().join("job-abc");

    let structure = build_canonical_structure(out.path(), &root, &source(), None, false)?;

    assert_eq!(structure.preview_path, root.join("preview.png"));
    assert_eq!(
        std::fs::read_to_string(&structure.preview_path)?,
        "content of a.png"
    );
    for name in ["a.png", "b.png", "c.png"] {
        assert!(root.join("artifacts").join(name).is_file());
    }
    assert!(root.join("manifest.json").is_file());
    assert_eq!(structure.manifest.artifact_count, 3);
    assert_eq!(structure.manifest.preview, "preview.png");
    assert_eq!(structure.manifest.task_type, TaskType::MultiOutput);

    // source untouched
    let mut left: Vec<_> = std::fs::read_dir(out.path())?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    left.sort();
    assert_eq!(left, vec!["a.png", "b.png", "c.png"]);
    Ok(())
}

#[test]
fn test_numeric_order_decides_preview() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    write_files(out.path(), &["page_10.jpg", "page_2.jpg", "page_1.JPG"])?;
    let root = staging.path().join("s");

    let structure = build_canonical_structure(out.path(), &root, &source(), None, false)?;
    assert_eq!(
        structure.manifest.artifacts,
        vec!["page_1.JPG", "page_2.jpg", "page_10.jpg"]
    );
    // original extension is kept as is
    assert_eq!(structure.manifest.preview, "preview.JPG");
    Ok(())
}

#[test]
fn test_selector_and_fallback() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    write_files(out.path(), &["shot_1.png", "shot_2.png", "contact.jpg"])?;

    let pick_jpg = preview_selector(|artifacts| artifacts.iter().find(|a| a.format == "jpg"));
    let structure = build_canonical_structure(
        out.path(),
        &staging.path().join("a"),
        &source(),
        Some(&pick_jpg),
        false,
    )?;
    assert_eq!(structure.manifest.preview, "preview.jpg");
    assert_eq!(
        std::fs::read_to_string(&structure.preview_path)?,
        "content of contact.jpg"
    );

    let pick_none = preview_selector(|_| None);
    let structure = build_canonical_structure(
        out.path(),
        &staging.path().join("b"),
        &source(),
        Some(&pick_none),
        false,
    )?;
    assert_eq!(
        std::fs::read_to_string(&structure.preview_path)?,
        "content of contact.jpg"
    );
    assert_eq!(structure.manifest.artifacts[0], "contact.jpg");
    Ok(())
}

#[test]
fn test_no_artifacts_is_an_error() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    write_files(out.path(), &[".hidden", "manifest.json"])?;
    let root = staging.path().join("empty");

    let err = build_canonical_structure(out.path(), &root, &source(), None, false).unwrap_err();
    assert!(matches!(err, PackagingError::NoArtifacts { .. }));
    assert_eq!(err.stage(), Stage::SelectPreview);
    assert!(!root.exists());
    Ok(())
}

#[test]
fn test_stale_staging_is_replaced() -> anyhow::Result<()> {
    let out = tempfile::tempdir()?;
    let staging = tempfile::tempdir()?;
    write_files(out.path(), &["x_1.webp", "x_2.webp"])?;
    let root = staging.path().join("job");
    std::fs::create_dir_all(root.join("artifacts"))?;
    std::fs::write(root.join("artifacts").join("stale.webp"), b"old")?;

    let structure = build_canonical_structure(out.path(), &root, &source(), None, false)?;
    assert_eq!(structure.manifest.artifact_count, 2);
    assert!(!root.join("artifacts").join("stale.webp").exists());
    Ok(())
}
