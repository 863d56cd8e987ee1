use std::path::{Path, PathBuf};

use anyhow::Context;
use output_gov::{
    ArgGovernor, JobFailure, Manifest, ManifestMetadata, PackageOptions, Packager, TaskType,
    archive_filename, classify_output, package_filename,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::cli::Command;
use crate::config::config;

const EXIT_INTERRUPTED: i32 = 130;

struct JobRequest {
    output_dir: PathBuf,
    options: PackageOptions,
    conversion_error: Option<String>,
}

/// Runs one command and returns the process exit code.
pub async fn run(command: Command, cancel: CancellationToken) -> anyhow::Result<i32> {
    match command {
        Command::Classify { output_dir } => classify(&output_dir),
        Command::Package {
            output_dir,
            job_id,
            engine,
            source_format,
            output_format,
            task_type,
            metadata,
            conversion_error,
        } => {
            let job_id = job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let mut options = PackageOptions::new(job_id, engine, source_format, output_format);
            if let Some(task_type) = task_type {
                let task_type: TaskType = task_type.parse()?;
                options = options.with_task_type(task_type);
            }
            if let Some(raw) = metadata {
                let metadata: ManifestMetadata =
                    serde_json::from_str(&raw).context("--metadata must be a JSON object")?;
                options = options.with_metadata(metadata);
            }
            let request = JobRequest {
                output_dir,
                options,
                conversion_error,
            };
            let packager = Packager::new(config().packaging.clone());
            let (code, report) = complete_job(request, packager, cancel).await?;
            print_json(&report)?;
            Ok(code)
        }
        Command::Plain { source_dir, output } => {
            if cancel.is_cancelled() {
                return Ok(EXIT_INTERRUPTED);
            }
            let packager = Packager::new(config().packaging.clone());
            let path = tokio::task::spawn_blocking(move || {
                packager.create_plain_archive(&source_dir, &output, None)
            })
            .await??;
            print_json(&json!({ "archive": path }))?;
            Ok(0)
        }
        Command::ArchiveName { base_name } => {
            print_json(&json!({
                "archive": archive_filename(&base_name),
                "package": package_filename(&base_name),
            }))?;
            Ok(0)
        }
        Command::Govern {
            output_path,
            output_format,
            args,
        } => govern(&output_path, output_format.as_deref(), &args),
        Command::Manifest { package } => {
            let manifest = Manifest::read_from_package(&package)?;
            println!("{}", manifest.to_json()?);
            Ok(0)
        }
    }
}

fn classify(output_dir: &Path) -> anyhow::Result<i32> {
    let classification = classify_output(output_dir);
    print_json(&json!({
        "is_multi": classification.is_multi,
        "file_count": classification.file_count,
        "code": classification.code.to_string(),
        "reason": classification.reason,
        "files": classification.files,
    }))?;
    Ok(0)
}

/// Delivers a finished job: exactly one file, or a failure with its kind.
/// Returns the exit code and the report to print.
///
/// Cancellation is honored only before packaging starts. Once started,
/// packaging runs to completion and its real result is reported.
async fn complete_job(
    request: JobRequest,
    packager: Packager,
    cancel: CancellationToken,
) -> anyhow::Result<(i32, Value)> {
    let job_id = request.options.job_id.clone();
    if let Some(message) = request.conversion_error {
        return Ok(failure_report(&job_id, &JobFailure::Conversion(message)));
    }
    if cancel.is_cancelled() {
        log::warn!("Delivery: job {} interrupted before packaging started", job_id);
        return Ok((
            EXIT_INTERRUPTED,
            json!({ "status": "interrupted", "job_id": job_id }),
        ));
    }

    let output_dir = request.output_dir.clone();
    let options = request.options;
    let result =
        tokio::task::spawn_blocking(move || packager.auto_package(&output_dir, &options)).await?;
    if cancel.is_cancelled() {
        log::info!("Delivery: job {} finished packaging after interrupt", job_id);
    }

    match result {
        Ok(Some(outcome)) => Ok((
            0,
            json!({
                "status": "delivered",
                "job_id": job_id,
                "delivery": "package",
                "package": outcome.package_path,
                "staging_dir": outcome.staging_dir,
                "manifest": outcome.manifest,
            }),
        )),
        Ok(None) => {
            let classification = classify_output(&request.output_dir);
            match classification.files.first() {
                Some(output) => Ok((
                    0,
                    json!({
                        "status": "delivered",
                        "job_id": job_id,
                        "delivery": "single",
                        "output": output,
                    }),
                )),
                None => {
                    let failure = JobFailure::Conversion(format!(
                        "no output produced: {}",
                        classification.reason
                    ));
                    Ok(failure_report(&job_id, &failure))
                }
            }
        }
        Err(e) => Ok(failure_report(&job_id, &JobFailure::from(e))),
    }
}

fn failure_report(job_id: &str, failure: &JobFailure) -> (i32, Value) {
    log::error!("Delivery: job {} failed: {}", job_id, failure);
    let stage = match failure {
        JobFailure::Packaging(e) => Some(e.stage().as_str()),
        JobFailure::Conversion(_) => None,
    };
    (
        1,
        json!({
            "status": "failed",
            "job_id": job_id,
            "kind": failure.kind(),
            "stage": stage,
            "error": failure.to_string(),
        }),
    )
}

fn govern(output_path: &str, output_format: Option<&str>, args: &[String]) -> anyhow::Result<i32> {
    let format = match output_format {
        Some(f) => f.to_string(),
        None => Path::new(output_path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default(),
    };
    let governor = ArgGovernor::new(config().governance.clone());
    let fixed = governor.validate_and_fix_args(output_path, &format, args);
    for note in &fixed.applied {
        log::info!("Governance: {}", note);
    }
    print_json(&fixed)?;
    Ok(if fixed.report.valid { 0 } else { 1 })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(output_dir: &Path) -> JobRequest {
        JobRequest {
            output_dir: output_dir.to_path_buf(),
            options: PackageOptions::new("job-1", "ffmpeg", "mp4", "png"),
            conversion_error: None,
        }
    }

    #[tokio::test]
    async fn test_missing_output_is_a_conversion_failure() -> anyhow::Result<()> {
        let (code, report) = complete_job(
            request(Path::new("/nonexistent/convertx/job-1")),
            Packager::default(),
            CancellationToken::new(),
        )
        .await?;
        assert_eq!(code, 1);
        assert_eq!(report["status"], "failed");
        assert_eq!(report["kind"], "conversion_failed");
        assert!(report["stage"].is_null());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_output_is_a_conversion_failure() -> anyhow::Result<()> {
        let out = tempfile::tempdir()?;
        std::fs::write(out.path().join(".partial"), b"x")?;
        let (code, report) =
            complete_job(request(out.path()), Packager::default(), CancellationToken::new())
                .await?;
        assert_eq!(code, 1);
        assert_eq!(report["kind"], "conversion_failed");
        Ok(())
    }

    #[tokio::test]
    async fn test_single_and_multi_delivery() -> anyhow::Result<()> {
        let out = tempfile::tempdir()?;
        std::fs::write(out.path().join("only.pdf"), b"pdf")?;
        let (code, report) =
            complete_job(request(out.path()), Packager::default(), CancellationToken::new())
                .await?;
        assert_eq!(code, 0);
        assert_eq!(report["delivery"], "single");
        assert!(report["output"].as_str().is_some_and(|p| p.ends_with("only.pdf")));

        std::fs::write(out.path().join("second.pdf"), b"pdf")?;
        let (code, report) =
            complete_job(request(out.path()), Packager::default(), CancellationToken::new())
                .await?;
        assert_eq!(code, 0);
        assert_eq!(report["delivery"], "package");
        assert_eq!(report["manifest"]["artifact_count"], 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_conversion_error_skips_packaging() -> anyhow::Result<()> {
        let out = tempfile::tempdir()?;
        std::fs::write(out.path().join("a.png"), b"a")?;
        std::fs::write(out.path().join("b.png"), b"b")?;
        let mut req = request(out.path());
        req.conversion_error = Some("exit status 1".to_string());

        let (code, report) =
            complete_job(req, Packager::default(), CancellationToken::new()).await?;
        assert_eq!(code, 1);
        assert_eq!(report["kind"], "conversion_failed");
        assert!(!out.path().join("job-1.cxpkg").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_interrupt_before_start_writes_nothing() -> anyhow::Result<()> {
        let out = tempfile::tempdir()?;
        std::fs::write(out.path().join("a.png"), b"a")?;
        std::fs::write(out.path().join("b.png"), b"b")?;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (code, report) = complete_job(request(out.path()), Packager::default(), cancel).await?;
        assert_eq!(code, EXIT_INTERRUPTED);
        assert_eq!(report["status"], "interrupted");
        assert!(!out.path().join("job-1.cxpkg").exists());
        Ok(())
    }
}
