//! End-to-end tests for the workflow stages.

#[cfg(test)]
mod tests {
    use crate::config::PipelineConfig;
    use crate::core::{SampleKey, StageArtifact, StageKind};
    use crate::errors::{ComputationError, SamflowError};
    use crate::logging::{CollectingLogSink, LogLevel, Logger};
    use crate::pipeline::{
        BuildRequest, FailurePolicy, ReportRequest, Workflow, DEFAULT_RUN_NAME,
    };
    use crate::sheet::{SampleSheet, SheetColumns};
    use crate::stages::{ComputationRequest, FnComputation};
    use crate::store::ArtifactName;
    use crate::testing::{
        mapping_scores_payload, read_csv_rows, FailingComputation, ProjectFixture, RecordingComputation,
        StaticComputation,
    };
    use crate::utils::RunId;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    fn workflow(config: &PipelineConfig) -> (Workflow, Arc<CollectingLogSink>) {
        let sink = Arc::new(CollectingLogSink::new());
        let logger = Logger::new(LogLevel::Debug, sink.clone());
        (Workflow::from_config(config, logger, RunId::new()), sink)
    }

    fn keys(names: &[&str]) -> Vec<SampleKey> {
        names.iter().map(|n| SampleKey::new(n).unwrap()).collect()
    }

    fn sample_loader() -> FnComputation<impl Fn(&ComputationRequest, &crate::logging::Console) -> Result<serde_json::Value, ComputationError> + Send + Sync> {
        FnComputation::new("load", |request, console| {
            let key = request.param_str("key").unwrap_or_default().to_string();
            console.line(&format!("read 100 cells for {key}"));
            Ok(json!({"key": key, "cells": 100}))
        })
    }

    fn write_loaded(dir: &Path, key: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let artifact = StageArtifact::new(StageKind::Load, format!("{key}_sam.json"), "earlier-run", json!({"key": key}))
            .with_sample(SampleKey::new(key).unwrap());
        std::fs::write(dir.join(format!("{key}_sam.json")), serde_json::to_vec(&artifact).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_build_run_report_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let layout = ProjectFixture::new(root.path())
            .with_sample("pl", Some("cluster"))
            .with_sample("sc", Some("cell_type"))
            .with_map("pl", "sc")
            .write()
            .unwrap();
        let sheet = SampleSheet::from_path(&layout.sheet, &SheetColumns::default()).unwrap();
        let (workflow, sink) = workflow(&PipelineConfig::default());
        let sams = layout.dir("sams");

        let loaded = workflow
            .load_samples(&sheet, &sample_loader(), &sams, FailurePolicy::FailFast)
            .await
            .unwrap();
        assert_eq!(loaded.resolved.len(), 2);
        assert!(sams.join("pl_sam.json").is_file());
        assert!(sams.join("sc_sam.json").is_file());

        let assemble = RecordingComputation::new("assemble");
        assemble.set_output(json!({"samap": "object"}));
        let maps_arg = layout.root.join("maps");
        let built = workflow
            .build(
                BuildRequest::new(&sams, sheet.keys(), &maps_arg, layout.dir("out"), FailurePolicy::FailFast),
                &assemble,
            )
            .await
            .unwrap();
        assert_eq!(built.path, layout.dir("out").join("samap.json"));

        let params = assemble.last_request().unwrap().params;
        assert!(params["maps_dir"].as_str().unwrap().ends_with("maps/"));
        assert_eq!(params["samples"].as_object().unwrap().len(), 2);
        assert_eq!(assemble.last_request().unwrap().inputs.len(), 2);

        let aligned = workflow
            .run_alignment(
                &built.path,
                &layout.dir("out"),
                ArtifactName::fixed(DEFAULT_RUN_NAME),
                &StaticComputation::new("align", json!({"aligned": true})),
            )
            .await
            .unwrap();
        assert_eq!(aligned.path, layout.dir("out").join("samap_results.json"));

        let scorer = RecordingComputation::new("score");
        scorer.set_output(mapping_scores_payload(&["pl_muscle", "sc_muscle"]));
        let report_dir = layout.dir("report");
        let report = workflow
            .report(
                ReportRequest::new(&aligned.path, &report_dir, sheet.annotations(), FailurePolicy::WarnAndSkip),
                &scorer,
            )
            .await
            .unwrap();

        let hms = report_dir.join("hms.csv");
        let pms = report_dir.join("pms.csv");
        assert_eq!(report.manifest.output("hms"), Some(hms.as_path()));
        assert_eq!(report.manifest.output("pms"), Some(pms.as_path()));
        assert_eq!(report.manifest.input_artifact, aligned.path);
        assert!(report.skipped.is_empty());

        let rows = read_csv_rows(&hms).unwrap();
        assert_eq!(rows[0], vec!["".to_string(), "pl_muscle".to_string(), "sc_muscle".to_string()]);
        assert_eq!(rows.len(), 3);

        let manifest_name = report.run.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(manifest_name.starts_with("manifest_"));
        assert!(manifest_name.contains(&workflow.runner().store().run_id().short()));
        let stored: crate::core::OutputManifest = workflow.runner().store().load(&report.run.path).unwrap();
        assert_eq!(stored, report.manifest);

        let scoring = scorer.last_request().unwrap();
        assert_eq!(scoring.params["keys"], json!({"pl": "cluster", "sc": "cell_type"}));
        assert_eq!(scoring.params["n_top"], json!(0));

        assert!(sink.messages_at(LogLevel::Warning).is_empty());
        assert!(sink.messages_at(LogLevel::Error).is_empty());
        assert!(sink
            .messages_at(LogLevel::Info)
            .contains(&"[load] read 100 cells for pl".to_string()));
        assert!(sink
            .messages_at(LogLevel::Debug)
            .iter()
            .any(|m| m.contains("pl_to_sc.txt")));
    }

    #[tokio::test]
    async fn test_load_skips_missing_raw_data() {
        let root = tempfile::tempdir().unwrap();
        let layout = ProjectFixture::new(root.path())
            .with_sample("pl", None)
            .with_sample("sc", None)
            .write()
            .unwrap();
        std::fs::remove_file(layout.data_dir.join("sc.h5ad")).unwrap();
        let sheet = SampleSheet::from_path(&layout.sheet, &SheetColumns::default()).unwrap();
        let (workflow, sink) = workflow(&PipelineConfig::default());

        let outcome = workflow
            .load_samples(&sheet, &sample_loader(), &layout.dir("sams"), FailurePolicy::WarnAndSkip)
            .await
            .unwrap();

        assert_eq!(outcome.resolved.len(), 1);
        assert_eq!(outcome.skipped_keys(), vec![&SampleKey::new("sc").unwrap()]);
        let warnings = sink.messages_at(LogLevel::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'sc'"));
    }

    #[tokio::test]
    async fn test_load_fail_fast_rolls_back() {
        let root = tempfile::tempdir().unwrap();
        let layout = ProjectFixture::new(root.path())
            .with_sample("hs", None)
            .with_sample("pl", None)
            .with_sample("sc", None)
            .write()
            .unwrap();
        std::fs::remove_file(layout.data_dir.join("sc.h5ad")).unwrap();
        let sheet = SampleSheet::from_path(&layout.sheet, &SheetColumns::default()).unwrap();
        let (workflow, sink) = workflow(&PipelineConfig::default().with_workers(2));
        let sams = layout.dir("sams");

        let err = workflow
            .load_samples(&sheet, &sample_loader(), &sams, FailurePolicy::FailFast)
            .await
            .unwrap_err();

        assert!(matches!(err, SamflowError::CorruptOrMissingArtifact(ref e) if e.path.ends_with("sc.h5ad")));
        assert!(!sams.join("hs_sam.json").exists());
        assert!(!sams.join("pl_sam.json").exists());
        assert_eq!(std::fs::read_dir(&sams).map_or(0, Iterator::count), 0);
        assert!(sink.messages_at(LogLevel::Warning).is_empty());
    }

    #[tokio::test]
    async fn test_load_fail_fast_stops_at_first_sample_and_keeps_earlier_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let layout = ProjectFixture::new(root.path())
            .with_sample("aa", None)
            .with_sample("pl", None)
            .with_sample("sc", None)
            .write()
            .unwrap();
        std::fs::remove_file(layout.data_dir.join("aa.h5ad")).unwrap();
        let sheet = SampleSheet::from_path(&layout.sheet, &SheetColumns::default()).unwrap();
        let (workflow, _) = workflow(&PipelineConfig::default());
        let sams = layout.dir("sams");
        write_loaded(&sams, "pl");
        let earlier = std::fs::read(sams.join("pl_sam.json")).unwrap();
        let loader = RecordingComputation::new("load");

        let err = workflow
            .load_samples(&sheet, &loader, &sams, FailurePolicy::FailFast)
            .await
            .unwrap_err();

        assert!(matches!(err, SamflowError::CorruptOrMissingArtifact(ref e) if e.path.ends_with("aa.h5ad")));
        assert_eq!(loader.call_count(), 0);
        assert_eq!(std::fs::read(sams.join("pl_sam.json")).unwrap(), earlier);
        assert!(!sams.join("sc_sam.json").exists());
    }

    #[tokio::test]
    async fn test_load_replaces_earlier_artifacts_on_success() {
        let root = tempfile::tempdir().unwrap();
        let layout = ProjectFixture::new(root.path())
            .with_sample("pl", None)
            .write()
            .unwrap();
        let sheet = SampleSheet::from_path(&layout.sheet, &SheetColumns::default()).unwrap();
        let (workflow, _) = workflow(&PipelineConfig::default());
        let sams = layout.dir("sams");
        write_loaded(&sams, "pl");

        let outcome = workflow
            .load_samples(&sheet, &sample_loader(), &sams, FailurePolicy::FailFast)
            .await
            .unwrap();

        let path = sams.join("pl_sam.json");
        assert_eq!(outcome.resolved.get("pl"), Some(&path));
        let artifact: StageArtifact = workflow.runner().store().load(&path).unwrap();
        assert_eq!(artifact.data["cells"], json!(100));
        assert_eq!(std::fs::read_dir(&sams).map_or(0, Iterator::count), 1);
    }

    #[tokio::test]
    async fn test_load_computation_failure_is_never_skipped() {
        let root = tempfile::tempdir().unwrap();
        let layout = ProjectFixture::new(root.path())
            .with_sample("pl", None)
            .with_sample("sc", None)
            .write()
            .unwrap();
        let sheet = SampleSheet::from_path(&layout.sheet, &SheetColumns::default()).unwrap();
        let (workflow, _) = workflow(&PipelineConfig::default());

        let err = workflow
            .load_samples(
                &sheet,
                &FailingComputation::new("load", "unreadable h5ad").for_samples(["sc"]),
                &layout.dir("sams"),
                FailurePolicy::WarnAndSkip,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SamflowError::ExternalComputationFailure(_)));
        assert!(!layout.dir("sams").join("pl_sam.json").exists());
    }

    #[tokio::test]
    async fn test_build_validates_maps_before_anything_else() {
        let root = tempfile::tempdir().unwrap();
        let sams = root.path().join("sams");
        write_loaded(&sams, "pl");
        write_loaded(&sams, "sc");
        let (workflow, _) = workflow(&PipelineConfig::default());
        let assemble = RecordingComputation::new("assemble");

        let err = workflow
            .build(
                BuildRequest::new(&sams, keys(&["pl", "sc"]), root.path().join("maps"), root.path(), FailurePolicy::FailFast),
                &assemble,
            )
            .await
            .unwrap_err();

        match err {
            SamflowError::DirectoryNotFound(e) => {
                assert!(e.path.ends_with("maps/"));
                assert_eq!(e.operation, "build");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(assemble.call_count(), 0);
    }

    #[tokio::test]
    async fn test_build_skips_missing_sample_and_requires_two() {
        let root = tempfile::tempdir().unwrap();
        let sams = root.path().join("sams");
        let maps = root.path().join("maps");
        std::fs::create_dir_all(&maps).unwrap();
        write_loaded(&sams, "pl");
        write_loaded(&sams, "sc");
        let (workflow, sink) = workflow(&PipelineConfig::default());
        let assemble = RecordingComputation::new("assemble");

        workflow
            .build(
                BuildRequest::new(&sams, keys(&["pl", "sc", "hs"]), &maps, root.path(), FailurePolicy::WarnAndSkip),
                &assemble,
            )
            .await
            .unwrap();
        let samples = assemble.last_request().unwrap().params["samples"].clone();
        assert_eq!(samples.as_object().unwrap().len(), 2);
        assert!(sink.messages_at(LogLevel::Warning).iter().any(|w| w.contains("'hs'")));

        let err = workflow
            .build(
                BuildRequest::new(&sams, keys(&["pl", "hs"]), &maps, root.path(), FailurePolicy::WarnAndSkip),
                &assemble,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SamflowError::InsufficientSamples { found: 1, required: 2, .. }));

        let err = workflow
            .build(
                BuildRequest::new(&sams, keys(&["pl", "hs"]), &maps, root.path(), FailurePolicy::FailFast),
                &assemble,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SamflowError::NotFound(ref e) if e.key == "hs"));
    }

    #[tokio::test]
    async fn test_run_from_missing_artifact() {
        let root = tempfile::tempdir().unwrap();
        let (workflow, _) = workflow(&PipelineConfig::default());

        let err = workflow
            .run_alignment(
                &root.path().join("samap.json"),
                root.path(),
                ArtifactName::fixed(DEFAULT_RUN_NAME),
                &RecordingComputation::new("align"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SamflowError::CorruptOrMissingArtifact(_)));
    }

    #[tokio::test]
    async fn test_report_rejects_malformed_scores() {
        let root = tempfile::tempdir().unwrap();
        write_loaded(root.path(), "pl");
        let (workflow, _) = workflow(&PipelineConfig::default());
        let report_dir = root.path().join("report");

        let err = workflow
            .report(
                ReportRequest::new(root.path().join("pl_sam.json"), &report_dir, Default::default(), FailurePolicy::WarnAndSkip),
                &StaticComputation::new("score", json!({"hms": []})),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SamflowError::ExternalComputationFailure(ComputationError::MalformedOutput { .. })
        ));
        assert!(!report_dir.join("hms.csv").exists());
    }

    #[tokio::test]
    async fn test_report_skips_unwritable_table() {
        let root = tempfile::tempdir().unwrap();
        write_loaded(root.path(), "pl");
        let report_dir = root.path().join("report");
        std::fs::create_dir_all(report_dir.join("pms.csv")).unwrap();
        let (workflow, sink) = workflow(&PipelineConfig::default());
        let input = root.path().join("pl_sam.json");
        let scorer = StaticComputation::new("score", mapping_scores_payload(&["a"]));

        let outcome = workflow
            .report(
                ReportRequest::new(&input, &report_dir, Default::default(), FailurePolicy::WarnAndSkip),
                &scorer,
            )
            .await
            .unwrap();
        assert_eq!(outcome.skipped, vec!["pms".to_string()]);
        assert_eq!(outcome.manifest.len(), 1);
        assert_eq!(sink.messages_at(LogLevel::Warning).len(), 1);

        let err = workflow
            .report(
                ReportRequest::new(&input, &report_dir, Default::default(), FailurePolicy::FailFast),
                &scorer,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SamflowError::Io { .. }));
    }

    #[tokio::test]
    async fn test_report_manifests_never_overwrite() {
        let root = tempfile::tempdir().unwrap();
        write_loaded(root.path(), "pl");
        let report_dir = root.path().join("report");
        let input = root.path().join("pl_sam.json");
        let scorer = StaticComputation::new("score", mapping_scores_payload(&["a", "b"]));
        let (workflow, _) = workflow(&PipelineConfig::default());

        let first = workflow
            .report(ReportRequest::new(&input, &report_dir, Default::default(), FailurePolicy::FailFast), &scorer)
            .await
            .unwrap();
        let second = workflow
            .report(ReportRequest::new(&input, &report_dir, Default::default(), FailurePolicy::FailFast), &scorer)
            .await
            .unwrap();

        assert_ne!(first.run.path, second.run.path);
        assert!(first.run.path.exists());
        assert!(second.run.path.exists());
    }

    #[tokio::test]
    async fn test_report_same_table_names_conflict() {
        let root = tempfile::tempdir().unwrap();
        write_loaded(root.path(), "pl");
        let (workflow, _) = workflow(&PipelineConfig::default());

        let err = workflow
            .report(
                ReportRequest::new(root.path().join("pl_sam.json"), root.path().join("report"), Default::default(), FailurePolicy::WarnAndSkip)
                    .with_table_names("scores", "scores"),
                &StaticComputation::new("score", mapping_scores_payload(&["a"])),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SamflowError::ManifestConflict(ref e) if e.name == "scores"));
    }
}
