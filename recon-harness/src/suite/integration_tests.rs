//! End-to-end suite flows against a recording runner and in-memory arrays.

#[cfg(test)]
mod tests {
    use crate::array::{AttrValue, LabeledArray, MemoryArrayReader, MockArrayReader, ReadMode};
    use crate::config::HarnessConfig;
    use crate::errors::{HarnessError, RenderError};
    use crate::events::{CollectingEventSink, HarnessEvent};
    use crate::report::StageStatus;
    use crate::runner::CommandSpec;
    use crate::suite::{Suite, SuiteRunner};
    use crate::testing::RecordingRunner;
    use crate::visualize::{Image2D, Renderer, VisualizationHook};
    use ndarray::{ArrayD, IxDyn};
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn output_name(subcommand: &str) -> &'static str {
        match subcommand {
            "phantom" => "unittest.h5",
            "sense-sim" => "unittest-sim-sense.h5",
            "recon" => "unittest-recon.h5",
            "rss" => "unittest-recon-rss.h5",
            "nufft" => "unittest-recon-nufft.h5",
            other => panic!("unexpected subcommand {other}"),
        }
    }

    /// A runner that writes the file each subcommand would produce.
    fn producing_runner(workdir: &Path) -> RecordingRunner {
        let workdir = workdir.to_path_buf();
        RecordingRunner::new().with_effect(move |command: &CommandSpec| {
            std::fs::write(workdir.join(output_name(&command.subcommand)), b"h5")
        })
    }

    fn image_array() -> LabeledArray {
        LabeledArray::new(vec![1, 64, 64, 64, 1], ["volume", "z", "y", "x", "image"]).unwrap()
    }

    fn recon_array() -> LabeledArray {
        let trajectory =
            LabeledArray::new(vec![2048, 64, 3], ["trace", "sample", "coord"]).unwrap();
        LabeledArray::new(
            vec![1, 1, 2048, 64, 4],
            ["volume", "slab", "trace", "sample", "channel"],
        )
        .unwrap()
        .with_attr("trajectory", AttrValue::Array(trajectory))
    }

    /// Arrays with the reference contracts, keyed by output path.
    fn reference_reader(config: &HarnessConfig) -> MemoryArrayReader {
        let reader = MemoryArrayReader::new();
        reader.insert(config.output_path(""), image_array());
        reader.insert(
            config.output_path("-sim-sense"),
            LabeledArray::new(vec![64, 64, 64, 4], ["z", "y", "x", "channel"]).unwrap(),
        );
        reader.insert(config.output_path("-recon"), recon_array());
        reader.insert(config.output_path("-recon-rss"), image_array());
        reader.insert(
            config.output_path("-recon-nufft"),
            LabeledArray::new(
                vec![1, 64, 64, 64, 1, 4],
                ["volume", "z", "y", "x", "image", "channel"],
            )
            .unwrap(),
        );
        reader
    }

    struct Fixture {
        dir: TempDir,
        config: HarnessConfig,
        suite: Suite,
        events: Arc<CollectingEventSink>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::default().with_workdir(dir.path());
        let suite = Suite::riesling(&config).unwrap();
        Fixture {
            dir,
            config,
            suite,
            events: Arc::new(CollectingEventSink::new()),
        }
    }

    fn h5_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "h5"))
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_full_suite_passes_and_tears_down() {
        let fx = fixture();
        let runner = Arc::new(producing_runner(fx.dir.path()));
        let harness = SuiteRunner::new(
            fx.config.clone(),
            runner.clone(),
            Arc::new(reference_reader(&fx.config)),
        )
        .with_event_sink(fx.events.clone());

        let report = harness.run(&fx.suite).await.unwrap();

        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            runner.subcommands(),
            vec!["phantom", "sense-sim", "recon", "rss", "nufft"]
        );
        assert!(report.stages.iter().all(|s| s.output_sha256.is_some()));
        assert_eq!(report.stages[0].exit_code, Some(0));
        assert!(h5_files(fx.dir.path()).is_empty());
        assert!(report.teardown_failures.is_empty());

        let types = fx.events.event_types();
        assert_eq!(types.first(), Some(&"suite.started"));
        assert_eq!(types.last(), Some(&"teardown.completed"));
        assert_eq!(fx.events.events_of_type("stage.completed").len(), 5);
    }

    #[tokio::test]
    async fn test_silent_process_failure_cascades_downstream() {
        let fx = fixture();
        let runner = Arc::new(producing_runner(fx.dir.path()).failing("recon"));
        let harness = SuiteRunner::new(
            fx.config.clone(),
            runner.clone(),
            Arc::new(reference_reader(&fx.config)),
        )
        .with_event_sink(fx.events.clone());

        let report = harness.run(&fx.suite).await.unwrap();

        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failed_stages(), vec!["kspace", "rss", "nufft"]);

        let kspace = report.stage("kspace").unwrap();
        assert_eq!(kspace.exit_code, Some(1));
        assert_eq!(kspace.error_code.as_deref(), Some("HARNESS-MISSING-FILE"));

        // Downstream stages fail on their missing input without running.
        let rss = report.stage("rss").unwrap();
        assert_eq!(rss.error_code.as_deref(), Some("HARNESS-MISSING-FILE"));
        assert!(rss.error_message.as_deref().unwrap().contains("unittest-recon.h5"));
        assert_eq!(runner.subcommands(), vec!["phantom", "sense-sim", "recon"]);

        assert_eq!(fx.events.events_of_type("stage.failed").len(), 3);
        assert_eq!(report.stage("image").unwrap().status, StageStatus::Passed);
    }

    #[tokio::test]
    async fn test_contract_violation_reports_actual_and_expected() {
        let fx = fixture();
        let reader = reference_reader(&fx.config);
        // Same element count, axes permuted.
        reader.insert(
            fx.config.output_path("-sim-sense"),
            LabeledArray::new(vec![4, 64, 64, 64], ["channel", "z", "y", "x"]).unwrap(),
        );
        let harness = SuiteRunner::new(
            fx.config.clone(),
            Arc::new(producing_runner(fx.dir.path())),
            Arc::new(reader),
        );

        let report = harness.run(&fx.suite).await.unwrap();

        assert_eq!(report.failed_stages(), vec!["sense"]);
        let sense = report.stage("sense").unwrap();
        assert_eq!(sense.error_code.as_deref(), Some("HARNESS-CONTRACT"));
        let message = sense.error_message.as_deref().unwrap();
        assert!(message.contains("expected (64, 64, 64, 4), got (4, 64, 64, 64)"));
        assert!(sense.output_sha256.is_some());
        let mismatches = sense.error_details.as_ref().unwrap()["mismatches"]
            .as_array()
            .unwrap();
        assert!(mismatches
            .iter()
            .any(|m| m["field"] == "shape" && m["actual"] == "(4, 64, 64, 64)"));
    }

    #[tokio::test]
    async fn test_keep_outputs_skips_teardown() {
        let mut fx = fixture();
        fx.config.keep_outputs = true;
        let harness = SuiteRunner::new(
            fx.config.clone(),
            Arc::new(producing_runner(fx.dir.path())),
            Arc::new(reference_reader(&fx.config)),
        )
        .with_event_sink(fx.events.clone());

        let report = harness.run(&fx.suite).await.unwrap();

        assert_eq!(report.exit_code(), 0);
        assert_eq!(h5_files(fx.dir.path()).len(), 5);
        assert!(fx.events.events_of_type("teardown.").is_empty());
    }

    #[tokio::test]
    async fn test_selected_stage_needs_existing_inputs() {
        let fx = fixture();
        let runner = Arc::new(producing_runner(fx.dir.path()));
        let harness = SuiteRunner::new(
            fx.config.clone(),
            runner.clone(),
            Arc::new(reference_reader(&fx.config)),
        );

        let report = harness.run_selected(&fx.suite, &["rss"]).await.unwrap();
        assert_eq!(report.failed_stages(), vec!["rss"]);
        assert_eq!(runner.call_count(), 0);

        std::fs::write(fx.config.output_path("-recon"), b"h5").unwrap();
        let report = harness.run_selected(&fx.suite, &["rss"]).await.unwrap();
        assert_eq!(report.exit_code(), 0);
        assert_eq!(runner.subcommands(), vec!["rss"]);
    }

    #[tokio::test]
    async fn test_unknown_selection_is_fatal() {
        let fx = fixture();
        let runner = Arc::new(RecordingRunner::new());
        let harness = SuiteRunner::new(
            fx.config.clone(),
            runner.clone(),
            Arc::new(MemoryArrayReader::new()),
        );

        let err = harness
            .run_selected(&fx.suite, &["test_bogus"])
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code(), "HARNESS-CONFIG-UNKNOWN-STAGE");
        assert_eq!(runner.call_count(), 0);
    }

    struct CountingRenderer(Arc<AtomicUsize>);

    impl Renderer for CountingRenderer {
        fn render(&self, _image: &Image2D) -> Result<Option<PathBuf>, RenderError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RenderError::Backend("no display".to_string()))
        }
    }

    #[tokio::test]
    async fn test_visualization_reads_values_and_never_fails_stage() {
        let fx = fixture();
        let values = ArrayD::from_elem(IxDyn(&[1, 64, 64, 64, 1]), 1.0_f32);
        let with_values = image_array().with_values(values).unwrap();

        let header = image_array();
        let mut reader = MockArrayReader::new();
        reader
            .expect_read()
            .withf(|path, mode| path.ends_with("unittest.h5") && *mode == ReadMode::Header)
            .times(1)
            .returning(move |_, _| Ok(header.clone()));
        reader
            .expect_read()
            .withf(|path, mode| path.ends_with("unittest.h5") && *mode == ReadMode::WithValues)
            .times(1)
            .returning(move |_, _| Ok(with_values.clone()));

        let rendered = Arc::new(AtomicUsize::new(0));
        let harness = SuiteRunner::new(
            fx.config.clone(),
            Arc::new(producing_runner(fx.dir.path())),
            Arc::new(reader),
        )
        .with_hook(VisualizationHook::with_renderer(Box::new(CountingRenderer(
            rendered.clone(),
        ))));

        let report = harness.run_selected(&fx.suite, &["image"]).await.unwrap();

        assert_eq!(report.exit_code(), 0);
        assert_eq!(rendered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreadable_values_skip_rendering_without_failing_stage() {
        let fx = fixture();
        let header = image_array();
        let mut reader = MockArrayReader::new();
        reader
            .expect_read()
            .withf(|_, mode| *mode == ReadMode::Header)
            .returning(move |_, _| Ok(header.clone()));
        reader
            .expect_read()
            .withf(|_, mode| *mode == ReadMode::WithValues)
            .returning(|path, _| Err(HarnessError::read(path, "values out of memory")));

        let rendered = Arc::new(AtomicUsize::new(0));
        let quiet = SuiteRunner::new(
            fx.config.clone(),
            Arc::new(producing_runner(fx.dir.path())),
            Arc::new(reference_reader(&fx.config)),
        );
        let loud = SuiteRunner::new(
            fx.config.clone(),
            Arc::new(producing_runner(fx.dir.path())),
            Arc::new(reader),
        )
        .with_hook(VisualizationHook::with_renderer(Box::new(CountingRenderer(
            rendered.clone(),
        ))));

        let quiet_report = quiet.run_selected(&fx.suite, &["image"]).await.unwrap();
        let loud_report = loud.run_selected(&fx.suite, &["image"]).await.unwrap();

        assert_eq!(quiet_report.exit_code(), 0);
        assert_eq!(loud_report.exit_code(), quiet_report.exit_code());
        assert_eq!(loud_report.stage("image").unwrap().status, StageStatus::Passed);
        assert_eq!(rendered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reader_failure_is_attributed_to_stage() {
        let fx = fixture();
        let mut reader = MockArrayReader::new();
        reader
            .expect_read()
            .returning(|path, _| Err(HarnessError::read(path, "truncated file")));

        let harness = SuiteRunner::new(
            fx.config.clone(),
            Arc::new(producing_runner(fx.dir.path())),
            Arc::new(reader),
        );
        let report = harness.run_selected(&fx.suite, &["image"]).await.unwrap();

        let image = report.stage("image").unwrap();
        assert_eq!(image.error_code.as_deref(), Some("HARNESS-READ"));
        assert!(image.error_message.as_deref().unwrap().contains("truncated file"));
    }

    #[test]
    fn test_teardown_removes_only_prefixed_h5_files() {
        let fx = fixture();
        for name in ["unittest.h5", "unittest-recon.h5", "other.h5", "unittest.txt"] {
            std::fs::write(fx.dir.path().join(name), b"x").unwrap();
        }
        let harness = SuiteRunner::new(
            fx.config.clone(),
            Arc::new(RecordingRunner::new()),
            Arc::new(MemoryArrayReader::new()),
        )
        .with_event_sink(fx.events.clone());

        let summary = harness.teardown();

        assert_eq!(summary.removed.len(), 2);
        assert!(summary.failures.is_empty());
        assert!(fx.dir.path().join("other.h5").exists());
        assert!(fx.dir.path().join("unittest.txt").exists());
        assert_eq!(
            fx.events.events(),
            vec![HarnessEvent::TeardownCompleted { removed: 2 }]
        );
    }

    #[test]
    fn test_teardown_failure_is_reported_not_raised() {
        let config = HarnessConfig::default().with_workdir("/nonexistent/recon-harness");
        let events = Arc::new(CollectingEventSink::new());
        let harness = SuiteRunner::new(
            config,
            Arc::new(RecordingRunner::new()),
            Arc::new(MemoryArrayReader::new()),
        )
        .with_event_sink(events.clone());

        let summary = harness.teardown();

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(events.event_types(), vec!["teardown.failed"]);
    }
}
