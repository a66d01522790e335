//! Integration tests for the staged pipeline.
//!
//! The clock is paused, so the simulated stage delays complete instantly
//! while elapsed times still reflect them.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;

fn statuses(run: &PipelineRun) -> Vec<StageStatus> {
    run.stages().iter().map(|s| s.status).collect()
}

fn last_entry(run: &PipelineRun) -> &LogEntry {
    run.log().last().expect("log should not be empty")
}

#[tokio::test(start_paused = true)]
async fn test_empty_canvas_logs_one_warning() -> anyhow::Result<()> {
    let mut orchestrator = Orchestrator::new(MockClassifier::answering(7, Some(94.2)), &test_config());

    let outcome = orchestrator.start(&blank_canvas()).await?;
    assert_eq!(outcome, StartOutcome::EmptyInput);

    let run = orchestrator.run();
    assert_eq!(run.log().len(), 1);
    assert_eq!(run.log()[0].severity, Severity::Warning);
    assert_eq!(statuses(run), vec![StageStatus::Pending; 5]);
    assert!(run.stages().iter().all(|s| s.elapsed.is_none()));

    // drawing and retrying needs no reset
    let outcome = orchestrator.start(&canvas_with_seven()).await?;
    assert_eq!(outcome, StartOutcome::Encrypted);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_full_run_reports_prediction() -> anyhow::Result<()> {
    init_logging();
    let classifier = MockClassifier::answering(7, Some(94.2));
    let calls = classifier.call_counter();
    let mut orchestrator = Orchestrator::new(classifier, &test_config());

    assert_eq!(orchestrator.start(&canvas_with_seven()).await?, StartOutcome::Encrypted);
    {
        let run = orchestrator.run();
        assert_eq!(run.status(StageId::Preprocess), StageStatus::Completed);
        assert_eq!(run.status(StageId::Encrypt), StageStatus::Completed);
        assert_eq!(run.status(StageId::Transmit), StageStatus::Pending);
        assert!(run.stage(StageId::Preprocess).elapsed >= Some(Duration::from_millis(500)));
        assert!(run.stage(StageId::Encrypt).elapsed >= Some(Duration::from_millis(1300)));
        assert_eq!(run.payload().map(|v| v.len()), Some(784));
        assert!(
            run.log()
                .iter()
                .any(|e| e.message.contains("Poly Modulus Degree") && e.severity == Severity::Info)
        );
    }

    let outcome = orchestrator.advance_to_transmit().await?;
    assert_eq!(
        outcome,
        TransmitOutcome::Classified(Prediction {
            label: 7,
            confidence: Some(94.2)
        })
    );
    {
        let run = orchestrator.run();
        assert_eq!(run.status(StageId::Transmit), StageStatus::Completed);
        assert_eq!(run.status(StageId::Infer), StageStatus::Completed);
        assert_eq!(run.status(StageId::Decrypt), StageStatus::Pending);
        assert!(run.stage(StageId::Infer).elapsed >= Some(Duration::from_millis(1000)));
        assert_eq!(last_entry(run).severity, Severity::Success);
    }

    let prediction = orchestrator.decrypt().await?;
    assert_eq!(prediction.label, 7);
    assert_eq!(prediction.confidence, Some(94.2));

    let run = orchestrator.run();
    assert!(run.is_finished());
    assert_eq!(statuses(run), vec![StageStatus::Completed; 5]);
    assert!(run.stages().iter().all(|s| s.elapsed.is_some()));
    assert_eq!(run.prediction(), Some(prediction));

    let last = last_entry(run);
    assert_eq!(last.severity, Severity::Success);
    assert!(last.message.contains('7'), "final entry was {:?}", last.message);
    assert!(run.log().iter().any(|e| e.message.contains("94.2")));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_decrypt_before_infer_is_rejected() -> anyhow::Result<()> {
    let mut orchestrator = Orchestrator::new(MockClassifier::answering(1, None), &test_config());

    let result = orchestrator.decrypt().await;
    assert!(matches!(result, Err(PipelineError::Precondition { operation: "decrypt", .. })));
    assert!(orchestrator.run().is_initial());
    assert!(orchestrator.run().log().is_empty());

    orchestrator.start(&canvas_with_seven()).await?;
    let stages_before = orchestrator.run().stages().to_vec();
    let log_before = orchestrator.run().log().len();

    let result = orchestrator.decrypt().await;
    assert!(matches!(result, Err(PipelineError::Precondition { operation: "decrypt", .. })));
    assert_eq!(orchestrator.run().stages(), stages_before.as_slice());
    assert_eq!(orchestrator.run().log().len(), log_before);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transmit_before_start_is_rejected() -> anyhow::Result<()> {
    let classifier = MockClassifier::answering(1, None);
    let calls = classifier.call_counter();
    let mut orchestrator = Orchestrator::new(classifier, &test_config());

    let result = orchestrator.advance_to_transmit().await;
    assert!(matches!(result, Err(PipelineError::Precondition { .. })));
    assert!(orchestrator.run().is_initial());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_requires_reset() -> anyhow::Result<()> {
    let mut orchestrator = Orchestrator::new(MockClassifier::answering(2, None), &test_config());

    orchestrator.start(&canvas_with_seven()).await?;
    let result = orchestrator.start(&canvas_with_seven()).await;
    assert!(matches!(result, Err(PipelineError::Precondition { operation: "start", .. })));

    orchestrator.reset();
    assert_eq!(orchestrator.start(&canvas_with_seven()).await?, StartOutcome::Encrypted);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reset_is_idempotent() -> anyhow::Result<()> {
    let mut orchestrator = Orchestrator::new(MockClassifier::answering(4, Some(71.0)), &test_config());
    orchestrator.start(&canvas_with_seven()).await?;
    orchestrator.advance_to_transmit().await?;
    let first_id = orchestrator.run().id();

    orchestrator.reset();
    let once = orchestrator.run().clone();
    orchestrator.reset();
    let twice = orchestrator.run().clone();

    for run in [&once, &twice] {
        assert!(run.is_initial());
        assert_eq!(statuses(run), vec![StageStatus::Pending; 5]);
        assert!(run.stages().iter().all(|s| s.elapsed.is_none()));
        assert!(run.log().is_empty());
        assert_eq!(run.prediction(), None);
        assert!(run.payload().is_none());
    }
    assert_eq!(once.stages(), twice.stages());
    assert_eq!(once.log(), twice.log());
    assert!(once.id() > first_id);
    assert!(twice.id() > once.id());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_service_error_is_contained() -> anyhow::Result<()> {
    init_logging();
    let mut orchestrator = Orchestrator::new(
        MockClassifier::failing_service(500, "Model or Context not initialized"),
        &test_config(),
    );
    orchestrator.start(&canvas_with_seven()).await?;
    let preprocess = orchestrator.run().stage(StageId::Preprocess).clone();
    let encrypt = orchestrator.run().stage(StageId::Encrypt).clone();

    let result = orchestrator.advance_to_transmit().await;
    assert!(matches!(result, Err(PipelineError::StageFailed { stage: StageId::Infer, .. })));

    let run = orchestrator.run();
    assert_eq!(run.stage(StageId::Preprocess), &preprocess);
    assert_eq!(run.stage(StageId::Encrypt), &encrypt);
    assert_eq!(run.status(StageId::Transmit), StageStatus::Completed);
    assert_eq!(run.status(StageId::Infer), StageStatus::Error);
    assert_eq!(run.stage(StageId::Infer).elapsed, None);
    assert_eq!(run.status(StageId::Decrypt), StageStatus::Pending);
    assert_eq!(run.failed_stage(), Some(StageId::Infer));
    assert_eq!(run.prediction(), None);

    let last = last_entry(run);
    assert_eq!(last.severity, Severity::Error);
    assert!(last.message.contains("500"));
    assert!(last.message.contains("Model or Context not initialized"));

    // decrypt never activates after a failure
    assert!(orchestrator.decrypt().await.is_err());
    assert_eq!(orchestrator.run().status(StageId::Decrypt), StageStatus::Pending);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_is_contained() -> anyhow::Result<()> {
    let classifier = MockClassifier::failing_transport("connection refused");
    let calls = classifier.call_counter();
    let mut orchestrator = Orchestrator::new(classifier, &test_config());
    orchestrator.start(&canvas_with_seven()).await?;
    let encrypt = orchestrator.run().stage(StageId::Encrypt).clone();

    let result = orchestrator.advance_to_transmit().await;
    assert!(matches!(result, Err(PipelineError::StageFailed { stage: StageId::Transmit, .. })));

    let run = orchestrator.run();
    assert_eq!(run.stage(StageId::Encrypt), &encrypt);
    assert_eq!(run.status(StageId::Transmit), StageStatus::Error);
    assert_eq!(run.status(StageId::Infer), StageStatus::Pending);
    assert_eq!(run.status(StageId::Decrypt), StageStatus::Pending);

    let last = last_entry(run);
    assert_eq!(last.severity, Severity::Error);
    assert!(last.message.contains("Failed to communicate with server"));
    assert!(last.message.contains("connection refused"));

    // no automatic or implicit retry: the run has to be reset
    let retry = orchestrator.advance_to_transmit().await;
    assert!(matches!(retry, Err(PipelineError::Precondition { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    orchestrator.reset();
    assert_eq!(orchestrator.start(&canvas_with_seven()).await?, StartOutcome::Encrypted);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_confidence_is_clamped() -> anyhow::Result<()> {
    for (raw, shown) in [(Some(250.0), Some(100.0)), (Some(-4.0), Some(0.0)), (None, None)] {
        let mut orchestrator = Orchestrator::new(MockClassifier::answering(3, raw), &test_config());
        orchestrator.start(&canvas_with_seven()).await?;
        orchestrator.advance_to_transmit().await?;
        let prediction = orchestrator.decrypt().await?;

        assert_eq!(prediction.confidence, shown);
        assert_eq!(
            orchestrator.run().log().iter().any(|e| e.message.starts_with("Confidence")),
            shown.is_some()
        );
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_debug_output_is_written() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");
    let mut orchestrator = Orchestrator::new(MockClassifier::answering(7, None), &test_config())
        .with_debug(debug_dir.clone())?;

    orchestrator.start(&canvas_with_seven()).await?;

    let input = image::open(debug_dir.join("00_input").join("01.png"))?;
    assert_eq!((input.width(), input.height()), (CANVAS_SIZE, CANVAS_SIZE));
    let grid = image::open(debug_dir.join("01_preprocess").join("01.png"))?;
    assert_eq!((grid.width(), grid.height()), (28, 28));

    // a directory that already has content is refused
    let refused = Orchestrator::new(MockClassifier::answering(7, None), &test_config())
        .with_debug(debug_dir);
    assert!(refused.is_err());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_debug_write_failure_is_reported_after_the_stages() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mut orchestrator = Orchestrator::new(MockClassifier::answering(7, None), &test_config())
        .with_debug(dir.path().to_path_buf())?;
    // a plain file where the input folder should go
    std::fs::write(dir.path().join("00_input"), b"in the way")?;

    let result = orchestrator.start(&canvas_with_seven()).await;
    assert!(matches!(result, Err(PipelineError::DebugOutput(_))));

    let run = orchestrator.run();
    assert_eq!(run.status(StageId::Preprocess), StageStatus::Completed);
    assert_eq!(run.status(StageId::Encrypt), StageStatus::Completed);
    assert_eq!(run.payload().map(|v| v.len()), Some(784));

    // the run itself is intact and can go on
    assert!(matches!(
        orchestrator.advance_to_transmit().await?,
        TransmitOutcome::Classified(_)
    ));

    Ok(())
}
