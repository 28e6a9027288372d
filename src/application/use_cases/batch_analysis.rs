//! Batch orchestration: drives uploaded files through encoding and analysis.
//!
//! Files are processed strictly one at a time in input order. A failure on one
//! file is recorded on its task and reported as an event; the loop always
//! continues with the next file. Successful photos are merged into the session
//! only once the whole batch has been processed, in input order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::application::use_cases::session_store::SharedSessionStore;
use crate::domain::error::{AnalysisFailure, AppError, Result};
use crate::domain::inspection::{Photo, RiskLevel};
use crate::domain::upload_task::{UploadStatus, UploadTask};
use crate::infrastructure::image_codec::{encode_image, PreviewStore};
use crate::infrastructure::vision_clients::VisionClient;

/// One uploaded file as received from the caller.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Set when the upload could not be read; the file then fails at conversion.
    pub unreadable: Option<String>,
}

impl RawFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            unreadable: None,
        }
    }

    pub fn unreadable(file_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: Vec::new(),
            unreadable: Some(detail.into()),
        }
    }
}

/// Progress and notification events, emitted in input order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    BatchStarted { total: usize },
    TaskUpdated { task: UploadTask },
    PhotoAnalyzed { file_name: String, risk_level: RiskLevel },
    PhotoFailed { file_name: String, detail: String },
    BatchFinished { succeeded: usize, failed: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub index: usize,
    pub file_name: String,
    pub detail: String,
    /// Set for analysis failures; `None` means the file itself was unreadable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<AnalysisFailure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub photos: Vec<Photo>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSnapshot {
    pub active: bool,
    pub tasks: Vec<UploadTask>,
}

#[derive(Default)]
struct UploadProgress {
    active: bool,
    /// Bumped per batch so a stale delayed clear leaves newer tasks alone.
    generation: u64,
    tasks: Vec<UploadTask>,
}

pub struct BatchAnalysisUseCase {
    vision_client: Arc<dyn VisionClient + Send + Sync>,
    session: SharedSessionStore,
    previews: Arc<PreviewStore>,
    progress: Arc<Mutex<UploadProgress>>,
    events: broadcast::Sender<BatchEvent>,
    clear_delay: Duration,
}

impl BatchAnalysisUseCase {
    pub fn new(
        vision_client: Arc<dyn VisionClient + Send + Sync>,
        session: SharedSessionStore,
        previews: Arc<PreviewStore>,
        clear_delay: Duration,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            vision_client,
            session,
            previews,
            progress: Arc::new(Mutex::new(UploadProgress::default())),
            events,
            clear_delay,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    pub async fn is_active(&self) -> bool {
        self.progress.lock().await.active
    }

    /// Current tasks ordered by index.
    pub async fn upload_tasks(&self) -> Vec<UploadTask> {
        self.progress.lock().await.tasks.clone()
    }

    pub async fn upload_snapshot(&self) -> UploadSnapshot {
        UploadSnapshot {
            tasks: self.upload_tasks().await,
            active: self.is_active().await,
        }
    }

    /// Runs one batch to completion. An empty batch is a no-op; a batch submitted
    /// while another is running is rejected.
    pub async fn run_batch(&self, files: Vec<RawFile>) -> Result<BatchOutcome> {
        if files.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let generation = {
            let mut progress = self.progress.lock().await;
            if progress.active {
                return Err(AppError::ValidationError(
                    "A batch is already being analyzed".to_string(),
                ));
            }
            progress.active = true;
            progress.generation += 1;
            progress.tasks = files
                .iter()
                .enumerate()
                .map(|(index, file)| UploadTask::new(index, file.file_name.clone()))
                .collect();
            progress.generation
        };

        info!(total = files.len(), "Starting batch analysis");
        self.emit(BatchEvent::BatchStarted { total: files.len() });

        let result = self.process_files(files).await;
        if let Ok(outcome) = &result {
            self.session.write().await.add_photos(outcome.photos.clone());
        }
        self.finish(generation).await;
        let outcome = result?;

        info!(
            succeeded = outcome.photos.len(),
            failed = outcome.failures.len(),
            "Batch analysis finished"
        );
        self.emit(BatchEvent::BatchFinished {
            succeeded: outcome.photos.len(),
            failed: outcome.failures.len(),
        });

        Ok(outcome)
    }

    async fn process_files(&self, files: Vec<RawFile>) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for (index, file) in files.into_iter().enumerate() {
            match self.process_file(index, &file).await {
                Ok(photo) => {
                    self.advance(index, UploadStatus::Complete).await?;
                    info!(
                        file_name = %file.file_name,
                        risk_level = %photo.risk_level(),
                        processing_time = photo.processing_time,
                        "Analyzed photo"
                    );
                    self.emit(BatchEvent::PhotoAnalyzed {
                        file_name: file.file_name.clone(),
                        risk_level: photo.risk_level(),
                    });
                    outcome.photos.push(photo);
                }
                Err(err) if err.is_per_photo() => {
                    self.advance(index, UploadStatus::Error).await?;
                    warn!(file_name = %file.file_name, error = %err, "Failed to analyze photo");
                    let detail = err.to_string();
                    let reason = match &err {
                        AppError::Analysis { reason, .. } => Some(*reason),
                        _ => None,
                    };
                    self.emit(BatchEvent::PhotoFailed {
                        file_name: file.file_name.clone(),
                        detail: detail.clone(),
                    });
                    outcome.failures.push(BatchFailure {
                        index,
                        file_name: file.file_name,
                        detail,
                        reason,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(outcome)
    }

    async fn process_file(&self, index: usize, file: &RawFile) -> Result<Photo> {
        let started = Instant::now();
        self.advance(index, UploadStatus::Converting).await?;

        if let Some(detail) = &file.unreadable {
            return Err(AppError::Codec(detail.clone()));
        }
        let payload = encode_image(&file.bytes)?;

        self.advance(index, UploadStatus::Analyzing).await?;
        let preview = self.previews.create(&file.bytes);

        match self.vision_client.analyze(&payload, &file.file_name).await {
            Ok(results) => {
                if results.has_warnings() {
                    warn!(
                        file_name = %file.file_name,
                        warnings = ?results.warnings,
                        "Analysis reply was adjusted"
                    );
                }
                Ok(Photo::from_analysis(
                    file.file_name.clone(),
                    preview,
                    results,
                    started.elapsed().as_secs_f64(),
                ))
            }
            Err(err) => {
                self.previews.release(&preview);
                Err(err)
            }
        }
    }

    async fn advance(&self, index: usize, next: UploadStatus) -> Result<()> {
        let task = {
            let mut progress = self.progress.lock().await;
            let task = progress
                .tasks
                .get_mut(index)
                .ok_or_else(|| AppError::Internal(format!("no upload task {}", index)))?;
            task.advance(next)?;
            task.clone()
        };
        self.emit(BatchEvent::TaskUpdated { task });
        Ok(())
    }

    /// Marks the batch inactive and schedules the task map to be cleared.
    async fn finish(&self, generation: u64) {
        self.progress.lock().await.active = false;

        let progress = self.progress.clone();
        let delay = self.clear_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut progress = progress.lock().await;
            if progress.generation == generation && !progress.active {
                progress.tasks.clear();
            }
        });
    }

    fn emit(&self, event: BatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}


#[cfg(test)]
mod tests {
    use super::stubs::ScriptedVisionClient;
    use super::*;
    use crate::domain::error::AnalysisFailure;
    use crate::application::use_cases::session_store::SessionStore;
    use crate::domain::inspection::{AnalysisResult, SessionStats, Violation, ViolationCategory};
    use crate::infrastructure::image_codec::fixtures::png_bytes;

    fn high_result() -> AnalysisResult {
        AnalysisResult {
            risk_level: RiskLevel::High,
            safety_score: 20,
            violations: vec![Violation {
                violation_type: "No Hard Hat".to_string(),
                category: ViolationCategory::Ppe,
                location: "center".to_string(),
                confidence: 95,
            }],
            summary: None,
            warnings: Vec::new(),
        }
    }

    fn low_result() -> AnalysisResult {
        AnalysisResult {
            risk_level: RiskLevel::Low,
            safety_score: 90,
            violations: vec![],
            summary: None,
            warnings: Vec::new(),
        }
    }

    fn use_case(client: ScriptedVisionClient) -> (BatchAnalysisUseCase, SharedSessionStore, Arc<PreviewStore>) {
        let previews = Arc::new(PreviewStore::new());
        let session = SessionStore::shared(previews.clone());
        let use_case = BatchAnalysisUseCase::new(
            Arc::new(client),
            session.clone(),
            previews.clone(),
            Duration::from_millis(2000),
            64,
        );
        (use_case, session, previews)
    }

    fn drain(rx: &mut broadcast::Receiver<BatchEvent>) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_mixed_batch_end_to_end() {
        let client = ScriptedVisionClient::default()
            .with("a.png", high_result())
            .with("c.png", low_result());
        let (use_case, session, previews) = use_case(client);

        let outcome = use_case
            .run_batch(vec![
                RawFile::new("a.png", png_bytes(1)),
                RawFile::new("b.png", png_bytes(2)),
                RawFile::new("c.png", png_bytes(3)),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.photos.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].file_name, "b.png");
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].reason, Some(AnalysisFailure::Rejected));

        let store = session.read().await;
        let names: Vec<&str> = store.photos().iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "c.png"]);
        assert!(store.photos()[0].flagged_for_follow_up);
        assert!(!store.photos()[1].flagged_for_follow_up);
        assert_eq!(
            store.compute_stats(),
            SessionStats {
                total: 2,
                high_risk: 1,
                medium_risk: 0,
                low_risk: 1,
                total_violations: 1,
                avg_safety_score: 55,
            }
        );
        // The failed file's preview was released.
        assert_eq!(previews.len(), 2);
    }

    #[tokio::test]
    async fn test_task_states_after_batch() {
        let client = ScriptedVisionClient::default().with("ok.png", low_result());
        let (use_case, _session, previews) = use_case(client);

        use_case
            .run_batch(vec![
                RawFile::new("ok.png", png_bytes(1)),
                RawFile::new("broken.png", b"not an image".to_vec()),
                RawFile::new("rejected.png", png_bytes(2)),
            ])
            .await
            .unwrap();

        let snapshot = use_case.upload_snapshot().await;
        assert!(!snapshot.active);
        let states: Vec<(UploadStatus, u8)> = snapshot
            .tasks
            .iter()
            .map(|t| (t.status, t.progress))
            .collect();
        assert_eq!(
            states,
            vec![
                (UploadStatus::Complete, 100),
                (UploadStatus::Error, 0),
                (UploadStatus::Error, 0),
            ]
        );
        // Only the analyzed photo still holds a preview.
        assert_eq!(previews.len(), 1);
    }

    #[tokio::test]
    async fn test_events_in_input_order() {
        let client = ScriptedVisionClient::default().with("a.png", high_result());
        let (use_case, _session, _previews) = use_case(client);
        let mut rx = use_case.subscribe();

        use_case
            .run_batch(vec![
                RawFile::new("a.png", png_bytes(1)),
                RawFile::new("bad.png", Vec::new()),
            ])
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&BatchEvent::BatchStarted { total: 2 }));
        assert_eq!(
            events.last(),
            Some(&BatchEvent::BatchFinished {
                succeeded: 1,
                failed: 1
            })
        );

        let progress: Vec<(usize, UploadStatus)> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::TaskUpdated { task } => Some((task.index, task.status)),
                _ => None,
            })
            .collect();
        assert_eq!(
            progress,
            vec![
                (0, UploadStatus::Converting),
                (0, UploadStatus::Analyzing),
                (0, UploadStatus::Complete),
                (1, UploadStatus::Converting),
                (1, UploadStatus::Error),
            ]
        );

        let notifications: Vec<&BatchEvent> = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::PhotoAnalyzed { .. } | BatchEvent::PhotoFailed { .. }))
            .collect();
        assert_eq!(
            notifications[0],
            &BatchEvent::PhotoAnalyzed {
                file_name: "a.png".to_string(),
                risk_level: RiskLevel::High
            }
        );
        assert!(matches!(
            notifications[1],
            BatchEvent::PhotoFailed { file_name, detail } if file_name == "bad.png" && detail.contains("empty")
        ));
    }

    #[tokio::test]
    async fn test_unreadable_upload_fails_alone() {
        let client = ScriptedVisionClient::default()
            .with("a.png", high_result())
            .with("c.png", low_result());
        let (use_case, session, previews) = use_case(client);
        let mut rx = use_case.subscribe();

        let outcome = use_case
            .run_batch(vec![
                RawFile::new("a.png", png_bytes(1)),
                RawFile::unreadable("b.png", "invalid base64 payload"),
                RawFile::new("c.png", png_bytes(3)),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.photos.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].reason, None);
        assert!(outcome.failures[0].detail.contains("invalid base64"));
        assert_eq!(session.read().await.photos().len(), 2);
        assert_eq!(previews.len(), 2);

        let tasks = use_case.upload_tasks().await;
        assert_eq!(tasks[1].status, UploadStatus::Error);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            BatchEvent::PhotoFailed { file_name, .. } if file_name == "b.png"
        )));
    }

    #[tokio::test]
    async fn test_duplicate_file_names_tracked_separately() {
        let client = ScriptedVisionClient::default().with("same.png", low_result());
        let (use_case, session, _previews) = use_case(client);

        use_case
            .run_batch(vec![
                RawFile::new("same.png", png_bytes(1)),
                RawFile::new("same.png", b"garbage".to_vec()),
            ])
            .await
            .unwrap();

        let snapshot = use_case.upload_snapshot().await;
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks[0].status, UploadStatus::Complete);
        assert_eq!(snapshot.tasks[1].status, UploadStatus::Error);
        assert_eq!(session.read().await.photos().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let (use_case, session, _previews) = use_case(ScriptedVisionClient::default());
        let mut rx = use_case.subscribe();

        let outcome = use_case.run_batch(Vec::new()).await.unwrap();

        assert!(outcome.photos.is_empty());
        assert!(outcome.failures.is_empty());
        assert!(drain(&mut rx).is_empty());
        assert!(use_case.upload_snapshot().await.tasks.is_empty());
        assert!(session.read().await.photos().is_empty());
    }

    #[tokio::test]
    async fn test_all_failures_add_nothing() {
        let (use_case, session, previews) = use_case(ScriptedVisionClient::default());

        let outcome = use_case
            .run_batch(vec![
                RawFile::new("x.png", png_bytes(1)),
                RawFile::new("y.png", png_bytes(2)),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.failures.len(), 2);
        assert!(session.read().await.photos().is_empty());
        assert_eq!(previews.len(), 0);
        assert!(!use_case.is_active().await);
    }

    #[tokio::test]
    async fn test_batches_append_in_submission_order() {
        let client = ScriptedVisionClient::default()
            .with("a.png", high_result())
            .with("c.png", low_result());
        let (use_case, session, _previews) = use_case(client);

        use_case
            .run_batch(vec![RawFile::new("c.png", png_bytes(1))])
            .await
            .unwrap();
        use_case
            .run_batch(vec![RawFile::new("a.png", png_bytes(2))])
            .await
            .unwrap();

        let store = session.read().await;
        let names: Vec<&str> = store.photos().iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, vec!["c.png", "a.png"]);
    }

    #[tokio::test]
    async fn test_files_analyzed_sequentially_in_order() {
        let client = Arc::new(
            ScriptedVisionClient::default()
                .with("1.png", low_result())
                .with("2.png", low_result())
                .with("3.png", low_result()),
        );
        let previews = Arc::new(PreviewStore::new());
        let use_case = BatchAnalysisUseCase::new(
            client.clone(),
            SessionStore::shared(previews.clone()),
            previews,
            Duration::from_millis(10),
            16,
        );

        use_case
            .run_batch(vec![
                RawFile::new("1.png", png_bytes(1)),
                RawFile::new("2.png", png_bytes(2)),
                RawFile::new("3.png", png_bytes(3)),
            ])
            .await
            .unwrap();

        assert_eq!(*client.calls.lock().unwrap(), vec!["1.png", "2.png", "3.png"]);
    }

    struct GatedVisionClient {
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl VisionClient for GatedVisionClient {
        async fn analyze(
            &self,
            _image: &crate::infrastructure::image_codec::EncodedImage,
            _file_name: &str,
        ) -> Result<AnalysisResult> {
            self.gate.notified().await;
            Ok(low_result())
        }
    }

    #[tokio::test]
    async fn test_second_batch_rejected_while_active() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let previews = Arc::new(PreviewStore::new());
        let use_case = Arc::new(BatchAnalysisUseCase::new(
            Arc::new(GatedVisionClient { gate: gate.clone() }),
            SessionStore::shared(previews.clone()),
            previews,
            Duration::from_millis(10),
            16,
        ));

        let running = {
            let use_case = use_case.clone();
            tokio::spawn(async move {
                use_case
                    .run_batch(vec![RawFile::new("slow.png", png_bytes(1))])
                    .await
            })
        };

        while !use_case.is_active().await {
            tokio::task::yield_now().await;
        }

        let rejected = use_case
            .run_batch(vec![RawFile::new("other.png", png_bytes(2))])
            .await;
        assert!(matches!(rejected, Err(AppError::ValidationError(_))));

        gate.notify_one();
        let outcome = running.await.unwrap().unwrap();
        assert_eq!(outcome.photos.len(), 1);
        assert!(!use_case.is_active().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_cleared_after_delay() {
        let client = ScriptedVisionClient::default().with("a.png", low_result());
        let (use_case, _session, _previews) = use_case(client);

        use_case
            .run_batch(vec![RawFile::new("a.png", png_bytes(1))])
            .await
            .unwrap();
        assert_eq!(use_case.upload_snapshot().await.tasks.len(), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(use_case.upload_snapshot().await.tasks.len(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(use_case.upload_snapshot().await.tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_clear_keeps_newer_batch() {
        let client = ScriptedVisionClient::default()
            .with("a.png", low_result())
            .with("b.png", low_result());
        let (use_case, _session, _previews) = use_case(client);

        use_case
            .run_batch(vec![RawFile::new("a.png", png_bytes(1))])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        use_case
            .run_batch(vec![RawFile::new("b.png", png_bytes(2))])
            .await
            .unwrap();

        // First batch's clear fires here but belongs to an older generation.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let tasks = use_case.upload_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_name, "b.png");
    }
}
