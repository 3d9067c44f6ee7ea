//! Update pipeline orchestration.
//!
//! One pipeline run is the three-step sequence cleanup -> generate -> post.
//! Cleanup is a precondition (stale graphs must not survive next to fresh
//! ones), so a failure enumerating history aborts the run. Per-message and
//! per-file failures are counted and skipped; a run that posts some but not
//! all graphs is a partial success, not a failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::config::{DeliveryConfig, GenerationConfig};
use crate::error::{GraphbotError, Result};
use crate::pipeline::channel::{ChannelClient, ChannelError};
use crate::pipeline::files::validate_graph_file;
use crate::pipeline::generator::GraphGenerator;

/// Callback invoked by the scheduler on every trigger.
#[async_trait]
pub trait UpdateCallback: Send + Sync {
    async fn run(&self) -> Result<PipelineResult>;
}

/// Outcome of a single pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineResult {
    pub graphs_requested: usize,
    pub graphs_posted: usize,
    pub errors: Vec<String>,
}

impl PipelineResult {
    /// True when some but not all requested graphs were delivered.
    pub fn is_partial(&self) -> bool {
        self.graphs_posted < self.graphs_requested
    }
}

/// The scheduler's registered callback: clean up previous bot messages,
/// generate fresh graphs, post them individually.
pub struct UpdatePipeline {
    channel: Arc<dyn ChannelClient>,
    generator: Arc<dyn GraphGenerator>,
    generation: GenerationConfig,
    delivery: DeliveryConfig,
}

impl UpdatePipeline {
    pub fn new(
        channel: Arc<dyn ChannelClient>,
        generator: Arc<dyn GraphGenerator>,
        generation: GenerationConfig,
        delivery: DeliveryConfig,
    ) -> Self {
        Self {
            channel,
            generator,
            generation,
            delivery,
        }
    }

    /// Execute one full cleanup -> generate -> post run.
    pub async fn run_once(&self) -> Result<PipelineResult> {
        self.cleanup_channel().await?;

        let files = self
            .generator
            .generate_all(
                self.generation.max_retries,
                Duration::from_secs(self.generation.timeout_seconds),
            )
            .await?;

        if files.is_empty() {
            info!("Generator produced no graphs, nothing to post");
            return Ok(PipelineResult::default());
        }

        Ok(self.post_graphs(&files).await)
    }

    /// Delete previous bot-authored messages from the target channel.
    ///
    /// A hard failure fetching history propagates; per-message failures are
    /// logged and skipped.
    async fn cleanup_channel(&self) -> Result<()> {
        let messages = self
            .channel
            .recent_messages()
            .await
            .map_err(|e| GraphbotError::Channel(format!("failed to enumerate history: {e}")))?;

        let mut deleted = 0u32;
        let mut errors = 0u32;

        for message in messages.iter().filter(|m| m.from_self) {
            match self.channel.delete_message(message.id).await {
                Ok(()) => {
                    deleted += 1;
                    // Stay under platform delete rate limits proactively.
                    if self.delivery.cleanup_batch_size > 0 && deleted % self.delivery.cleanup_batch_size == 0 {
                        tokio::time::sleep(Duration::from_secs(self.delivery.cleanup_pause_secs)).await;
                    }
                }
                Err(ChannelError::NotFound) => {
                    // Already gone, fine.
                }
                Err(ChannelError::PermissionDenied) => {
                    warn!("Cannot delete message {}: permission denied", message.id);
                    errors += 1;
                }
                Err(ChannelError::RateLimited { retry_after }) => {
                    info!("Rate limited during cleanup, waiting {retry_after:?}");
                    errors += 1;
                    tokio::time::sleep(retry_after).await;
                }
                Err(ChannelError::Http(e)) => {
                    error!("HTTP error deleting message {}: {}", message.id, e);
                    errors += 1;
                }
            }
        }

        info!("Channel cleanup complete: {deleted} deleted, {errors} errors");
        Ok(())
    }

    /// Post each generated file individually. Per-file failures are counted
    /// and the batch continues.
    async fn post_graphs(&self, files: &[PathBuf]) -> PipelineResult {
        let mut result = PipelineResult {
            graphs_requested: files.len(),
            ..Default::default()
        };

        for file in files {
            let validation = validate_graph_file(file, self.delivery.max_file_bytes);
            if !validation.valid {
                let reason = validation.reason.unwrap_or_else(|| "invalid file".to_string());
                warn!("Skipping graph {}: {}", file.display(), reason);
                result.errors.push(reason);
                continue;
            }

            match self.send_with_backoff(file).await {
                Ok(()) => {
                    result.graphs_posted += 1;
                    debug!("Posted graph: {}", file.display());
                }
                Err(e) => {
                    error!("Failed to post graph {}: {}", file.display(), e);
                    result.errors.push(format!("{}: {e}", file.display()));
                }
            }
        }

        info!(
            "Posted {}/{} graphs ({} errors)",
            result.graphs_posted,
            result.graphs_requested,
            result.errors.len()
        );
        result
    }

    /// Send one file, honoring a single server-provided rate-limit delay.
    async fn send_with_backoff(&self, file: &Path) -> std::result::Result<(), ChannelError> {
        let caption = caption_for(file);
        match self.channel.send_file(file, &caption).await {
            Err(ChannelError::RateLimited { retry_after }) => {
                info!("Rate limited posting {}, waiting {retry_after:?}", file.display());
                tokio::time::sleep(retry_after).await;
                self.channel.send_file(file, &caption).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl UpdateCallback for UpdatePipeline {
    async fn run(&self) -> Result<PipelineResult> {
        self.run_once().await
    }
}

/// Derive a human-readable caption from the file name.
fn caption_for(file: &Path) -> String {
    file.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.replace('_', " "))
        .unwrap_or_else(|| "graph".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::{ChannelMessage, MessageId};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Channel fake with scriptable per-call behavior.
    struct FakeChannel {
        messages: Vec<ChannelMessage>,
        history_error: Option<ChannelError>,
        send_errors: Mutex<Vec<Option<ChannelError>>>,
        delete_errors: Mutex<Vec<Option<ChannelError>>>,
        deleted: AtomicUsize,
        sent: AtomicUsize,
    }

    impl FakeChannel {
        fn empty() -> Self {
            Self {
                messages: Vec::new(),
                history_error: None,
                send_errors: Mutex::new(Vec::new()),
                delete_errors: Mutex::new(Vec::new()),
                deleted: AtomicUsize::new(0),
                sent: AtomicUsize::new(0),
            }
        }

        fn with_messages(messages: Vec<ChannelMessage>) -> Self {
            Self {
                messages,
                ..Self::empty()
            }
        }
    }

    #[async_trait]
    impl ChannelClient for FakeChannel {
        async fn recent_messages(&self) -> std::result::Result<Vec<ChannelMessage>, ChannelError> {
            match &self.history_error {
                Some(e) => Err(e.clone()),
                None => Ok(self.messages.clone()),
            }
        }

        async fn delete_message(&self, _id: MessageId) -> std::result::Result<(), ChannelError> {
            let scripted = self.delete_errors.lock().unwrap().pop().flatten();
            match scripted {
                Some(e) => Err(e),
                None => {
                    self.deleted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }

        async fn send_file(&self, _file: &Path, _caption: &str) -> std::result::Result<(), ChannelError> {
            let scripted = self.send_errors.lock().unwrap().pop().flatten();
            match scripted {
                Some(e) => Err(e),
                None => {
                    self.sent.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }
    }

    struct FakeGenerator {
        files: Vec<PathBuf>,
        fail: bool,
    }

    #[async_trait]
    impl GraphGenerator for FakeGenerator {
        async fn generate_all(&self, _max_retries: u32, _timeout: Duration) -> Result<Vec<PathBuf>> {
            if self.fail {
                return Err(GraphbotError::Generator("render backend down".to_string()));
            }
            Ok(self.files.clone())
        }
    }

    fn pipeline(channel: FakeChannel, generator: FakeGenerator) -> UpdatePipeline {
        UpdatePipeline::new(
            Arc::new(channel),
            Arc::new(generator),
            GenerationConfig::default(),
            DeliveryConfig {
                cleanup_pause_secs: 0,
                ..DeliveryConfig::default()
            },
        )
    }

    fn temp_graphs(dir: &tempfile::TempDir, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.path().join(format!("graph_{i}.png"));
                std::fs::write(&path, b"imagedata").unwrap();
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_generator_is_clean_success() {
        let p = pipeline(FakeChannel::empty(), FakeGenerator { files: Vec::new(), fail: false });
        let result = p.run_once().await.unwrap();
        assert_eq!(result.graphs_requested, 0);
        assert_eq!(result.graphs_posted, 0);
        assert!(result.errors.is_empty());
        assert!(!result.is_partial());
    }

    #[tokio::test]
    async fn test_generator_failure_propagates() {
        let p = pipeline(FakeChannel::empty(), FakeGenerator { files: Vec::new(), fail: true });
        let err = p.run_once().await.unwrap_err();
        assert!(matches!(err, GraphbotError::Generator(_)));
    }

    #[tokio::test]
    async fn test_history_failure_aborts_run() {
        let mut channel = FakeChannel::empty();
        channel.history_error = Some(ChannelError::PermissionDenied);
        let p = pipeline(channel, FakeGenerator { files: Vec::new(), fail: false });
        let err = p.run_once().await.unwrap_err();
        assert!(matches!(err, GraphbotError::Channel(_)));
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_own_messages() {
        let messages = vec![
            ChannelMessage { id: MessageId(1), from_self: true },
            ChannelMessage { id: MessageId(2), from_self: false },
            ChannelMessage { id: MessageId(3), from_self: true },
        ];
        let channel = FakeChannel::with_messages(messages);
        let deleted = Arc::new(channel);
        let p = UpdatePipeline::new(
            deleted.clone(),
            Arc::new(FakeGenerator { files: Vec::new(), fail: false }),
            GenerationConfig::default(),
            DeliveryConfig {
                cleanup_pause_secs: 0,
                ..DeliveryConfig::default()
            },
        );
        p.run_once().await.unwrap();
        assert_eq!(deleted.deleted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_delete_waits_and_continues() {
        let messages = vec![
            ChannelMessage { id: MessageId(1), from_self: true },
            ChannelMessage { id: MessageId(2), from_self: true },
        ];
        let channel = FakeChannel::with_messages(messages);
        // Scripted errors are popped per delete: first delete is rate
        // limited, second succeeds.
        *channel.delete_errors.lock().unwrap() = vec![
            None,
            Some(ChannelError::RateLimited {
                retry_after: Duration::from_millis(1),
            }),
        ];

        let channel = Arc::new(channel);
        let p = UpdatePipeline::new(
            channel.clone(),
            Arc::new(FakeGenerator { files: Vec::new(), fail: false }),
            GenerationConfig::default(),
            DeliveryConfig {
                cleanup_pause_secs: 0,
                ..DeliveryConfig::default()
            },
        );

        // The rate-limited message is skipped after the wait, not retried,
        // and cleanup moves on to the rest.
        p.run_once().await.unwrap();
        assert_eq!(channel.deleted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_success_counts_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let files = temp_graphs(&dir, 3);

        let channel = FakeChannel::empty();
        // Scripted errors are popped per send: first send fails, rest succeed.
        *channel.send_errors.lock().unwrap() = vec![None, None, Some(ChannelError::Http("500".to_string()))];

        let p = pipeline(channel, FakeGenerator { files, fail: false });
        let result = p.run_once().await.unwrap();

        assert_eq!(result.graphs_requested, 3);
        assert_eq!(result.graphs_posted, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.is_partial());
    }

    #[tokio::test]
    async fn test_invalid_file_skipped_not_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut files = temp_graphs(&dir, 1);
        files.push(dir.path().join("missing.png"));

        let p = pipeline(FakeChannel::empty(), FakeGenerator { files, fail: false });
        let result = p.run_once().await.unwrap();

        assert_eq!(result.graphs_requested, 2);
        assert_eq!(result.graphs_posted, 1);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_send_retries_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let files = temp_graphs(&dir, 1);

        let channel = FakeChannel::empty();
        *channel.send_errors.lock().unwrap() = vec![Some(ChannelError::RateLimited {
            retry_after: Duration::from_millis(1),
        })];

        let p = pipeline(channel, FakeGenerator { files, fail: false });
        let result = p.run_once().await.unwrap();
        assert_eq!(result.graphs_posted, 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_caption_from_file_name() {
        assert_eq!(caption_for(Path::new("out/daily_play_count.png")), "daily play count");
    }
}
