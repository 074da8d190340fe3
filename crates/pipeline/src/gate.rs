//! Single-flight transcription gate
//!
//! At most one transcription runs per session. A segment arriving while one
//! is in flight is rejected, not queued: for live conversation, recency
//! beats completeness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use voice_loop_core::PcmFormat;
use voice_loop_providers::{ProviderError, Transcriber, Transcription};

/// Why a segment was rejected without a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// A transcription is already in flight.
    Busy,
    /// The segment is below the minimum-content threshold.
    TooShort,
}

/// Single-flight wrapper around a [`Transcriber`].
pub struct TranscriptionGate {
    transcriber: Arc<dyn Transcriber>,
    busy: Arc<AtomicBool>,
    min_bytes: usize,
}

impl TranscriptionGate {
    pub fn new(transcriber: Arc<dyn Transcriber>, format: PcmFormat, min_audio_ms: u64) -> Self {
        Self {
            transcriber,
            busy: Arc::new(AtomicBool::new(false)),
            min_bytes: format.bytes_for_ms(min_audio_ms),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Submit a segment. On acceptance the provider call runs in a spawned
    /// task and the receiver resolves with its result; the gate frees itself
    /// when the call finishes, whatever the outcome.
    pub fn try_submit(
        &self,
        audio: Vec<u8>,
    ) -> Result<oneshot::Receiver<Result<Transcription, ProviderError>>, GateRejection> {
        if audio.len() < self.min_bytes {
            return Err(GateRejection::TooShort);
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GateRejection::Busy);
        }

        let (tx, rx) = oneshot::channel();
        let transcriber = self.transcriber.clone();
        let busy = self.busy.clone();

        tokio::spawn(async move {
            let result = transcriber.transcribe(&audio).await;
            busy.store(false, Ordering::Release);
            let _ = tx.send(result);
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;
    use voice_loop_core::TARGET_FORMAT;

    /// Transcriber that blocks until released, to hold the gate busy.
    struct BlockingTranscriber {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Transcriber for BlockingTranscriber {
        async fn transcribe(&self, pcm: &[u8]) -> Result<Transcription, ProviderError> {
            self.release.notified().await;
            Ok(Transcription {
                text: "done".to_string(),
                language: None,
                duration_ms: TARGET_FORMAT.duration_ms(pcm.len()),
                confidence: 0.9,
            })
        }
    }

    fn segment(ms: u64) -> Vec<u8> {
        vec![0u8; TARGET_FORMAT.bytes_for_ms(ms)]
    }

    #[tokio::test]
    async fn test_rejects_segment_below_minimum_content() {
        let release = Arc::new(Notify::new());
        let gate = TranscriptionGate::new(
            Arc::new(BlockingTranscriber {
                release: release.clone(),
            }),
            TARGET_FORMAT,
            100,
        );

        assert_eq!(gate.try_submit(segment(50)).unwrap_err(), GateRejection::TooShort);
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_second_submission_rejected_while_busy() {
        let release = Arc::new(Notify::new());
        let gate = TranscriptionGate::new(
            Arc::new(BlockingTranscriber {
                release: release.clone(),
            }),
            TARGET_FORMAT,
            100,
        );

        let rx = gate.try_submit(segment(500)).unwrap();
        assert!(gate.is_busy());
        assert_eq!(gate.try_submit(segment(500)).unwrap_err(), GateRejection::Busy);

        release.notify_one();
        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.text, "done");
        assert!(!gate.is_busy());

        // Free again: a new segment is accepted.
        let rx = gate.try_submit(segment(500)).unwrap();
        release.notify_one();
        assert!(rx.await.unwrap().is_ok());
    }
}
