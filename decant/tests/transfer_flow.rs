//! Integration tests for the transfer pipeline.
//!
//! These run the full transfer topology for real: a scripted provider
//! supplies the upstream bytes, and a shell script stands in for the
//! transform binary so input pipes, the stdout payload, stderr diagnostics,
//! and the progress channel are all exercised without a media toolchain.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tempfile::TempDir;

use catalog::{CatalogError, CatalogProvider, Encoding, EncodingStream, MediaCatalog};
use decant::progress::{ProgressBus, ProgressStatus, TransferPhase};
use decant::transfer::{DownloadRequest, TransferKind, TransferService, TransformConfig};

fn encoding(id: &str, container: &str, has_audio: bool, has_video: bool) -> Encoding {
    Encoding {
        id: id.to_string(),
        container: container.to_string(),
        has_audio,
        has_video,
        quality_label: has_video.then(|| "1080p".to_string()),
        bitrate: Some(4500.0),
        audio_bitrate: has_audio.then_some(128.0),
        content_length: None,
        duration_secs: Some(120.0),
        url: format!("https://cdn.example/{id}"),
        http_headers: HashMap::new(),
    }
}

fn media_catalog(duration: Option<f64>) -> MediaCatalog {
    let mut encodings = vec![
        encoding("18", "mp4", true, true),
        encoding("137", "mp4", false, true),
        encoding("140", "m4a", true, false),
        encoding("251", "webm", true, false),
    ];
    for e in &mut encodings {
        e.duration_secs = duration;
    }
    MediaCatalog {
        media_id: "abc123DEF01".to_string(),
        title: "Fixture Clip".to_string(),
        channel: Some("fixtures".to_string()),
        description: None,
        thumbnail_url: None,
        view_count: Some(7),
        duration_secs: duration,
        encodings,
    }
}

/// Provider serving fixed payloads per encoding id, in small chunks.
struct ScriptedProvider {
    media: MediaCatalog,
    payloads: HashMap<String, Bytes>,
    open_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(media: MediaCatalog, payloads: &[(&str, &'static [u8])]) -> Self {
        Self {
            media,
            payloads: payloads
                .iter()
                .map(|(id, bytes)| (id.to_string(), Bytes::from_static(bytes)))
                .collect(),
            open_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CatalogProvider for ScriptedProvider {
    async fn fetch_media(&self, media_id: &str) -> Result<MediaCatalog, CatalogError> {
        if media_id == self.media.media_id {
            Ok(self.media.clone())
        } else {
            Err(CatalogError::NotFound(media_id.to_string()))
        }
    }

    async fn open_stream(&self, encoding: &Encoding) -> Result<EncodingStream, CatalogError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let payload = self
            .payloads
            .get(&encoding.id)
            .cloned()
            .ok_or_else(|| CatalogError::upstream("no payload scripted"))?;
        let total = payload.len() as u64;
        let chunks: Vec<_> = payload
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(EncodingStream {
            bytes: futures::stream::iter(chunks).boxed(),
            content_length: Some(total),
        })
    }
}

/// Write an executable shell script into `dir` and point a transform config
/// at it.
fn fake_transform(dir: &TempDir, script: &str) -> TransformConfig {
    let path = dir.path().join("transform.sh");
    std::fs::write(&path, script).expect("write transform script");
    let mut perms = std::fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("make script executable");
    TransformConfig { binary: path }
}

fn request(encoding_id: &str, audio: Option<&str>, kind: TransferKind) -> DownloadRequest {
    DownloadRequest {
        media_id: "abc123DEF01".to_string(),
        encoding_id: encoding_id.to_string(),
        audio_encoding_id: audio.map(str::to_string),
        kind,
        ticket: None,
    }
}

async fn collect_body(
    mut body: tokio_stream::wrappers::ReceiverStream<std::io::Result<Bytes>>,
) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

mod mux_tests {
    use super::*;

    #[tokio::test]
    async fn test_mux_runs_one_transform_with_two_input_pipes() {
        let dir = TempDir::new().expect("temp dir");
        // Drains both inputs, reports two time markers, emits the payload.
        let transform = fake_transform(
            &dir,
            "#!/bin/sh\n\
             printf 'frame=1 fps=0 q=-1.0 size=0kB time=00:00:30.00 bitrate=N/A\\n' >&2\n\
             cat <&3 > /dev/null\n\
             cat <&4 > /dev/null\n\
             printf 'frame=2 fps=0 q=-1.0 size=1kB time=00:01:00.00 bitrate=N/A\\n' >&2\n\
             printf 'MUXED-PAYLOAD'\n",
        );

        let provider = Arc::new(ScriptedProvider::new(
            media_catalog(Some(120.0)),
            &[("137", b"video-bytes-for-the-mux"), ("140", b"audio-bytes")],
        ));
        let bus = Arc::new(ProgressBus::new());
        let service = TransferService::new(Arc::clone(&provider) as _, Arc::clone(&bus), transform);

        let mut sub = bus.subscribe("abc123DEF01");
        let transfer = service
            .start(request("137", Some("140"), TransferKind::Video))
            .await
            .expect("start mux transfer");
        assert_eq!(transfer.file_name, "Fixture Clip.mp4");
        assert_eq!(transfer.content_type, "video/mp4");

        let delivered = collect_body(transfer.body).await.expect("mux payload");
        assert_eq!(delivered, b"MUXED-PAYLOAD");
        assert_eq!(
            provider.open_calls.load(Ordering::SeqCst),
            2,
            "one upstream stream per input pipe"
        );

        let mut events = Vec::new();
        while let Some(event) = sub.recv().await {
            events.push(event);
        }

        let first = events.first().expect("events published");
        assert_eq!(first.status, ProgressStatus::Processing);
        assert_eq!(first.progress, 0);
        assert_eq!(first.phase, Some(TransferPhase::Muxing));

        // Diagnostics markers at 30s and 60s of 120s: 25 then 50 percent,
        // strictly increasing and below 100.
        let percents: Vec<u8> = events
            .iter()
            .filter(|e| e.current_time.is_some() && e.progress < 100)
            .map(|e| e.progress)
            .collect();
        assert_eq!(percents, vec![25, 50]);

        // Completion pins 100 before the single terminal event.
        let completion = &events[events.len() - 2];
        assert_eq!(completion.status, ProgressStatus::Processing);
        assert_eq!(completion.progress, 100);

        let finished: Vec<_> = events
            .iter()
            .filter(|e| e.status == ProgressStatus::Finished)
            .collect();
        assert_eq!(finished.len(), 1, "exactly one terminal event");
        assert_eq!(events.last().expect("terminal").status, ProgressStatus::Finished);

        assert!(!bus.is_active("abc123DEF01"));

        // A subscriber arriving after completion sees an empty channel.
        let mut late = bus.subscribe("abc123DEF01");
        let outcome = tokio::time::timeout(Duration::from_millis(50), late.recv()).await;
        assert!(outcome.is_err(), "late subscriber must see nothing");
    }

    #[tokio::test]
    async fn test_mux_without_duration_skips_derived_progress() {
        let dir = TempDir::new().expect("temp dir");
        let transform = fake_transform(
            &dir,
            "#!/bin/sh\n\
             cat <&3 > /dev/null\n\
             cat <&4 > /dev/null\n\
             printf 'frame=2 fps=0 q=-1.0 size=1kB time=00:01:00.00 bitrate=N/A\\n' >&2\n\
             printf 'OUT'\n",
        );

        let provider = Arc::new(ScriptedProvider::new(
            media_catalog(None),
            &[("137", b"vvvv"), ("140", b"aaaa")],
        ));
        let bus = Arc::new(ProgressBus::new());
        let service = TransferService::new(Arc::clone(&provider) as _, Arc::clone(&bus), transform);

        let mut sub = bus.subscribe("abc123DEF01");
        let transfer = service
            .start(request("137", Some("140"), TransferKind::Video))
            .await
            .expect("start mux transfer");
        collect_body(transfer.body).await.expect("payload");

        let mut events = Vec::new();
        while let Some(event) = sub.recv().await {
            events.push(event);
        }

        // No derived percents without a declared duration: start, the
        // 100-percent completion, and the terminal only.
        assert!(events.iter().all(|e| e.current_time.is_none()));
        assert_eq!(events.last().expect("terminal").status, ProgressStatus::Finished);
    }
}

mod transform_failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_nonzero_exit_fails_the_transfer() {
        let dir = TempDir::new().expect("temp dir");
        // Consumes its input, then dies without producing a payload.
        let transform = fake_transform(&dir, "#!/bin/sh\ncat <&3 > /dev/null\nexit 3\n");

        let provider = Arc::new(ScriptedProvider::new(
            media_catalog(Some(120.0)),
            &[("251", b"opus-audio-bytes")],
        ));
        let bus = Arc::new(ProgressBus::new());
        let service = TransferService::new(Arc::clone(&provider) as _, Arc::clone(&bus), transform);

        let mut sub = bus.subscribe("abc123DEF01");
        let transfer = service
            .start(request("251", None, TransferKind::Audio))
            .await
            .expect("launch succeeds, failure comes later");
        assert_eq!(transfer.file_name, "Fixture Clip.mp3");

        let outcome = collect_body(transfer.body).await;
        assert!(outcome.is_err(), "body must end in an error");

        let mut terminal = None;
        while let Some(event) = sub.recv().await {
            if event.is_terminal() {
                terminal = Some(event);
            }
        }
        let terminal = terminal.expect("terminal event");
        assert_eq!(terminal.status, ProgressStatus::Error);
        assert!(
            terminal
                .error
                .as_deref()
                .expect("error reason")
                .contains("status 3")
        );
        assert!(!bus.is_active("abc123DEF01"));
    }

    #[tokio::test]
    async fn test_unknown_encoding_never_reaches_the_transform() {
        let dir = TempDir::new().expect("temp dir");
        // Leaves a marker behind if it ever runs.
        let transform = fake_transform(&dir, "#!/bin/sh\ntouch \"$(dirname \"$0\")/executed\"\n");

        let provider = Arc::new(ScriptedProvider::new(media_catalog(Some(120.0)), &[]));
        let bus = Arc::new(ProgressBus::new());
        let service = TransferService::new(Arc::clone(&provider) as _, Arc::clone(&bus), transform);

        let err = service
            .start(request("999", Some("140"), TransferKind::Video))
            .await
            .expect_err("unknown encoding");
        assert!(matches!(err, decant::Error::NotFound(_)));

        assert_eq!(provider.open_calls.load(Ordering::SeqCst), 0);
        assert!(!bus.is_active("abc123DEF01"));
        assert!(
            !dir.path().join("executed").exists(),
            "transform must not have been spawned"
        );
    }
}

mod passthrough_tests {
    use super::*;

    #[tokio::test]
    async fn test_progressive_download_counts_every_chunk() {
        let dir = TempDir::new().expect("temp dir");
        let transform = fake_transform(&dir, "#!/bin/sh\nexit 9\n");

        let provider = Arc::new(ScriptedProvider::new(
            media_catalog(Some(120.0)),
            &[("18", b"twelve bytes")],
        ));
        let bus = Arc::new(ProgressBus::new());
        let service = TransferService::new(Arc::clone(&provider) as _, Arc::clone(&bus), transform);

        let mut sub = bus.subscribe("abc123DEF01");
        let transfer = service
            .start(request("18", None, TransferKind::Video))
            .await
            .expect("start passthrough");

        let delivered = collect_body(transfer.body).await.expect("payload");
        assert_eq!(delivered, b"twelve bytes");

        let mut events = Vec::new();
        while let Some(event) = sub.recv().await {
            events.push(event);
        }

        let downloading: Vec<_> = events
            .iter()
            .filter(|e| e.status == ProgressStatus::Downloading)
            .collect();
        assert_eq!(downloading.len(), 3, "12 bytes in 4-byte chunks");
        let last = downloading.last().expect("byte progress");
        assert_eq!(last.progress, 100);
        assert_eq!(last.downloaded, Some(12));
        assert_eq!(last.total, Some(12));

        assert_eq!(events.last().expect("terminal").status, ProgressStatus::Finished);
    }
}
