//! Transfer orchestration.
//!
//! Turns a selected [`TransferPlan`] into live plumbing: upstream byte
//! streams, the transform process with its input pipes, the copy loops, and
//! progress publication. `start` returns as soon as response headers can be
//! decided; everything afterwards flows through the returned body stream,
//! and failures past that point reach clients through the progress channel.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use catalog::{CatalogProvider, Encoding, EncodingStream};

use crate::error::{Error, Result};
use crate::progress::{ProgressBus, ProgressEvent, ProgressPublisher, TransferPhase};
use crate::transfer::counter::ByteProgress;
use crate::transfer::diagnostics::DiagnosticProgress;
use crate::transfer::plan::{TransferKind, TransferPlan};
use crate::transfer::transform::{
    TransformConfig, TransformProcess, audio_transcode_args, mux_args, spawn_transform_waiter,
};
use crate::utils::filename::sanitize_filename;

/// Chunks buffered between the transfer tasks and the HTTP sink. Kept small
/// so sink backpressure reaches the copy loops and, through the pipes, the
/// transform itself.
const CONDUIT_CAPACITY: usize = 8;

/// A download request as the HTTP layer hands it over.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub media_id: String,
    pub encoding_id: String,
    /// Companion audio encoding for muxing video-only renditions.
    pub audio_encoding_id: Option<String>,
    pub kind: TransferKind,
    /// Client-chosen progress channel key. The media id is used when absent,
    /// which means two concurrent transfers of the same media share a
    /// channel unless clients pick distinct tickets.
    pub ticket: Option<String>,
}

impl DownloadRequest {
    pub fn progress_key(&self) -> &str {
        self.ticket.as_deref().unwrap_or(&self.media_id)
    }
}

/// A started transfer: decided headers plus the byte stream to copy out.
///
/// Dropping the body (client disconnect) releases the conduit, which stops
/// the copy loops on their next send and tears the rest down.
#[derive(Debug)]
pub struct TransferStream {
    pub file_name: String,
    pub content_type: &'static str,
    pub body: ReceiverStream<io::Result<Bytes>>,
}

/// First-error-wins coordinator shared by every task of one transfer.
///
/// The first `trip` records its error and cancels the token, which kills the
/// transform and unblocks the other legs; their subsequent trips are
/// swallowed. The supervisor reads the slot once after all legs finish.
struct FirstFailure {
    slot: Mutex<Option<Error>>,
    token: CancellationToken,
}

impl FirstFailure {
    fn new(token: CancellationToken) -> Self {
        Self {
            slot: Mutex::new(None),
            token,
        }
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn trip(&self, error: Error) {
        {
            let mut slot = self.slot.lock();
            if slot.is_none() {
                *slot = Some(error);
            }
        }
        self.token.cancel();
    }

    fn take(&self) -> Option<Error> {
        self.slot.lock().take()
    }
}

/// Orchestrates downloads end to end.
pub struct TransferService {
    catalog: Arc<dyn CatalogProvider>,
    bus: Arc<ProgressBus>,
    transform: TransformConfig,
}

impl TransferService {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        bus: Arc<ProgressBus>,
        transform: TransformConfig,
    ) -> Self {
        Self {
            catalog,
            bus,
            transform,
        }
    }

    /// Resolve the request, pick a strategy, and launch the transfer.
    ///
    /// Returns once headers can be written. Unknown ids surface as
    /// `NotFound` before any side effect; upstream and spawn failures after
    /// the progress channel exists also publish a terminal error event so
    /// subscribers are not left hanging.
    pub async fn start(&self, request: DownloadRequest) -> Result<TransferStream> {
        let transfer_id = Uuid::new_v4();
        let media = self.catalog.fetch_media(&request.media_id).await?;

        let primary = media
            .encoding(&request.encoding_id)
            .cloned()
            .ok_or_else(|| {
                Error::not_found(format!(
                    "encoding '{}' of media '{}'",
                    request.encoding_id, request.media_id
                ))
            })?;
        let audio = match &request.audio_encoding_id {
            Some(id) => Some(media.encoding(id).cloned().ok_or_else(|| {
                Error::not_found(format!(
                    "encoding '{}' of media '{}'",
                    id, request.media_id
                ))
            })?),
            None => None,
        };

        let plan = TransferPlan::select(request.kind, &primary, audio.as_ref());
        let phase = plan.phase();
        let file_name = format!(
            "{}.{}",
            sanitize_filename(&media.title),
            plan.file_extension()
        );
        let content_type = plan.content_type();

        info!(
            %transfer_id,
            media_id = %request.media_id,
            encoding_id = %request.encoding_id,
            plan = plan.name(),
            key = request.progress_key(),
            "starting transfer"
        );

        let publisher = Arc::new(self.bus.publisher(request.progress_key()));
        let (conduit, sink) = mpsc::channel::<io::Result<Bytes>>(CONDUIT_CAPACITY);

        let launched = match plan {
            TransferPlan::Direct { encoding } | TransferPlan::Fallback { encoding } => {
                self.launch_passthrough(transfer_id, encoding, Arc::clone(&publisher), conduit)
                    .await
            }
            TransferPlan::MuxAv { video, audio } => {
                self.launch_transform(
                    transfer_id,
                    phase,
                    vec![video, audio],
                    mux_args(),
                    Arc::clone(&publisher),
                    conduit,
                )
                .await
            }
            TransferPlan::TranscodeAudio { encoding } => {
                self.launch_transform(
                    transfer_id,
                    phase,
                    vec![encoding],
                    audio_transcode_args(),
                    Arc::clone(&publisher),
                    conduit,
                )
                .await
            }
        };

        if let Err(error) = launched {
            warn!(%transfer_id, %error, "transfer failed to launch");
            publisher.publish(ProgressEvent::failed(Some(phase), error.to_string()));
            return Err(error);
        }

        Ok(TransferStream {
            file_name,
            content_type,
            body: ReceiverStream::new(sink),
        })
    }

    /// Copy one encoding straight to the sink, counting bytes as they pass.
    async fn launch_passthrough(
        &self,
        transfer_id: Uuid,
        encoding: Encoding,
        publisher: Arc<ProgressPublisher>,
        conduit: mpsc::Sender<io::Result<Bytes>>,
    ) -> Result<()> {
        let source = self.catalog.open_stream(&encoding).await?;
        let mut counter = ByteProgress::new(source.content_length);
        let mut bytes = source.bytes;

        tokio::spawn(async move {
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        if let Some(update) = counter.observe(chunk.len()) {
                            publisher.publish(ProgressEvent::downloading(
                                update.progress,
                                update.downloaded,
                                update.total,
                                update.speed,
                            ));
                        }
                        if conduit.send(Ok(chunk)).await.is_err() {
                            debug!(%transfer_id, "client disconnected during passthrough");
                            return;
                        }
                    }
                    Err(error) => {
                        warn!(%transfer_id, %error, "source stream failed");
                        publisher.publish(ProgressEvent::failed(
                            Some(TransferPhase::Downloading),
                            error.to_string(),
                        ));
                        let _ = conduit.send(Err(io::Error::other(error.to_string()))).await;
                        return;
                    }
                }
            }
            debug!(%transfer_id, delivered = counter.downloaded(), "passthrough complete");
            publisher.publish(ProgressEvent::finished(TransferPhase::Downloading));
        });

        Ok(())
    }

    /// Spawn the transform and wire its legs: one feed per input pipe, the
    /// stdout pump, the stderr diagnostics reader, and a supervisor that
    /// joins them and publishes the terminal event exactly once.
    async fn launch_transform(
        &self,
        transfer_id: Uuid,
        phase: TransferPhase,
        inputs: Vec<Encoding>,
        args: Vec<String>,
        publisher: Arc<ProgressPublisher>,
        conduit: mpsc::Sender<io::Result<Bytes>>,
    ) -> Result<()> {
        let mut sources = Vec::with_capacity(inputs.len());
        for encoding in &inputs {
            sources.push(self.catalog.open_stream(encoding).await?);
        }
        // The first input labels the transfer; its declared duration drives
        // time-counted progress.
        let duration = inputs[0].duration_secs;

        let process = TransformProcess::spawn(&self.transform, &args, sources.len())?;
        let TransformProcess {
            child,
            inputs: pipes,
            stdout,
            stderr,
        } = process;
        debug!(%transfer_id, inputs = pipes.len(), "transform spawned");

        publisher.publish(ProgressEvent::starting(phase));

        let failure = Arc::new(FirstFailure::new(CancellationToken::new()));
        let exit_rx = spawn_transform_waiter(child, failure.token());

        let mut feeds = Vec::with_capacity(sources.len());
        for (source, pipe) in sources.into_iter().zip(pipes) {
            feeds.push(spawn_feed(source, pipe, Arc::clone(&failure)));
        }
        let output = spawn_output_pump(stdout, conduit.clone(), Arc::clone(&failure));
        let diagnostics = spawn_diagnostics_reader(
            stderr,
            phase,
            DiagnosticProgress::new(duration),
            Arc::clone(&publisher),
        );

        tokio::spawn(async move {
            for feed in feeds {
                let _ = feed.await;
            }
            let exit_code = exit_rx.await.unwrap_or(None);
            let _ = output.await;
            let _ = diagnostics.await;

            match (failure.take(), exit_code) {
                (Some(Error::ClientDisconnect), _) => {
                    debug!(%transfer_id, "client disconnected, transform abandoned");
                }
                (Some(error), _) => {
                    warn!(%transfer_id, %error, "transform transfer failed");
                    let _ = conduit.send(Err(io::Error::other(error.to_string()))).await;
                    publisher.publish(ProgressEvent::failed(Some(phase), error.to_string()));
                }
                (None, Some(0)) => {
                    info!(%transfer_id, "transform complete");
                    publisher.publish(ProgressEvent::phase_complete(phase, duration));
                    publisher.publish(ProgressEvent::finished(phase));
                }
                (None, code) => {
                    let reason = match code {
                        Some(code) => format!("transform exited with status {code}"),
                        None => "transform terminated by signal".to_string(),
                    };
                    warn!(%transfer_id, reason, "transform failed");
                    let _ = conduit.send(Err(io::Error::other(reason.clone()))).await;
                    publisher.publish(ProgressEvent::failed(Some(phase), reason));
                }
            }
        });

        Ok(())
    }
}

/// Copy one upstream byte stream into a transform input pipe. Dropping the
/// writer at the end closes that input so the transform can finish.
fn spawn_feed(
    source: EncodingStream,
    mut pipe: pipe::Sender,
    failure: Arc<FirstFailure>,
) -> JoinHandle<()> {
    let token = failure.token();
    tokio::spawn(async move {
        let mut bytes = source.bytes;
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => break,
                chunk = bytes.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            match chunk {
                Ok(chunk) => {
                    let write = tokio::select! {
                        _ = token.cancelled() => break,
                        result = pipe.write_all(&chunk) => result,
                    };
                    if let Err(error) = write {
                        failure.trip(Error::transform_runtime(format!(
                            "transform input closed early: {error}"
                        )));
                        break;
                    }
                }
                Err(error) => {
                    failure.trip(error.into());
                    break;
                }
            }
        }
    })
}

/// Forward transform stdout to the HTTP sink. A refused send means the
/// client went away; that trips the coordinator so the whole transfer winds
/// down.
fn spawn_output_pump(
    stdout: ChildStdout,
    conduit: mpsc::Sender<io::Result<Bytes>>,
    failure: Arc<FirstFailure>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut produced = ReaderStream::new(stdout);
        while let Some(chunk) = produced.next().await {
            match chunk {
                Ok(chunk) => {
                    if conduit.send(Ok(chunk)).await.is_err() {
                        failure.trip(Error::ClientDisconnect);
                        break;
                    }
                }
                Err(error) => {
                    failure.trip(Error::transform_runtime(format!(
                        "transform output failed: {error}"
                    )));
                    break;
                }
            }
        }
    })
}

/// Read transform diagnostics line by line, publishing derived progress.
///
/// Runs until stderr hits EOF, which every path guarantees: the process
/// either exits on its own or the waiter kills it once the failure token
/// trips. Draining to EOF keeps the last progress line ahead of the
/// completion events.
fn spawn_diagnostics_reader(
    stderr: ChildStderr,
    phase: TransferPhase,
    mut progress: DiagnosticProgress,
    publisher: Arc<ProgressPublisher>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            trace!(line, "transform diagnostics");
            if let Some((percent, elapsed)) = progress.observe(&line) {
                publisher.publish(ProgressEvent::transforming(
                    phase,
                    percent,
                    elapsed,
                    progress.duration_secs(),
                ));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressStatus;
    use async_trait::async_trait;
    use catalog::{CatalogError, MediaCatalog};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn enc(id: &str, container: &str, has_audio: bool, has_video: bool) -> Encoding {
        Encoding {
            id: id.to_string(),
            container: container.to_string(),
            has_audio,
            has_video,
            quality_label: has_video.then(|| "1080p".to_string()),
            bitrate: Some(2500.0),
            audio_bitrate: has_audio.then_some(128.0),
            content_length: None,
            duration_secs: Some(120.0),
            url: format!("https://cdn.example/{id}"),
            http_headers: HashMap::new(),
        }
    }

    fn media() -> MediaCatalog {
        MediaCatalog {
            media_id: "vid1".to_string(),
            title: "Test Media".to_string(),
            channel: Some("tester".to_string()),
            description: None,
            thumbnail_url: None,
            view_count: Some(42),
            duration_secs: Some(120.0),
            encodings: vec![
                enc("18", "mp4", true, true),
                enc("137", "mp4", false, true),
                enc("140", "m4a", true, false),
            ],
        }
    }

    struct FakeProvider {
        media: MediaCatalog,
        chunks: Vec<Bytes>,
        endless: bool,
        open_calls: AtomicUsize,
    }

    impl FakeProvider {
        fn with_chunks(chunks: Vec<Bytes>) -> Self {
            Self {
                media: media(),
                chunks,
                endless: false,
                open_calls: AtomicUsize::new(0),
            }
        }

        fn endless() -> Self {
            Self {
                media: media(),
                chunks: Vec::new(),
                endless: true,
                open_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogProvider for FakeProvider {
        async fn fetch_media(&self, media_id: &str) -> std::result::Result<MediaCatalog, CatalogError> {
            if media_id == self.media.media_id {
                Ok(self.media.clone())
            } else {
                Err(CatalogError::NotFound(media_id.to_string()))
            }
        }

        async fn open_stream(
            &self,
            _encoding: &Encoding,
        ) -> std::result::Result<EncodingStream, CatalogError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            if self.endless {
                let chunk = Bytes::from(vec![0u8; 1024]);
                let bytes = futures::stream::repeat_with(move || Ok(chunk.clone())).boxed();
                return Ok(EncodingStream {
                    bytes,
                    content_length: None,
                });
            }
            let total: u64 = self.chunks.iter().map(|c| c.len() as u64).sum();
            let bytes = futures::stream::iter(self.chunks.clone().into_iter().map(Ok)).boxed();
            Ok(EncodingStream {
                bytes,
                content_length: Some(total),
            })
        }
    }

    fn request(
        media_id: &str,
        encoding_id: &str,
        audio: Option<&str>,
        kind: TransferKind,
    ) -> DownloadRequest {
        DownloadRequest {
            media_id: media_id.to_string(),
            encoding_id: encoding_id.to_string(),
            audio_encoding_id: audio.map(str::to_string),
            kind,
            ticket: None,
        }
    }

    async fn collect_body(mut body: ReceiverStream<io::Result<Bytes>>) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    fn service(provider: Arc<FakeProvider>, bus: Arc<ProgressBus>) -> TransferService {
        TransferService::new(provider, bus, TransformConfig::default())
    }

    #[tokio::test]
    async fn test_passthrough_delivers_bytes_and_progress() {
        let provider = Arc::new(FakeProvider::with_chunks(vec![
            Bytes::from_static(b"aaaa"),
            Bytes::from_static(b"bbbb"),
            Bytes::from_static(b"cc"),
        ]));
        let bus = Arc::new(ProgressBus::new());
        let service = service(Arc::clone(&provider), Arc::clone(&bus));

        let mut sub = bus.subscribe("vid1");
        let transfer = service
            .start(request("vid1", "18", None, TransferKind::Video))
            .await
            .expect("start");
        assert_eq!(transfer.file_name, "Test Media.mp4");
        assert_eq!(transfer.content_type, "video/mp4");

        let delivered = collect_body(transfer.body).await.expect("body");
        assert_eq!(delivered, b"aaaabbbbcc");

        let mut events = Vec::new();
        while let Some(event) = sub.recv().await {
            events.push(event);
        }
        let last = events.last().expect("events published");
        assert_eq!(last.status, ProgressStatus::Finished);
        assert_eq!(last.progress, 100);

        let downloading: Vec<_> = events
            .iter()
            .filter(|e| e.status == ProgressStatus::Downloading)
            .collect();
        assert_eq!(downloading.len(), 3, "one event per chunk");
        assert_eq!(downloading.last().expect("chunks").progress, 100);
        assert_eq!(downloading.last().expect("chunks").downloaded, Some(10));
        assert!(!bus.is_active("vid1"));
    }

    #[tokio::test]
    async fn test_unknown_media_is_not_found() {
        let provider = Arc::new(FakeProvider::with_chunks(vec![]));
        let bus = Arc::new(ProgressBus::new());
        let service = service(Arc::clone(&provider), Arc::clone(&bus));

        let err = service
            .start(request("nope", "18", None, TransferKind::Video))
            .await
            .expect_err("unknown media");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_encoding_has_no_side_effects() {
        let provider = Arc::new(FakeProvider::with_chunks(vec![]));
        let bus = Arc::new(ProgressBus::new());
        let service = service(Arc::clone(&provider), Arc::clone(&bus));

        let err = service
            .start(request("vid1", "999", None, TransferKind::Video))
            .await
            .expect_err("unknown encoding");
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(provider.open_calls.load(Ordering::SeqCst), 0);
        assert!(!bus.is_active("vid1"));
    }

    #[tokio::test]
    async fn test_disconnect_retires_channel_without_terminal() {
        let provider = Arc::new(FakeProvider::endless());
        let bus = Arc::new(ProgressBus::new());
        let service = service(Arc::clone(&provider), Arc::clone(&bus));

        let mut sub = bus.subscribe("vid1");
        let transfer = service
            .start(request("vid1", "18", None, TransferKind::Video))
            .await
            .expect("start");

        let mut body = transfer.body;
        let first = body.next().await.expect("chunk").expect("bytes");
        assert!(!first.is_empty());
        drop(body);

        // The copy task notices on its next send and retires the channel
        // without publishing a terminal event.
        let saw_terminal = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = sub.recv().await {
                if event.is_terminal() {
                    return true;
                }
            }
            false
        })
        .await
        .expect("subscription should close after disconnect");
        assert!(!saw_terminal);
        assert!(!bus.is_active("vid1"));
    }

    #[tokio::test]
    async fn test_transform_spawn_failure_reports_both_ways() {
        let provider = Arc::new(FakeProvider::with_chunks(vec![Bytes::from_static(b"x")]));
        let bus = Arc::new(ProgressBus::new());
        let service = TransferService::new(
            Arc::clone(&provider) as Arc<dyn CatalogProvider>,
            Arc::clone(&bus),
            TransformConfig {
                binary: "/nonexistent/transform-binary".into(),
            },
        );

        let mut sub = bus.subscribe("vid1");
        let err = service
            .start(request("vid1", "137", Some("140"), TransferKind::Video))
            .await
            .expect_err("spawn must fail");
        assert!(matches!(err, Error::TransformSpawn(_)));

        let event = sub.recv().await.expect("error event");
        assert_eq!(event.status, ProgressStatus::Error);
        assert!(event.error.as_deref().expect("reason").contains("spawn"));
        assert!(sub.recv().await.is_none());
        assert!(!bus.is_active("vid1"));
    }

    #[tokio::test]
    async fn test_ticket_overrides_progress_key() {
        let provider = Arc::new(FakeProvider::with_chunks(vec![Bytes::from_static(b"data")]));
        let bus = Arc::new(ProgressBus::new());
        let service = service(Arc::clone(&provider), Arc::clone(&bus));

        let mut sub = bus.subscribe("job-7");
        let mut req = request("vid1", "18", None, TransferKind::Video);
        req.ticket = Some("job-7".to_string());

        let transfer = service.start(req).await.expect("start");
        collect_body(transfer.body).await.expect("body");

        let mut saw_terminal = false;
        while let Some(event) = sub.recv().await {
            saw_terminal |= event.is_terminal();
        }
        assert!(saw_terminal, "events must arrive on the ticket channel");
        assert!(!bus.is_active("job-7"));
        assert!(!bus.is_active("vid1"));
    }
}
