//! Background compute workers
//!
//! Each worker is one named thread fed through a request channel and
//! answering on a response channel. Workers own no scene state and only
//! exchange plain data. Requests carry a generation number; the caller
//! discards responses whose generation is no longer current.
//!
//! Dropping a worker cancels it and detaches the thread without joining, so
//! teardown on the main schedule never waits for a request in flight. A
//! detached thread exits at its next cancellation check and anything it
//! still produces goes nowhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use bevy::log::{debug, error, warn};
use crossbeam_channel::{unbounded, Receiver, Sender};
use rayon::prelude::*;

use super::attachment::Attachment;
use super::dataset::{parse_dataset, Dataset, Spline};
use super::fetch::{ApiClient, FetchError};
use super::geometry::{normalize, Bounds, GeometryError, NormalizationScope, NormalizedSet};
use super::mesh_asset::{decode_gltf, MeshAsset, MeshDecodeError};

/// Cooperative cancellation flag shared with a worker thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Failure reported by a worker as a message payload
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkerError {
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("geometry error: {0}")]
    Geometry(String),
    #[error("worker disconnected")]
    Disconnected,
}

impl From<FetchError> for WorkerError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Json { .. } => WorkerError::Decode(err.to_string()),
            other => WorkerError::Network(other.to_string()),
        }
    }
}

impl From<GeometryError> for WorkerError {
    fn from(err: GeometryError) -> Self {
        WorkerError::Geometry(err.to_string())
    }
}

/// Internal message for worker threads
enum WorkerMessage<Req> {
    Job(Req),
    Shutdown,
}

/// A single background thread processing requests one at a time
pub struct Worker<Req, Resp> {
    name: String,
    request_sender: Sender<WorkerMessage<Req>>,
    response_receiver: Receiver<Resp>,
    cancel: CancelToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl<Req, Resp> Worker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Start the thread. `handler` runs once per request.
    pub fn spawn<F>(name: &str, mut handler: F) -> std::io::Result<Self>
    where
        F: FnMut(Req, &CancelToken) -> Resp + Send + 'static,
    {
        let (request_tx, request_rx) = unbounded::<WorkerMessage<Req>>();
        let (response_tx, response_rx) = unbounded::<Resp>();
        let cancel = CancelToken::new();
        let thread_cancel = cancel.clone();
        let thread_name = name.to_string();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!("Worker {} started", thread_name);
                while let Ok(message) = request_rx.recv() {
                    let request = match message {
                        WorkerMessage::Job(request) => request,
                        WorkerMessage::Shutdown => break,
                    };
                    if thread_cancel.is_cancelled() {
                        break;
                    }
                    let response = handler(request, &thread_cancel);
                    if thread_cancel.is_cancelled() {
                        break;
                    }
                    if response_tx.send(response).is_err() {
                        warn!("Worker {} has no listener, stopping", thread_name);
                        break;
                    }
                }
                debug!("Worker {} exited", thread_name);
            })?;

        Ok(Self {
            name: name.to_string(),
            request_sender: request_tx,
            response_receiver: response_rx,
            cancel,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a request
    pub fn send(&self, request: Req) -> Result<(), WorkerError> {
        self.request_sender
            .send(WorkerMessage::Job(request))
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Non-blocking poll for the next response
    pub fn try_recv(&self) -> Option<Resp> {
        self.response_receiver.try_recv().ok()
    }

    /// Everything that arrived since the last poll
    pub fn drain(&self) -> Vec<Resp> {
        self.response_receiver.try_iter().collect()
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| !thread.is_finished())
            .unwrap_or(false)
    }

    /// Cancel in-flight work and join the thread. Blocks until the current
    /// request returns; dropping the worker does not.
    pub fn terminate(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.cancel.cancel();
        let _ = self.request_sender.send(WorkerMessage::Shutdown);
        if thread.join().is_err() {
            error!("Worker {} panicked", self.name);
        }
        debug!("Worker {} terminated", self.name);
    }
}

impl<Req, Resp> Drop for Worker<Req, Resp> {
    fn drop(&mut self) {
        self.cancel.cancel();
        let _ = self.request_sender.send(WorkerMessage::Shutdown);
        if self.thread.take().is_some() {
            debug!("Worker {} detached", self.name);
        }
    }
}

// ---------------------------------------------------------------------------
// Fetch-and-classify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub generation: u64,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct ClassifyResponse {
    pub generation: u64,
    pub outcome: Result<Dataset, WorkerError>,
}

pub type ClassifyWorker = Worker<ClassifyRequest, ClassifyResponse>;

/// Download a dataset and classify it
pub fn fetch_and_classify(
    client: &ApiClient,
    href: &str,
    cancel: &CancelToken,
) -> Result<Dataset, WorkerError> {
    let url = client.resolve(href)?;
    let bytes = client.get_bytes(&url, cancel, |_, _| {})?;
    parse_dataset(&bytes).map_err(|err| WorkerError::Decode(err.to_string()))
}

pub fn spawn_classify_worker(client: ApiClient) -> std::io::Result<ClassifyWorker> {
    Worker::spawn("classify-worker", move |request: ClassifyRequest, cancel| {
        let outcome = fetch_and_classify(&client, &request.href, cancel);
        if let Err(err) = &outcome {
            error!("Fetching dataset {} failed: {}", request.href, err);
        }
        ClassifyResponse {
            generation: request.generation,
            outcome,
        }
    })
}

// ---------------------------------------------------------------------------
// Normalize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NormalizeRequest {
    pub generation: u64,
    pub splines: Vec<Spline>,
    pub target_extent: f32,
    pub scope: NormalizationScope,
}

/// A spline after normalization, with the transform that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSpline {
    pub label: String,
    pub points: Vec<bevy::math::Vec3>,
    pub scale: f32,
    pub center: bevy::math::Vec3,
}

#[derive(Debug, Clone)]
pub struct NormalizeResponse {
    pub generation: u64,
    pub outcome: Result<Vec<NormalizedSpline>, WorkerError>,
}

pub type NormalizeWorker = Worker<NormalizeRequest, NormalizeResponse>;

/// Normalize when the bounds have extent, otherwise only recenter.
/// A lone landmark or a set of coincident points keeps scale 1.
fn fit_or_recenter(
    point_sets: &[Vec<bevy::math::Vec3>],
    target_extent: f32,
) -> Result<NormalizedSet, GeometryError> {
    let bounds =
        Bounds::from_points(point_sets.iter().flatten().copied()).ok_or(GeometryError::Empty)?;
    if bounds.is_normalizable() {
        return normalize(point_sets, target_extent);
    }

    let center = bounds.center();
    if !center.is_finite() {
        return Err(GeometryError::Degenerate {
            max_dimension: bounds.max_dimension(),
        });
    }
    debug!("Point set has no extent, recentering at {:?} without scaling", center);
    Ok(NormalizedSet {
        points: point_sets
            .iter()
            .map(|set| set.iter().map(|&p| p - center).collect())
            .collect(),
        scale: 1.0,
        center,
    })
}

/// Normalize a spline set under the given scope
pub fn normalize_splines(
    splines: &[Spline],
    target_extent: f32,
    scope: NormalizationScope,
) -> Result<Vec<NormalizedSpline>, GeometryError> {
    if splines.is_empty() {
        return Ok(Vec::new());
    }
    match scope {
        NormalizationScope::Global => {
            let sets: Vec<_> = splines.iter().map(|s| s.points.clone()).collect();
            let normalized = fit_or_recenter(&sets, target_extent)?;
            Ok(splines
                .iter()
                .zip(normalized.points)
                .map(|(spline, points)| NormalizedSpline {
                    label: spline.label.clone(),
                    points,
                    scale: normalized.scale,
                    center: normalized.center,
                })
                .collect())
        }
        NormalizationScope::PerSpline => splines
            .par_iter()
            .map(|spline| {
                let normalized =
                    fit_or_recenter(std::slice::from_ref(&spline.points), target_extent)?;
                Ok(NormalizedSpline {
                    label: spline.label.clone(),
                    points: normalized.points.into_iter().next().unwrap_or_default(),
                    scale: normalized.scale,
                    center: normalized.center,
                })
            })
            .collect(),
    }
}

pub fn spawn_normalize_worker() -> std::io::Result<NormalizeWorker> {
    Worker::spawn("normalize-worker", |request: NormalizeRequest, _cancel| {
        let outcome = normalize_splines(&request.splines, request.target_extent, request.scope)
            .map_err(WorkerError::from);
        NormalizeResponse {
            generation: request.generation,
            outcome,
        }
    })
}

// ---------------------------------------------------------------------------
// Mesh load
// ---------------------------------------------------------------------------

/// Event streamed from a mesh load thread
#[derive(Debug)]
pub enum MeshLoadEvent {
    Progress { loaded: u64, total: Option<u64> },
    Loaded(Box<MeshAsset>),
    Failed(WorkerError),
}

/// Download and decode a glTF asset, reporting transfer progress.
/// Relative buffer URIs are fetched relative to the asset URL.
pub fn load_mesh<F>(
    client: &ApiClient,
    href: &str,
    cancel: &CancelToken,
    on_progress: F,
) -> Result<MeshAsset, WorkerError>
where
    F: FnMut(u64, Option<u64>),
{
    let url = client.resolve(href)?;
    let bytes = client.get_bytes(&url, cancel, on_progress)?;

    decode_gltf(&bytes, |uri| {
        let buffer_url = url.join(uri).map_err(|err| MeshDecodeError::ExternalBuffer {
            uri: uri.to_string(),
            reason: err.to_string(),
        })?;
        client
            .get_bytes(&buffer_url, cancel, |_, _| {})
            .map_err(|err| MeshDecodeError::ExternalBuffer {
                uri: uri.to_string(),
                reason: err.to_string(),
            })
    })
    .map_err(|err| match err {
        MeshDecodeError::ExternalBuffer { .. } => WorkerError::Network(err.to_string()),
        other => WorkerError::Decode(other.to_string()),
    })
}

/// One in-flight mesh download on its own thread
pub struct MeshLoadJob {
    href: String,
    events: Receiver<MeshLoadEvent>,
    cancel: CancelToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl MeshLoadJob {
    pub fn spawn(client: ApiClient, href: &str) -> std::io::Result<Self> {
        let (event_tx, event_rx) = unbounded();
        let cancel = CancelToken::new();
        let thread_cancel = cancel.clone();
        let thread_href = href.to_string();

        let thread = thread::Builder::new()
            .name("mesh-loader".to_string())
            .spawn(move || {
                let progress_tx = event_tx.clone();
                let result = load_mesh(&client, &thread_href, &thread_cancel, |loaded, total| {
                    let _ = progress_tx.send(MeshLoadEvent::Progress { loaded, total });
                });
                if thread_cancel.is_cancelled() {
                    debug!("Mesh load of {} cancelled", thread_href);
                    return;
                }
                let event = match result {
                    Ok(asset) => MeshLoadEvent::Loaded(Box::new(asset)),
                    Err(err) => MeshLoadEvent::Failed(err),
                };
                let _ = event_tx.send(event);
            })?;

        Ok(Self {
            href: href.to_string(),
            events: event_rx,
            cancel,
            thread: Some(thread),
        })
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    /// Events received since the last poll
    pub fn poll(&self) -> Vec<MeshLoadEvent> {
        self.events.try_iter().collect()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Job fed from an existing channel, with no thread behind it
    #[cfg(test)]
    pub(crate) fn from_events(href: &str, events: Receiver<MeshLoadEvent>) -> Self {
        Self {
            href: href.to_string(),
            events,
            cancel: CancelToken::new(),
            thread: None,
        }
    }
}

impl Drop for MeshLoadJob {
    fn drop(&mut self) {
        self.cancel.cancel();
        if self.thread.take().is_some() {
            debug!("Mesh load of {} detached", self.href);
        }
    }
}

// ---------------------------------------------------------------------------
// Attachment index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub owner_id: String,
}

#[derive(Debug, Clone)]
pub struct IndexResponse {
    pub owner_id: String,
    pub attachments: Result<Vec<Attachment>, WorkerError>,
    pub patient: Option<serde_json::Value>,
}

pub type IndexWorker = Worker<IndexRequest, IndexResponse>;

pub fn spawn_index_worker(client: ApiClient) -> std::io::Result<IndexWorker> {
    Worker::spawn("index-worker", move |request: IndexRequest, cancel| {
        let attachments = client
            .list_attachments(&request.owner_id, cancel)
            .map_err(WorkerError::from);
        if let Err(err) = &attachments {
            error!("Listing attachments for {} failed: {}", request.owner_id, err);
        }
        let patient = match client.patient(&request.owner_id, cancel) {
            Ok(patient) => Some(patient),
            Err(err) => {
                warn!("Patient record {} unavailable: {}", request.owner_id, err);
                None
            }
        };
        IndexResponse {
            owner_id: request.owner_id,
            attachments,
            patient,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Vec3;
    use std::time::{Duration, Instant};

    fn recv_blocking<Req, Resp>(worker: &Worker<Req, Resp>) -> Resp
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(response) = worker.try_recv() {
                return response;
            }
            assert!(Instant::now() < deadline, "worker did not answer");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn spline(label: &str, points: &[[f32; 3]]) -> Spline {
        Spline {
            label: label.to_string(),
            points: points.iter().map(|p| Vec3::from_array(*p)).collect(),
        }
    }

    #[test]
    fn test_worker_round_trip_and_terminate() {
        let mut worker = Worker::spawn("echo", |x: u32, _| x * 2).unwrap();
        worker.send(21).unwrap();
        assert_eq!(recv_blocking(&worker), 42);
        assert!(worker.is_running());

        worker.terminate();
        assert!(!worker.is_running());
        assert_eq!(worker.send(1), Err(WorkerError::Disconnected));
    }

    #[test]
    fn test_drop_does_not_wait_for_busy_handler() {
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let worker = Worker::spawn("busy", move |x: u8, cancel| {
            let _ = started_tx.send(());
            let until = Instant::now() + Duration::from_secs(3);
            while Instant::now() < until && !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_secs(1));
            }
            x
        })
        .unwrap();
        worker.send(1).unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let start = Instant::now();
        drop(worker);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_global_scope_shares_scale() {
        let splines = vec![
            spline("small", &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]),
            spline("large", &[[0.0, 0.0, 0.0], [0.0, 10.0, 0.0]]),
        ];
        let result = normalize_splines(&splines, 200.0, NormalizationScope::Global).unwrap();

        assert_eq!(result[0].scale, result[1].scale);
        assert_eq!(result[0].center, result[1].center);
        assert!((result[0].scale - 20.0).abs() < 1e-4);
        // The small spline stays small next to the large one
        let small_len = result[0].points[0].distance(result[0].points[1]);
        assert!((small_len - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_per_spline_scope_fits_each() {
        let splines = vec![
            spline("small", &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]),
            spline("large", &[[0.0, 0.0, 0.0], [0.0, 10.0, 0.0]]),
        ];
        let result = normalize_splines(&splines, 200.0, NormalizationScope::PerSpline).unwrap();
        for normalized in &result {
            let len = normalized.points[0].distance(normalized.points[1]);
            assert!((len - 200.0).abs() < 1e-3);
        }
        assert_eq!(result[0].label, "small");
        assert_eq!(result[1].label, "large");
    }

    #[test]
    fn test_single_point_spline_under_both_scopes() {
        let splines = vec![
            spline("dot", &[[5.0, 5.0, 5.0]]),
            spline("line", &[[0.0, 0.0, 0.0], [10.0, 0.0, 0.0]]),
        ];
        let global = normalize_splines(&splines, 200.0, NormalizationScope::Global).unwrap();
        assert!((global[0].scale - 20.0).abs() < 1e-4);

        let per_spline = normalize_splines(&splines, 200.0, NormalizationScope::PerSpline).unwrap();
        assert_eq!(per_spline[0].scale, 1.0);
        assert_eq!(per_spline[0].center, Vec3::splat(5.0));
        assert_eq!(per_spline[0].points, vec![Vec3::ZERO]);
        let len = per_spline[1].points[0].distance(per_spline[1].points[1]);
        assert!((len - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_coincident_union_is_recentered_globally() {
        let splines = vec![
            spline("a", &[[2.0, 3.0, 4.0], [2.0, 3.0, 4.0]]),
            spline("b", &[[2.0, 3.0, 4.0]]),
        ];
        let result = normalize_splines(&splines, 200.0, NormalizationScope::Global).unwrap();
        assert_eq!(result.len(), 2);
        for normalized in &result {
            assert_eq!(normalized.scale, 1.0);
            assert!(normalized.points.iter().all(|p| *p == Vec3::ZERO));
        }
        assert!(normalize_splines(&[], 200.0, NormalizationScope::Global)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_normalize_worker_reports_geometry_errors() {
        let worker = spawn_normalize_worker().unwrap();
        worker
            .send(NormalizeRequest {
                generation: 3,
                splines: vec![spline("far", &[[f32::INFINITY, 1.0, 1.0]])],
                target_extent: 200.0,
                scope: NormalizationScope::Global,
            })
            .unwrap();

        let response = recv_blocking(&worker);
        assert_eq!(response.generation, 3);
        assert!(matches!(response.outcome, Err(WorkerError::Geometry(_))));
    }

    #[test]
    fn test_normalize_worker_keeps_generation() {
        let worker = spawn_normalize_worker().unwrap();
        for generation in [1, 2] {
            worker
                .send(NormalizeRequest {
                    generation,
                    splines: vec![spline("a", &[[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]])],
                    target_extent: 200.0,
                    scope: NormalizationScope::Global,
                })
                .unwrap();
        }
        assert_eq!(recv_blocking(&worker).generation, 1);
        assert_eq!(recv_blocking(&worker).generation, 2);
    }
}
