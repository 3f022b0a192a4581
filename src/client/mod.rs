//! Multi-connection client with a bounded frame cache.
//!
//! [`Client`] owns a small tokio runtime that drives every socket. Connection
//! tasks report to the client's shared state, where frames from redundant
//! links are arbitrated into one cache. Callers read that cache synchronously
//! with poll/wait, or asynchronously through [`Client::subscribe`].

mod arbiter;

pub use arbiter::FrameArbiter;

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::axis::{AxisMapping, AxisMappingError, Direction};
use crate::codec::ByteBuffer;
use crate::config::ClientConfig;
use crate::connection::{ConnectionContext, ConnectionDriver, ConnectionObserver, TcpSettings};
use crate::frame::{FramePair, FrameState};
use crate::objects::{
    Block, ControlMessage, DynamicObjects, FrameRequest, MulticastStart, ObjectKind, RequestSet,
    StaticObjects, StreamMode,
};
use crate::stream::ThrottleExt;
use crate::types::UpdateRate;
use crate::{Result, StreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Tcp,
    Multicast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkStatus {
    Connecting,
    Connected,
}

/// One live or pending connection.
struct Link {
    kind: LinkKind,
    endpoint: String,
    status: LinkStatus,
    /// Control channel; multicast receivers have none
    outgoing: Option<mpsc::UnboundedSender<ByteBuffer>>,
    /// Kinds the server advertised, once known
    supported: Option<BTreeSet<ObjectKind>>,
    cancel: CancellationToken,
}

struct ClientState {
    links: BTreeMap<usize, Link>,
    next_index: usize,
    arbiter: FrameArbiter,
    feedback: BTreeSet<u32>,
    stream_mode: StreamMode,
    multicast_controller: bool,
    /// Bumped whenever links are torn down, so waiters can tell
    disconnect_epoch: u64,
}

impl ClientState {
    fn has_tcp(&self) -> bool {
        self.links.values().any(|link| link.kind == LinkKind::Tcp)
    }

    /// Queue `message` on every TCP link. Returns how many accepted it.
    fn broadcast(&self, message: ControlMessage) -> usize {
        let buffer = Block::Control(message).to_buffer();
        self.links
            .values()
            .filter_map(|link| link.outgoing.as_ref())
            .filter(|outgoing| outgoing.send(buffer.clone()).is_ok())
            .count()
    }

    fn take_links(&mut self, kind: LinkKind) -> usize {
        let indices: Vec<usize> = self
            .links
            .iter()
            .filter(|(_, link)| link.kind == kind)
            .map(|(index, _)| *index)
            .collect();
        for index in &indices {
            if let Some(link) = self.links.remove(index) {
                debug!(index, endpoint = %link.endpoint, "Closing connection");
                link.cancel.cancel();
            }
            // Links that stay open keep their last frame ids
            self.arbiter.forget(*index);
        }
        if !indices.is_empty() {
            self.disconnect_epoch += 1;
        }
        indices.len()
    }
}

/// State shared between the caller-facing [`Client`] and its I/O tasks.
struct Shared {
    state: Mutex<ClientState>,
    frames_ready: Condvar,
    /// Newest accepted frame, for subscriptions
    latest: watch::Sender<Option<Arc<FramePair>>>,
    requests: watch::Sender<RequestSet>,
    mapping: watch::Sender<AxisMapping>,
}

impl ConnectionObserver for Shared {
    fn on_connected(&self, index: usize) {
        let mut state = self.state.lock();
        if let Some(link) = state.links.get_mut(&index) {
            link.status = LinkStatus::Connected;
            info!(index, endpoint = %link.endpoint, "Connected");
        }
    }

    fn on_capabilities(&self, index: usize, kinds: BTreeSet<ObjectKind>) {
        let mut state = self.state.lock();
        if let Some(link) = state.links.get_mut(&index) {
            debug!(index, kinds = kinds.len(), "Server capabilities received");
            link.supported = Some(kinds);
        }
    }

    fn on_static_objects(&self, index: usize, statics: Arc<StaticObjects>) {
        let mut state = self.state.lock();
        if state.links.contains_key(&index) {
            debug!(index, subjects = statics.subjects.len(), "Static objects updated");
            state.arbiter.set_static(statics);
        }
    }

    fn on_dynamic_objects(&self, index: usize, dynamics: Arc<DynamicObjects>) {
        let accepted = {
            let mut state = self.state.lock();
            if !state.links.contains_key(&index) {
                return;
            }
            let connection_count = state.links.len();
            state
                .arbiter
                .offer(index, connection_count, dynamics)
                .map(|pair| Arc::new(pair.clone()))
        };

        if let Some(pair) = accepted {
            trace!(index, frame = pair.dynamics.frame_number(), "Frame buffered");
            self.frames_ready.notify_all();
            self.latest.send_replace(Some(pair));
        }
    }

    fn on_disconnected(&self, index: usize) {
        {
            let mut state = self.state.lock();
            let Some(link) = state.links.remove(&index) else {
                return;
            };
            info!(index, endpoint = %link.endpoint, "Disconnected");
            state.arbiter.forget(index);
            if !state.has_tcp() {
                state.multicast_controller = false;
            }
            state.disconnect_epoch += 1;
        }
        self.frames_ready.notify_all();
    }
}

/// Streaming client for one or more capture servers.
///
/// All operations are synchronous and return without waiting on the network,
/// except [`wait_frame`](Self::wait_frame) and
/// [`wait_frames`](Self::wait_frames). Connection outcomes show up through
/// [`is_connected`](Self::is_connected) and the frames that arrive.
///
/// ```rust,no_run
/// use mocap_stream::{Client, ObjectKind};
/// use std::time::Duration;
///
/// let client = Client::new()?;
/// client.connect("localhost", 801)?;
/// client.set_request_type(ObjectKind::LabeledReconstructions, true)?;
///
/// let frame = client.wait_frame(Duration::from_secs(1))?;
/// println!("frame {} has {} markers", frame.frame_number, frame.labeled_reconstructions.len());
/// # Ok::<(), mocap_stream::StreamError>(())
/// ```
pub struct Client {
    shared: Arc<Shared>,
    config: ClientConfig,
    runtime: Option<Runtime>,
}

impl Client {
    /// Create a client with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let mapping = config.mapping()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mocap-stream-io")
            .enable_all()
            .build()
            .map_err(|source| StreamError::Runtime { source })?;

        let state = ClientState {
            links: BTreeMap::new(),
            next_index: 0,
            arbiter: FrameArbiter::new(config.buffer_size),
            feedback: BTreeSet::new(),
            stream_mode: config.stream_mode,
            multicast_controller: false,
            disconnect_epoch: 0,
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            frames_ready: Condvar::new(),
            latest: watch::channel(None).0,
            requests: watch::channel(config.request_types.clone()).0,
            mapping: watch::channel(mapping).0,
        });

        debug!(
            buffer_size = config.buffer_size,
            stream_mode = ?config.stream_mode,
            "Client created"
        );
        Ok(Self { shared, config, runtime: Some(runtime) })
    }

    fn context(&self, state: &mut ClientState, cancel: &CancellationToken) -> ConnectionContext {
        let index = state.next_index;
        state.next_index += 1;
        let observer: Arc<dyn ConnectionObserver> = self.shared.clone();
        ConnectionContext {
            index,
            requested: self.shared.requests.subscribe(),
            observer,
            cancel: cancel.clone(),
        }
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.runtime.as_ref().ok_or_else(|| StreamError::config("client runtime has shut down"))
    }

    /// Start connecting to a server. Returns the new connection's index.
    ///
    /// The connection sends the current request set, stream mode and device
    /// feedback state as soon as the socket is up.
    pub fn connect(&self, host: &str, port: u16) -> Result<usize> {
        let runtime = self.runtime()?.handle().clone();
        let settings = TcpSettings {
            connect_timeout: self.config.connect_timeout(),
            max_block_length: self.config.max_block_length,
        };

        let mut state = self.shared.state.lock();
        let cancel = CancellationToken::new();
        let context = self.context(&mut state, &cancel);
        let index = context.index;
        let outgoing =
            ConnectionDriver::spawn_tcp(&runtime, host.to_string(), port, settings, context);

        let requested = self.shared.requests.borrow().clone();
        let initial = [
            ControlMessage::object_request(&requested),
            ControlMessage::StreamMode(state.stream_mode),
            ControlMessage::DeviceFeedback(state.feedback.clone()),
        ];
        for message in initial {
            let _ = outgoing.send(Block::Control(message).to_buffer());
        }

        state.links.insert(
            index,
            Link {
                kind: LinkKind::Tcp,
                endpoint: format!("{host}:{port}"),
                status: LinkStatus::Connecting,
                outgoing: Some(outgoing),
                supported: None,
                cancel,
            },
        );
        info!(index, host, port, "Connection dispatched");
        Ok(index)
    }

    /// Connect to several redundant servers at once.
    ///
    /// Endpoints are `host` or `host:port`. Nothing is started unless every
    /// endpoint parses.
    pub fn connect_all<I, S>(&self, endpoints: I) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resolved = endpoints
            .into_iter()
            .map(|endpoint| self.config.resolve_endpoint(endpoint.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        resolved.iter().map(|(host, port)| self.connect(host, *port)).collect()
    }

    /// Close every TCP connection and wake blocked waiters.
    pub fn disconnect(&self) {
        let closed = {
            let mut state = self.shared.state.lock();
            state.multicast_controller = false;
            state.take_links(LinkKind::Tcp)
        };
        if closed > 0 {
            info!(connections = closed, "Disconnected");
        }
        self.shared.frames_ready.notify_all();
    }

    /// Receive frames multicast by a server, joining `multicast` through the
    /// interface at `local`.
    pub fn receive_multicast_data(
        &self,
        multicast: Ipv4Addr,
        local: Ipv4Addr,
        port: u16,
    ) -> Result<usize> {
        if !multicast.is_multicast() {
            return Err(StreamError::config(format!("{multicast} is not a multicast address")));
        }
        let runtime = self.runtime()?.handle().clone();

        let mut state = self.shared.state.lock();
        let cancel = CancellationToken::new();
        let context = self.context(&mut state, &cancel);
        let index = context.index;
        ConnectionDriver::spawn_multicast(&runtime, multicast, local, port, context);

        state.links.insert(
            index,
            Link {
                kind: LinkKind::Multicast,
                endpoint: format!("{multicast}:{port}"),
                status: LinkStatus::Connecting,
                outgoing: None,
                supported: None,
                cancel,
            },
        );
        info!(index, %multicast, %local, port, "Multicast receiver dispatched");
        Ok(index)
    }

    pub fn stop_receiving_multicast_data(&self) -> Result<()> {
        let stopped = self.shared.state.lock().take_links(LinkKind::Multicast);
        self.shared.frames_ready.notify_all();
        if stopped == 0 {
            return Err(StreamError::not_connected("stop_receiving_multicast_data"));
        }
        Ok(())
    }

    /// Ask for, or stop asking for, one kind of object.
    ///
    /// Fails without changing anything if the kind is a control message or a
    /// connected server has said it cannot produce it.
    pub fn set_request_type(&self, kind: ObjectKind, enable: bool) -> Result<()> {
        if !kind.is_requestable() {
            return Err(StreamError::unsupported_kind(kind, "control messages cannot be requested"));
        }

        let state = self.shared.state.lock();
        if enable {
            let unsupported = state
                .links
                .values()
                .filter_map(|link| link.supported.as_ref().map(|kinds| (link, kinds)))
                .find(|(_, kinds)| !kinds.contains(&kind));
            if let Some((link, _)) = unsupported {
                return Err(StreamError::unsupported_kind(
                    kind,
                    format!("{} does not provide it", link.endpoint),
                ));
            }
        }

        let changed = self.shared.requests.send_if_modified(|requested| {
            if enable { requested.insert(kind) } else { requested.remove(&kind) }
        });
        if changed {
            debug!(?kind, enable, "Request set changed");
            state.broadcast(ControlMessage::object_request(&self.shared.requests.borrow()));
        }
        Ok(())
    }

    pub fn request_types(&self) -> RequestSet {
        self.shared.requests.borrow().clone()
    }

    /// Bound the frame cache, dropping the oldest frames if it is over.
    /// Sizes below one are raised to one.
    pub fn set_buffer_size(&self, frames: usize) -> usize {
        let mut state = self.shared.state.lock();
        state.arbiter.set_capacity(frames);
        debug!(buffer_size = state.arbiter.capacity(), "Buffer size changed");
        state.arbiter.capacity()
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.state.lock().arbiter.capacity()
    }

    pub fn set_stream_mode(&self, mode: StreamMode) {
        let mut state = self.shared.state.lock();
        if state.stream_mode != mode {
            debug!(?mode, "Stream mode changed");
        }
        state.stream_mode = mode;
        state.broadcast(ControlMessage::StreamMode(mode));
    }

    pub fn stream_mode(&self) -> StreamMode {
        self.shared.state.lock().stream_mode
    }

    /// Whether frames currently arrive without being requested.
    pub fn is_streaming(&self) -> bool {
        self.stream_mode().is_streaming()
    }

    /// Ask every server for its latest frame.
    pub fn request_frame(&self) -> Result<()> {
        self.send_frame_request(false, "request_frame")
    }

    /// Ask every server for the frame after its latest one.
    pub fn request_next_frame(&self) -> Result<()> {
        self.send_frame_request(true, "request_next_frame")
    }

    fn send_frame_request(&self, next: bool, operation: &str) -> Result<()> {
        let state = self.shared.state.lock();
        if state.broadcast(ControlMessage::FrameRequest(FrameRequest { next })) == 0 {
            return Err(StreamError::not_connected(operation));
        }
        Ok(())
    }

    fn to_states(&self, pairs: Vec<FramePair>) -> Vec<FrameState> {
        let mapping = *self.shared.mapping.borrow();
        pairs.iter().map(|pair| FrameState::from_pair(pair).remapped(&mapping)).collect()
    }

    fn to_state(&self, pair: &FramePair) -> FrameState {
        FrameState::from_pair(pair).remapped(&self.shared.mapping.borrow())
    }

    /// Take the oldest buffered frame, if any.
    pub fn poll_frame(&self) -> Option<FrameState> {
        let pair = self.shared.state.lock().arbiter.pop_oldest()?;
        Some(self.to_state(&pair))
    }

    /// Take every buffered frame, oldest first. Empty when nothing is buffered.
    pub fn poll_frames(&self) -> Vec<FrameState> {
        let pairs = self.shared.state.lock().arbiter.take_all();
        self.to_states(pairs)
    }

    fn wait_for_frames(&self, timeout: Duration) -> Result<MutexGuard<'_, ClientState>> {
        // Too far out to represent means no deadline
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        let epoch = state.disconnect_epoch;

        while state.arbiter.is_empty() {
            if state.disconnect_epoch != epoch && state.links.is_empty() {
                return Err(StreamError::Disconnected);
            }
            let Some(deadline) = deadline else {
                self.shared.frames_ready.wait(&mut state);
                continue;
            };
            if self.shared.frames_ready.wait_until(&mut state, deadline).timed_out()
                && state.arbiter.is_empty()
            {
                trace!(?timeout, "Wait for frame timed out");
                return Err(StreamError::Timeout { duration: timeout });
            }
        }
        Ok(state)
    }

    /// Block until a frame is buffered, then take the oldest one.
    ///
    /// Fails with [`StreamError::Timeout`] at the deadline, or with
    /// [`StreamError::Disconnected`] once every connection has closed.
    pub fn wait_frame(&self, timeout: Duration) -> Result<FrameState> {
        let pair = self
            .wait_for_frames(timeout)?
            .arbiter
            .pop_oldest()
            .ok_or(StreamError::Timeout { duration: timeout })?;
        Ok(self.to_state(&pair))
    }

    /// Block until a frame is buffered, then take every buffered frame.
    pub fn wait_frames(&self, timeout: Duration) -> Result<Vec<FrameState>> {
        let pairs = self.wait_for_frames(timeout)?.arbiter.take_all();
        Ok(self.to_states(pairs))
    }

    /// Switch haptic feedback for an Apex device on or off.
    ///
    /// Fails with [`StreamError::FeedbackUnchanged`] when the device is
    /// already in the requested state.
    pub fn set_apex_device_feedback(&self, device_id: u32, enabled: bool) -> Result<()> {
        let mut state = self.shared.state.lock();
        let changed = if enabled {
            state.feedback.insert(device_id)
        } else {
            state.feedback.remove(&device_id)
        };
        if !changed {
            return Err(StreamError::FeedbackUnchanged { device_id, enabled });
        }

        debug!(device_id, enabled, "Device feedback changed");
        state.broadcast(ControlMessage::DeviceFeedback(state.feedback.clone()));
        Ok(())
    }

    /// Ask connected servers to multicast their frames, making this client
    /// the multicast controller.
    pub fn set_server_to_transmit_multicast(
        &self,
        server: Ipv4Addr,
        multicast: Ipv4Addr,
        port: u16,
    ) -> Result<()> {
        if !multicast.is_multicast() {
            return Err(StreamError::config(format!("{multicast} is not a multicast address")));
        }
        let mut state = self.shared.state.lock();
        let start = MulticastStart {
            server_address: server.to_string(),
            multicast_address: multicast.to_string(),
            port,
        };
        if state.broadcast(ControlMessage::MulticastStart(start)) == 0 {
            return Err(StreamError::not_connected("set_server_to_transmit_multicast"));
        }
        state.multicast_controller = true;
        info!(%server, %multicast, port, "Multicast transmission requested");
        Ok(())
    }

    pub fn stop_multicast_transmission(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !state.multicast_controller {
            return Err(StreamError::not_connected("stop_multicast_transmission"));
        }
        if state.broadcast(ControlMessage::MulticastStop) == 0 {
            warn!("No connection left to stop multicast transmission");
        }
        state.multicast_controller = false;
        Ok(())
    }

    /// Whether any TCP connection is up.
    pub fn is_connected(&self) -> bool {
        self.shared
            .state
            .lock()
            .links
            .values()
            .any(|link| link.kind == LinkKind::Tcp && link.status == LinkStatus::Connected)
    }

    pub fn is_multicast_receiving(&self) -> bool {
        self.shared.state.lock().links.values().any(|link| link.kind == LinkKind::Multicast)
    }

    pub fn is_multicast_controller(&self) -> bool {
        self.shared.state.lock().multicast_controller
    }

    /// Live and pending connections, TCP and multicast.
    pub fn connection_count(&self) -> usize {
        self.shared.state.lock().links.len()
    }

    /// Report frames with output X, Y and Z along the given directions.
    ///
    /// An invalid triple leaves the current mapping in place.
    pub fn set_axis_mapping(
        &self,
        x: Direction,
        y: Direction,
        z: Direction,
    ) -> Result<(), AxisMappingError> {
        let mapping = AxisMapping::new(x, y, z)?;
        self.shared.mapping.send_replace(mapping);
        debug!(?x, ?y, ?z, "Axis mapping changed");
        Ok(())
    }

    pub fn axis_mapping(&self) -> AxisMapping {
        *self.shared.mapping.borrow()
    }

    /// Stream of accepted frames, axis-mapped, at most at `rate`.
    ///
    /// Frames are latest-wins: a slow consumer sees the newest frame, not a
    /// backlog. The stream must be polled inside a tokio runtime with timers
    /// enabled, and ends when the client is dropped.
    pub fn subscribe(&self, rate: UpdateRate) -> BoxStream<'static, FrameState> {
        let source_hz = self
            .shared
            .latest
            .borrow()
            .as_ref()
            .map(|pair| pair.dynamics.frame.frame_rate)
            .filter(|hz| *hz > 0.0);

        let mapping = self.shared.mapping.subscribe();
        let frames = WatchStream::from_changes(self.shared.latest.subscribe())
            .filter_map(|pair| async move { pair })
            .map(move |pair| FrameState::from_pair(&pair).remapped(&mapping.borrow()));

        match rate.throttle_interval(source_hz) {
            None => frames.boxed(),
            Some(period) => frames.throttle(period).boxed(),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        debug!("Dropping client");
        {
            let mut state = self.shared.state.lock();
            state.take_links(LinkKind::Tcp);
            state.take_links(LinkKind::Multicast);
        }
        self.shared.frames_ready.notify_all();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
