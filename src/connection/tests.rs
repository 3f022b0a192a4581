//! Connection driver tests over in-memory and loopback sources

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::codec::ByteBuffer;
use crate::objects::{Block, ControlMessage, ObjectKind, RequestSet, StaticObjects};
use crate::source::{BlockSource, RawBlock};
use crate::sources::StreamSource;
use crate::test_utils::{encode_blocks, frame_blocks, frame_info_block, raw, segments_block};
use crate::transport::{BLOCK_HEADER_LEN, append_block, read_block};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Connected(usize),
    Capabilities(usize, BTreeSet<ObjectKind>),
    Static(usize),
    Dynamic(usize, u32, usize),
    Disconnected(usize),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn frames(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Dynamic(_, frame, _) => Some(frame),
                _ => None,
            })
            .collect()
    }

    async fn wait_for(&self, predicate: impl Fn(&[Event]) -> bool) {
        for _ in 0..200 {
            if predicate(&self.events.lock()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached, events: {:?}", self.events());
    }
}

impl ConnectionObserver for Recorder {
    fn on_connected(&self, index: usize) {
        self.events.lock().push(Event::Connected(index));
    }

    fn on_capabilities(&self, index: usize, kinds: BTreeSet<ObjectKind>) {
        self.events.lock().push(Event::Capabilities(index, kinds));
    }

    fn on_static_objects(&self, index: usize, _statics: Arc<StaticObjects>) {
        self.events.lock().push(Event::Static(index));
    }

    fn on_dynamic_objects(&self, index: usize, dynamics: Arc<crate::objects::DynamicObjects>) {
        let subjects = dynamics.global_segments.len();
        self.events.lock().push(Event::Dynamic(index, dynamics.frame_number(), subjects));
    }

    fn on_disconnected(&self, index: usize) {
        self.events.lock().push(Event::Disconnected(index));
    }
}

/// Blocks fed in by the test through a channel.
struct ChannelSource {
    blocks: mpsc::UnboundedReceiver<RawBlock>,
}

#[async_trait::async_trait]
impl BlockSource for ChannelSource {
    async fn next_block(&mut self) -> crate::Result<Option<RawBlock>> {
        Ok(self.blocks.recv().await)
    }

    fn endpoint(&self) -> String {
        "channel".to_string()
    }
}

fn context(
    index: usize,
    requested: RequestSet,
    recorder: &Arc<Recorder>,
) -> (ConnectionContext, watch::Sender<RequestSet>, CancellationToken) {
    let (requests_tx, requests_rx) = watch::channel(requested);
    let cancel = CancellationToken::new();
    let context = ConnectionContext {
        index,
        requested: requests_rx,
        observer: recorder.clone(),
        cancel: cancel.clone(),
    };
    (context, requests_tx, cancel)
}

#[tokio::test]
async fn unknown_block_between_frames_is_skipped() {
    let mut bytes = ByteBuffer::new();
    bytes.write_bytes(encode_blocks(&frame_blocks(1)).as_bytes());
    append_block(&mut bytes, 0xDEAD, &[0xABu8; 37][..]);
    bytes.write_bytes(encode_blocks(&frame_blocks(2)).as_bytes());

    let recorder = Arc::new(Recorder::default());
    let (context, _requests, _cancel) = context(3, ObjectKind::default_request_set(), &recorder);
    let source = StreamSource::new(std::io::Cursor::new(bytes.into_vec()), "memory", 4096);

    ConnectionDriver::run(source, context).await;

    assert_eq!(recorder.frames(), vec![1, 2]);
    assert!(recorder.events().iter().all(|event| match event {
        Event::Dynamic(index, _, subjects) => *index == 3 && *subjects == 1,
        Event::Disconnected(index) => *index == 3,
        _ => true,
    }));
    assert_eq!(recorder.events().last(), Some(&Event::Disconnected(3)));
}

#[tokio::test]
async fn request_set_changes_apply_to_later_blocks() {
    let recorder = Arc::new(Recorder::default());
    let (context, requests, _cancel) = context(0, ObjectKind::default_request_set(), &recorder);
    let (blocks_tx, blocks_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(ConnectionDriver::run(ChannelSource { blocks: blocks_rx }, context));

    blocks_tx.send(segments_block(1)).unwrap();
    blocks_tx.send(frame_info_block(1)).unwrap();
    recorder.wait_for(|events| events.iter().any(|e| matches!(e, Event::Dynamic(..)))).await;

    requests.send_replace(RequestSet::new());
    blocks_tx.send(segments_block(1)).unwrap();
    blocks_tx.send(frame_info_block(2)).unwrap();
    drop(blocks_tx);
    task.await.unwrap();

    let dynamics: Vec<_> =
        recorder.events().into_iter().filter(|e| matches!(e, Event::Dynamic(..))).collect();
    assert_eq!(dynamics, vec![Event::Dynamic(0, 1, 1), Event::Dynamic(0, 2, 0)]);
}

#[tokio::test]
async fn cancellation_ends_an_idle_connection() {
    let recorder = Arc::new(Recorder::default());
    let (context, _requests, cancel) = context(5, RequestSet::new(), &recorder);
    let (_blocks_tx, blocks_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(ConnectionDriver::run(ChannelSource { blocks: blocks_rx }, context));

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

    assert_eq!(recorder.events(), vec![Event::Disconnected(5)]);
}

#[tokio::test]
async fn tcp_connection_sends_queued_messages_and_reads_frames() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = ByteBuffer::new();
        let header = read_block(&mut socket, &mut request, |_, _| true).await.unwrap();
        assert_eq!(header.tag, ObjectKind::ObjectRequest.tag());
        let tags = request.read::<BTreeSet<u32>>().unwrap();

        let mut frames = ByteBuffer::new();
        for block in frame_blocks(10).iter().chain(frame_blocks(11).iter()) {
            block.append_to(&mut frames);
        }
        socket.write_all(frames.as_bytes()).await.unwrap();
        tags
    });

    let recorder = Arc::new(Recorder::default());
    let (context, _requests, cancel) = context(0, ObjectKind::default_request_set(), &recorder);
    let settings =
        TcpSettings { connect_timeout: Duration::from_secs(2), max_block_length: 1 << 20 };
    let outgoing = ConnectionDriver::spawn_tcp(
        &tokio::runtime::Handle::current(),
        "127.0.0.1".to_string(),
        port,
        settings,
        context,
    );
    let request = ControlMessage::object_request(&ObjectKind::default_request_set());
    outgoing.send(Block::Control(request).to_buffer()).unwrap();

    let tags = server.await.unwrap();
    assert!(tags.contains(&ObjectKind::GlobalSegments.tag()));

    recorder.wait_for(|events| events.iter().any(|e| matches!(e, Event::Disconnected(0)))).await;
    assert_eq!(recorder.events().first(), Some(&Event::Connected(0)));
    assert_eq!(recorder.frames(), vec![10, 11]);
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn failed_connect_reports_disconnect_only() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let recorder = Arc::new(Recorder::default());
    let (context, _requests, _cancel) = context(2, RequestSet::new(), &recorder);
    let settings =
        TcpSettings { connect_timeout: Duration::from_millis(500), max_block_length: 1024 };
    let _outgoing = ConnectionDriver::spawn_tcp(
        &tokio::runtime::Handle::current(),
        "127.0.0.1".to_string(),
        port,
        settings,
        context,
    );

    recorder.wait_for(|events| !events.is_empty()).await;
    assert_eq!(recorder.events(), vec![Event::Disconnected(2)]);
}

#[test]
fn raw_block_helper_strips_the_header() {
    let block = raw(&frame_blocks(4)[1]);
    let encoded = frame_blocks(4)[1].to_buffer();
    assert_eq!(block.body.as_bytes(), &encoded.as_bytes()[BLOCK_HEADER_LEN..]);
}
