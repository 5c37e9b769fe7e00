#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calls_peer::{
    CallsClient, ConnectionFactory, IceConnectionState, InboundTrackHandler, LocalTrack,
    MediaConnection, MediaKind, NegotiationConfig, RemoteTrack, RtcError, SignalingApi,
    SignalingError, SyntheticCapture, Transceiver,
};
use calls_proto::{
    BrokerRejection, CreateSessionResponse, GetSessionResponse, NewTrackRequest,
    NewTrackResponse, RenegotiateRequest, SdpType, SessionDescription, TrackObject,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// How the fake ICE agent reacts once a remote answer is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceScript {
    Connect,
    Stall,
    Fail,
}

pub struct FakeTransceiver {
    pub kind: MediaKind,
    pub track_name: Option<String>,
    mid: Mutex<Option<String>>,
    deactivated: AtomicBool,
}

impl FakeTransceiver {
    pub fn is_deactivated(&self) -> bool {
        self.deactivated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transceiver for FakeTransceiver {
    fn mid(&self) -> Option<String> {
        self.mid.lock().clone()
    }

    async fn deactivate(&self) -> Result<(), RtcError> {
        self.deactivated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type RemoteHook = Box<dyn Fn(&SessionDescription) + Send + Sync>;

/// In-process stand-in for a peer connection. Offers list one line per
/// transceiver; mids are handed out in order when a local description is set.
pub struct FakeConnection {
    ice: IceScript,
    ice_tx: watch::Sender<IceConnectionState>,
    handler: RwLock<Option<InboundTrackHandler>>,
    transceivers: Mutex<Vec<Arc<FakeTransceiver>>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    inbound_on_offer: Mutex<Vec<(String, MediaKind)>>,
    on_set_remote: Mutex<Option<RemoteHook>>,
    pub fail_remote: AtomicBool,
    pub closed: AtomicBool,
    pub events: Mutex<Vec<String>>,
}

impl FakeConnection {
    pub fn new(ice: IceScript) -> Arc<Self> {
        let (ice_tx, _) = watch::channel(IceConnectionState::New);
        Arc::new(Self {
            ice,
            ice_tx,
            handler: RwLock::new(None),
            transceivers: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            inbound_on_offer: Mutex::new(Vec::new()),
            on_set_remote: Mutex::new(None),
            fail_remote: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Tracks to announce synchronously while the next remote offer is applied.
    pub fn arrive_on_next_offer(&self, mids: &[(&str, MediaKind)]) {
        self.inbound_on_offer
            .lock()
            .extend(mids.iter().map(|(mid, kind)| (mid.to_string(), *kind)));
    }

    /// Announce an inbound track right now.
    pub fn deliver_track(&self, mid: &str, kind: MediaKind) {
        if let Some(handler) = self.handler.read().as_ref() {
            handler(RemoteTrack {
                mid: mid.to_owned(),
                id: format!("remote-{mid}"),
                kind,
                media: None,
            });
        }
    }

    pub fn on_set_remote(&self, hook: impl Fn(&SessionDescription) + Send + Sync + 'static) {
        *self.on_set_remote.lock() = Some(Box::new(hook));
    }

    pub fn transceivers(&self) -> Vec<Arc<FakeTransceiver>> {
        self.transceivers.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    fn render(&self, role: &str) -> String {
        let lines: Vec<String> = self
            .transceivers
            .lock()
            .iter()
            .map(|t| format!("m={}", t.kind))
            .collect();
        format!("{role}:{}", lines.join(","))
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    async fn add_placeholder_transceiver(&self) -> Result<(), RtcError> {
        self.record("add_placeholder");
        self.transceivers.lock().push(Arc::new(FakeTransceiver {
            kind: MediaKind::Audio,
            track_name: None,
            mid: Mutex::new(None),
            deactivated: AtomicBool::new(false),
        }));
        Ok(())
    }

    async fn add_send_transceiver(
        &self,
        track: &LocalTrack,
    ) -> Result<Arc<dyn Transceiver>, RtcError> {
        self.record(format!("add_send:{}", track.kind));
        let transceiver = Arc::new(FakeTransceiver {
            kind: track.kind,
            track_name: Some(track.name.clone()),
            mid: Mutex::new(None),
            deactivated: AtomicBool::new(false),
        });
        self.transceivers.lock().push(Arc::clone(&transceiver));
        Ok(transceiver)
    }

    async fn create_offer(&self) -> Result<SessionDescription, RtcError> {
        self.record("create_offer");
        Ok(SessionDescription::offer(self.render("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, RtcError> {
        self.record("create_answer");
        match self.remote.lock().as_ref() {
            Some(remote) if remote.sdp_type == SdpType::Offer => {
                Ok(SessionDescription::answer(self.render("answer")))
            }
            _ => Err(RtcError::Capability("no remote offer to answer".into())),
        }
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        self.record(format!("set_local:{}", description.sdp_type));
        for (index, transceiver) in self.transceivers.lock().iter().enumerate() {
            transceiver
                .mid
                .lock()
                .get_or_insert_with(|| index.to_string());
        }
        *self.local.lock() = Some(description);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        self.record(format!("set_remote:{}", description.sdp_type));
        if let Some(hook) = self.on_set_remote.lock().as_ref() {
            hook(&description);
        }
        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(RtcError::Capability("remote description rejected".into()));
        }
        let sdp_type = description.sdp_type;
        *self.remote.lock() = Some(description);

        match sdp_type {
            SdpType::Offer => {
                let arriving: Vec<_> = self.inbound_on_offer.lock().drain(..).collect();
                for (mid, kind) in arriving {
                    self.deliver_track(&mid, kind);
                }
            }
            SdpType::Answer if !self.ice_tx.borrow().is_connected() => match self.ice {
                IceScript::Connect => {
                    self.ice_tx.send_replace(IceConnectionState::Checking);
                    self.ice_tx.send_replace(IceConnectionState::Connected);
                }
                IceScript::Stall => {
                    self.ice_tx.send_replace(IceConnectionState::Checking);
                }
                IceScript::Fail => {
                    self.ice_tx.send_replace(IceConnectionState::Failed);
                }
            },
            _ => {}
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    fn ice_state(&self) -> watch::Receiver<IceConnectionState> {
        self.ice_tx.subscribe()
    }

    fn on_inbound_track(&self, handler: InboundTrackHandler) {
        *self.handler.write() = Some(handler);
    }

    async fn close(&self) -> Result<(), RtcError> {
        self.record("close");
        self.closed.store(true, Ordering::SeqCst);
        self.ice_tx.send_replace(IceConnectionState::Closed);
        Ok(())
    }
}

/// Hands out pre-built fake connections in order.
pub struct FakeFactory {
    connections: Mutex<VecDeque<Arc<FakeConnection>>>,
    pub created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(connections: Vec<Arc<FakeConnection>>) -> Arc<Self> {
        Arc::new(Self {
            connections: Mutex::new(connections.into()),
            created: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(
        &self,
        _config: &NegotiationConfig,
    ) -> Result<Arc<dyn MediaConnection>, RtcError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let connection = self
            .connections
            .lock()
            .pop_front()
            .ok_or_else(|| RtcError::Capability("no connection scripted".into()))?;
        Ok(connection)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalCall {
    CreateSession(SessionDescription),
    GetSession(String),
    NewTracks(NewTrackRequest),
    Renegotiate(RenegotiateRequest),
}

/// Broker stand-in answering from per-operation queues. An empty queue
/// falls back to a plain successful reply.
#[derive(Default)]
pub struct ScriptedSignaling {
    pub calls: Mutex<Vec<SignalCall>>,
    create: Mutex<VecDeque<Result<CreateSessionResponse, SignalingError>>>,
    get: Mutex<VecDeque<Result<GetSessionResponse, SignalingError>>>,
    new_tracks: Mutex<VecDeque<Result<NewTrackResponse, SignalingError>>>,
    renegotiate: Mutex<VecDeque<Result<(), SignalingError>>>,
}

impl ScriptedSignaling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_create(&self, reply: Result<CreateSessionResponse, SignalingError>) {
        self.create.lock().push_back(reply);
    }

    pub fn push_get(&self, reply: Result<GetSessionResponse, SignalingError>) {
        self.get.lock().push_back(reply);
    }

    pub fn push_new_tracks(&self, reply: Result<NewTrackResponse, SignalingError>) {
        self.new_tracks.lock().push_back(reply);
    }

    pub fn push_renegotiate(&self, reply: Result<(), SignalingError>) {
        self.renegotiate.lock().push_back(reply);
    }

    pub fn calls(&self) -> Vec<SignalCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl SignalingApi for ScriptedSignaling {
    async fn create_session(
        &self,
        offer: &SessionDescription,
    ) -> Result<CreateSessionResponse, SignalingError> {
        self.calls
            .lock()
            .push(SignalCall::CreateSession(offer.clone()));
        self.create.lock().pop_front().unwrap_or_else(|| {
            Ok(CreateSessionResponse {
                session_id: Some("local-session".into()),
                session_description: Some(SessionDescription::answer("broker-answer")),
                ..Default::default()
            })
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<GetSessionResponse, SignalingError> {
        self.calls
            .lock()
            .push(SignalCall::GetSession(session_id.to_owned()));
        self.get
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(GetSessionResponse::default()))
    }

    async fn new_tracks(
        &self,
        request: &NewTrackRequest,
    ) -> Result<NewTrackResponse, SignalingError> {
        self.calls.lock().push(SignalCall::NewTracks(request.clone()));
        self.new_tracks.lock().pop_front().unwrap_or_else(|| {
            Ok(NewTrackResponse {
                tracks: request.tracks.clone(),
                session_description: request
                    .session_description
                    .as_ref()
                    .map(|_| SessionDescription::answer("broker-answer")),
                ..Default::default()
            })
        })
    }

    async fn renegotiate(&self, request: &RenegotiateRequest) -> Result<(), SignalingError> {
        self.calls
            .lock()
            .push(SignalCall::Renegotiate(request.clone()));
        self.renegotiate.lock().pop_front().unwrap_or(Ok(()))
    }
}

pub fn rejection(code: &str, description: &str) -> SignalingError {
    SignalingError::Rejected(BrokerRejection {
        code: code.into(),
        description: Some(description.into()),
    })
}

/// A pull reply placing each named track at the given local mid.
pub fn pull_reply(remote_session: &str, placed: &[(&str, &str)], renegotiate: bool) -> NewTrackResponse {
    NewTrackResponse {
        tracks: placed
            .iter()
            .map(|(mid, name)| TrackObject {
                mid: Some(mid.to_string()),
                ..TrackObject::remote(remote_session, *name)
            })
            .collect(),
        requires_immediate_renegotiation: renegotiate,
        session_description: renegotiate.then(|| SessionDescription::offer("broker-offer")),
        ..Default::default()
    }
}

pub fn listing(published: &[(&str, &str)]) -> GetSessionResponse {
    GetSessionResponse {
        tracks: published
            .iter()
            .map(|(mid, name)| TrackObject::local(*mid, *name))
            .collect(),
        ..Default::default()
    }
}

pub struct Harness {
    pub client: CallsClient,
    pub connection: Arc<FakeConnection>,
    pub factory: Arc<FakeFactory>,
    pub signaling: Arc<ScriptedSignaling>,
}

pub fn harness(ice: IceScript, capture: SyntheticCapture) -> Harness {
    let connection = FakeConnection::new(ice);
    let factory = FakeFactory::new(vec![Arc::clone(&connection)]);
    let signaling = ScriptedSignaling::new();
    let client = CallsClient::new(
        Arc::clone(&factory) as Arc<dyn ConnectionFactory>,
        Arc::clone(&signaling) as Arc<dyn SignalingApi>,
        Arc::new(capture),
        NegotiationConfig::default(),
    );
    Harness {
        client,
        connection,
        factory,
        signaling,
    }
}
