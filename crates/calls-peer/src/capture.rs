use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::connection::MediaKind;

/// A captured track ready to be attached to an outbound transceiver.
#[derive(Clone)]
pub struct LocalTrack {
    /// Identifier announced to the broker as `trackName`.
    pub name: String,
    pub kind: MediaKind,
    pub source: Arc<dyn TrackLocal + Send + Sync>,
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LocalStream {
    pub id: String,
    pub tracks: Vec<LocalTrack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub audio: bool,
    pub video: bool,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),
    #[error("no capture device available")]
    NoDevice,
    #[error("capture device error: {0}")]
    Device(String),
}

#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn capture(&self, request: CaptureRequest) -> Result<Vec<LocalStream>, CaptureError>;
}

/// Capture source for headless peers: produces sample-fed opus and VP8
/// tracks that the caller writes media into.
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    audio: bool,
    video: bool,
    granted: bool,
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self {
            audio: true,
            video: true,
            granted: true,
        }
    }

    /// Restrict which devices exist.
    pub fn with_devices(mut self, audio: bool, video: bool) -> Self {
        self.audio = audio;
        self.video = video;
        self
    }

    /// Every capture request is refused.
    pub fn denied() -> Self {
        Self {
            granted: false,
            ..Self::new()
        }
    }

    fn track(kind: MediaKind, stream_id: &str) -> LocalTrack {
        let name = Uuid::new_v4().to_string();
        let capability = match kind {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        };
        let source = Arc::new(TrackLocalStaticSample::new(
            capability,
            name.clone(),
            stream_id.to_owned(),
        ));
        LocalTrack { name, kind, source }
    }
}

#[async_trait]
impl MediaCapture for SyntheticCapture {
    async fn capture(&self, request: CaptureRequest) -> Result<Vec<LocalStream>, CaptureError> {
        if !self.granted {
            return Err(CaptureError::PermissionDenied(
                "capture refused by configuration".into(),
            ));
        }
        let stream_id = Uuid::new_v4().to_string();
        let mut tracks = Vec::new();
        if request.audio && self.audio {
            tracks.push(Self::track(MediaKind::Audio, &stream_id));
        }
        if request.video && self.video {
            tracks.push(Self::track(MediaKind::Video, &stream_id));
        }
        if tracks.is_empty() {
            return Err(CaptureError::NoDevice);
        }
        Ok(vec![LocalStream {
            id: stream_id,
            tracks,
        }])
    }
}

/// Pacing of the frames a [`SyntheticFeed`] writes.
pub const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Opus frame that decodes to 20 ms of silence.
const SILENT_OPUS_FRAME: &[u8] = &[0xf8, 0xff, 0xfe];

/// VP8 key frame header for a 16x16 picture. Decoders discard it, but the
/// packets keep the outbound RTP stream flowing.
const BLANK_VP8_FRAME: &[u8] = &[
    0x50, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x10, 0x00, 0x10, 0x00, 0x00, 0x47, 0x08, 0x85, 0x85,
    0x88, 0x85, 0x84, 0x88, 0x02, 0x02,
];

/// Writes placeholder media into the sample tracks of captured streams.
/// Remote peers only see a pulled track once its first RTP packet arrives,
/// so a headless publisher has to keep one flowing.
#[derive(Debug, Clone, Default)]
pub struct SyntheticFeed {
    tracks: Vec<LocalTrack>,
}

impl SyntheticFeed {
    /// Picks up every track backed by a `TrackLocalStaticSample`; others are
    /// skipped.
    pub fn new(streams: &[LocalStream]) -> Self {
        let tracks = streams
            .iter()
            .flat_map(|stream| stream.tracks.iter())
            .filter(|track| {
                track
                    .source
                    .as_any()
                    .downcast_ref::<TrackLocalStaticSample>()
                    .is_some()
            })
            .cloned()
            .collect();
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Writes one frame into every track.
    pub async fn write_frame(&self, duration: Duration) -> Result<(), CaptureError> {
        for track in &self.tracks {
            let Some(sampler) = track
                .source
                .as_any()
                .downcast_ref::<TrackLocalStaticSample>()
            else {
                continue;
            };
            let data: &'static [u8] = match track.kind {
                MediaKind::Audio => SILENT_OPUS_FRAME,
                MediaKind::Video => BLANK_VP8_FRAME,
            };
            sampler
                .write_sample(&Sample {
                    data: data.into(),
                    duration,
                    ..Default::default()
                })
                .await
                .map_err(|err| CaptureError::Device(err.to_string()))?;
        }
        Ok(())
    }

    /// Writes a frame every `interval` until the task is aborted or a write
    /// fails.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(tracks = self.tracks.len(), "synthetic feed started");
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = self.write_frame(interval).await {
                    warn!(error = %err, "synthetic feed stopped");
                    break;
                }
            }
        })
    }
}
