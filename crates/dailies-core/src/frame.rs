//! Frame types flowing from the playback engine to the display.
//!
//! The scheduler treats pixel data as opaque: it routes, orders and evicts
//! frames but never inspects their contents. Blind data payloads attached
//! by collaborator plugins are equally opaque and carried untouched.

use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ids::{CollaboratorId, PlayheadId};
use crate::time::TimelineTime;

/// Pixel format of an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 8-bit RGBA (32 bits per pixel)
    #[default]
    Rgba8,
    /// 16-bit RGBA half-float (64 bits per pixel)
    Rgba16F,
    /// YUV 4:2:0 planar
    Yuv420P,
}

impl PixelFormat {
    /// Number of planes for this format.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Rgba8 | Self::Rgba16F => 1,
            Self::Yuv420P => 3,
        }
    }
}

/// A plane of pixel data.
#[derive(Debug, Clone)]
pub struct ImagePlane {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Bytes per row (may include padding)
    pub stride: usize,
}

/// A decoded, colour-processed image ready for upload to the renderer.
///
/// Produced by the media reader, handed through the scheduler by shared
/// pointer and never copied on the presentation path.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    /// Pixel format
    pub format: PixelFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel data planes (1-3 depending on format)
    pub planes: SmallVec<[ImagePlane; 3]>,
}

impl ImageBuffer {
    /// Create an empty (black) buffer of the given size.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let planes = match format {
            PixelFormat::Rgba8 => {
                let stride = width as usize * 4;
                smallvec::smallvec![ImagePlane {
                    data: vec![0u8; stride * height as usize],
                    stride,
                }]
            }
            PixelFormat::Rgba16F => {
                let stride = width as usize * 8;
                smallvec::smallvec![ImagePlane {
                    data: vec![0u8; stride * height as usize],
                    stride,
                }]
            }
            PixelFormat::Yuv420P => {
                let y_stride = width as usize;
                let uv_stride = (width / 2) as usize;
                smallvec::smallvec![
                    ImagePlane {
                        data: vec![0u8; y_stride * height as usize],
                        stride: y_stride,
                    },
                    ImagePlane {
                        data: vec![0u8; uv_stride * (height / 2) as usize],
                        stride: uv_stride,
                    },
                    ImagePlane {
                        data: vec![0u8; uv_stride * (height / 2) as usize],
                        stride: uv_stride,
                    },
                ]
            }
        };
        Self {
            format,
            width,
            height,
            planes,
        }
    }

    /// Total memory held by this buffer in bytes.
    pub fn memory_size(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

/// Arc-wrapped image buffer for shared ownership across the draw path.
pub type SharedImageBuffer = Arc<ImageBuffer>;

/// An opaque per-frame payload contributed by a collaborator plugin,
/// carried but never interpreted by the scheduler.
pub type BlindData = Arc<dyn Any + Send + Sync>;

/// A frame queued for presentation.
///
/// Immutable once enqueued, except that the augmentation path attaches
/// blind data to the clone it is about to deliver.
#[derive(Clone)]
pub struct DisplayFrame {
    image: Option<SharedImageBuffer>,
    timestamp: TimelineTime,
    playhead: PlayheadId,
    blind_data: HashMap<CollaboratorId, BlindData>,
    error: Option<String>,
}

impl DisplayFrame {
    /// Create a frame to be shown at `timestamp` on the timeline.
    pub fn new(image: SharedImageBuffer, timestamp: TimelineTime, playhead: PlayheadId) -> Self {
        Self {
            image: Some(image),
            timestamp,
            playhead,
            blind_data: HashMap::new(),
            error: None,
        }
    }

    /// Create an imageless frame recording a reader/decode failure. The
    /// renderer shows a hold frame or error slate in its place.
    pub fn error_frame(
        timestamp: TimelineTime,
        playhead: PlayheadId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            image: None,
            timestamp,
            playhead,
            blind_data: HashMap::new(),
            error: Some(message.into()),
        }
    }

    /// The image payload, absent for error frames.
    pub fn image(&self) -> Option<&SharedImageBuffer> {
        self.image.as_ref()
    }

    /// Timeline time at which this frame should be visible.
    #[inline]
    pub fn timestamp(&self) -> TimelineTime {
        self.timestamp
    }

    /// Identity of the playhead that produced this frame.
    #[inline]
    pub fn playhead(&self) -> PlayheadId {
        self.playhead
    }

    /// Decode/read error carried by this frame, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Attach a collaborator's blind data payload. A payload already
    /// present for the same collaborator is replaced.
    pub fn attach_blind_data(&mut self, collaborator: CollaboratorId, payload: BlindData) {
        self.blind_data.insert(collaborator, payload);
    }

    /// Fetch a collaborator's payload, downcast to its concrete type.
    pub fn blind_data<T: Any + Send + Sync>(&self, collaborator: CollaboratorId) -> Option<Arc<T>> {
        self.blind_data
            .get(&collaborator)
            .cloned()
            .and_then(|d| d.downcast::<T>().ok())
    }

    /// Number of blind data payloads attached.
    pub fn blind_data_count(&self) -> usize {
        self.blind_data.len()
    }
}

impl std::fmt::Debug for DisplayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayFrame")
            .field("timestamp", &self.timestamp)
            .field("playhead", &self.playhead)
            .field("has_image", &self.image.is_some())
            .field("blind_data", &self.blind_data.len())
            .field("error", &self.error)
            .finish()
    }
}
