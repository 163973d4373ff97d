//! Image containers for the weft camera stack.
//!
//! [`RawFrame`] is the driver-shaped container handed out by a camera
//! backend: its pixel data may carry padding and a stride wider than one
//! row, and it holds a driver buffer slot that must be returned. [`Frame`]
//! is the portable, densely packed form that leaves the capture loop;
//! [`Frame::from_raw`] performs the copy.

use machine_vision_formats::{ImageBuffer, ImageBufferRef, ImageData, PixFmt, Stride};

use weft_cam_types::FrameStatus;

pub type Result<M> = std::result::Result<M, ConvertError>;

#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("frame is incomplete: {0}")]
    Incomplete(String),
    #[error("image data is {actual} bytes but the reported shape needs {expected}")]
    ShortBuffer { expected: usize, actual: usize },
    #[error("stride {stride} is smaller than one output row ({min} bytes)")]
    BadStride { stride: usize, min: usize },
    #[error("reported shape {width}x{height} with {channels} channel(s) has no pixels")]
    EmptyShape {
        width: u32,
        height: u32,
        channels: u32,
    },
}

/// Token for one driver-owned buffer slot.
///
/// Handed out inside a [`RawFrame`] and given back to the backend once the
/// frame data has been copied out. The driver cannot refill a slot until it
/// is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferSlot(pub u32);

/// Image data and metadata exactly as a camera driver delivered it.
#[derive(Clone)]
pub struct RawFrame {
    /// number of pixels in an image row
    pub width: u32,
    /// number of pixels in an image column
    pub height: u32,
    /// horizontal padding, in pixels per row
    pub x_padding: u32,
    /// vertical padding, in rows
    pub y_padding: u32,
    /// number of bytes from one row to the next
    pub stride: u32,
    /// interleaved channels per pixel, as reported by the driver
    pub channels: u32,
    /// byte layout of the pixel data
    pub pixel_format: PixFmt,
    /// completion status reported by the device
    pub status: FrameStatus,
    /// frame number from the camera driver
    pub block_id: u64,
    /// timestamp from the camera driver
    pub device_timestamp: u64,
    /// the driver buffer slot backing `image_data`
    pub slot: BufferSlot,
    pub image_data: Vec<u8>,
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "RawFrame {{ width: {}, height: {}, status: {:?}, block_id: {}, slot: {:?} }}",
            self.width, self.height, self.status, self.block_id, self.slot
        )
    }
}

/// A dense copy of one acquired image, plus host-side metadata.
#[derive(Clone)]
pub struct Frame {
    /// number of pixels in an image row, padding included
    width: u32,
    /// number of pixels in an image column, padding included
    height: u32,
    /// number of bytes in an image row
    stride: u32,
    /// interleaved channels per pixel
    channels: u32,
    image_data: Vec<u8>,
    pixel_format: PixFmt,
    /// serial number of the originating camera
    serial: String,
    host_timestamp: chrono::DateTime<chrono::Utc>, // timestamp from host computer
    host_framenumber: usize,                       // framenumber from host computer
    pub block_id: u64,                             // framenumber from the camera driver
    pub device_timestamp: u64,                     // timestamp from the camera driver
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Frame {{ serial: {}, width: {}, height: {}, block_id: {}, host_framenumber: {} }}",
            self.serial, self.width, self.height, self.block_id, self.host_framenumber
        )
    }
}

impl Frame {
    /// Copy a driver container into a dense buffer.
    ///
    /// The output keeps the driver's horizontal and vertical padding as
    /// image content, so the result is `(height + y_padding)` rows of
    /// `(width + x_padding)` pixels. The reported stride is used to locate
    /// rows in the source; the output rows are packed back to back.
    ///
    /// No color-space conversion happens here. The byte order of the output
    /// is exactly the camera's configured pixel format; a consumer wanting
    /// e.g. BGR from an RGB8 camera must reorder channels itself.
    pub fn from_raw(
        raw: &RawFrame,
        serial: &str,
        host_framenumber: usize,
        host_timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Result<Frame> {
        if let FrameStatus::Incomplete(reason) = &raw.status {
            return Err(ConvertError::Incomplete(reason.clone()));
        }

        let width = raw.width + raw.x_padding;
        let height = raw.height + raw.y_padding;
        let src_stride = raw.stride as usize;
        let dest_stride = width as usize * raw.channels as usize;

        if width == 0 || height == 0 || raw.channels == 0 {
            return Err(ConvertError::EmptyShape {
                width,
                height,
                channels: raw.channels,
            });
        }

        if src_stride < dest_stride {
            return Err(ConvertError::BadStride {
                stride: src_stride,
                min: dest_stride,
            });
        }

        // The final row does not need trailing stride slack.
        let expected = (height as usize - 1) * src_stride + dest_stride;
        if raw.image_data.len() < expected {
            return Err(ConvertError::ShortBuffer {
                expected,
                actual: raw.image_data.len(),
            });
        }

        let mut image_data = vec![0u8; height as usize * dest_stride];
        for (row, dest) in image_data.chunks_exact_mut(dest_stride).enumerate() {
            let start = row * src_stride;
            dest.copy_from_slice(&raw.image_data[start..start + dest_stride]);
        }

        Ok(Frame {
            width,
            height,
            stride: dest_stride as u32,
            channels: raw.channels,
            image_data,
            pixel_format: raw.pixel_format,
            serial: serial.to_string(),
            host_timestamp,
            host_framenumber,
            block_id: raw.block_id,
            device_timestamp: raw.device_timestamp,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn stride(&self) -> usize {
        self.stride as usize
    }
    pub fn channels(&self) -> u32 {
        self.channels
    }
    pub fn pixel_format(&self) -> PixFmt {
        self.pixel_format
    }
    pub fn serial(&self) -> &str {
        &self.serial
    }
    pub fn host_timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.host_timestamp
    }
    pub fn host_framenumber(&self) -> usize {
        self.host_framenumber
    }
    pub fn image_data(&self) -> &[u8] {
        &self.image_data
    }
}

impl<F> ImageData<F> for Frame {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn buffer_ref(&self) -> ImageBufferRef<'_, F> {
        ImageBufferRef::new(&self.image_data)
    }
    fn buffer(self) -> ImageBuffer<F> {
        ImageBuffer::new(self.image_data)
    }
}

impl Stride for Frame {
    fn stride(&self) -> usize {
        self.stride as usize
    }
}

impl From<Frame> for Vec<u8> {
    fn from(orig: Frame) -> Vec<u8> {
        orig.image_data
    }
}

impl From<Box<Frame>> for Vec<u8> {
    fn from(orig: Box<Frame>) -> Vec<u8> {
        orig.image_data
    }
}
