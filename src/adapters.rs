use crate::*;
use int_enum::IntEnum;
use std::path::PathBuf;

mod bounded_raw;
mod byte_buffer;
mod colored_text;
mod file;
mod gvox_fill;
mod gvox_raw;
mod gzip;
mod raw;
mod raw_u32;
mod stdout;

pub use byte_buffer::ByteBufferOutput;

pub(crate) fn register_builtin(ctx: &mut Context) {
    ctx.register_adapter::<Input, ByteBuffer>();
    ctx.register_adapter::<Input, File>();
    ctx.register_adapter::<Input, Gzip>();
    ctx.register_adapter::<Output, ByteBuffer>();
    ctx.register_adapter::<Output, File>();
    ctx.register_adapter::<Output, StdOut>();
    ctx.register_adapter::<Parse, GvoxRaw>();
    ctx.register_adapter::<Parse, GvoxFill>();
    ctx.register_adapter::<Parse, RawU32>();
    ctx.register_adapter::<Serialize, GvoxRaw>();
    ctx.register_adapter::<Serialize, GvoxFill>();
    ctx.register_adapter::<Serialize, RawU32>();
    ctx.register_adapter::<Serialize, ColoredText>();
    ctx.register_adapter::<Container, BoundedRaw>();
    ctx.register_adapter::<Container, Raw>();
}

pub struct ByteBuffer;

impl AdapterDescriptor<Input> for ByteBuffer {
    type Configuration = ByteBufferInputConfig;
    type Handler = byte_buffer::ByteBufferInput;
}

impl AdapterDescriptor<Output> for ByteBuffer {
    type Configuration = ByteBufferOutputConfig;
    type Handler = byte_buffer::ByteBufferOutputHandler;
}

impl NamedAdapter for ByteBuffer {
    fn name() -> &'static str {
        "byte_buffer"
    }
}

/// Bytes an input byte buffer reads from.
#[derive(Clone, Debug, Default)]
pub struct ByteBufferInputConfig {
    pub bytes: Vec<u8>,
}

impl From<&[u8]> for ByteBufferInputConfig {
    fn from(value: &[u8]) -> Self {
        Self {
            bytes: value.to_vec(),
        }
    }
}

impl From<Vec<u8>> for ByteBufferInputConfig {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Where an output byte buffer writes. Keep a clone of `buffer` to read the
/// bytes back once the output is destroyed.
#[derive(Clone, Debug, Default)]
pub struct ByteBufferOutputConfig {
    pub buffer: ByteBufferOutput,
    /// Capacity reserved up front.
    pub reserve: usize,
}

impl From<&ByteBufferOutput> for ByteBufferOutputConfig {
    fn from(value: &ByteBufferOutput) -> Self {
        Self {
            buffer: value.clone(),
            reserve: 0,
        }
    }
}

pub struct File;

impl AdapterDescriptor<Input> for File {
    type Configuration = FileInputConfig;
    type Handler = file::FileInput;
}

impl AdapterDescriptor<Output> for File {
    type Configuration = FileOutputConfig;
    type Handler = file::FileOutput;
}

impl NamedAdapter for File {
    fn name() -> &'static str {
        "file"
    }
}

#[derive(Clone, Debug, Default)]
pub struct FileInputConfig {
    pub path: PathBuf,
    /// Bytes skipped at the start of the file; position 0 of the stream
    /// is this offset.
    pub byte_offset: u64,
}

#[derive(Clone, Debug, Default)]
pub struct FileOutputConfig {
    pub path: PathBuf,
}

pub struct StdOut;

impl AdapterDescriptor<Output> for StdOut {
    type Configuration = ();
    type Handler = stdout::StdOutHandler;
}

impl NamedAdapter for StdOut {
    fn name() -> &'static str {
        "stdout"
    }
}

/// Decompresses a gzip stream read from another input.
pub struct Gzip;

impl AdapterDescriptor<Input> for Gzip {
    type Configuration = GzipInputConfig;
    type Handler = gzip::GzipInput;
}

impl NamedAdapter for Gzip {
    fn name() -> &'static str {
        "gzip"
    }
}

#[derive(Debug, Default)]
pub struct GzipInputConfig {
    /// The compressed stream. Required.
    pub inner: Option<AdapterContext<Input>>,
}

/// Lossless dense format: a header then every voxel's channels in order.
pub struct GvoxRaw;

impl AdapterDescriptor<Parse> for GvoxRaw {
    type Configuration = ();
    type Handler = gvox_raw::GvoxRawParser;
}

impl AdapterDescriptor<Serialize> for GvoxRaw {
    type Configuration = ();
    type Handler = gvox_raw::GvoxRawSerializer;
}

impl NamedAdapter for GvoxRaw {
    fn name() -> &'static str {
        "gvox_raw"
    }
}

/// Headerless little-endian `u32` values of a single channel.
pub struct RawU32;

impl AdapterDescriptor<Parse> for RawU32 {
    type Configuration = RawU32ParseConfig;
    type Handler = raw_u32::RawU32Parser;
}

impl AdapterDescriptor<Serialize> for RawU32 {
    type Configuration = ();
    type Handler = raw_u32::RawU32Serializer;
}

impl NamedAdapter for RawU32 {
    fn name() -> &'static str {
        "raw_u32"
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawU32ParseConfig {
    pub offset: Offset3D,
    /// `None` is a single voxel.
    pub extent: Option<Extent3D>,
    pub channel: ChannelId,
}

impl Default for RawU32ParseConfig {
    fn default() -> Self {
        Self {
            offset: Offset3D::default(),
            extent: None,
            channel: ChannelId::COLOR,
        }
    }
}

/// A list of uniform boxes.
pub struct GvoxFill;

impl AdapterDescriptor<Parse> for GvoxFill {
    type Configuration = ();
    type Handler = gvox_fill::GvoxFillParser;
}

impl AdapterDescriptor<Serialize> for GvoxFill {
    type Configuration = GvoxFillSerializeConfig;
    type Handler = gvox_fill::GvoxFillSerializer;
}

impl NamedAdapter for GvoxFill {
    fn name() -> &'static str {
        "gvox_fill"
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GvoxFillSerializeConfig {
    /// Split non-uniform regions into octants until every box is uniform.
    /// Without it a non-uniform region cannot be written.
    pub subdivide: bool,
}

impl Default for GvoxFillSerializeConfig {
    fn default() -> Self {
        Self { subdivide: true }
    }
}

/// ANSI true-colour text rendering of a volume.
pub struct ColoredText;

impl AdapterDescriptor<Serialize> for ColoredText {
    type Configuration = ColoredTextSerializeAdapterConfig;
    type Handler = colored_text::ColoredTextSerializer;
}

impl NamedAdapter for ColoredText {
    fn name() -> &'static str {
        "colored_text"
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, IntEnum)]
#[repr(i32)]
pub enum ColoredTextSerializeAdapterDownscaleMode {
    Nearest = 0,
    Linear = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColoredTextSerializeAdapterConfig {
    /// Voxels per character cell along each axis. `None` is 1.
    pub downscale_factor: Option<u32>,
    pub downscale_mode: ColoredTextSerializeAdapterDownscaleMode,
    /// Value mapped to full brightness for channels other than colour.
    /// `None` is 255.
    pub non_color_max_value: Option<u32>,
    /// Stack z-slices top to bottom instead of side by side.
    pub vertical: bool,
}

impl Default for ColoredTextSerializeAdapterConfig {
    fn default() -> Self {
        Self {
            downscale_factor: None,
            downscale_mode: ColoredTextSerializeAdapterDownscaleMode::Nearest,
            non_color_max_value: None,
            vertical: false,
        }
    }
}

impl ColoredTextSerializeAdapterConfig {
    /// Builds a configuration from raw host values, where `-1` means default.
    pub fn from_raw(
        downscale_factor: i32,
        downscale_mode: i32,
        non_color_max_value: i32,
        vertical: bool,
    ) -> Result<Self> {
        let optional = |value: i32, field: &str| match value {
            -1 => Ok(None),
            v if v > 0 => Ok(Some(v as u32)),
            v => Err(VoxError::invalid_argument(format!("{field} must be positive or -1, got {v}"))),
        };
        let downscale_mode = if downscale_mode == -1 {
            ColoredTextSerializeAdapterDownscaleMode::Nearest
        } else {
            ColoredTextSerializeAdapterDownscaleMode::from_int(downscale_mode).map_err(|_| {
                VoxError::invalid_argument(format!("unknown downscale mode {downscale_mode}"))
            })?
        };
        Ok(Self {
            downscale_factor: optional(downscale_factor, "downscale_factor")?,
            downscale_mode,
            non_color_max_value: optional(non_color_max_value, "non_color_max_value")?,
            vertical,
        })
    }
}

/// Dense container over a fixed range, backed by one allocation.
pub struct BoundedRaw;

impl AdapterDescriptor<Container> for BoundedRaw {
    type Configuration = BoundedRawContainerConfig;
    type Handler = bounded_raw::BoundedRawContainer;
}

impl NamedAdapter for BoundedRaw {
    fn name() -> &'static str {
        "bounded_raw"
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundedRawContainerConfig {
    pub range: RegionRange,
    pub channels: ChannelId,
    /// Initial value of every coordinate. `None` is 0.
    pub default_value: Option<u32>,
}

impl Default for BoundedRawContainerConfig {
    fn default() -> Self {
        Self {
            range: RegionRange::default(),
            channels: ChannelId::COLOR,
            default_value: None,
        }
    }
}

/// Chunked container that allocates blocks on first write.
pub struct Raw;

impl AdapterDescriptor<Container> for Raw {
    type Configuration = RawContainerConfig;
    type Handler = raw::RawContainer;
}

impl NamedAdapter for Raw {
    fn name() -> &'static str {
        "raw"
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawContainerConfig {
    pub channels: ChannelId,
    /// Value of coordinates never written. `None` makes them unsampleable.
    pub default_value: Option<u32>,
}

impl Default for RawContainerConfig {
    fn default() -> Self {
        Self {
            channels: ChannelId::COLOR,
            default_value: None,
        }
    }
}
