//! Format-agnostic voxel conversion.
//!
//! Voxel data moves from a producer (a [`Parse`] adapter reading an [`Input`]
//! stream, or a [`Container`]) to a consumer (a [`Serialize`] adapter writing an
//! [`Output`] stream, or another container) through [`Region`]s. Producers answer
//! cheap flag queries before any decode, which lets a consumer emit a single value
//! for a homogeneous ([`RegionFlags::UNIFORM`]) volume instead of walking it.
//!
//! Adapters are looked up in a [`Context`], the registry of every adapter kind,
//! and a conversion job is driven by [`blit_region`] and its siblings.


mod adapter;
pub mod adapters;
mod blit;
mod iter;
mod region;

pub use adapter::{
    Adapter, AdapterContext, AdapterDescriptor, AdapterKind, AdapterKindId,
    BaseAdapterHandler, Container, ContainerAdapterHandler, Context, Input,
    InputAdapterHandler, IntoHandler, MoveSource, NamedAdapter, Output, OutputAdapterHandler, Parse,
    ParseAdapterHandler, SampleRequest, Serialize, SerializeAdapterHandler,
};
pub use blit::{
    blit_region, blit_region_to_container, blit_region_to_container_with, blit_region_with,
    serialize_container, serialize_container_with, BlitOptions, BlitOutcome, ParseBlitContext,
    ParseSource, RegionSource, SerializeBlitContext,
};
pub use iter::{AdvanceMode, BrickSource, BrickWalker, IteratorValue, RegionIter, VoxelCursor};
pub use region::{DenseBlock, Region, Voxel};

use int_enum::IntEnum;

/// Result type used throughout the pipeline.
pub type Result<T> = std::result::Result<T, VoxError>;

/// The kind of a [`VoxError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, IntEnum)]
#[repr(u32)]
pub enum ErrorType {
    /// Placeholder for paths that have no implementation.
    Unknown = 0,
    /// Bad configuration or a missing required field.
    InvalidArgument = 1,
    /// A stream could not be opened, read, written or seeked.
    IoError = 2,
    /// Corrupt header, magic or structure.
    FormatError = 3,
    /// The target format cannot express the requested region.
    UnrepresentableData = 4,
    /// An access outside a region's range or channel mask.
    OutOfRange = 5,
}

/// An error raised by an adapter or by the blit orchestration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{ty:?}: {message}")]
pub struct VoxError {
    ty: ErrorType,
    message: String,
}

impl VoxError {
    pub fn new(ty: ErrorType, message: impl Into<String>) -> Self {
        Self {
            ty,
            message: message.into(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        self.ty
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorType::InvalidArgument, message)
    }

    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorType::IoError, message)
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorType::FormatError, message)
    }

    pub(crate) fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorType::OutOfRange, message)
    }

    pub(crate) fn unrepresentable(message: impl Into<String>) -> Self {
        Self::new(ErrorType::UnrepresentableData, message)
    }
}

impl From<std::io::Error> for VoxError {
    fn from(value: std::io::Error) -> Self {
        Self::io(value.to_string())
    }
}

/// A signed voxel-space coordinate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Offset3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Offset3D {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    fn axes(&self) -> [i64; 3] {
        [self.x as i64, self.y as i64, self.z as i64]
    }
}

impl std::ops::Add for Offset3D {
    type Output = Offset3D;

    fn add(self, rhs: Self) -> Self::Output {
        Offset3D {
            x: self.x.wrapping_add(rhs.x),
            y: self.y.wrapping_add(rhs.y),
            z: self.z.wrapping_add(rhs.z),
        }
    }
}

/// A non-negative size per axis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent3D {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Extent3D {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub const fn splat(size: u32) -> Self {
        Self::new(size, size, size)
    }

    fn axes(&self) -> [i64; 3] {
        [self.x as i64, self.y as i64, self.z as i64]
    }
}

/// An axis-aligned box of voxels. A zero extent is an empty but valid range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegionRange {
    pub offset: Offset3D,
    pub extent: Extent3D,
}

impl RegionRange {
    pub const fn new(offset: Offset3D, extent: Extent3D) -> Self {
        Self { offset, extent }
    }

    /// The range covering the single voxel at `offset`.
    pub const fn voxel(offset: Offset3D) -> Self {
        Self::new(offset, Extent3D::splat(1))
    }

    pub fn volume(&self) -> u64 {
        self.extent.x as u64 * self.extent.y as u64 * self.extent.z as u64
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    /// Exclusive upper corner, widened so it never overflows.
    pub fn end(&self) -> [i64; 3] {
        let o = self.offset.axes();
        let e = self.extent.axes();
        [o[0] + e[0], o[1] + e[1], o[2] + e[2]]
    }

    pub fn contains(&self, offset: &Offset3D) -> bool {
        let lo = self.offset.axes();
        let hi = self.end();
        let p = offset.axes();
        (0..3).all(|i| p[i] >= lo[i] && p[i] < hi[i])
    }

    /// Whether every voxel of `other` lies in `self`. Empty ranges are contained
    /// in everything.
    pub fn contains_range(&self, other: &RegionRange) -> bool {
        if other.is_empty() {
            return true;
        }
        let lo = self.offset.axes();
        let hi = self.end();
        let olo = other.offset.axes();
        let ohi = other.end();
        (0..3).all(|i| olo[i] >= lo[i] && ohi[i] <= hi[i])
    }

    /// The overlap of two ranges, `None` if they do not share a voxel.
    pub fn intersection(&self, other: &RegionRange) -> Option<RegionRange> {
        let a_lo = self.offset.axes();
        let a_hi = self.end();
        let b_lo = other.offset.axes();
        let b_hi = other.end();
        let mut lo = [0i64; 3];
        let mut hi = [0i64; 3];
        for i in 0..3 {
            lo[i] = a_lo[i].max(b_lo[i]);
            hi[i] = a_hi[i].min(b_hi[i]);
            if hi[i] <= lo[i] {
                return None;
            }
        }
        Some(Self::from_bounds(lo, hi))
    }

    pub fn translated(&self, by: Offset3D) -> RegionRange {
        Self::new(self.offset + by, self.extent)
    }

    /// Index of `offset` in an x-fastest, then y, then z dense layout of this
    /// range. The caller guarantees `self.contains(offset)`.
    pub fn linear_index(&self, offset: &Offset3D) -> usize {
        let lx = (offset.x as i64 - self.offset.x as i64) as usize;
        let ly = (offset.y as i64 - self.offset.y as i64) as usize;
        let lz = (offset.z as i64 - self.offset.z as i64) as usize;
        let ex = self.extent.x as usize;
        let ey = self.extent.y as usize;
        lx + ex * (ly + ey * lz)
    }

    /// Every coordinate in the range, x fastest.
    pub fn iter_offsets(&self) -> OffsetIter {
        OffsetIter {
            range: *self,
            next: if self.is_empty() { None } else { Some(self.offset) },
        }
    }

    /// Tiles the range into sub-ranges aligned to multiples of `size` in voxel
    /// space, clipped to the range, in z-major, then y, then x order.
    pub fn bricks(&self, size: u32) -> Vec<RegionRange> {
        let size = size.max(1) as i64;
        let mut out = Vec::new();
        if self.is_empty() {
            return out;
        }
        let lo = self.offset.axes();
        let hi = self.end();
        let start = |axis: usize| lo[axis].div_euclid(size) * size;
        let mut z = start(2);
        while z < hi[2] {
            let mut y = start(1);
            while y < hi[1] {
                let mut x = start(0);
                while x < hi[0] {
                    let cell = Self::from_bounds([x, y, z], [x + size, y + size, z + size]);
                    if let Some(clipped) = cell.intersection(self) {
                        out.push(clipped);
                    }
                    x += size;
                }
                y += size;
            }
            z += size;
        }
        out
    }

    /// Smallest range covering both inputs. Empty inputs are ignored.
    pub fn union(&self, other: &RegionRange) -> RegionRange {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let a_lo = self.offset.axes();
        let a_hi = self.end();
        let b_lo = other.offset.axes();
        let b_hi = other.end();
        let mut lo = [0i64; 3];
        let mut hi = [0i64; 3];
        for i in 0..3 {
            lo[i] = a_lo[i].min(b_lo[i]);
            hi[i] = a_hi[i].max(b_hi[i]);
        }
        Self::from_bounds(lo, hi)
    }

    pub(crate) fn from_bounds(lo: [i64; 3], hi: [i64; 3]) -> RegionRange {
        RegionRange {
            offset: Offset3D::new(lo[0] as i32, lo[1] as i32, lo[2] as i32),
            extent: Extent3D::new(
                (hi[0] - lo[0]) as u32,
                (hi[1] - lo[1]) as u32,
                (hi[2] - lo[2]) as u32,
            ),
        }
    }
}

/// Iterator over the coordinates of a [`RegionRange`].
#[derive(Clone, Debug)]
pub struct OffsetIter {
    range: RegionRange,
    next: Option<Offset3D>,
}

impl Iterator for OffsetIter {
    type Item = Offset3D;

    fn next(&mut self) -> Option<Offset3D> {
        let current = self.next?;
        let end = self.range.end();
        let mut p = current.axes();
        p[0] += 1;
        if p[0] >= end[0] {
            p[0] = self.range.offset.x as i64;
            p[1] += 1;
            if p[1] >= end[1] {
                p[1] = self.range.offset.y as i64;
                p[2] += 1;
            }
        }
        self.next = if p[2] >= end[2] {
            None
        } else {
            Some(Offset3D::new(p[0] as i32, p[1] as i32, p[2] as i32))
        };
        Some(current)
    }
}

bitflags::bitflags! {
    /// A set of per-voxel data planes. Bit `n` is channel `n`.
    #[derive(Default)]
    pub struct ChannelId: u32 {
        const COLOR = 1 << 0;
        const NORMAL = 1 << 1;
        const MATERIAL_ID = 1 << 2;
        const ROUGHNESS = 1 << 3;
        const METALNESS = 1 << 4;
        const TRANSPARENCY = 1 << 5;
        const IOR = 1 << 6;
        const EMISSIVITY = 1 << 7;
        const HARDNESS = 1 << 8;
    }
}

/// Maximum number of channels a [`ChannelId`] set can address.
pub const CHANNEL_COUNT: usize = 32;

impl ChannelId {
    /// Every set bit of `bits` as a channel. Bits above
    /// [`ChannelId::HARDNESS`] are custom channels and are kept.
    pub const fn from_mask(bits: u32) -> ChannelId {
        // SAFETY: every bit of a `u32` names a channel; the named constants
        // only cover the standard ones.
        unsafe { ChannelId::from_bits_unchecked(bits) }
    }

    /// The single channel with index `index`, including custom channels above
    /// [`ChannelId::HARDNESS`].
    pub fn from_index(index: u32) -> Option<ChannelId> {
        if (index as usize) < CHANNEL_COUNT {
            Some(ChannelId::from_mask(1 << index))
        } else {
            None
        }
    }

    /// Index of a single-channel set. `None` for empty or multi-channel sets.
    pub fn index(self) -> Option<u32> {
        if self.bits().count_ones() == 1 {
            Some(self.bits().trailing_zeros())
        } else {
            None
        }
    }

    pub fn count(self) -> usize {
        self.bits().count_ones() as usize
    }

    /// Position of the single channel `channel` among the set channels of
    /// `self`, counted in ascending order.
    pub fn slot_of(self, channel: ChannelId) -> Option<usize> {
        let index = channel.index()?;
        if !self.contains(channel) {
            return None;
        }
        Some((self.bits() & ((1u32 << index) - 1)).count_ones() as usize)
    }

    /// The set channels, one single-channel set at a time, ascending.
    pub fn iter_channels(self) -> impl Iterator<Item = ChannelId> {
        let bits = self.bits();
        (0..CHANNEL_COUNT as u32)
            .filter(move |i| bits & (1 << i) != 0)
            .map(|i| ChannelId::from_mask(1 << i))
    }
}

bitflags::bitflags! {
    /// Properties a producer reports for a range before any decode.
    #[derive(Default)]
    pub struct RegionFlags: u32 {
        /// Every coordinate holds the same value for every requested channel.
        const UNIFORM = 1 << 0;
    }
}

/// Origin of a stream seek.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntEnum)]
#[repr(i32)]
pub enum SeekOrigin {
    Beg = 0,
    Cur = 1,
    End = 2,
}

impl SeekOrigin {
    /// Absolute position of a seek, failing when it would land before 0.
    pub fn resolve(self, offset: i64, current: u64, end: u64) -> Result<u64> {
        let base = match self {
            SeekOrigin::Beg => 0i64,
            SeekOrigin::Cur => current as i64,
            SeekOrigin::End => end as i64,
        };
        let target = base.checked_add(offset).ok_or_else(|| {
            VoxError::io(format!("seek overflow ({offset} from {self:?})"))
        })?;
        if target < 0 {
            return Err(VoxError::io(format!(
                "seek to negative position {target} ({offset} from {self:?})"
            )));
        }
        Ok(target as u64)
    }
}
