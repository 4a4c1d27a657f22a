use crate::*;
use std::any::Any;

/// One value per channel for a single voxel.
///
/// Unset channels always hold 0 so two voxels compare equal exactly when they
/// carry the same channels with the same values.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Voxel {
    channels: ChannelId,
    values: [u32; CHANNEL_COUNT],
}

impl Default for Voxel {
    fn default() -> Self {
        Self {
            channels: ChannelId::empty(),
            values: [0; CHANNEL_COUNT],
        }
    }
}

impl Voxel {
    /// A voxel carrying `value` in every channel of `channels`.
    pub fn splat(channels: ChannelId, value: u32) -> Self {
        let mut voxel = Self::default();
        for channel in channels.iter_channels() {
            voxel.set(channel, value);
        }
        voxel
    }

    pub fn with(mut self, channel: ChannelId, value: u32) -> Self {
        self.set(channel, value);
        self
    }

    /// Sets a single channel. Multi-channel or empty sets are ignored.
    pub fn set(&mut self, channel: ChannelId, value: u32) {
        if let Some(index) = channel.index() {
            self.values[index as usize] = value;
            self.channels.insert(channel);
        }
    }

    pub fn get(&self, channel: ChannelId) -> Option<u32> {
        let index = channel.index()?;
        if self.channels.contains(channel) {
            Some(self.values[index as usize])
        } else {
            None
        }
    }

    pub fn channels(&self) -> ChannelId {
        self.channels
    }

    /// Keeps only the channels in `channels`.
    pub fn restrict(mut self, channels: ChannelId) -> Self {
        for channel in self.channels.difference(channels).iter_channels() {
            if let Some(index) = channel.index() {
                self.values[index as usize] = 0;
            }
        }
        self.channels &= channels;
        self
    }
}

impl std::fmt::Debug for Voxel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for channel in self.channels.iter_channels() {
            map.entry(&channel, &self.get(channel).unwrap_or_default());
        }
        map.finish()
    }
}

/// A read-only snapshot of voxel data over a range and channel set.
///
/// A region belongs to the parser or container that loaded it and must be
/// handed back through `unload_region` before that producer is destroyed. The
/// payload is opaque to everyone but the producer; its meaning depends on
/// [`Region::flags`].
pub struct Region {
    range: RegionRange,
    channels: ChannelId,
    flags: RegionFlags,
    data: Box<dyn Any + Send>,
    pub(crate) producer: u64,
}

impl Region {
    pub fn new<T: Any + Send>(
        range: RegionRange,
        channels: ChannelId,
        flags: RegionFlags,
        data: T,
    ) -> Self {
        Self {
            range,
            channels,
            flags,
            data: Box::new(data),
            producer: 0,
        }
    }

    /// A uniform region whose payload is the single shared voxel.
    pub fn uniform(range: RegionRange, channels: ChannelId, voxel: Voxel) -> Self {
        Self::new(range, channels, RegionFlags::UNIFORM, voxel.restrict(channels))
    }

    pub fn range(&self) -> &RegionRange {
        &self.range
    }

    pub fn channels(&self) -> ChannelId {
        self.channels
    }

    pub fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// The producer's payload, if it has type `T`.
    pub fn data<T: Any>(&self) -> Result<&T> {
        self.data.downcast_ref::<T>().ok_or_else(|| {
            VoxError::invalid_argument("region payload was not produced by this adapter")
        })
    }

    /// Rejects samples outside the range or the channel mask. `channel` must
    /// name exactly one channel.
    pub fn check_sample(&self, offset: &Offset3D, channel: ChannelId) -> Result<()> {
        if channel.index().is_none() {
            return Err(VoxError::invalid_argument(format!(
                "sample must name exactly one channel, got {channel:?}"
            )));
        }
        if !self.channels.contains(channel) {
            return Err(VoxError::out_of_range(format!(
                "channel {channel:?} is not in region mask {:?}",
                self.channels
            )));
        }
        if !self.range.contains(offset) {
            return Err(VoxError::out_of_range(format!(
                "{offset:?} is outside region {:?}",
                self.range
            )));
        }
        Ok(())
    }

    /// Samples a region whose payload is a [`Voxel`] (uniform) or a
    /// [`DenseBlock`]. Producers using other payloads sample their own.
    pub fn sample_standard(&self, offset: &Offset3D, channel: ChannelId) -> Result<u32> {
        self.check_sample(offset, channel)?;
        if let Some(voxel) = self.data.downcast_ref::<Voxel>() {
            return voxel
                .get(channel)
                .ok_or_else(|| VoxError::out_of_range(format!("{channel:?} not stored")));
        }
        self.data::<DenseBlock>()?.sample(offset, channel)
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("range", &self.range)
            .field("channels", &self.channels)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Dense per-channel values over a range, x fastest, channels interleaved in
/// ascending order. Coordinates flagged absent cannot be sampled.
#[derive(Clone, Debug)]
pub struct DenseBlock {
    pub range: RegionRange,
    pub channels: ChannelId,
    pub values: Vec<u32>,
    pub present: Option<Vec<bool>>,
}

impl DenseBlock {
    pub fn new(range: RegionRange, channels: ChannelId) -> Self {
        Self {
            range,
            channels,
            values: vec![0; range.volume() as usize * channels.count()],
            present: None,
        }
    }

    pub fn index(&self, offset: &Offset3D, channel: ChannelId) -> Option<usize> {
        if !self.range.contains(offset) {
            return None;
        }
        let slot = self.channels.slot_of(channel)?;
        Some(self.range.linear_index(offset) * self.channels.count() + slot)
    }

    pub fn sample(&self, offset: &Offset3D, channel: ChannelId) -> Result<u32> {
        let index = self.index(offset, channel).ok_or_else(|| {
            VoxError::out_of_range(format!("{offset:?}/{channel:?} is outside the block"))
        })?;
        if let Some(present) = &self.present {
            if !present[self.range.linear_index(offset)] {
                return Err(VoxError::out_of_range(format!("{offset:?} holds no data")));
            }
        }
        Ok(self.values[index])
    }

    pub fn set(&mut self, offset: &Offset3D, channel: ChannelId, value: u32) {
        if let Some(index) = self.index(offset, channel) {
            self.values[index] = value;
        }
    }

    /// Marks a coordinate as holding no data.
    pub fn mark_absent(&mut self, offset: &Offset3D) {
        if !self.range.contains(offset) {
            return;
        }
        let linear = self.range.linear_index(offset);
        let volume = self.range.volume() as usize;
        self.present.get_or_insert_with(|| vec![true; volume])[linear] = false;
    }
}
