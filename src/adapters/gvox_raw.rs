use super::*;

const MAGIC: [u8; 4] = *b"GVRW";
const VERSION: u32 = 1;

/// Where a dense x-fastest block of interleaved `u32` channel values sits in
/// the input, and what it covers.
#[derive(Copy, Clone, Debug, Default)]
pub(super) struct DenseLayout {
    pub data_start: u64,
    pub range: RegionRange,
    pub channels: ChannelId,
}

impl DenseLayout {
    fn stride(&self) -> usize {
        self.channels.count()
    }

    pub fn byte_len(&self) -> u64 {
        self.range.volume() * self.stride() as u64 * 4
    }

    /// Fails with `FormatError` when the input ends before the block does.
    pub fn check_fits(&self, blit: &mut ParseBlitContext<'_>) -> Result<()> {
        let here = blit.input_tell()?;
        blit.input_seek(0, SeekOrigin::End)?;
        let end = blit.input_tell()?;
        blit.input_seek(here as i64, SeekOrigin::Beg)?;
        let needed = self.data_start + self.byte_len();
        if end < needed {
            return Err(VoxError::format(format!(
                "truncated voxel data: need {needed} bytes, stream has {end}"
            )));
        }
        Ok(())
    }

    /// Every stored channel of `len` consecutive voxels starting at `start`.
    fn read_row(&self, blit: &mut ParseBlitContext<'_>, start: &Offset3D, len: u32) -> Result<Vec<u32>> {
        let stride = self.stride();
        let position = self.data_start + (self.range.linear_index(start) * stride * 4) as u64;
        blit.input_seek(position as i64, SeekOrigin::Beg)?;
        let mut bytes = vec![0u8; len as usize * stride * 4];
        blit.input_read(&mut bytes)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Calls `f` with each voxel of the stored part of `range`, row by row.
    fn for_each_stored(
        &self,
        blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
        mut f: impl FnMut(Offset3D, Voxel) -> bool,
    ) -> Result<()> {
        let Some(stored) = range.intersection(&self.range) else {
            return Ok(());
        };
        let stride = self.stride();
        let mut rows = stored;
        rows.extent.x = 1;
        for row_start in rows.iter_offsets() {
            let row = self.read_row(blit, &row_start, stored.extent.x)?;
            for (i, values) in row.chunks_exact(stride).enumerate() {
                let mut voxel = Voxel::default();
                for (slot, channel) in self.channels.iter_channels().enumerate() {
                    if channels.contains(channel) {
                        voxel.set(channel, values[slot]);
                    }
                }
                let offset = Offset3D::new(row_start.x + i as i32, row_start.y, row_start.z);
                if !f(offset, voxel) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Decodes only the rows `range` touches. Coordinates outside the stored
    /// range read as 0.
    pub fn load(
        &self,
        blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<Region> {
        let mut block = DenseBlock::new(*range, channels);
        self.for_each_stored(blit, range, channels, |offset, voxel| {
            for channel in channels.iter_channels() {
                block.set(&offset, channel, voxel.get(channel).unwrap_or_default());
            }
            true
        })?;
        let stride = channels.count().max(1);
        let mut voxels = block.values.chunks_exact(stride);
        let first = voxels.next();
        let flags = match first {
            Some(first) if voxels.all(|v| v == first) => RegionFlags::UNIFORM,
            _ => RegionFlags::empty(),
        };
        Ok(Region::new(*range, channels, flags, block))
    }

    /// Scans `range` and stops at the first voxel that differs. The input
    /// cursor is left where it was.
    pub fn is_uniform(
        &self,
        blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<bool> {
        let mut expected = if self.range.contains_range(range) {
            None
        } else {
            Some(Voxel::splat(channels, 0))
        };
        let mut uniform = true;
        let cursor = blit.input_tell()?;
        let scanned = self.for_each_stored(blit, range, channels, |_, voxel| {
            let first = *expected.get_or_insert(voxel);
            uniform = first == voxel;
            uniform
        });
        blit.input_seek(cursor as i64, SeekOrigin::Beg)?;
        scanned?;
        Ok(uniform)
    }
}

pub struct GvoxRawParser {
    layout: DenseLayout,
}

impl BaseAdapterHandler<Parse, GvoxRaw> for GvoxRawParser {
    fn create(_: ()) -> Result<Self> {
        Ok(Self {
            layout: DenseLayout::default(),
        })
    }
}

impl ParseAdapterHandler for GvoxRawParser {
    fn begin(&mut self, blit: &mut ParseBlitContext<'_>) -> Result<()> {
        let mut magic = [0u8; 4];
        blit.input_read(&mut magic)?;
        if magic != MAGIC {
            return Err(VoxError::format(format!("bad gvox_raw magic {magic:02x?}")));
        }
        let version = blit.read_u32()?;
        if version != VERSION {
            return Err(VoxError::format(format!("unsupported gvox_raw version {version}")));
        }
        let offset = Offset3D::new(blit.read_i32()?, blit.read_i32()?, blit.read_i32()?);
        let extent = Extent3D::new(blit.read_u32()?, blit.read_u32()?, blit.read_u32()?);
        let channels = ChannelId::from_mask(blit.read_u32()?);
        self.layout = DenseLayout {
            data_start: blit.input_tell()?,
            range: RegionRange::new(offset, extent),
            channels,
        };
        self.layout.check_fits(blit)
    }

    fn available_channels(&self) -> ChannelId {
        self.layout.channels
    }

    fn parsable_range(&self) -> RegionRange {
        self.layout.range
    }

    fn query_region_flags(
        &mut self,
        blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<RegionFlags> {
        Ok(if self.layout.is_uniform(blit, range, channels)? {
            RegionFlags::UNIFORM
        } else {
            RegionFlags::empty()
        })
    }

    fn load_region(
        &mut self,
        blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<Region> {
        self.layout.load(blit, range, channels)
    }
}

/// Writes `range` as x-fastest interleaved values, one z-slice at a time.
/// Uniform slices are written without loading them.
pub(super) fn write_dense(
    blit: &mut SerializeBlitContext<'_>,
    range: &RegionRange,
    channels: ChannelId,
) -> Result<()> {
    if range.is_empty() {
        return Ok(());
    }
    let stride = channels.count();
    blit.output_reserve(range.volume() as usize * stride * 4)?;
    if blit.query_region_flags(range, channels)?.contains(RegionFlags::UNIFORM) {
        let voxel = blit.uniform_voxel(range, channels)?;
        return write_repeated(blit, &voxel, channels, range.volume());
    }
    let mut slice = *range;
    slice.extent.z = 1;
    for z in 0..range.extent.z {
        slice.offset.z = range.offset.z + z as i32;
        if blit.query_region_flags(&slice, channels)?.contains(RegionFlags::UNIFORM) {
            let voxel = blit.uniform_voxel(&slice, channels)?;
            write_repeated(blit, &voxel, channels, slice.volume())?;
            continue;
        }
        let region = blit.load_region(&slice, channels)?;
        let mut bytes = Vec::with_capacity(slice.volume() as usize * stride * 4);
        let mut result = Ok(());
        for offset in slice.iter_offsets() {
            match blit.sample_voxel(&region, &offset, channels) {
                Ok(voxel) => {
                    for channel in channels.iter_channels() {
                        bytes.extend_from_slice(&voxel.get(channel).unwrap_or_default().to_le_bytes());
                    }
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        blit.unload_region(region)?;
        result?;
        blit.output_write(&bytes)?;
    }
    Ok(())
}

fn write_repeated(
    blit: &mut SerializeBlitContext<'_>,
    voxel: &Voxel,
    channels: ChannelId,
    count: u64,
) -> Result<()> {
    let one: Vec<u8> = channels
        .iter_channels()
        .flat_map(|channel| voxel.get(channel).unwrap_or_default().to_le_bytes())
        .collect();
    const BATCH: u64 = 4096;
    let batch = one.repeat(count.min(BATCH) as usize);
    let mut left = count;
    while left > 0 {
        let n = left.min(BATCH);
        blit.output_write(&batch[..n as usize * one.len()])?;
        left -= n;
    }
    Ok(())
}

pub struct GvoxRawSerializer;

impl BaseAdapterHandler<Serialize, GvoxRaw> for GvoxRawSerializer {
    fn create(_: ()) -> Result<Self> {
        Ok(Self)
    }
}

impl SerializeAdapterHandler for GvoxRawSerializer {
    fn blit_begin(
        &mut self,
        blit: &mut SerializeBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<()> {
        blit.output_write(&MAGIC)?;
        blit.write_u32(VERSION)?;
        blit.write_i32(range.offset.x)?;
        blit.write_i32(range.offset.y)?;
        blit.write_i32(range.offset.z)?;
        blit.write_u32(range.extent.x)?;
        blit.write_u32(range.extent.y)?;
        blit.write_u32(range.extent.z)?;
        blit.write_u32(channels.bits())
    }

    fn serialize_region(
        &mut self,
        blit: &mut SerializeBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<()> {
        write_dense(blit, range, channels)
    }
}
