use super::*;

const ITER_BRICK_SIZE: u32 = 16;

pub struct BoundedRawContainer {
    block: DenseBlock,
}

impl BaseAdapterHandler<Container, BoundedRaw> for BoundedRawContainer {
    fn create(config: BoundedRawContainerConfig) -> Result<Self> {
        if config.channels.is_empty() {
            return Err(VoxError::invalid_argument("bounded_raw needs at least one channel"));
        }
        let mut block = DenseBlock::new(config.range, config.channels);
        if let Some(value) = config.default_value {
            block.values.fill(value);
        }
        tracing::debug!(range = ?config.range, channels = ?config.channels, "allocated bounded_raw storage");
        Ok(Self { block })
    }
}

impl BoundedRawContainer {
    fn check_inside(&self, range: &RegionRange) -> Result<()> {
        if !self.block.range.contains_range(range) {
            return Err(VoxError::out_of_range(format!(
                "{range:?} is outside the container bounds {:?}",
                self.block.range
            )));
        }
        Ok(())
    }
}

impl ContainerAdapterHandler for BoundedRawContainer {
    fn channels(&self) -> ChannelId {
        self.block.channels
    }

    fn bounds(&self) -> RegionRange {
        self.block.range
    }

    fn fill(&mut self, voxel: &Voxel, range: &RegionRange) -> Result<()> {
        self.check_inside(range)?;
        let stride = self.block.channels.count();
        let slots: Vec<(usize, u32)> = voxel
            .channels()
            .iter_channels()
            .filter_map(|channel| {
                Some((self.block.channels.slot_of(channel)?, voxel.get(channel)?))
            })
            .collect();
        let mut rows = *range;
        rows.extent.x = 1;
        for row_start in rows.iter_offsets() {
            let base = self.block.range.linear_index(&row_start) * stride;
            for x in 0..range.extent.x as usize {
                for &(slot, value) in &slots {
                    self.block.values[base + x * stride + slot] = value;
                }
            }
        }
        Ok(())
    }

    fn sample(&self, offset: &Offset3D, channel: ChannelId) -> Result<u32> {
        self.block.sample(offset, channel)
    }

    fn uniform_value(&self, range: &RegionRange, channels: ChannelId) -> Result<Option<Voxel>> {
        if !self.block.range.contains_range(range) {
            return Ok(None);
        }
        uniform_in(&self.block, range, channels)
    }

    fn create_iterator(&self) -> Box<dyn VoxelCursor + '_> {
        let bricks = self.block.range.bricks(ITER_BRICK_SIZE);
        Box::new(BrickWalker::new(DenseBricks { block: &self.block }, bricks, self.block.channels))
    }
}

fn voxel_at(block: &DenseBlock, offset: &Offset3D, channels: ChannelId) -> Result<Voxel> {
    let mut voxel = Voxel::default();
    for channel in channels.iter_channels() {
        voxel.set(channel, block.sample(offset, channel)?);
    }
    Ok(voxel)
}

fn uniform_in(block: &DenseBlock, range: &RegionRange, channels: ChannelId) -> Result<Option<Voxel>> {
    let mut offsets = range.iter_offsets();
    let Some(first) = offsets.next() else {
        return Ok(None);
    };
    let voxel = voxel_at(block, &first, channels)?;
    for offset in offsets {
        if voxel_at(block, &offset, channels)? != voxel {
            return Ok(None);
        }
    }
    Ok(Some(voxel))
}

struct DenseBricks<'a> {
    block: &'a DenseBlock,
}

impl BrickSource for DenseBricks<'_> {
    fn brick_value(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Option<Voxel>> {
        uniform_in(self.block, range, channels)
    }

    fn leaf(&mut self, offset: &Offset3D, channels: ChannelId) -> Result<Option<Voxel>> {
        voxel_at(self.block, offset, channels).map(Some)
    }
}
