//! Chunked voxel storage.
//!
//! Space is cut into 16³ chunks keyed by chunk coordinate. A chunk is only
//! materialized when something is written to it, and a chunk covered by a
//! single fill is kept as one shared voxel until a partial write splits it.

use super::*;
use fxhash::FxHashMap;

/// Side length of a chunk in voxels.
pub const CHUNK_SIZE: u32 = 16;

type ChunkKey = [i32; 3];

enum Chunk {
    /// Every coordinate of the chunk holds this voxel.
    Uniform(Voxel),
    Dense(Box<DenseBlock>),
}

fn chunk_key(offset: &Offset3D) -> ChunkKey {
    let size = CHUNK_SIZE as i32;
    [
        offset.x.div_euclid(size),
        offset.y.div_euclid(size),
        offset.z.div_euclid(size),
    ]
}

fn chunk_range(key: ChunkKey) -> RegionRange {
    let size = CHUNK_SIZE as i64;
    let lo = [key[0] as i64 * size, key[1] as i64 * size, key[2] as i64 * size];
    RegionRange::from_bounds(lo, [lo[0] + size, lo[1] + size, lo[2] + size])
}

/// Writes the channels of `voxel` at `offset`. A coordinate written for the
/// first time starts from `base`.
fn write_dense(block: &mut DenseBlock, offset: &Offset3D, voxel: &Voxel, base: &Voxel) {
    let linear = block.range.linear_index(offset);
    let fresh = match &mut block.present {
        Some(present) if !present[linear] => {
            present[linear] = true;
            true
        }
        _ => false,
    };
    if fresh {
        for channel in block.channels.iter_channels() {
            block.set(offset, channel, base.get(channel).unwrap_or_default());
        }
    }
    for channel in voxel.channels().iter_channels() {
        block.set(offset, channel, voxel.get(channel).unwrap_or_default());
    }
}

fn dense_voxel(block: &DenseBlock, offset: &Offset3D, channels: ChannelId) -> Option<Voxel> {
    let mut voxel = Voxel::default();
    for channel in channels.iter_channels() {
        voxel.set(channel, block.sample(offset, channel).ok()?);
    }
    Some(voxel)
}

/// The uniform voxel of a chunk over `range`, which lies inside the chunk.
/// Unwritten coordinates count as `gap`, or break uniformity when it is `None`.
fn chunk_uniform(
    chunk: &Chunk,
    range: &RegionRange,
    channels: ChannelId,
    gap: Option<Voxel>,
) -> Option<Voxel> {
    match chunk {
        Chunk::Uniform(voxel) => voxel.channels().contains(channels).then(|| voxel.restrict(channels)),
        Chunk::Dense(block) => {
            let voxel_at = |offset: &Offset3D| dense_voxel(block, offset, channels).or(gap);
            let mut offsets = range.iter_offsets();
            let first = voxel_at(&offsets.next()?)?;
            for offset in offsets {
                if voxel_at(&offset)? != first {
                    return None;
                }
            }
            Some(first)
        }
    }
}

pub struct RawContainer {
    channels: ChannelId,
    default_value: Option<u32>,
    chunks: FxHashMap<ChunkKey, Chunk>,
    bounds: RegionRange,
}

impl BaseAdapterHandler<Container, Raw> for RawContainer {
    fn create(config: RawContainerConfig) -> Result<Self> {
        if config.channels.is_empty() {
            return Err(VoxError::invalid_argument("raw container needs at least one channel"));
        }
        Ok(Self {
            channels: config.channels,
            default_value: config.default_value,
            chunks: FxHashMap::default(),
            bounds: RegionRange::default(),
        })
    }
}

impl RawContainer {
    /// What an unwritten coordinate holds, if anything.
    fn base_voxel(&self) -> Voxel {
        match self.default_value {
            Some(value) => Voxel::splat(self.channels, value),
            None => Voxel::default(),
        }
    }

    fn unwritten(&self, channels: ChannelId) -> Option<Voxel> {
        self.default_value.map(|value| Voxel::splat(channels, value))
    }

    fn uniform_over(
        &self,
        range: &RegionRange,
        channels: ChannelId,
        gap: Option<Voxel>,
    ) -> Option<Voxel> {
        let mut value: Option<Voxel> = None;
        for brick in range.bricks(CHUNK_SIZE) {
            let voxel = match self.chunks.get(&chunk_key(&brick.offset)) {
                None => self.unwritten(channels).or(gap),
                Some(chunk) => chunk_uniform(chunk, &brick, channels, gap),
            }?;
            if *value.get_or_insert(voxel) != voxel {
                return None;
            }
        }
        value
    }

    /// The chunk at `key` as dense storage, splitting or allocating it.
    fn dense_chunk(&mut self, key: ChunkKey) -> &mut DenseBlock {
        let channels = self.channels;
        let default_value = self.default_value;
        let chunk = self.chunks.entry(key).or_insert_with(|| {
            let mut block = DenseBlock::new(chunk_range(key), channels);
            match default_value {
                Some(value) => block.values.fill(value),
                None => block.present = Some(vec![false; block.range.volume() as usize]),
            }
            tracing::debug!(chunk = ?key, "allocated chunk");
            Chunk::Dense(Box::new(block))
        });
        if let Chunk::Uniform(voxel) = *chunk {
            let mut block = DenseBlock::new(chunk_range(key), channels);
            let shared: Vec<u32> = channels
                .iter_channels()
                .map(|channel| voxel.get(channel).or(default_value).unwrap_or_default())
                .collect();
            for (value, slot) in block.values.iter_mut().zip(shared.iter().cycle()) {
                *value = *slot;
            }
            tracing::trace!(chunk = ?key, "split uniform chunk");
            *chunk = Chunk::Dense(Box::new(block));
        }
        match chunk {
            Chunk::Dense(block) => &mut **block,
            Chunk::Uniform(_) => unreachable!("uniform chunks were just split"),
        }
    }

    fn fill_chunk(&mut self, key: ChunkKey, voxel: &Voxel, range: &RegionRange) {
        let base = self.base_voxel();
        if *range == chunk_range(key) {
            let merged = match self.chunks.get(&key) {
                Some(Chunk::Uniform(old)) => Some(*old),
                Some(Chunk::Dense(_)) if voxel.channels() != self.channels => None,
                _ => Some(base),
            };
            if let Some(mut merged) = merged {
                for channel in voxel.channels().iter_channels() {
                    merged.set(channel, voxel.get(channel).unwrap_or_default());
                }
                if self.default_value.is_none() {
                    for channel in self.channels.difference(merged.channels()).iter_channels() {
                        merged.set(channel, 0);
                    }
                }
                self.chunks.insert(key, Chunk::Uniform(merged));
                return;
            }
        }
        let block = self.dense_chunk(key);
        for offset in range.iter_offsets() {
            write_dense(block, &offset, voxel, &base);
        }
    }
}

impl ContainerAdapterHandler for RawContainer {
    fn channels(&self) -> ChannelId {
        self.channels
    }

    fn bounds(&self) -> RegionRange {
        self.bounds
    }

    fn fill(&mut self, voxel: &Voxel, range: &RegionRange) -> Result<()> {
        for brick in range.bricks(CHUNK_SIZE) {
            self.fill_chunk(chunk_key(&brick.offset), voxel, &brick);
        }
        self.bounds = self.bounds.union(range);
        Ok(())
    }

    fn set_voxel(&mut self, offset: &Offset3D, voxel: &Voxel) -> Result<()> {
        let base = self.base_voxel();
        write_dense(self.dense_chunk(chunk_key(offset)), offset, voxel, &base);
        self.bounds = self.bounds.union(&RegionRange::voxel(*offset));
        Ok(())
    }

    fn sample(&self, offset: &Offset3D, channel: ChannelId) -> Result<u32> {
        let stored = match self.chunks.get(&chunk_key(offset)) {
            None => self.default_value,
            Some(Chunk::Uniform(voxel)) => voxel.get(channel),
            Some(Chunk::Dense(block)) => block.sample(offset, channel).ok(),
        };
        stored.ok_or_else(|| VoxError::out_of_range(format!("nothing stored at {offset:?}")))
    }

    fn uniform_value(&self, range: &RegionRange, channels: ChannelId) -> Result<Option<Voxel>> {
        Ok(self.uniform_over(range, channels, None))
    }

    fn uniform_value_or_zero(
        &self,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<Option<Voxel>> {
        Ok(self.uniform_over(range, channels, Some(Voxel::splat(channels, 0))))
    }

    /// Visits allocated chunks in z, y, x order of their coordinates.
    fn create_iterator(&self) -> Box<dyn VoxelCursor + '_> {
        let mut keys: Vec<ChunkKey> = self.chunks.keys().copied().collect();
        keys.sort_unstable_by_key(|k| [k[2], k[1], k[0]]);
        let bricks = keys.into_iter().map(chunk_range).collect();
        Box::new(BrickWalker::new(ChunkBricks { chunks: &self.chunks }, bricks, self.channels))
    }
}

struct ChunkBricks<'a> {
    chunks: &'a FxHashMap<ChunkKey, Chunk>,
}

impl BrickSource for ChunkBricks<'_> {
    fn brick_value(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Option<Voxel>> {
        Ok(self
            .chunks
            .get(&chunk_key(&range.offset))
            .and_then(|chunk| chunk_uniform(chunk, range, channels, None)))
    }

    fn leaf(&mut self, offset: &Offset3D, channels: ChannelId) -> Result<Option<Voxel>> {
        Ok(match self.chunks.get(&chunk_key(offset)) {
            Some(Chunk::Dense(block)) => dense_voxel(block, offset, channels),
            Some(Chunk::Uniform(voxel)) => Some(voxel.restrict(channels)),
            None => None,
        })
    }
}
