use crate::*;

/// How far an iterator moves on the next advance.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AdvanceMode {
    /// Step into the current node, or to the next item.
    #[default]
    Next,
    /// Skip the leaves of the node last returned.
    SkipBranch,
}

/// One step of a traversal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IteratorValue {
    /// Opens a node. When the node is uniform, `uniform` holds its voxel and
    /// the consumer may skip its leaves.
    Region {
        range: RegionRange,
        flags: RegionFlags,
        uniform: Option<Voxel>,
    },
    /// A single stored coordinate of the node last opened.
    Leaf { offset: Offset3D, voxel: Voxel },
    End,
}

/// A cursor over a container or parser.
pub trait VoxelCursor {
    fn advance(&mut self, mode: AdvanceMode) -> Result<IteratorValue>;
}

/// What a [`BrickWalker`] needs from the store it walks.
pub trait BrickSource {
    /// The shared voxel of `range`, or `None` if the range is not uniform.
    fn brick_value(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Option<Voxel>>;

    /// Called before the leaves of `range` are read.
    fn open(&mut self, _range: &RegionRange, _channels: ChannelId) -> Result<()> {
        Ok(())
    }

    /// The voxel at `offset`, or `None` when nothing is stored there.
    fn leaf(&mut self, offset: &Offset3D, channels: ChannelId) -> Result<Option<Voxel>>;

    /// Called once the leaves of the open node are done or skipped.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

enum WalkState {
    Idle,
    Pending(RegionRange),
    Open(OffsetIter),
    Done,
}

/// Walks a fixed list of disjoint bricks, yielding one node per brick and,
/// unless skipped, the brick's leaves.
pub struct BrickWalker<S> {
    source: S,
    bricks: Vec<RegionRange>,
    next_brick: usize,
    channels: ChannelId,
    state: WalkState,
}

impl<S: BrickSource> BrickWalker<S> {
    pub fn new(source: S, bricks: Vec<RegionRange>, channels: ChannelId) -> Self {
        Self {
            source,
            bricks,
            next_brick: 0,
            channels,
            state: WalkState::Idle,
        }
    }

    pub fn into_source(self) -> S {
        self.source
    }

    fn open_next_node(&mut self) -> Result<IteratorValue> {
        let Some(range) = self.bricks.get(self.next_brick).copied() else {
            self.state = WalkState::Done;
            return Ok(IteratorValue::End);
        };
        self.next_brick += 1;
        let uniform = self.source.brick_value(&range, self.channels)?;
        let flags = if uniform.is_some() {
            RegionFlags::UNIFORM
        } else {
            RegionFlags::empty()
        };
        self.state = WalkState::Pending(range);
        Ok(IteratorValue::Region {
            range,
            flags,
            uniform,
        })
    }
}

impl<S: BrickSource> VoxelCursor for BrickWalker<S> {
    fn advance(&mut self, mode: AdvanceMode) -> Result<IteratorValue> {
        loop {
            match std::mem::replace(&mut self.state, WalkState::Idle) {
                WalkState::Done => {
                    self.state = WalkState::Done;
                    return Ok(IteratorValue::End);
                }
                WalkState::Idle => return self.open_next_node(),
                WalkState::Pending(range) => {
                    if mode == AdvanceMode::SkipBranch {
                        return self.open_next_node();
                    }
                    self.source.open(&range, self.channels)?;
                    self.state = WalkState::Open(range.iter_offsets());
                }
                WalkState::Open(mut offsets) => {
                    if mode == AdvanceMode::SkipBranch {
                        self.source.close()?;
                        return self.open_next_node();
                    }
                    match offsets.next() {
                        Some(offset) => {
                            let leaf = self.source.leaf(&offset, self.channels)?;
                            self.state = WalkState::Open(offsets);
                            if let Some(voxel) = leaf {
                                return Ok(IteratorValue::Leaf { offset, voxel });
                            }
                        }
                        None => {
                            self.source.close()?;
                            return self.open_next_node();
                        }
                    }
                }
            }
        }
    }
}

/// A finite, non-restartable traversal. As an [`Iterator`] it always advances
/// with [`AdvanceMode::Next`] and stops after `End` or the first error.
pub struct RegionIter<'a> {
    cursor: Box<dyn VoxelCursor + 'a>,
    finished: bool,
}

impl<'a> RegionIter<'a> {
    pub fn new(cursor: Box<dyn VoxelCursor + 'a>) -> Self {
        Self {
            cursor,
            finished: false,
        }
    }

    pub fn advance(&mut self, mode: AdvanceMode) -> Result<IteratorValue> {
        if self.finished {
            return Ok(IteratorValue::End);
        }
        let value = self.cursor.advance(mode);
        if !matches!(value, Ok(IteratorValue::Region { .. } | IteratorValue::Leaf { .. })) {
            self.finished = true;
        }
        value
    }
}

impl Iterator for RegionIter<'_> {
    type Item = Result<IteratorValue>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance(AdvanceMode::Next) {
            Ok(IteratorValue::End) => None,
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stores the x coordinate as the color of every voxel with even x.
    struct Stripes;

    impl BrickSource for Stripes {
        fn brick_value(&mut self, range: &RegionRange, _: ChannelId) -> Result<Option<Voxel>> {
            Ok((range.extent.x == 1).then(|| Voxel::splat(ChannelId::COLOR, range.offset.x as u32)))
        }

        fn leaf(&mut self, offset: &Offset3D, channels: ChannelId) -> Result<Option<Voxel>> {
            Ok((offset.x % 2 == 0).then(|| Voxel::splat(channels, offset.x as u32)))
        }
    }

    fn stripes(range: RegionRange) -> BrickWalker<Stripes> {
        BrickWalker::new(Stripes, range.bricks(2), ChannelId::COLOR)
    }

    #[test]
    fn visits_each_stored_leaf_once() {
        let range = RegionRange::new(Offset3D::new(0, 0, 0), Extent3D::new(4, 2, 1));
        let iter = RegionIter::new(Box::new(stripes(range)));
        let leaves: Vec<_> = iter
            .filter_map(|v| match v {
                Ok(IteratorValue::Leaf { offset, .. }) => Some(offset),
                _ => None,
            })
            .collect();
        assert_eq!(leaves.len(), 4);
        let mut sorted = leaves.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), leaves.len());
    }

    #[test]
    fn skip_branch_jumps_to_next_node() {
        let range = RegionRange::new(Offset3D::new(0, 0, 0), Extent3D::new(4, 1, 1));
        let mut iter = RegionIter::new(Box::new(stripes(range)));
        let mut nodes = 0;
        let mut mode = AdvanceMode::Next;
        loop {
            match iter.advance(mode).unwrap() {
                IteratorValue::Region { .. } => {
                    nodes += 1;
                    mode = AdvanceMode::SkipBranch;
                }
                IteratorValue::Leaf { .. } => panic!("skipped nodes must not yield leaves"),
                IteratorValue::End => break,
            }
        }
        assert_eq!(nodes, 2);
        assert_eq!(iter.advance(AdvanceMode::Next).unwrap(), IteratorValue::End);
    }

    #[test]
    fn empty_range_ends_immediately() {
        let range = RegionRange::new(Offset3D::new(0, 0, 0), Extent3D::default());
        let mut iter = RegionIter::new(Box::new(stripes(range)));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }
}
