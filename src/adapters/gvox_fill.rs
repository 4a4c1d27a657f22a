use super::*;

const MAGIC: [u8; 4] = *b"GVFL";
const RECORD_HEADER_SIZE: u64 = 7 * 4;

#[derive(Copy, Clone, Debug)]
struct FillRecord {
    range: RegionRange,
    voxel: Voxel,
}

/// `voxel` with every channel of `channels` present, missing ones as 0.
fn normalized(voxel: &Voxel, channels: ChannelId) -> Voxel {
    let mut out = Voxel::default();
    for channel in channels.iter_channels() {
        out.set(channel, voxel.get(channel).unwrap_or_default());
    }
    out
}

/// Value of `offset` given the records overlapping it. Uncovered coordinates
/// read as 0.
fn lookup(records: &[FillRecord], offset: &Offset3D, channel: ChannelId) -> u32 {
    records
        .iter()
        .find(|record| record.range.contains(offset))
        .and_then(|record| record.voxel.get(channel))
        .unwrap_or_default()
}

/// Fails with `FormatError` when two records share a coordinate.
fn check_disjoint(records: &[FillRecord]) -> Result<()> {
    let mut sorted: Vec<&FillRecord> = records.iter().collect();
    sorted.sort_unstable_by_key(|record| record.range.offset.x);
    for (i, a) in sorted.iter().enumerate() {
        let end = a.range.end()[0];
        let later = sorted[i + 1..]
            .iter()
            .take_while(|b| (b.range.offset.x as i64) < end);
        for b in later {
            if let Some(shared) = a.range.intersection(&b.range) {
                return Err(VoxError::format(format!(
                    "gvox_fill records {:?} and {:?} overlap at {:?}",
                    a.range, b.range, shared.offset
                )));
            }
        }
    }
    Ok(())
}

pub struct GvoxFillParser {
    records: Vec<FillRecord>,
    channels: ChannelId,
    range: RegionRange,
}

impl BaseAdapterHandler<Parse, GvoxFill> for GvoxFillParser {
    fn create(_: ()) -> Result<Self> {
        Ok(Self {
            records: Vec::new(),
            channels: ChannelId::empty(),
            range: RegionRange::default(),
        })
    }
}

impl GvoxFillParser {
    fn overlapping(&self, range: &RegionRange) -> impl Iterator<Item = (RegionRange, &FillRecord)> + '_ {
        let range = *range;
        self.records
            .iter()
            .filter_map(move |record| Some((record.range.intersection(&range)?, record)))
    }

    fn uniform_value(&self, range: &RegionRange, channels: ChannelId) -> Option<Voxel> {
        let mut covered = 0;
        let mut value = None;
        for (overlap, record) in self.overlapping(range) {
            covered += overlap.volume();
            let voxel = normalized(&record.voxel, channels);
            if *value.get_or_insert(voxel) != voxel {
                return None;
            }
        }
        let zero = Voxel::splat(channels, 0);
        match value {
            None => Some(zero),
            Some(voxel) if covered == range.volume() => Some(voxel),
            Some(voxel) if voxel == zero => Some(zero),
            Some(_) => None,
        }
    }
}

impl ParseAdapterHandler for GvoxFillParser {
    fn begin(&mut self, blit: &mut ParseBlitContext<'_>) -> Result<()> {
        let start = blit.input_tell()?;
        blit.input_seek(0, SeekOrigin::End)?;
        let end = blit.input_tell()?;
        blit.input_seek(start as i64, SeekOrigin::Beg)?;

        let mut magic = [0u8; 4];
        blit.input_read(&mut magic)?;
        if magic != MAGIC {
            return Err(VoxError::format(format!("bad gvox_fill magic {magic:02x?}")));
        }
        let count = blit.read_u32()?;
        for i in 0..count {
            let remaining = end.saturating_sub(blit.input_tell()?);
            if remaining < RECORD_HEADER_SIZE {
                return Err(VoxError::format(format!(
                    "gvox_fill holds {count} records but ends inside record {i}"
                )));
            }
            let offset = Offset3D::new(blit.read_i32()?, blit.read_i32()?, blit.read_i32()?);
            let extent = Extent3D::new(blit.read_u32()?, blit.read_u32()?, blit.read_u32()?);
            let channels = ChannelId::from_mask(blit.read_u32()?);
            if remaining < RECORD_HEADER_SIZE + channels.count() as u64 * 4 {
                return Err(VoxError::format(format!("gvox_fill record {i} is truncated")));
            }
            let mut voxel = Voxel::default();
            for channel in channels.iter_channels() {
                voxel.set(channel, blit.read_u32()?);
            }
            let range = RegionRange::new(offset, extent);
            if range.is_empty() {
                continue;
            }
            self.range = self.range.union(&range);
            self.channels |= channels;
            self.records.push(FillRecord { range, voxel });
        }
        check_disjoint(&self.records)?;
        tracing::debug!(records = self.records.len(), range = ?self.range, "read gvox_fill records");
        Ok(())
    }

    fn available_channels(&self) -> ChannelId {
        self.channels
    }

    fn parsable_range(&self) -> RegionRange {
        self.range
    }

    fn query_region_flags(
        &mut self,
        _blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<RegionFlags> {
        Ok(match self.uniform_value(range, channels) {
            Some(_) => RegionFlags::UNIFORM,
            None => RegionFlags::empty(),
        })
    }

    fn load_region(
        &mut self,
        _blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<Region> {
        if let Some(voxel) = self.uniform_value(range, channels) {
            return Ok(Region::uniform(*range, channels, voxel));
        }
        let records: Vec<FillRecord> = self
            .overlapping(range)
            .map(|(overlap, record)| FillRecord {
                range: overlap,
                voxel: normalized(&record.voxel, channels),
            })
            .collect();
        Ok(Region::new(*range, channels, RegionFlags::empty(), records))
    }

    fn sample_region(
        &mut self,
        _blit: &mut ParseBlitContext<'_>,
        region: &Region,
        offset: &Offset3D,
        channel: ChannelId,
    ) -> Result<u32> {
        if region.flags().contains(RegionFlags::UNIFORM) {
            return region.sample_standard(offset, channel);
        }
        Ok(lookup(region.data::<Vec<FillRecord>>()?, offset, channel))
    }
}

/// Halves every axis longer than one voxel.
fn octants(range: &RegionRange) -> Vec<RegionRange> {
    let split = |origin: i32, size: u32| -> Vec<(i32, u32)> {
        if size > 1 {
            let low = size / 2;
            vec![(origin, low), (origin + low as i32, size - low)]
        } else {
            vec![(origin, size)]
        }
    };
    let mut out = Vec::with_capacity(8);
    for &(z, ez) in &split(range.offset.z, range.extent.z) {
        for &(y, ey) in &split(range.offset.y, range.extent.y) {
            for &(x, ex) in &split(range.offset.x, range.extent.x) {
                out.push(RegionRange::new(Offset3D::new(x, y, z), Extent3D::new(ex, ey, ez)));
            }
        }
    }
    out
}

pub struct GvoxFillSerializer {
    subdivide: bool,
    count_position: u64,
    records: u32,
}

impl BaseAdapterHandler<Serialize, GvoxFill> for GvoxFillSerializer {
    fn create(config: GvoxFillSerializeConfig) -> Result<Self> {
        Ok(Self {
            subdivide: config.subdivide,
            count_position: 0,
            records: 0,
        })
    }
}

impl GvoxFillSerializer {
    fn write_record(
        &mut self,
        blit: &mut SerializeBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
        voxel: &Voxel,
    ) -> Result<()> {
        blit.write_i32(range.offset.x)?;
        blit.write_i32(range.offset.y)?;
        blit.write_i32(range.offset.z)?;
        blit.write_u32(range.extent.x)?;
        blit.write_u32(range.extent.y)?;
        blit.write_u32(range.extent.z)?;
        blit.write_u32(channels.bits())?;
        for channel in channels.iter_channels() {
            blit.write_u32(voxel.get(channel).unwrap_or_default())?;
        }
        self.records += 1;
        Ok(())
    }

    fn emit(
        &mut self,
        blit: &mut SerializeBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        let uniform = blit.query_region_flags(range, channels)?.contains(RegionFlags::UNIFORM);
        if uniform || range.volume() == 1 {
            let voxel = blit.uniform_voxel(range, channels)?;
            return self.write_record(blit, range, channels, &voxel);
        }
        if !self.subdivide {
            return Err(VoxError::unrepresentable(format!(
                "gvox_fill without subdivision cannot store non-uniform {range:?}"
            )));
        }
        for octant in octants(range) {
            self.emit(blit, &octant, channels)?;
        }
        Ok(())
    }
}

impl SerializeAdapterHandler for GvoxFillSerializer {
    fn blit_begin(
        &mut self,
        blit: &mut SerializeBlitContext<'_>,
        _range: &RegionRange,
        _channels: ChannelId,
    ) -> Result<()> {
        self.records = 0;
        blit.output_write(&MAGIC)?;
        self.count_position = blit.output_tell()?;
        blit.write_u32(0)
    }

    fn serialize_region(
        &mut self,
        blit: &mut SerializeBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<()> {
        self.emit(blit, range, channels)
    }

    /// Patches the record count into the header.
    fn blit_end(&mut self, blit: &mut SerializeBlitContext<'_>) -> Result<()> {
        let end = blit.output_tell()?;
        blit.output_seek(self.count_position as i64, SeekOrigin::Beg)?;
        blit.write_u32(self.records)?;
        blit.output_seek(end as i64, SeekOrigin::Beg)?;
        tracing::debug!(records = self.records, "wrote gvox_fill records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octants_cover_the_range() {
        let range = RegionRange::new(Offset3D::new(-1, 0, 3), Extent3D::new(5, 1, 2));
        let parts = octants(&range);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.iter().map(|p| p.volume()).sum::<u64>(), range.volume());
        for part in &parts {
            assert!(range.contains_range(part));
        }
    }

    #[test]
    fn overlapping_records_are_rejected() {
        let record = |x, w, value| FillRecord {
            range: RegionRange::new(Offset3D::new(x, 0, 0), Extent3D::new(w, 1, 1)),
            voxel: Voxel::splat(ChannelId::COLOR, value),
        };
        assert!(check_disjoint(&[record(0, 2, 1), record(2, 2, 1), record(-5, 5, 3)]).is_ok());
        let err = check_disjoint(&[record(0, 2, 1), record(0, 2, 1)]).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::FormatError);
        let err = check_disjoint(&[record(3, 4, 1), record(-1, 5, 2)]).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::FormatError);
    }

    #[test]
    fn partially_covered_range_is_uniform_only_when_zero() {
        let full = RegionRange::new(Offset3D::new(0, 0, 0), Extent3D::new(4, 1, 1));
        let mut parser = GvoxFillParser::create(()).unwrap();
        parser.records.push(FillRecord {
            range: RegionRange::new(Offset3D::new(0, 0, 0), Extent3D::new(2, 1, 1)),
            voxel: Voxel::splat(ChannelId::COLOR, 0),
        });
        assert!(parser.uniform_value(&full, ChannelId::COLOR).is_some());
        parser.records[0].voxel = Voxel::splat(ChannelId::COLOR, 9);
        assert!(parser.uniform_value(&full, ChannelId::COLOR).is_none());
        let covered = RegionRange::new(Offset3D::new(1, 0, 0), Extent3D::new(1, 1, 1));
        assert_eq!(
            parser.uniform_value(&covered, ChannelId::COLOR),
            Some(Voxel::splat(ChannelId::COLOR, 9))
        );
    }
}
