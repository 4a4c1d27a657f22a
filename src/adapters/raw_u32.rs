use super::gvox_raw::{write_dense, DenseLayout};
use super::*;

pub struct RawU32Parser {
    layout: DenseLayout,
}

impl BaseAdapterHandler<Parse, RawU32> for RawU32Parser {
    fn create(config: RawU32ParseConfig) -> Result<Self> {
        if config.channel.index().is_none() {
            return Err(VoxError::invalid_argument(format!(
                "raw_u32 stores exactly one channel, got {:?}",
                config.channel
            )));
        }
        Ok(Self {
            layout: DenseLayout {
                data_start: 0,
                range: RegionRange::new(config.offset, config.extent.unwrap_or(Extent3D::splat(1))),
                channels: config.channel,
            },
        })
    }
}

impl ParseAdapterHandler for RawU32Parser {
    fn begin(&mut self, blit: &mut ParseBlitContext<'_>) -> Result<()> {
        self.layout.data_start = blit.input_tell()?;
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

pub struct RawU32Serializer;

impl BaseAdapterHandler<Serialize, RawU32> for RawU32Serializer {
    fn create(_: ()) -> Result<Self> {
        Ok(Self)
    }
}

impl SerializeAdapterHandler for RawU32Serializer {
    fn blit_begin(
        &mut self,
        _blit: &mut SerializeBlitContext<'_>,
        _range: &RegionRange,
        channels: ChannelId,
    ) -> Result<()> {
        if channels.count() != 1 {
            return Err(VoxError::unrepresentable(format!(
                "raw_u32 holds a single channel, asked for {channels:?}"
            )));
        }
        Ok(())
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
