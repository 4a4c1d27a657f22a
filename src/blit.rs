use crate::adapter::sample_container_voxel;
use crate::adapters::{
    ByteBuffer, ByteBufferInputConfig, ByteBufferOutput, ByteBufferOutputConfig, Raw,
    RawContainerConfig,
};
use crate::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A producer of regions: a parser bound to its input, or a container.
pub trait RegionSource {
    fn available_channels(&self) -> ChannelId;

    /// Range holding the producer's data.
    fn bounds(&self) -> RegionRange;

    fn query_region_flags(&mut self, range: &RegionRange, channels: ChannelId)
        -> Result<RegionFlags>;

    fn load_region(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Region>;

    fn unload_region(&mut self, region: Region) -> Result<()>;

    fn sample_region(
        &mut self,
        region: &Region,
        offset: &Offset3D,
        channel: ChannelId,
    ) -> Result<u32>;
}

/// Knobs for one conversion job.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlitOptions {
    /// Random coordinates sampled in every region a producer claims uniform.
    /// A mismatch is reported and the region is treated as non-uniform.
    pub uniform_check_samples: usize,
    pub seed: u64,
}

impl Default for BlitOptions {
    fn default() -> Self {
        Self {
            uniform_check_samples: if cfg!(debug_assertions) { 8 } else { 0 },
            seed: 0x5eed_b117,
        }
    }
}

/// How a conversion job ended when nothing fatal happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlitOutcome {
    Success,
    /// Finished, but adapters reported problems along the way.
    Partial(Vec<VoxError>),
}

impl BlitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BlitOutcome::Success)
    }

    pub fn errors(&self) -> &[VoxError] {
        match self {
            BlitOutcome::Success => &[],
            BlitOutcome::Partial(errors) => errors,
        }
    }
}

fn push_deferred(errors: &mut Vec<VoxError>, ty: ErrorType, message: String) {
    tracing::warn!(kind = ?ty, "{message}");
    errors.push(VoxError::new(ty, message));
}

/// What a parser sees of the job: the input stream and the error list.
pub struct ParseBlitContext<'a> {
    input: Option<&'a mut AdapterContext<Input>>,
    errors: Vec<VoxError>,
}

impl<'a> ParseBlitContext<'a> {
    pub fn new(input: Option<&'a mut AdapterContext<Input>>) -> Self {
        Self {
            input,
            errors: Vec::new(),
        }
    }

    fn input(&mut self) -> Result<&mut AdapterContext<Input>> {
        self.input
            .as_deref_mut()
            .ok_or_else(|| VoxError::invalid_argument("no input stream is bound to this blit"))
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn input_read(&mut self, data: &mut [u8]) -> Result<()> {
        self.input()?.read(data)
    }

    pub fn input_seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        self.input()?.seek(offset, origin)
    }

    pub fn input_tell(&mut self) -> Result<u64> {
        Ok(self.input()?.tell())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = [0; 4];
        self.input_read(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut bytes = [0; 4];
        self.input_read(&mut bytes)?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Records a non-fatal problem; the job carries on.
    pub fn push_error(&mut self, ty: ErrorType, message: impl Into<String>) {
        push_deferred(&mut self.errors, ty, message.into());
    }

    pub fn errors(&self) -> &[VoxError] {
        &self.errors
    }
}

fn check_channels(available: ChannelId, requested: ChannelId) -> Result<()> {
    if requested.is_empty() {
        return Err(VoxError::invalid_argument("no channels requested"));
    }
    if !available.contains(requested) {
        return Err(VoxError::invalid_argument(format!(
            "requested channels {:?} are not available (have {available:?})",
            requested.difference(available)
        )));
    }
    Ok(())
}

fn check_producer(region: &Region, producer: u64, name: &str) -> Result<()> {
    if region.producer != producer {
        return Err(VoxError::invalid_argument(format!(
            "region {:?} was not loaded by '{name}'",
            region.range()
        )));
    }
    Ok(())
}

fn resolve_request(
    source: &dyn RegionSource,
    range: Option<&RegionRange>,
    channels: ChannelId,
) -> Result<RegionRange> {
    check_channels(source.available_channels(), channels)?;
    Ok(range.copied().unwrap_or_else(|| source.bounds()))
}

/// All requested channels of one coordinate of a loaded region.
fn sample_voxel(
    source: &mut dyn RegionSource,
    region: &Region,
    offset: &Offset3D,
    channels: ChannelId,
) -> Result<Voxel> {
    let mut voxel = Voxel::default();
    for channel in channels.iter_channels() {
        voxel.set(channel, source.sample_region(region, offset, channel)?);
    }
    Ok(voxel)
}

fn random_offset(range: &RegionRange, rng: &mut StdRng) -> Offset3D {
    let axis = |base: i32, size: u32, rng: &mut StdRng| {
        (base as i64 + rng.gen_range(0..size.max(1)) as i64) as i32
    };
    Offset3D::new(
        axis(range.offset.x, range.extent.x, rng),
        axis(range.offset.y, range.extent.y, rng),
        axis(range.offset.z, range.extent.z, rng),
    )
}

fn spot_check(
    source: &mut dyn RegionSource,
    region: &Region,
    channels: ChannelId,
    samples: usize,
    rng: &mut StdRng,
) -> Result<bool> {
    let range = *region.range();
    let first = sample_voxel(source, region, &range.offset, channels)?;
    for _ in 0..samples {
        let offset = random_offset(&range, rng);
        if sample_voxel(source, region, &offset, channels)? != first {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Samples random coordinates of a range claimed uniform. `false` means the
/// claim is wrong.
fn verify_uniform(
    source: &mut dyn RegionSource,
    range: &RegionRange,
    channels: ChannelId,
    samples: usize,
    rng: &mut StdRng,
) -> Result<bool> {
    let region = source.load_region(range, channels)?;
    let verdict = spot_check(source, &region, channels, samples, rng);
    source.unload_region(region)?;
    verdict
}

/// A parser bound to its input for the duration of a job.
///
/// Binding runs the parser's `begin` hook the first time a parser is bound.
pub struct ParseSource<'a> {
    parser: &'a mut AdapterContext<Parse>,
    blit: ParseBlitContext<'a>,
}

impl<'a> ParseSource<'a> {
    pub fn new(
        input: &'a mut AdapterContext<Input>,
        parser: &'a mut AdapterContext<Parse>,
    ) -> Result<Self> {
        Self::bind(Some(input), parser)
    }

    /// Binds a parser that reads no input, such as a procedural generator.
    pub fn detached(parser: &'a mut AdapterContext<Parse>) -> Result<Self> {
        Self::bind(None, parser)
    }

    fn bind(
        input: Option<&'a mut AdapterContext<Input>>,
        parser: &'a mut AdapterContext<Parse>,
    ) -> Result<Self> {
        let mut source = Self {
            parser,
            blit: ParseBlitContext::new(input),
        };
        if !source.parser.begun {
            source.parser.handler.begin(&mut source.blit)?;
            source.parser.begun = true;
            tracing::debug!(
                parser = source.parser.name(),
                range = ?source.parser.handler.parsable_range(),
                channels = ?source.parser.handler.available_channels(),
                "parser ready"
            );
        }
        Ok(source)
    }

    pub fn blit_begin(&mut self) -> Result<()> {
        self.parser.handler.blit_begin(&mut self.blit)
    }

    pub fn blit_end(&mut self) -> Result<()> {
        self.parser.handler.blit_end(&mut self.blit)
    }

    /// Deferred errors pushed so far.
    pub fn errors(&self) -> &[VoxError] {
        self.blit.errors()
    }

    fn take_errors(&mut self) -> Vec<VoxError> {
        std::mem::take(&mut self.blit.errors)
    }

    /// Traverses the parser's whole range in bricks.
    pub fn iter(&mut self, channels: ChannelId) -> Result<RegionIter<'_>> {
        let range = self.bounds();
        self.iter_range(&range, channels)
    }

    pub fn iter_range(&mut self, range: &RegionRange, channels: ChannelId) -> Result<RegionIter<'_>> {
        self.iter_checked(range, channels, 0, 0)
    }

    fn iter_checked(
        &mut self,
        range: &RegionRange,
        channels: ChannelId,
        uniform_check_samples: usize,
        seed: u64,
    ) -> Result<RegionIter<'_>> {
        check_channels(self.available_channels(), channels)?;
        let bricks = range.bricks(self.parser.handler.brick_size());
        let bricks_source = ParseBricks {
            source: self,
            open: None,
            uniform_check_samples,
            rng: StdRng::seed_from_u64(seed),
        };
        Ok(RegionIter::new(Box::new(BrickWalker::new(
            bricks_source,
            bricks,
            channels,
        ))))
    }
}

impl RegionSource for ParseSource<'_> {
    fn available_channels(&self) -> ChannelId {
        self.parser.handler.available_channels()
    }

    fn bounds(&self) -> RegionRange {
        self.parser.handler.parsable_range()
    }

    fn query_region_flags(
        &mut self,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<RegionFlags> {
        check_channels(self.available_channels(), channels)?;
        if range.is_empty() {
            return Ok(RegionFlags::empty());
        }
        self.parser
            .handler
            .query_region_flags(&mut self.blit, range, channels)
    }

    fn load_region(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Region> {
        check_channels(self.available_channels(), channels)?;
        let mut region = self
            .parser
            .handler
            .load_region(&mut self.blit, range, channels)?;
        if !region.range().contains_range(range) || !region.channels().contains(channels) {
            let loaded = *region.range();
            self.parser.handler.unload_region(&mut self.blit, region);
            return Err(VoxError::invalid_argument(format!(
                "'{}' loaded {loaded:?} for a request of {range:?}",
                self.parser.name()
            )));
        }
        region.producer = self.parser.id;
        self.parser.live_regions += 1;
        tracing::trace!(parser = self.parser.name(), range = ?region.range(), flags = ?region.flags(), "loaded region");
        Ok(region)
    }

    fn unload_region(&mut self, region: Region) -> Result<()> {
        check_producer(&region, self.parser.id, self.parser.name())?;
        self.parser.live_regions -= 1;
        self.parser.handler.unload_region(&mut self.blit, region);
        Ok(())
    }

    fn sample_region(
        &mut self,
        region: &Region,
        offset: &Offset3D,
        channel: ChannelId,
    ) -> Result<u32> {
        check_producer(region, self.parser.id, self.parser.name())?;
        region.check_sample(offset, channel)?;
        self.parser
            .handler
            .sample_region(&mut self.blit, region, offset, channel)
    }
}

struct ParseBricks<'s, 'a> {
    source: &'s mut ParseSource<'a>,
    open: Option<Region>,
    uniform_check_samples: usize,
    rng: StdRng,
}

impl BrickSource for ParseBricks<'_, '_> {
    fn brick_value(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Option<Voxel>> {
        let flags = self.source.query_region_flags(range, channels)?;
        if !flags.contains(RegionFlags::UNIFORM) {
            return Ok(None);
        }
        let region = self.source.load_region(range, channels)?;
        let checked = if self.uniform_check_samples > 0 {
            spot_check(
                self.source,
                &region,
                channels,
                self.uniform_check_samples,
                &mut self.rng,
            )
        } else {
            Ok(true)
        };
        let voxel = sample_voxel(self.source, &region, &range.offset, channels);
        self.source.unload_region(region)?;
        if !checked? {
            self.source.blit.push_error(
                ErrorType::FormatError,
                format!("'{}' claimed {range:?} is uniform but it is not", self.source.parser.name()),
            );
            return Ok(None);
        }
        voxel.map(Some)
    }

    fn open(&mut self, range: &RegionRange, channels: ChannelId) -> Result<()> {
        self.open = Some(self.source.load_region(range, channels)?);
        Ok(())
    }

    fn leaf(&mut self, offset: &Offset3D, channels: ChannelId) -> Result<Option<Voxel>> {
        let Self { source, open, .. } = self;
        match open {
            Some(region) => sample_voxel(&mut **source, region, offset, channels).map(Some),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.open.take() {
            Some(region) => self.source.unload_region(region),
            None => Ok(()),
        }
    }
}

impl Drop for ParseBricks<'_, '_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("failed to release region of abandoned iteration: {e}");
        }
    }
}

impl RegionSource for AdapterContext<Container> {
    fn available_channels(&self) -> ChannelId {
        self.handler.channels()
    }

    fn bounds(&self) -> RegionRange {
        self.handler.bounds()
    }

    fn query_region_flags(
        &mut self,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<RegionFlags> {
        check_channels(self.handler.channels(), channels)?;
        if range.is_empty() {
            return Ok(RegionFlags::empty());
        }
        Ok(match self.handler.uniform_value_or_zero(range, channels)? {
            Some(_) => RegionFlags::UNIFORM,
            None => RegionFlags::empty(),
        })
    }

    /// Snapshots the range: one voxel when uniform, else a dense copy.
    /// Coordinates holding no data read as 0.
    fn load_region(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Region> {
        check_channels(self.handler.channels(), channels)?;
        let uniform = if range.is_empty() {
            None
        } else {
            self.handler.uniform_value_or_zero(range, channels)?
        };
        let mut region = match uniform {
            Some(voxel) => Region::uniform(*range, channels, voxel),
            None => {
                let mut block = DenseBlock::new(*range, channels);
                for offset in range.iter_offsets() {
                    let stored = sample_container_voxel(self.handler.as_ref(), &offset, channels)?;
                    if let Some(voxel) = stored {
                        for channel in channels.iter_channels() {
                            block.set(&offset, channel, voxel.get(channel).unwrap_or_default());
                        }
                    }
                }
                Region::new(*range, channels, RegionFlags::empty(), block)
            }
        };
        region.producer = self.id;
        self.live_regions += 1;
        Ok(region)
    }

    fn unload_region(&mut self, region: Region) -> Result<()> {
        check_producer(&region, self.id, self.name())?;
        self.live_regions -= 1;
        Ok(())
    }

    fn sample_region(
        &mut self,
        region: &Region,
        offset: &Offset3D,
        channel: ChannelId,
    ) -> Result<u32> {
        check_producer(region, self.id, self.name())?;
        region.sample_standard(offset, channel)
    }
}

/// What a serializer sees of the job: the output stream, the producer and the
/// error list.
pub struct SerializeBlitContext<'a> {
    output: Option<&'a mut AdapterContext<Output>>,
    source: &'a mut dyn RegionSource,
    errors: Vec<VoxError>,
    uniform_check_samples: usize,
    rng: StdRng,
}

impl<'a> SerializeBlitContext<'a> {
    pub fn new(
        output: Option<&'a mut AdapterContext<Output>>,
        source: &'a mut dyn RegionSource,
        options: &BlitOptions,
    ) -> Self {
        Self {
            output,
            source,
            errors: Vec::new(),
            uniform_check_samples: options.uniform_check_samples,
            rng: StdRng::seed_from_u64(options.seed),
        }
    }

    fn output(&mut self) -> Result<&mut AdapterContext<Output>> {
        self.output
            .as_deref_mut()
            .ok_or_else(|| VoxError::invalid_argument("no output stream is bound to this blit"))
    }

    pub fn output_write(&mut self, data: &[u8]) -> Result<()> {
        self.output()?.write(data)
    }

    pub fn output_seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        self.output()?.seek(offset, origin)
    }

    pub fn output_tell(&mut self) -> Result<u64> {
        Ok(self.output()?.tell())
    }

    pub fn output_reserve(&mut self, size: usize) -> Result<()> {
        self.output()?.reserve(size)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.output_write(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.output_write(&value.to_le_bytes())
    }

    pub fn push_error(&mut self, ty: ErrorType, message: impl Into<String>) {
        push_deferred(&mut self.errors, ty, message.into());
    }

    pub fn errors(&self) -> &[VoxError] {
        &self.errors
    }

    pub fn available_channels(&self) -> ChannelId {
        self.source.available_channels()
    }

    /// The producer's flags for `range`. Claimed uniformity is spot-checked
    /// when the job asks for it.
    pub fn query_region_flags(
        &mut self,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<RegionFlags> {
        let mut flags = self.source.query_region_flags(range, channels)?;
        if flags.contains(RegionFlags::UNIFORM) && self.uniform_check_samples > 0 {
            let samples = self.uniform_check_samples;
            if !verify_uniform(self.source, range, channels, samples, &mut self.rng)? {
                self.push_error(
                    ErrorType::FormatError,
                    format!("producer claimed {range:?} is uniform but it is not"),
                );
                flags.remove(RegionFlags::UNIFORM);
            }
        }
        Ok(flags)
    }

    pub fn load_region(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Region> {
        self.source.load_region(range, channels)
    }

    pub fn unload_region(&mut self, region: Region) -> Result<()> {
        self.source.unload_region(region)
    }

    pub fn sample_region(
        &mut self,
        region: &Region,
        offset: &Offset3D,
        channel: ChannelId,
    ) -> Result<u32> {
        self.source.sample_region(region, offset, channel)
    }

    pub fn sample_voxel(
        &mut self,
        region: &Region,
        offset: &Offset3D,
        channels: ChannelId,
    ) -> Result<Voxel> {
        sample_voxel(self.source, region, offset, channels)
    }

    /// The voxel of a range already known to be uniform, read with a single
    /// load and one sample per channel.
    pub fn uniform_voxel(&mut self, range: &RegionRange, channels: ChannelId) -> Result<Voxel> {
        let region = self.source.load_region(range, channels)?;
        let voxel = sample_voxel(self.source, &region, &range.offset, channels);
        self.source.unload_region(region)?;
        voxel
    }
}

fn serialize_pass<'a>(
    output: &'a mut AdapterContext<Output>,
    serialize: &mut AdapterContext<Serialize>,
    source: &'a mut dyn RegionSource,
    range: &RegionRange,
    channels: ChannelId,
    options: &BlitOptions,
    errors: &mut Vec<VoxError>,
) -> Result<()> {
    tracing::debug!(serializer = serialize.name(), output = output.name(), ?range, ?channels, "blit begin");
    let mut blit = SerializeBlitContext::new(Some(output), source, options);
    let handler = &mut serialize.handler;
    let mut result = handler.blit_begin(&mut blit, range, channels);
    if result.is_ok() {
        result = handler.serialize_region(&mut blit, range, channels);
    }
    let end = handler.blit_end(&mut blit);
    errors.append(&mut blit.errors);
    tracing::debug!(serializer = serialize.name(), ok = result.is_ok() && end.is_ok(), "blit end");
    result.and(end)
}

fn check_leaks(name: &str, live_before: usize, live_regions: &mut usize, errors: &mut Vec<VoxError>) {
    if *live_regions > live_before {
        push_deferred(
            errors,
            ErrorType::InvalidArgument,
            format!(
                "{} regions of '{name}' were never unloaded",
                *live_regions - live_before
            ),
        );
        *live_regions = live_before;
    }
}

fn finish(result: Result<()>, errors: Vec<VoxError>) -> Result<BlitOutcome> {
    match result {
        Err(e) => {
            tracing::debug!(deferred = errors.len(), "blit failed: {e}");
            Err(e)
        }
        Ok(()) if errors.is_empty() => Ok(BlitOutcome::Success),
        Ok(()) => Ok(BlitOutcome::Partial(errors)),
    }
}

/// Parses `range` (the parser's whole range when `None`) and serializes it.
pub fn blit_region(
    input: &mut AdapterContext<Input>,
    output: &mut AdapterContext<Output>,
    parse: &mut AdapterContext<Parse>,
    serialize: &mut AdapterContext<Serialize>,
    range: Option<&RegionRange>,
    channels: ChannelId,
) -> Result<BlitOutcome> {
    blit_region_with(input, output, parse, serialize, range, channels, &BlitOptions::default())
}

pub fn blit_region_with(
    input: &mut AdapterContext<Input>,
    output: &mut AdapterContext<Output>,
    parse: &mut AdapterContext<Parse>,
    serialize: &mut AdapterContext<Serialize>,
    range: Option<&RegionRange>,
    channels: ChannelId,
    options: &BlitOptions,
) -> Result<BlitOutcome> {
    let mut source = ParseSource::new(input, parse)?;
    let range = resolve_request(&source, range, channels)?;
    let live_before = source.parser.live_regions;
    source.blit_begin()?;
    let mut errors = Vec::new();
    let result = serialize_pass(output, serialize, &mut source, &range, channels, options, &mut errors);
    let end = source.blit_end();
    errors.extend(source.take_errors());
    let name = source.parser.name();
    check_leaks(name, live_before, &mut source.parser.live_regions, &mut errors);
    finish(result.and(end), errors)
}

/// Parses `range` into a container. Uniform bricks become one `fill` each.
pub fn blit_region_to_container(
    input: &mut AdapterContext<Input>,
    parse: &mut AdapterContext<Parse>,
    container: &mut AdapterContext<Container>,
    range: Option<&RegionRange>,
    channels: ChannelId,
) -> Result<BlitOutcome> {
    blit_region_to_container_with(input, parse, container, range, channels, &BlitOptions::default())
}

pub fn blit_region_to_container_with(
    input: &mut AdapterContext<Input>,
    parse: &mut AdapterContext<Parse>,
    container: &mut AdapterContext<Container>,
    range: Option<&RegionRange>,
    channels: ChannelId,
    options: &BlitOptions,
) -> Result<BlitOutcome> {
    let mut source = ParseSource::new(input, parse)?;
    let range = resolve_request(&source, range, channels)?;
    check_channels(container.channels(), channels)?;
    let live_before = source.parser.live_regions;
    tracing::debug!(parser = source.parser.name(), container = container.name(), ?range, ?channels, "blit begin");
    source.blit_begin()?;
    let result = copy_into_container(&mut source, container, &range, channels, options);
    let end = source.blit_end();
    let mut errors = source.take_errors();
    let name = source.parser.name();
    check_leaks(name, live_before, &mut source.parser.live_regions, &mut errors);
    tracing::debug!(parser = name, ok = result.is_ok() && end.is_ok(), "blit end");
    finish(result.and(end), errors)
}

fn copy_into_container(
    source: &mut ParseSource<'_>,
    container: &mut AdapterContext<Container>,
    range: &RegionRange,
    channels: ChannelId,
    options: &BlitOptions,
) -> Result<()> {
    let mut iter = source.iter_checked(range, channels, options.uniform_check_samples, options.seed)?;
    let mut mode = AdvanceMode::Next;
    loop {
        mode = match iter.advance(mode)? {
            IteratorValue::Region {
                range,
                uniform: Some(voxel),
                ..
            } => {
                container.fill(&voxel, &range)?;
                AdvanceMode::SkipBranch
            }
            IteratorValue::Region { .. } => AdvanceMode::Next,
            IteratorValue::Leaf { offset, voxel } => {
                container.handler.set_voxel(&offset, &voxel)?;
                AdvanceMode::Next
            }
            IteratorValue::End => return Ok(()),
        };
    }
}

/// Serializes a container's `range` (its bounds when `None`).
pub fn serialize_container(
    output: &mut AdapterContext<Output>,
    serialize: &mut AdapterContext<Serialize>,
    container: &mut AdapterContext<Container>,
    range: Option<&RegionRange>,
    channels: ChannelId,
) -> Result<BlitOutcome> {
    serialize_container_with(output, serialize, container, range, channels, &BlitOptions::default())
}

pub fn serialize_container_with(
    output: &mut AdapterContext<Output>,
    serialize: &mut AdapterContext<Serialize>,
    container: &mut AdapterContext<Container>,
    range: Option<&RegionRange>,
    channels: ChannelId,
    options: &BlitOptions,
) -> Result<BlitOutcome> {
    let range = resolve_request(&*container, range, channels)?;
    let live_before = container.live_regions;
    let mut errors = Vec::new();
    let result = serialize_pass(output, serialize, container, &range, channels, options, &mut errors);
    let name = container.name();
    check_leaks(name, live_before, &mut container.live_regions, &mut errors);
    finish(result, errors)
}

fn report(outcome: &BlitOutcome, job: &str) {
    for e in outcome.errors() {
        tracing::warn!(job, "{e}");
    }
}

impl Context {
    /// Parses a whole byte payload into a chunked container holding every
    /// channel the format provides.
    pub fn load_scene(&self, bytes: &[u8], format: &str) -> Result<AdapterContext<Container>> {
        let mut input = self
            .get_adapter::<Input, ByteBuffer>()?
            .create_adapter_context(ByteBufferInputConfig::from(bytes))?;
        let mut parse = self.create_adapter_context_by_name::<Parse>(format, None)?;
        let channels = ParseSource::new(&mut input, &mut parse)?.available_channels();
        let mut scene = self
            .get_adapter::<Container, Raw>()?
            .create_adapter_context(RawContainerConfig {
                channels,
                ..Default::default()
            })?;
        let outcome = blit_region_to_container(&mut input, &mut parse, &mut scene, None, channels)?;
        report(&outcome, "load_scene");
        parse.destroy()?;
        input.destroy()?;
        Ok(scene)
    }

    /// Serializes every stored channel of a container to bytes.
    pub fn save_scene(&self, scene: &mut AdapterContext<Container>, format: &str) -> Result<Vec<u8>> {
        let buffer = ByteBufferOutput::new();
        let mut output = self
            .get_adapter::<Output, ByteBuffer>()?
            .create_adapter_context(ByteBufferOutputConfig::from(&buffer))?;
        let mut serialize = self.create_adapter_context_by_name::<Serialize>(format, None)?;
        let channels = scene.channels();
        let outcome = serialize_container(&mut output, &mut serialize, scene, None, channels)?;
        report(&outcome, "save_scene");
        serialize.destroy()?;
        output.destroy()?;
        Ok(buffer.take())
    }
}
