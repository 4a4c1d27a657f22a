use crate::*;
use fxhash::FxHashMap;
use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

mod sealed {
    pub trait Sealed {}
}

/// Runtime tag of an adapter kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdapterKindId {
    Input,
    Output,
    Parse,
    Serialize,
    Container,
}

/// A role in the pipeline. Each kind has one handler trait.
pub trait AdapterKind: 'static + sealed::Sealed {
    type Handler: ?Sized + Send;
    const KIND: AdapterKindId;

    #[doc(hidden)]
    fn destroy_handler(handler: Box<Self::Handler>) -> Result<()>;
}

pub struct Input;
pub struct Output;
pub struct Parse;
pub struct Serialize;
pub struct Container;

impl sealed::Sealed for Input {}
impl sealed::Sealed for Output {}
impl sealed::Sealed for Parse {}
impl sealed::Sealed for Serialize {}
impl sealed::Sealed for Container {}

impl AdapterKind for Input {
    type Handler = dyn InputAdapterHandler;
    const KIND: AdapterKindId = AdapterKindId::Input;

    fn destroy_handler(handler: Box<Self::Handler>) -> Result<()> {
        handler.destroy()
    }
}

impl AdapterKind for Output {
    type Handler = dyn OutputAdapterHandler;
    const KIND: AdapterKindId = AdapterKindId::Output;

    fn destroy_handler(handler: Box<Self::Handler>) -> Result<()> {
        handler.destroy()
    }
}

impl AdapterKind for Parse {
    type Handler = dyn ParseAdapterHandler;
    const KIND: AdapterKindId = AdapterKindId::Parse;

    fn destroy_handler(handler: Box<Self::Handler>) -> Result<()> {
        handler.destroy()
    }
}

impl AdapterKind for Serialize {
    type Handler = dyn SerializeAdapterHandler;
    const KIND: AdapterKindId = AdapterKindId::Serialize;

    fn destroy_handler(handler: Box<Self::Handler>) -> Result<()> {
        handler.destroy()
    }
}

impl AdapterKind for Container {
    type Handler = dyn ContainerAdapterHandler;
    const KIND: AdapterKindId = AdapterKindId::Container;

    fn destroy_handler(handler: Box<Self::Handler>) -> Result<()> {
        handler.destroy()
    }
}

/// A seekable byte source.
pub trait InputAdapterHandler: Send {
    /// Fills `data` completely or fails with `IoError`.
    fn read(&mut self, data: &mut [u8]) -> Result<()>;

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()>;

    fn tell(&self) -> u64;

    fn destroy(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// A seekable byte sink.
pub trait OutputAdapterHandler: Send {
    /// Writes at the cursor, overwriting or growing as needed.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()>;

    fn tell(&self) -> u64;

    /// Hint that `size` more bytes are about to be written.
    fn reserve(&mut self, _size: usize) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases the sink.
    fn destroy(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Decodes regions from an input stream.
///
/// `begin` runs once, before any region traffic, and inspects the header.
/// Every other call may assume it succeeded.
pub trait ParseAdapterHandler: Send {
    fn begin(&mut self, blit: &mut ParseBlitContext<'_>) -> Result<()>;

    fn available_channels(&self) -> ChannelId;

    /// The range holding data, known once `begin` has run.
    fn parsable_range(&self) -> RegionRange;

    /// Must be side-effect free and cheaper than `load_region`.
    fn query_region_flags(
        &mut self,
        blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<RegionFlags>;

    /// Returns a region covering at least `range`.
    fn load_region(
        &mut self,
        blit: &mut ParseBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<Region>;

    fn unload_region(&mut self, _blit: &mut ParseBlitContext<'_>, _region: Region) {}

    fn sample_region(
        &mut self,
        _blit: &mut ParseBlitContext<'_>,
        region: &Region,
        offset: &Offset3D,
        channel: ChannelId,
    ) -> Result<u32> {
        region.sample_standard(offset, channel)
    }

    /// Edge of the bricks the parser is iterated in.
    fn brick_size(&self) -> u32 {
        16
    }

    fn blit_begin(&mut self, _blit: &mut ParseBlitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn blit_end(&mut self, _blit: &mut ParseBlitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Encodes regions pulled from the blit's producer into the output stream.
pub trait SerializeAdapterHandler: Send {
    fn blit_begin(
        &mut self,
        _blit: &mut SerializeBlitContext<'_>,
        _range: &RegionRange,
        _channels: ChannelId,
    ) -> Result<()> {
        Ok(())
    }

    fn serialize_region(
        &mut self,
        blit: &mut SerializeBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<()>;

    fn blit_end(&mut self, _blit: &mut SerializeBlitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// A mutable in-memory voxel store.
pub trait ContainerAdapterHandler: Send {
    fn channels(&self) -> ChannelId;

    /// Bounding range of everything stored. Empty when nothing is.
    fn bounds(&self) -> RegionRange;

    /// Writes the channels of `voxel` to every coordinate of `range`.
    fn fill(&mut self, voxel: &Voxel, range: &RegionRange) -> Result<()>;

    fn set_voxel(&mut self, offset: &Offset3D, voxel: &Voxel) -> Result<()> {
        self.fill(voxel, &RegionRange::voxel(*offset))
    }

    /// Fails with `OutOfRange` where nothing is stored and no default exists.
    fn sample(&self, offset: &Offset3D, channel: ChannelId) -> Result<u32>;

    /// The voxel shared by every coordinate of `range`, if there is one.
    fn uniform_value(&self, range: &RegionRange, channels: ChannelId) -> Result<Option<Voxel>>;

    /// Like [`uniform_value`](Self::uniform_value), but coordinates holding
    /// no data count as 0 in every channel. Containers that leave gaps
    /// inside their bounds override this.
    fn uniform_value_or_zero(
        &self,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<Option<Voxel>> {
        self.uniform_value(range, channels)
    }

    /// Deterministic traversal of every stored coordinate.
    fn create_iterator(&self) -> Box<dyn VoxelCursor + '_>;

    fn destroy(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Boxes a concrete handler as the trait object of kind `K`.
pub trait IntoHandler<K: AdapterKind> {
    fn into_handler(self) -> Box<K::Handler>;
}

impl<T: InputAdapterHandler + 'static> IntoHandler<Input> for T {
    fn into_handler(self) -> Box<dyn InputAdapterHandler> {
        Box::new(self)
    }
}

impl<T: OutputAdapterHandler + 'static> IntoHandler<Output> for T {
    fn into_handler(self) -> Box<dyn OutputAdapterHandler> {
        Box::new(self)
    }
}

impl<T: ParseAdapterHandler + 'static> IntoHandler<Parse> for T {
    fn into_handler(self) -> Box<dyn ParseAdapterHandler> {
        Box::new(self)
    }
}

impl<T: SerializeAdapterHandler + 'static> IntoHandler<Serialize> for T {
    fn into_handler(self) -> Box<dyn SerializeAdapterHandler> {
        Box::new(self)
    }
}

impl<T: ContainerAdapterHandler + 'static> IntoHandler<Container> for T {
    fn into_handler(self) -> Box<dyn ContainerAdapterHandler> {
        Box::new(self)
    }
}

pub trait NamedAdapter {
    fn name() -> &'static str;
}

/// Describes an adapter of kind `K`: how it is configured and what handles it.
pub trait AdapterDescriptor<K: AdapterKind>: NamedAdapter + 'static {
    type Configuration: Default + Send + 'static;
    type Handler: BaseAdapterHandler<K, Self> + IntoHandler<K>;
}

pub trait BaseAdapterHandler<K: AdapterKind, A: AdapterDescriptor<K> + ?Sized>: Sized {
    fn create(config: A::Configuration) -> Result<Self>;
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A live adapter instance.
///
/// Parse and container contexts count the regions they have handed out;
/// [`AdapterContext::destroy`] refuses to run while any are live.
pub struct AdapterContext<K: AdapterKind> {
    name: &'static str,
    pub(crate) handler: Box<K::Handler>,
    pub(crate) id: u64,
    pub(crate) live_regions: usize,
    pub(crate) begun: bool,
}

impl<K: AdapterKind> AdapterContext<K> {
    fn new(name: &'static str, handler: Box<K::Handler>) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(adapter = name, kind = ?K::KIND, id, "created adapter context");
        Self {
            name,
            handler,
            id,
            live_regions: 0,
            begun: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn live_regions(&self) -> usize {
        self.live_regions
    }

    pub fn destroy(self) -> Result<()> {
        if self.live_regions > 0 {
            return Err(VoxError::invalid_argument(format!(
                "adapter '{}' destroyed with {} regions still loaded",
                self.name, self.live_regions
            )));
        }
        tracing::debug!(adapter = self.name, kind = ?K::KIND, id = self.id, "destroying adapter context");
        K::destroy_handler(self.handler)
    }
}

impl<K: AdapterKind> std::fmt::Debug for AdapterContext<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("name", &self.name)
            .field("kind", &K::KIND)
            .field("live_regions", &self.live_regions)
            .finish()
    }
}

impl AdapterContext<Input> {
    pub fn read(&mut self, data: &mut [u8]) -> Result<()> {
        self.handler.read(data)
    }

    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        self.handler.seek(offset, origin)
    }

    pub fn tell(&self) -> u64 {
        self.handler.tell()
    }
}

impl AdapterContext<Output> {
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.handler.write(data)
    }

    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<()> {
        self.handler.seek(offset, origin)
    }

    pub fn tell(&self) -> u64 {
        self.handler.tell()
    }

    pub fn reserve(&mut self, size: usize) -> Result<()> {
        self.handler.reserve(size)
    }
}

/// A point lookup for [`AdapterContext::<Container>::sample`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SampleRequest {
    pub offset: Offset3D,
    pub channel: ChannelId,
}

/// One source of a container [`move_from`](AdapterContext::<Container>::move_from).
/// Source coordinates are translated by `offset` on their way in.
pub struct MoveSource<'a> {
    pub container: &'a AdapterContext<Container>,
    pub range: RegionRange,
    pub offset: Offset3D,
}

const MOVE_BRICK_SIZE: u32 = 16;

impl AdapterContext<Container> {
    pub fn channels(&self) -> ChannelId {
        self.handler.channels()
    }

    pub fn bounds(&self) -> RegionRange {
        self.handler.bounds()
    }

    pub fn fill(&mut self, voxel: &Voxel, range: &RegionRange) -> Result<()> {
        let stored = self.handler.channels();
        if !stored.contains(voxel.channels()) {
            return Err(VoxError::invalid_argument(format!(
                "fill channels {:?} are not all stored by '{}' ({stored:?})",
                voxel.channels(),
                self.name
            )));
        }
        if range.is_empty() {
            return Ok(());
        }
        self.handler.fill(voxel, range)
    }

    /// Copies each source's range into this container. Uniform bricks of a
    /// source are copied with one fill; coordinates a source cannot sample
    /// are left untouched.
    pub fn move_from(&mut self, sources: &[MoveSource<'_>]) -> Result<()> {
        for source in sources {
            let channels = self.handler.channels() & source.container.channels();
            tracing::debug!(
                from = source.container.name,
                to = self.name,
                range = ?source.range,
                offset = ?source.offset,
                "moving voxels"
            );
            for brick in source.range.bricks(MOVE_BRICK_SIZE) {
                let src = &source.container.handler;
                if let Some(voxel) = src.uniform_value(&brick, channels)? {
                    self.handler.fill(&voxel, &brick.translated(source.offset))?;
                    continue;
                }
                for offset in brick.iter_offsets() {
                    if let Some(voxel) = sample_container_voxel(src.as_ref(), &offset, channels)? {
                        self.handler.set_voxel(&(offset + source.offset), &voxel)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Batched point lookups; each request fails on its own.
    pub fn sample(&self, requests: &[SampleRequest]) -> Vec<Result<u32>> {
        requests
            .iter()
            .map(|request| {
                if request.channel.index().is_none() {
                    return Err(VoxError::invalid_argument(format!(
                        "sample must name exactly one channel, got {:?}",
                        request.channel
                    )));
                }
                if !self.handler.channels().contains(request.channel) {
                    return Err(VoxError::out_of_range(format!(
                        "channel {:?} is not stored by '{}'",
                        request.channel, self.name
                    )));
                }
                self.handler.sample(&request.offset, request.channel)
            })
            .collect()
    }

    pub fn sample_voxel(&self, offset: &Offset3D, channels: ChannelId) -> Result<Option<Voxel>> {
        sample_container_voxel(self.handler.as_ref(), offset, channels)
    }

    pub fn iter(&self) -> RegionIter<'_> {
        RegionIter::new(self.handler.create_iterator())
    }
}

/// All channels of one coordinate, `None` if the coordinate holds no data.
pub(crate) fn sample_container_voxel(
    container: &dyn ContainerAdapterHandler,
    offset: &Offset3D,
    channels: ChannelId,
) -> Result<Option<Voxel>> {
    let mut voxel = Voxel::default();
    for channel in channels.iter_channels() {
        match container.sample(offset, channel) {
            Ok(value) => voxel.set(channel, value),
            Err(e) if e.error_type() == ErrorType::OutOfRange => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(Some(voxel))
}

type ErasedCreate<K> = fn(Option<Box<dyn Any>>) -> Result<Box<<K as AdapterKind>::Handler>>;

fn create_erased<K: AdapterKind, A: AdapterDescriptor<K>>(
    config: Option<Box<dyn Any>>,
) -> Result<Box<K::Handler>> {
    let config = match config {
        None => A::Configuration::default(),
        Some(config) => *config.downcast::<A::Configuration>().map_err(|_| {
            VoxError::invalid_argument(format!(
                "configuration passed to '{}' has the wrong type",
                A::name()
            ))
        })?,
    };
    let handler = <A::Handler as BaseAdapterHandler<K, A>>::create(config)?;
    Ok(IntoHandler::<K>::into_handler(handler))
}

struct Registration {
    type_id: TypeId,
    create: Box<dyn Any + Send + Sync>,
}

/// The adapter registry. [`Context::new`] registers every built-in adapter;
/// more can be added with [`Context::register_adapter`].
pub struct Context {
    adapters: FxHashMap<AdapterKindId, FxHashMap<&'static str, Registration>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        let mut ctx = Self::empty();
        adapters::register_builtin(&mut ctx);
        ctx
    }

    /// A registry with no adapters at all.
    pub fn empty() -> Self {
        Self {
            adapters: FxHashMap::default(),
        }
    }

    /// Registers `A` under its name, replacing any adapter of the same kind
    /// and name.
    pub fn register_adapter<K: AdapterKind, A: AdapterDescriptor<K>>(&mut self) {
        let create: ErasedCreate<K> = create_erased::<K, A>;
        let previous = self.adapters.entry(K::KIND).or_default().insert(
            A::name(),
            Registration {
                type_id: TypeId::of::<A>(),
                create: Box::new(create),
            },
        );
        if previous.is_some() {
            tracing::debug!(kind = ?K::KIND, name = A::name(), "replaced registered adapter");
        }
    }

    pub fn get_adapter<K: AdapterKind, A: AdapterDescriptor<K>>(&self) -> Result<Adapter<K, A>> {
        let registration = self.registration(K::KIND, A::name())?;
        if registration.type_id != TypeId::of::<A>() {
            return Err(VoxError::invalid_argument(format!(
                "'{}' is registered to a different {:?} adapter",
                A::name(),
                K::KIND
            )));
        }
        Ok(Adapter {
            _marker: PhantomData,
        })
    }

    /// Names of the adapters registered for `kind`, sorted.
    pub fn adapter_names(&self, kind: AdapterKindId) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .adapters
            .get(&kind)
            .map(|named| named.keys().copied().collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Creates an adapter by name. `config` must be the adapter's
    /// configuration type; `None` uses its default.
    pub fn create_adapter_context_by_name<K: AdapterKind>(
        &self,
        name: &str,
        config: Option<Box<dyn Any>>,
    ) -> Result<AdapterContext<K>> {
        let (name, registration) = self
            .adapters
            .get(&K::KIND)
            .and_then(|named| named.get_key_value(name))
            .ok_or_else(|| {
                VoxError::invalid_argument(format!("no {:?} adapter named '{name}'", K::KIND))
            })?;
        let create = registration
            .create
            .downcast_ref::<ErasedCreate<K>>()
            .ok_or_else(|| {
                VoxError::invalid_argument(format!("'{name}' is not a {:?} adapter", K::KIND))
            })?;
        let handler = create(config)?;
        Ok(AdapterContext::new(*name, handler))
    }

    fn registration(&self, kind: AdapterKindId, name: &str) -> Result<&Registration> {
        self.adapters
            .get(&kind)
            .and_then(|named| named.get(name))
            .ok_or_else(|| {
                VoxError::invalid_argument(format!("no {kind:?} adapter named '{name}'"))
            })
    }
}

/// A typed handle to a registered adapter.
pub struct Adapter<K: AdapterKind, A: AdapterDescriptor<K>> {
    _marker: PhantomData<fn() -> (K, A)>,
}

impl<K: AdapterKind, A: AdapterDescriptor<K>> Adapter<K, A> {
    pub fn name(&self) -> &'static str {
        A::name()
    }

    pub fn create_adapter_context(&self, config: A::Configuration) -> Result<AdapterContext<K>> {
        let handler = <A::Handler as BaseAdapterHandler<K, A>>::create(config)?;
        Ok(AdapterContext::new(
            A::name(),
            IntoHandler::<K>::into_handler(handler),
        ))
    }
}
