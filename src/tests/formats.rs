use super::*;
use voxblit::adapters::{GvoxFill, GvoxFillSerializeConfig, GvoxRaw};
use voxblit::{ErrorType, ParseSource, RegionFlags, RegionSource, SampleRequest, Voxel};

/// A small two-channel scene with a few single-voxel details.
fn scene(ctx: &voxblit::Context) -> voxblit::AdapterContext<voxblit::Container> {
    let mut scene = raw_container(ctx, ChannelId::COLOR | ChannelId::MATERIAL_ID);
    let stone = Voxel::default()
        .with(ChannelId::COLOR, 0x0080_8080)
        .with(ChannelId::MATERIAL_ID, 3);
    scene.fill(&stone, &range([-3, 0, 2], [20, 10, 6])).unwrap();
    for (i, x) in [-3, 0, 5, 16].into_iter().enumerate() {
        let ore = Voxel::default()
            .with(ChannelId::COLOR, 0x00ff_0000 + i as u32)
            .with(ChannelId::MATERIAL_ID, 7);
        scene.fill(&ore, &range([x, 4, 3], [1, 1, 1])).unwrap();
    }
    scene
}

fn assert_same_voxels(
    a: &voxblit::AdapterContext<voxblit::Container>,
    b: &voxblit::AdapterContext<voxblit::Container>,
    channels: ChannelId,
) {
    assert_eq!(a.bounds(), b.bounds());
    for offset in a.bounds().iter_offsets() {
        assert_eq!(
            a.sample_voxel(&offset, channels).unwrap(),
            b.sample_voxel(&offset, channels).unwrap(),
            "at {offset:?}"
        );
    }
}

#[test]
fn raw_u32_single_voxel() {
    let ctx = voxblit::Context::new();
    let mut i_ctx = input(&ctx, &[0x01, 0x00, 0x00, 0x00]);
    let mut p_ctx = ctx
        .get_adapter::<voxblit::Parse, RawU32>()
        .unwrap()
        .create_adapter_context(RawU32ParseConfig::default())
        .unwrap();

    {
        let mut source = ParseSource::new(&mut i_ctx, &mut p_ctx).unwrap();
        let one = range([0, 0, 0], [1, 1, 1]);
        assert_eq!(source.bounds(), one);
        let region = source.load_region(&one, ChannelId::COLOR).unwrap();
        assert!(region.flags().contains(RegionFlags::UNIFORM));
        assert_eq!(
            source
                .sample_region(&region, &Offset3D::new(0, 0, 0), ChannelId::COLOR)
                .unwrap(),
            1
        );
        let err = source
            .sample_region(&region, &Offset3D::new(1, 0, 0), ChannelId::COLOR)
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::OutOfRange);
        source.unload_region(region).unwrap();
    }

    assert_eq!(p_ctx.live_regions(), 0);
    p_ctx.destroy().unwrap();
}

#[test]
fn raw_u32_reads_after_the_input_cursor() {
    let ctx = voxblit::Context::new();
    let mut bytes = vec![0xee; 5];
    bytes.extend_from_slice(BYTES);
    let mut i_ctx = input(&ctx, &bytes);
    i_ctx.seek(5, voxblit::SeekOrigin::Beg).unwrap();
    let mut p_ctx = ctx
        .get_adapter::<voxblit::Parse, RawU32>()
        .unwrap()
        .create_adapter_context(RawU32ParseConfig {
            offset: Offset3D::new(10, 20, 30),
            extent: Some(Extent3D::splat(2)),
            channel: ChannelId::MATERIAL_ID,
        })
        .unwrap();

    let mut source = ParseSource::new(&mut i_ctx, &mut p_ctx).unwrap();
    let region = source
        .load_region(&range([10, 20, 30], [2, 2, 2]), ChannelId::MATERIAL_ID)
        .unwrap();
    let last = source
        .sample_region(&region, &Offset3D::new(11, 21, 31), ChannelId::MATERIAL_ID)
        .unwrap();
    assert_eq!(last, 7);
    source.unload_region(region).unwrap();
}

#[test]
fn raw_u32_rejects_short_input() {
    let ctx = voxblit::Context::new();
    let mut i_ctx = input(&ctx, &BYTES[..20]);
    let mut p_ctx = ctx
        .get_adapter::<voxblit::Parse, RawU32>()
        .unwrap()
        .create_adapter_context(RawU32ParseConfig {
            extent: Some(Extent3D::splat(2)),
            ..Default::default()
        })
        .unwrap();
    let err = ParseSource::new(&mut i_ctx, &mut p_ctx).err().unwrap();
    assert_eq!(err.error_type(), ErrorType::FormatError);
}

#[test]
fn gvox_raw_scene_round_trip() {
    let ctx = voxblit::Context::new();
    let channels = ChannelId::COLOR | ChannelId::MATERIAL_ID;
    let mut original = scene(&ctx);

    let bytes = ctx.save_scene(&mut original, "gvox_raw").unwrap();
    assert_eq!(&bytes[..4], b"GVRW");
    assert_eq!(bytes.len(), 36 + 20 * 10 * 6 * 2 * 4);

    let mut loaded = ctx.load_scene(&bytes, "gvox_raw").unwrap();
    assert_eq!(loaded.channels(), channels);
    assert_same_voxels(&original, &loaded, channels);
    assert_eq!(ctx.save_scene(&mut loaded, "gvox_raw").unwrap(), bytes);
}

#[test]
fn gvox_fill_scene_round_trip() {
    let ctx = voxblit::Context::new();
    let channels = ChannelId::COLOR | ChannelId::MATERIAL_ID;
    let mut original = scene(&ctx);

    let bytes = ctx.save_scene(&mut original, "gvox_fill").unwrap();
    assert_eq!(&bytes[..4], b"GVFL");
    let records = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    assert!(records > 4, "details need their own records");
    assert_eq!(bytes.len() as u32, 8 + records * (28 + 8));

    let loaded = ctx.load_scene(&bytes, "gvox_fill").unwrap();
    assert_same_voxels(&original, &loaded, channels);
}

#[test]
fn sparse_scene_round_trips_with_gaps_as_zero() {
    let ctx = voxblit::Context::new();
    let mut sparse = raw_container(&ctx, ChannelId::COLOR);
    sparse
        .fill(&Voxel::splat(ChannelId::COLOR, 4), &range([0, 0, 0], [2, 2, 2]))
        .unwrap();
    sparse
        .fill(&Voxel::splat(ChannelId::COLOR, 9), &range([40, 0, 0], [2, 2, 2]))
        .unwrap();
    let zero = Voxel::splat(ChannelId::COLOR, 0);

    for format in ["gvox_raw", "gvox_fill"] {
        let bytes = ctx.save_scene(&mut sparse, format).unwrap();
        assert_eq!(sparse.live_regions(), 0);
        let loaded = ctx.load_scene(&bytes, format).unwrap();
        assert_eq!(loaded.bounds(), sparse.bounds(), "{format}");
        for offset in sparse.bounds().iter_offsets() {
            let expected = sparse
                .sample_voxel(&offset, ChannelId::COLOR)
                .unwrap()
                .unwrap_or(zero);
            assert_eq!(
                loaded.sample_voxel(&offset, ChannelId::COLOR).unwrap(),
                Some(expected),
                "{format} at {offset:?}"
            );
        }
    }

    let fill = ctx.save_scene(&mut sparse, "gvox_fill").unwrap();
    let records = u32::from_le_bytes([fill[4], fill[5], fill[6], fill[7]]);
    assert!(
        (records as u64) < sparse.bounds().volume(),
        "gaps are stored as boxes, not voxel by voxel"
    );
}

#[test]
fn custom_channels_survive_a_round_trip() {
    let ctx = voxblit::Context::new();
    let custom = ChannelId::from_index(20).unwrap();
    let channels = ChannelId::COLOR | custom;
    let mut scene = raw_container(&ctx, channels);
    scene
        .fill(
            &Voxel::default().with(ChannelId::COLOR, 1).with(custom, 0xc0ffee),
            &range([0, 0, 0], [3, 2, 1]),
        )
        .unwrap();
    scene
        .fill(&Voxel::splat(custom, 5), &range([2, 1, 0], [1, 1, 1]))
        .unwrap();
    let value = scene.sample(&[SampleRequest {
        offset: Offset3D::new(2, 1, 0),
        channel: custom,
    }]);
    assert_eq!(value[0], Ok(5));

    let bytes = ctx.save_scene(&mut scene, "gvox_raw").unwrap();
    assert_eq!(&bytes[32..36], &channels.bits().to_le_bytes());
    assert_eq!(bytes.len(), 36 + 3 * 2 * 2 * 4);
    let mut loaded = ctx.load_scene(&bytes, "gvox_raw").unwrap();
    assert_eq!(loaded.channels(), channels);
    assert_same_voxels(&scene, &loaded, channels);
    assert_eq!(ctx.save_scene(&mut loaded, "gvox_raw").unwrap(), bytes);
}

#[test]
fn gvox_raw_flag_queries_leave_the_input_cursor_alone() {
    let ctx = voxblit::Context::new();
    let bytes = ctx.save_scene(&mut scene(&ctx), "gvox_raw").unwrap();
    let mut i_ctx = input(&ctx, &bytes);
    let mut p_ctx = ctx
        .get_adapter::<voxblit::Parse, GvoxRaw>()
        .unwrap()
        .create_adapter_context(())
        .unwrap();
    {
        let mut source = ParseSource::new(&mut i_ctx, &mut p_ctx).unwrap();
        let flags = source
            .query_region_flags(&range([-3, 0, 2], [20, 10, 6]), ChannelId::COLOR)
            .unwrap();
        assert!(!flags.contains(RegionFlags::UNIFORM));
    }
    assert_eq!(i_ctx.tell(), 36);
}

#[test]
fn gvox_fill_rejects_overlapping_records() {
    let ctx = voxblit::Context::new();
    let mut bytes = b"GVFL".to_vec();
    bytes.extend_from_slice(&2u32.to_le_bytes());
    for _ in 0..2 {
        for field in [0u32, 0, 0, 2, 1, 1, ChannelId::COLOR.bits(), 1] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
    }
    let err = ctx.load_scene(&bytes, "gvox_fill").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FormatError);
}

#[test]
fn gvox_fill_stores_a_uniform_volume_as_one_record() {
    let ctx = voxblit::Context::new();
    let mut cube = raw_container(&ctx, ChannelId::COLOR);
    cube.fill(&Voxel::splat(ChannelId::COLOR, 0xabcdef), &range([0, 0, 0], [32, 32, 32]))
        .unwrap();

    let bytes = ctx.save_scene(&mut cube, "gvox_fill").unwrap();
    assert_eq!(bytes.len(), 40);
    assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
    assert_eq!(&bytes[36..40], &0xabcdefu32.to_le_bytes());

    let loaded = ctx.load_scene(&bytes, "gvox_fill").unwrap();
    assert_eq!(loaded.bounds(), range([0, 0, 0], [32, 32, 32]));
    let value = loaded.sample(&[SampleRequest {
        offset: Offset3D::new(31, 0, 17),
        channel: ChannelId::COLOR,
    }]);
    assert_eq!(value.len(), 1);
    assert_eq!(value[0], Ok(0xabcdef));
}

#[test]
fn gvox_fill_without_subdivision_needs_uniform_input() {
    let ctx = voxblit::Context::new();
    let mut source = scene(&ctx);
    let buffer = ByteBufferOutput::new();
    let mut o_ctx = output(&ctx, &buffer);
    let mut s_ctx = ctx
        .get_adapter::<voxblit::Serialize, GvoxFill>()
        .unwrap()
        .create_adapter_context(GvoxFillSerializeConfig { subdivide: false })
        .unwrap();

    let err = voxblit::serialize_container(
        &mut o_ctx,
        &mut s_ctx,
        &mut source,
        None,
        ChannelId::COLOR,
    )
    .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::UnrepresentableData);
    assert_eq!(source.live_regions(), 0);

    let flat = range([0, 0, 2], [4, 4, 4]);
    let outcome = voxblit::serialize_container(
        &mut o_ctx,
        &mut s_ctx,
        &mut source,
        Some(&flat),
        ChannelId::COLOR,
    )
    .unwrap();
    assert!(outcome.is_success());
}

#[test]
fn raw_u32_serializer_rejects_several_channels() {
    let ctx = voxblit::Context::new();
    let mut source = scene(&ctx);
    let buffer = ByteBufferOutput::new();
    let mut o_ctx = output(&ctx, &buffer);
    let mut s_ctx = ctx
        .get_adapter::<voxblit::Serialize, RawU32>()
        .unwrap()
        .create_adapter_context(())
        .unwrap();

    let err = voxblit::serialize_container(
        &mut o_ctx,
        &mut s_ctx,
        &mut source,
        None,
        ChannelId::COLOR | ChannelId::MATERIAL_ID,
    )
    .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::UnrepresentableData);
    assert!(buffer.is_empty());

    voxblit::serialize_container(&mut o_ctx, &mut s_ctx, &mut source, None, ChannelId::MATERIAL_ID)
        .unwrap();
    assert_eq!(buffer.len(), 20 * 10 * 6 * 4);
}

#[test]
fn corrupt_payloads_are_format_errors() {
    let ctx = voxblit::Context::new();

    let err = ctx.load_scene(b"NOPE\x01\0\0\0", "gvox_raw").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FormatError);
    let err = ctx.load_scene(b"NOPE\0\0\0\0", "gvox_fill").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FormatError);

    let mut cube = raw_container(&ctx, ChannelId::COLOR);
    cube.fill(&Voxel::splat(ChannelId::COLOR, 1), &range([0, 0, 0], [2, 2, 2]))
        .unwrap();
    cube.fill(&Voxel::splat(ChannelId::COLOR, 2), &range([1, 1, 1], [1, 1, 1]))
        .unwrap();

    let raw = ctx.save_scene(&mut cube, "gvox_raw").unwrap();
    let err = ctx.load_scene(&raw[..raw.len() - 4], "gvox_raw").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FormatError);

    let mut version = raw.clone();
    version[4] = 9;
    let err = ctx.load_scene(&version, "gvox_raw").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FormatError);

    let fill = ctx.save_scene(&mut cube, "gvox_fill").unwrap();
    let err = ctx.load_scene(&fill[..fill.len() - 2], "gvox_fill").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::FormatError);
}

#[test]
fn zero_extent_blit_writes_only_the_header() {
    let ctx = voxblit::Context::new();
    let mut source = scene(&ctx);
    let buffer = ByteBufferOutput::new();
    let mut o_ctx = output(&ctx, &buffer);
    let mut s_ctx = ctx
        .get_adapter::<voxblit::Serialize, GvoxRaw>()
        .unwrap()
        .create_adapter_context(())
        .unwrap();

    let empty = range([1, 2, 3], [0, 4, 4]);
    let outcome = voxblit::serialize_container(
        &mut o_ctx,
        &mut s_ctx,
        &mut source,
        Some(&empty),
        ChannelId::COLOR,
    )
    .unwrap();
    assert!(outcome.is_success());
    assert_eq!(buffer.len(), 36);
    assert_eq!(source.live_regions(), 0);
}

#[test]
fn colored_text_renders_true_color_cells() {
    let ctx = voxblit::Context::new();
    let mut source = raw_container(&ctx, ChannelId::COLOR);
    source
        .fill(&Voxel::splat(ChannelId::COLOR, 0x0011_2233), &range([0, 0, 0], [3, 2, 1]))
        .unwrap();
    let buffer = ByteBufferOutput::new();
    let mut o_ctx = output(&ctx, &buffer);
    let mut s_ctx = ctx
        .get_adapter::<voxblit::Serialize, ColoredText>()
        .unwrap()
        .create_adapter_context(Default::default())
        .unwrap();

    voxblit::serialize_container(&mut o_ctx, &mut s_ctx, &mut source, None, ChannelId::COLOR)
        .unwrap();
    let text = String::from_utf8(buffer.take()).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert_eq!(text.matches("\x1b[48;2;51;34;17m  ").count(), 6);
    assert!(text.lines().all(|line| line.ends_with("\x1b[0m")));
}

#[test]
fn colored_text_downscales_by_averaging() {
    let ctx = voxblit::Context::new();
    let mut source = raw_container(&ctx, ChannelId::COLOR);
    source
        .fill(&Voxel::splat(ChannelId::COLOR, 0), &range([0, 0, 0], [2, 2, 2]))
        .unwrap();
    source
        .fill(&Voxel::splat(ChannelId::COLOR, 0x00ff_ffff), &range([0, 0, 0], [1, 2, 2]))
        .unwrap();
    let buffer = ByteBufferOutput::new();
    let mut o_ctx = output(&ctx, &buffer);
    let config = ColoredTextSerializeAdapterConfig::from_raw(2, 1, -1, false).unwrap();
    let mut s_ctx = ctx
        .get_adapter::<voxblit::Serialize, ColoredText>()
        .unwrap()
        .create_adapter_context(config)
        .unwrap();

    voxblit::serialize_container(&mut o_ctx, &mut s_ctx, &mut source, None, ChannelId::COLOR)
        .unwrap();
    let text = String::from_utf8(buffer.take()).unwrap();
    assert_eq!(text.matches("\x1b[48;2;").count(), 1);
    assert!(text.contains("\x1b[48;2;128;128;128m"), "{text:?}");
}
