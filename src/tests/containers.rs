use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voxblit::{
    AdvanceMode, ErrorType, IteratorValue, MoveSource, RegionFlags, RegionSource, SampleRequest,
    Voxel,
};

fn sample_all(
    container: &voxblit::AdapterContext<voxblit::Container>,
    range: &RegionRange,
    channel: ChannelId,
) -> Vec<voxblit::Result<u32>> {
    let requests: Vec<_> = range
        .iter_offsets()
        .map(|offset| SampleRequest { offset, channel })
        .collect();
    container.sample(&requests)
}

#[test]
fn fill_then_sample_every_coordinate() {
    let ctx = voxblit::Context::new();
    let cube = range([0, 0, 0], [4, 4, 4]);
    let containers = [
        raw_container(&ctx, ChannelId::COLOR),
        bounded_container(&ctx, range([-2, -2, -2], [8, 8, 8]), ChannelId::COLOR),
    ];
    for mut container in containers {
        container.fill(&Voxel::splat(ChannelId::COLOR, 7), &cube).unwrap();
        let values = sample_all(&container, &cube, ChannelId::COLOR);
        assert_eq!(values.len(), 64);
        assert!(values.iter().all(|v| *v == Ok(7)), "{}", container.name());
        container.destroy().unwrap();
    }
}

#[test]
fn move_translates_source_coordinates() {
    let ctx = voxblit::Context::new();
    let mut a = raw_container(&ctx, ChannelId::COLOR);
    for (i, offset) in range([0, 0, 0], [2, 2, 2]).iter_offsets().enumerate() {
        a.fill(&Voxel::splat(ChannelId::COLOR, 100 + i as u32), &RegionRange::voxel(offset))
            .unwrap();
    }
    let before = a.sample_voxel(&Offset3D::new(0, 0, 0), ChannelId::COLOR).unwrap();

    let mut b = bounded_container(&ctx, range([0, 0, 0], [16, 4, 4]), ChannelId::COLOR);
    b.move_from(&[MoveSource {
        container: &a,
        range: range([0, 0, 0], [2, 2, 2]),
        offset: Offset3D::new(10, 0, 0),
    }])
    .unwrap();

    assert_eq!(b.sample_voxel(&Offset3D::new(10, 0, 0), ChannelId::COLOR).unwrap(), before);
    assert_eq!(
        b.sample_voxel(&Offset3D::new(11, 1, 1), ChannelId::COLOR).unwrap(),
        Some(Voxel::splat(ChannelId::COLOR, 107))
    );
    assert_eq!(
        a.sample_voxel(&Offset3D::new(0, 0, 0), ChannelId::COLOR).unwrap(),
        before,
        "sources are copied, not drained"
    );
}

#[test]
fn move_combines_several_sources() {
    let ctx = voxblit::Context::new();
    let mut ground = raw_container(&ctx, ChannelId::COLOR);
    ground
        .fill(&Voxel::splat(ChannelId::COLOR, 1), &range([0, 0, 0], [32, 1, 32]))
        .unwrap();
    let mut tree = raw_container(&ctx, ChannelId::COLOR);
    tree.fill(&Voxel::splat(ChannelId::COLOR, 2), &range([0, 0, 0], [1, 5, 1]))
        .unwrap();

    let mut scene = raw_container(&ctx, ChannelId::COLOR);
    scene
        .move_from(&[
            MoveSource {
                container: &ground,
                range: ground.bounds(),
                offset: Offset3D::new(-16, 0, -16),
            },
            MoveSource {
                container: &tree,
                range: tree.bounds(),
                offset: Offset3D::new(3, 1, 3),
            },
        ])
        .unwrap();

    assert_eq!(scene.bounds(), range([-16, 0, -16], [32, 6, 32]));
    let sample = |x, y, z| {
        scene.sample(&[SampleRequest {
            offset: Offset3D::new(x, y, z),
            channel: ChannelId::COLOR,
        }])[0]
            .clone()
    };
    assert_eq!(sample(-16, 0, 15), Ok(1));
    assert_eq!(sample(3, 5, 3), Ok(2));
    assert_eq!(sample(3, 6, 3).unwrap_err().error_type(), ErrorType::OutOfRange);
}

#[test]
fn sample_errors_are_per_request() {
    let ctx = voxblit::Context::new();
    let mut container = bounded_container(&ctx, range([0, 0, 0], [2, 2, 2]), ChannelId::COLOR);
    container
        .fill(&Voxel::splat(ChannelId::COLOR, 5), &range([0, 0, 0], [2, 2, 2]))
        .unwrap();
    let results = container.sample(&[
        SampleRequest {
            offset: Offset3D::new(1, 1, 1),
            channel: ChannelId::COLOR,
        },
        SampleRequest {
            offset: Offset3D::new(2, 0, 0),
            channel: ChannelId::COLOR,
        },
        SampleRequest {
            offset: Offset3D::new(0, 0, 0),
            channel: ChannelId::NORMAL,
        },
        SampleRequest {
            offset: Offset3D::new(0, 0, 0),
            channel: ChannelId::COLOR | ChannelId::NORMAL,
        },
    ]);
    assert_eq!(results[0], Ok(5));
    assert_eq!(results[1].as_ref().unwrap_err().error_type(), ErrorType::OutOfRange);
    assert_eq!(results[2].as_ref().unwrap_err().error_type(), ErrorType::OutOfRange);
    assert_eq!(results[3].as_ref().unwrap_err().error_type(), ErrorType::InvalidArgument);
}

#[test]
fn fill_rejects_unstored_channels_and_ignores_empty_ranges() {
    let ctx = voxblit::Context::new();
    let mut container = raw_container(&ctx, ChannelId::COLOR);
    let err = container
        .fill(&Voxel::splat(ChannelId::NORMAL, 1), &range([0, 0, 0], [1, 1, 1]))
        .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::InvalidArgument);

    container
        .fill(&Voxel::splat(ChannelId::COLOR, 1), &range([0, 0, 0], [0, 0, 0]))
        .unwrap();
    assert!(container.bounds().is_empty());
    assert!(container.iter().next().is_none());
}

#[test]
fn bounded_container_rejects_writes_outside_its_range() {
    let ctx = voxblit::Context::new();
    let mut container = bounded_container(&ctx, range([0, 0, 0], [4, 4, 4]), ChannelId::COLOR);
    let err = container
        .fill(&Voxel::splat(ChannelId::COLOR, 1), &range([2, 2, 2], [4, 1, 1]))
        .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::OutOfRange);
}

#[test]
fn iteration_visits_every_stored_coordinate_once() {
    let ctx = voxblit::Context::new();
    let mut container = raw_container(&ctx, ChannelId::COLOR | ChannelId::MATERIAL_ID);
    let solid = range([-20, 0, 0], [40, 16, 16]);
    container
        .fill(
            &Voxel::default().with(ChannelId::COLOR, 3).with(ChannelId::MATERIAL_ID, 1),
            &solid,
        )
        .unwrap();
    container
        .fill(&Voxel::splat(ChannelId::COLOR, 9), &range([0, 0, 0], [2, 2, 2]))
        .unwrap();

    let walk = |container: &voxblit::AdapterContext<voxblit::Container>| {
        let mut iter = container.iter();
        let mut visited = Vec::new();
        let mut mode = AdvanceMode::Next;
        loop {
            mode = match iter.advance(mode).unwrap() {
                IteratorValue::Region { range, uniform: Some(voxel), flags } => {
                    assert!(flags.contains(RegionFlags::UNIFORM));
                    visited.extend(range.iter_offsets().map(|o| (o, voxel)));
                    AdvanceMode::SkipBranch
                }
                IteratorValue::Region { .. } => AdvanceMode::Next,
                IteratorValue::Leaf { offset, voxel } => {
                    visited.push((offset, voxel));
                    AdvanceMode::Next
                }
                IteratorValue::End => break,
            };
        }
        visited
    };

    let first = walk(&container);
    assert_eq!(first, walk(&container), "traversal is deterministic");
    assert_eq!(first.len() as u64, solid.volume());
    let mut offsets: Vec<_> = first.iter().map(|(o, _)| *o).collect();
    offsets.sort();
    offsets.dedup();
    assert_eq!(offsets.len() as u64, solid.volume());
    for (offset, voxel) in &first {
        assert_eq!(container.sample_voxel(offset, voxel.channels()).unwrap(), Some(*voxel));
    }
}

#[test]
fn uniform_flag_is_truthful() {
    let ctx = voxblit::Context::new();
    let mut rng = StdRng::seed_from_u64(0x0b1e);
    let mut container = raw_container(&ctx, ChannelId::COLOR);
    let world = range([-24, -24, -24], [48, 48, 48]);
    container.fill(&Voxel::splat(ChannelId::COLOR, 0), &world).unwrap();
    for _ in 0..24 {
        let extent = [rng.gen_range(1..20), rng.gen_range(1..20), rng.gen_range(1..20)];
        let offset = [
            rng.gen_range(-24..24 - extent[0] as i32),
            rng.gen_range(-24..24 - extent[1] as i32),
            rng.gen_range(-24..24 - extent[2] as i32),
        ];
        let value = rng.gen_range(0..3);
        container
            .fill(&Voxel::splat(ChannelId::COLOR, value), &range(offset, extent))
            .unwrap();
    }

    let mut uniform_seen = 0;
    for probe in world.bricks(8) {
        let flags = container.query_region_flags(&probe, ChannelId::COLOR).unwrap();
        let region = container.load_region(&probe, ChannelId::COLOR).unwrap();
        if flags.contains(RegionFlags::UNIFORM) {
            uniform_seen += 1;
            let first = container
                .sample_region(&region, &probe.offset, ChannelId::COLOR)
                .unwrap();
            for offset in probe.iter_offsets() {
                assert_eq!(
                    container.sample_region(&region, &offset, ChannelId::COLOR).unwrap(),
                    first
                );
            }
        }
        container.unload_region(region).unwrap();
    }
    assert!(uniform_seen > 0);
    assert_eq!(container.live_regions(), 0);
    container.destroy().unwrap();
}

#[test]
fn container_with_live_region_cannot_be_destroyed() {
    let ctx = voxblit::Context::new();
    let mut container = raw_container(&ctx, ChannelId::COLOR);
    container
        .fill(&Voxel::splat(ChannelId::COLOR, 1), &range([0, 0, 0], [2, 2, 2]))
        .unwrap();
    let region = container
        .load_region(&range([0, 0, 0], [2, 2, 2]), ChannelId::COLOR)
        .unwrap();
    assert_eq!(region.flags(), RegionFlags::UNIFORM);
    assert_eq!(container.live_regions(), 1);

    let mut other = raw_container(&ctx, ChannelId::COLOR);
    let err = other.unload_region(region).unwrap_err();
    assert_eq!(err.error_type(), ErrorType::InvalidArgument);

    let err = container.destroy().unwrap_err();
    assert_eq!(err.error_type(), ErrorType::InvalidArgument);
}

#[test]
fn zero_extent_region_is_exhausted_immediately() {
    let ctx = voxblit::Context::new();
    let mut container = raw_container(&ctx, ChannelId::COLOR);
    let empty = range([3, 3, 3], [0, 0, 0]);
    assert_eq!(
        container.query_region_flags(&empty, ChannelId::COLOR).unwrap(),
        RegionFlags::empty()
    );
    let region = container.load_region(&empty, ChannelId::COLOR).unwrap();
    let err = container
        .sample_region(&region, &Offset3D::new(3, 3, 3), ChannelId::COLOR)
        .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::OutOfRange);
    container.unload_region(region).unwrap();
    assert_eq!(empty.iter_offsets().count(), 0);
    container.destroy().unwrap();
}
