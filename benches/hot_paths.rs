use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::UVec2;
use mapview::geo::{BoundingBox, GeoCoordinate};
use mapview::map::projection::projection_for;
use mapview::map::{ProjectionKind, Quadtree, WorldPixel};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    fn coord(&mut self) -> GeoCoordinate {
        GeoCoordinate::new(self.next_f64() * 360.0 - 180.0, self.next_f64() * 170.0 - 85.0)
    }
}

fn bench_projection(c: &mut Criterion) {
    let tile = UVec2::splat(256);
    let mut rng = Rng(0x9e37_79b9_7f4a_7c15);
    let coords: Vec<_> = (0..1024).map(|_| rng.coord()).collect();

    let mut group = c.benchmark_group("projection");
    for kind in [ProjectionKind::SphericalMercator, ProjectionKind::Equirectangular] {
        let projection = projection_for(kind);
        group.bench_with_input(BenchmarkId::new("to_world_px", kind), &coords, |b, coords| {
            b.iter(|| {
                for coord in coords {
                    black_box(projection.to_world_px(12, tile, coord));
                }
            })
        });
        group.bench_with_input(BenchmarkId::new("to_geo", kind), &coords, |b, coords| {
            b.iter(|| {
                for i in 0..coords.len() {
                    let px = WorldPixel::new(i as f64 * 997.0, i as f64 * 613.0);
                    black_box(projection.to_geo(12, tile, px));
                }
            })
        });
    }
    group.finish();
}

fn bench_quadtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadtree");
    for n in [1_000usize, 10_000, 100_000] {
        let mut rng = Rng(42);
        let mut tree = Quadtree::world(50);
        for i in 0..n {
            tree.insert(rng.coord(), i);
        }

        let europe = BoundingBox::from_edges(-10.0, 35.0, 30.0, 60.0);
        group.bench_with_input(BenchmarkId::new("query_region", n), &tree, |b, tree| {
            b.iter(|| black_box(tree.query(&europe)))
        });

        group.bench_function(BenchmarkId::new("insert", n), |b| {
            let mut rng = Rng(7);
            b.iter(|| {
                let mut tree = Quadtree::world(50);
                for i in 0..1_000usize {
                    tree.insert(rng.coord(), i);
                }
                black_box(tree.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_projection, bench_quadtree);
criterion_main!(benches);
