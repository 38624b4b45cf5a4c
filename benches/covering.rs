use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quadtile::{
    exterior_covering, search, search_ranges, CoveringConfig, Entry, Payload, QuadIndex, QuadKey,
};

#[derive(Debug, Clone)]
struct Tag(u64);

impl Payload for Tag {
    type Id = u64;

    fn id(&self) -> u64 {
        self.0
    }
}

const AUSTRALIA_WKT: &str = "MULTIPOLYGON(\
    ((115.12974936961064 -33.94746740383465, 116.89325344621824 -35.1773935246154, 123.54635525699587 -34.0334665647765, 125.01229427555933 -32.76504696519842, 130.8533264250692 -31.621205514074042, 133.3554878149327 -32.013812745097916, 135.59925229667363 -34.824810219542044, 140.15501878018097 -37.94107655667957, 143.29965711410927 -38.98670541298011, 145.99722125772973 -39.15763221685892, 149.89173421681983 -37.7629793608208, 153.28147327805465 -31.274083836016892, 153.19944941207405 -25.699910662918327, 142.40106983051436 -10.445759124437714, 140.49420368110157 -17.547905748173463, 135.53694091389116 -14.833465482045824, 136.88524622800003 -12.169310284547564, 130.56764876913473 -11.235979504388865, 129.25811634656884 -14.111505857716836, 129.55354736823062 -14.99121754617586, 126.93839179015254 -13.866803186408347, 125.14157328273859 -14.493436274092332, 121.13901156170527 -19.316348563404404, 113.74170321256048 -21.997856972782103, 113.47904014429406 -26.171395434387343, 115.84534035714637 -32.53204953697848, 115.12974936961064 -33.94746740383465)),\
    ((144.28919920677697 -40.77079688015533, 146.07335528591045 -43.71159773845069, 147.43011180353886 -43.616346924564745, 148.33034010300855 -40.908336071447536, 146.25199570018162 -41.090890980452386, 144.28919920677697 -40.77079688015533)))";

fn benchmark_covering(c: &mut Criterion) {
    let mut group = c.benchmark_group("covering");

    let geometry = quadtile::covering::parse_wkt(AUSTRALIA_WKT).unwrap();

    for max_cells in [20usize, 100, 500] {
        group.bench_function(format!("australia_{}_cells", max_cells), |b| {
            let config = CoveringConfig::with_max_cells(max_cells);
            b.iter(|| exterior_covering(black_box(&geometry), &config).unwrap())
        });
    }

    let point = quadtile::covering::parse_wkt("POINT(151.196 -33.866)").unwrap();
    group.bench_function("point_to_max_zoom", |b| {
        let config = CoveringConfig::with_max_cells(20);
        b.iter(|| exterior_covering(black_box(&point), &config).unwrap())
    });

    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");

    // A dense zoom-12 grid of entries under one zoom-6 tile.
    let base = QuadKey::from_slippy(58, 38, 6).unwrap();
    let entries: Vec<Entry<Tag>> = base
        .descendants_at_zoom(12)
        .unwrap()
        .enumerate()
        .map(|(i, key)| Entry::new(key, Tag(i as u64)))
        .collect();
    let index = QuadIndex::new(entries);

    let query: Vec<QuadKey> = base
        .descendants_at_zoom(9)
        .unwrap()
        .take(16)
        .collect();

    group.bench_function("search_ranges_16_tiles", |b| {
        b.iter(|| search_ranges(black_box(&query), 0))
    });

    group.bench_function("search_4096_entries", |b| {
        b.iter(|| search(black_box(&index), black_box(&query), 0).unwrap())
    });

    group.finish();
}

criterion_group!(benches, benchmark_covering, benchmark_search);
criterion_main!(benches);
