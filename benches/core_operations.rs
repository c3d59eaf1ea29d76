use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use kettle::cache::entry_name;
use kettle::cellar::compare_versions;
use kettle::{Dependency, DependencyKind, Formula, ResolveOptions, Resolver, normalize_path};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

fn formula(name: &str, deps: Vec<String>) -> Formula {
    Formula {
        name: name.to_string(),
        version: "1.0".to_string(),
        url: format!("https://example.com/{}-1.0.tar.gz", name),
        sha256: None,
        desc: None,
        homepage: None,
        dependencies: deps
            .into_iter()
            .map(|name| Dependency {
                name,
                kind: DependencyKind::Runtime,
            })
            .collect(),
        options: vec![],
        keg_only: false,
        build_steps: vec![],
        bottles: BTreeMap::new(),
        tap: Some("homebrew/core".to_string()),
        path: PathBuf::new(),
    }
}

/// Layered graph: every node depends on up to `fan_out` nodes of the next layer
fn layered_graph(layers: usize, width: usize, fan_out: usize) -> HashMap<String, Formula> {
    let mut graph = HashMap::new();
    for layer in 0..layers {
        for i in 0..width {
            let name = format!("f{}-{}", layer, i);
            let deps = if layer + 1 < layers {
                (0..fan_out)
                    .map(|k| format!("f{}-{}", layer + 1, (i + k) % width))
                    .collect()
            } else {
                vec![]
            };
            graph.insert(name.clone(), formula(&name, deps));
        }
    }

    let roots = (0..width).map(|i| format!("f0-{}", i)).collect();
    graph.insert("root".to_string(), formula("root", roots));
    graph
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for (layers, width) in [(4, 8), (8, 16), (16, 32)] {
        let graph = layered_graph(layers, width, 3);
        group.bench_with_input(
            BenchmarkId::new("layered", graph.len()),
            &graph,
            |b, graph| {
                b.iter(|| {
                    Resolver::new(graph, ResolveOptions::default())
                        .resolve(black_box("root"))
                        .map(|g| g.len())
                })
            },
        );
    }

    group.finish();
}

fn bench_normalize_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_path");

    let simple = Path::new("/opt/kettle/bin/foo");
    let medium = Path::new("/opt/kettle/bin/../Cellar/./foo/1.0");
    let complex = Path::new("/a/b/c/../../d/e/f/../g/./h/../i");

    group.bench_with_input(BenchmarkId::new("simple", 0), &simple, |b, path| {
        b.iter(|| normalize_path(black_box(path)))
    });
    group.bench_with_input(BenchmarkId::new("medium", 1), &medium, |b, path| {
        b.iter(|| normalize_path(black_box(path)))
    });
    group.bench_with_input(BenchmarkId::new("complex", 2), &complex, |b, path| {
        b.iter(|| normalize_path(black_box(path)))
    });

    group.finish();
}

fn bench_compare_versions(c: &mut Criterion) {
    let mut versions: Vec<String> = (0..200)
        .map(|i| format!("{}.{}.{}", i % 7, i % 13, i))
        .collect();

    c.bench_function("sort 200 versions", |b| {
        b.iter(|| {
            versions.sort_by(|a, b| compare_versions(b, a));
            black_box(versions.first().cloned())
        })
    });
}

fn bench_entry_name(c: &mut Criterion) {
    let artifact = formula("testball", vec![]).source_artifact();
    c.bench_function("cache entry_name", |b| b.iter(|| entry_name(black_box(&artifact))));
}

criterion_group!(
    benches,
    bench_resolve,
    bench_normalize_path,
    bench_compare_versions,
    bench_entry_name
);
criterion_main!(benches);
