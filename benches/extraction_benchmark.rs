/// Benchmarks for classification and extraction throughput
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use git2base::analyzer::{AnalysisPipeline, AnalyzerRegistry};
use git2base::classifier::classify_file_type;
use git2base::config::Config;
use git2base::importer::{ImportMode, ImportRequest, Importer};
use git2base::sink::{BatchSink, MemoryBackend};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a repository with two commits touching `count` files
fn create_test_repo(count: usize) -> anyhow::Result<(TempDir, Oid, Oid)> {
    let dir = TempDir::new()?;
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(dir.path(), &opts)?;
    let sig = Signature::now("Bench", "bench@example.com")?;

    let commit = |revision: usize, parent: Option<Oid>| -> anyhow::Result<Oid> {
        let mut index = repo.index()?;
        for i in 0..count {
            let path = format!("src/module_{}.py", i);
            let content = format!(
                "class Module{i}:\n    revision = {revision}\n\n    def run(self):\n        return {i} * {revision}\n"
            );
            std::fs::create_dir_all(dir.path().join("src"))?;
            std::fs::write(dir.path().join(&path), content)?;
            index.add_path(Path::new(&path))?;
        }
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let parent = parent.map(|oid| repo.find_commit(oid)).transpose()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        Ok(repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &format!("revision {}", revision),
            &tree,
            &parents,
        )?)
    };

    let old = commit(1, None)?;
    let new = commit(2, Some(old))?;
    Ok((dir, old, new))
}

fn importer(path: &Path) -> Importer {
    let config = Config::default();
    let pipeline =
        AnalysisPipeline::with_registry(&AnalyzerRegistry::with_builtins(), &config.analyzers)
            .unwrap();
    Importer::with_pipeline(config, path, pipeline).unwrap()
}

fn benchmark_classification(c: &mut Criterion) {
    let paths: Vec<String> = (0..1000)
        .map(|i| match i % 4 {
            0 => format!("src/module_{}.rs", i),
            1 => format!("config/.env{}", i),
            2 => format!("docs/README_{}", i),
            _ => format!("web/assets/app.{}.min.JS", i),
        })
        .collect();

    c.bench_function("classify_file_type_1000", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(classify_file_type(black_box(path)));
            }
        })
    });
}

fn benchmark_diff_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_extraction");

    for file_count in [10, 100, 250].iter() {
        let (dir, old, new) = create_test_repo(*file_count).unwrap();
        let importer = importer(dir.path());
        let request = ImportRequest::history(Some("main".to_string())).with_mode(ImportMode::Diff {
            old: old.to_string(),
            new: new.to_string(),
        });

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_files", file_count)),
            file_count,
            |b, _| {
                b.iter(|| {
                    let mut sink =
                        BatchSink::new(Box::new(MemoryBackend::new()), Duration::from_secs(30));
                    importer.run(black_box(&request), &mut sink).unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_history_walk(c: &mut Criterion) {
    let (dir, _, _) = create_test_repo(100).unwrap();
    let importer = importer(dir.path());
    let request = ImportRequest::history(Some("main".to_string()));

    c.bench_function("history_walk_2_commits_100_files", |b| {
        b.iter(|| {
            let mut sink = BatchSink::new(Box::new(MemoryBackend::new()), Duration::from_secs(30));
            importer.run(black_box(&request), &mut sink).unwrap()
        })
    });
}

criterion_group!(
    benches,
    benchmark_classification,
    benchmark_diff_extraction,
    benchmark_history_walk
);
criterion_main!(benches);
