//! Relationship Synchronization Benchmarks
//!
//! Measures schema construction, many-to-many reassignment and cascading
//! destroys against the in-memory store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use elif_memory_orm::{AssociationOptions, Model, ModelDefinition, Schema};
use serde_json::json;

fn definitions() -> Vec<(&'static str, ModelDefinition)> {
    vec![
        ("user", ModelDefinition::new().attribute("name", "").has_many("posts")),
        (
            "post",
            ModelDefinition::new()
                .attribute("title", "")
                .belongs_to_model("author", "user")
                .has_many("tags")
                .has_many_with("comments", AssociationOptions::new().inverse("commentable")),
        ),
        ("tag", ModelDefinition::new().has_many("posts")),
        (
            "comment",
            ModelDefinition::new().belongs_to_with("commentable", AssociationOptions::new().polymorphic()),
        ),
    ]
}

fn seed(schema: &Schema, count: usize) -> (Vec<Model>, Vec<Model>) {
    let posts = (0..count)
        .map(|i| schema.create("post", json!({ "title": format!("post {}", i) })).unwrap())
        .collect();
    let tags = (0..count).map(|_| schema.create("tag", ()).unwrap()).collect();
    (posts, tags)
}

fn bench_schema_build(c: &mut Criterion) {
    c.bench_function("schema_build", |b| {
        b.iter(|| black_box(Schema::new(definitions()).unwrap()))
    });
}

fn bench_many_to_many_reassign(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_to_many_reassign");

    for &size in &[10, 50, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let schema = Schema::new(definitions()).unwrap();
            let (posts, tags) = seed(&schema, size);
            let (first_half, second_half) = tags.split_at(size / 2);

            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let tags = if flip { first_half } else { second_half };
                for post in &posts {
                    post.set_related_many(black_box("tags"), tags).unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_cascade_destroy(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade_destroy");

    for &size in &[10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_with_setup(
                || {
                    let schema = Schema::new(definitions()).unwrap();
                    let user = schema.create("user", ()).unwrap();
                    for _ in 0..size {
                        let post = user.create_related("posts", ()).unwrap();
                        post.create_related("comments", ()).unwrap();
                    }
                    (schema, user)
                },
                |(schema, user)| {
                    user.destroy().unwrap();
                    black_box(schema)
                },
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_schema_build, bench_many_to_many_reassign, bench_cascade_destroy);
criterion_main!(benches);
