//! Criterion benchmarks for kin

use chrono::{DateTime, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kin::core::{BufferedCursor, RowCursor};
use kin::prelude::*;

// ============================================================================
// Row Extraction Benchmarks
// ============================================================================

fn sample_row() -> RowExtractor {
    RowExtractor::new(
        vec![
            "id".to_string(),
            "name".to_string(),
            "active".to_string(),
            "balance".to_string(),
            "created_at".to_string(),
        ],
        vec![
            DatabaseValue::Bytes(b"42".to_vec()),
            DatabaseValue::Bytes(b"Ada Lovelace".to_vec()),
            DatabaseValue::Bytes(b"t".to_vec()),
            DatabaseValue::Bytes(b"1234.5".to_vec()),
            DatabaseValue::Bytes(b"2024-03-01T12:30:45.123456Z".to_vec()),
        ],
    )
}

fn bench_row_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_extraction");
    group.throughput(Throughput::Elements(1));

    group.bench_function("int", |b| {
        b.iter_batched(
            sample_row,
            |mut row| black_box(row.extract_int("id")),
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("bool", |b| {
        b.iter_batched(
            sample_row,
            |mut row| black_box(row.extract_bool("active")),
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("time", |b| {
        b.iter_batched(
            sample_row,
            |mut row| black_box(row.extract_time("created_at")),
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("poisoned", |b| {
        b.iter_batched(
            || {
                let mut row = sample_row();
                row.extract_int("missing");
                row
            },
            |mut row| black_box(row.extract_string("name")),
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

// ============================================================================
// Result Set Benchmarks
// ============================================================================

fn bench_result_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_set");

    for size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || {
                    let mut cursor = BufferedCursor::new(vec!["id".to_string(), "name".to_string()]);
                    for i in 0..size {
                        cursor.push_row(vec![
                            DatabaseValue::Long(i as i64),
                            DatabaseValue::String(format!("user_{}", i)),
                        ]);
                    }
                    Box::new(cursor) as Box<dyn RowCursor>
                },
                |cursor| black_box(ResultSet::from_cursor(cursor)),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// Model Mapping Benchmarks
// ============================================================================

#[derive(Default)]
struct Account {
    id: Option<i64>,
    name: Option<String>,
    active: Option<bool>,
    balance: Option<f64>,
    created_at: Option<DateTime<Utc>>,
}

impl Builder for Account {
    fn columns(&mut self) -> Vec<Box<dyn FieldBuilder + '_>> {
        vec![
            int_field("id", &mut self.id),
            string_field("name", &mut self.name),
            bool_field("active", &mut self.active),
            decimal_field("balance", &mut self.balance),
            time_field("created_at", &mut self.created_at),
        ]
    }
}

impl Model for Account {
    fn table_name(&self) -> &str {
        "accounts"
    }
}

fn bench_model_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_mapping");
    group.throughput(Throughput::Elements(1));

    group.bench_function("fill_from_row", |b| {
        b.iter_batched(
            sample_row,
            |mut row| {
                let mut account = Account::default();
                for mut field in account.columns() {
                    field.set(&mut row);
                }
                black_box(account.id)
            },
            criterion::BatchSize::SmallInput,
        );
    });

    #[cfg(feature = "sqlite")]
    {
        let db = SqliteDatabase::new();
        group.bench_function("insert_query", |b| {
            b.iter(|| {
                let mut account = Account {
                    name: Some("Ada".to_string()),
                    balance: Some(10.0),
                    ..Default::default()
                };
                let query = insert_query(&db, &mut account);
                black_box(query.statement().len())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_row_extraction,
    bench_result_set,
    bench_model_mapping
);
criterion_main!(benches);
