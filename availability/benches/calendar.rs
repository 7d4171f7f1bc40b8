//! Calendar and overlap benchmarks
//!
//! - `build_calendar`: window size × number of held stays
//! - `conflicts`: one candidate against a crowded neighbourhood
//!
//! Run with: `cargo bench --bench calendar`

#![allow(missing_docs)]
#![allow(clippy::expect_used)]

use availability_service::calendar::build_calendar;
use availability_service::occupancy::{OccupancyRecord, Stay};
use availability_service::overlap::conflicts;
use campsite_core::contracts::ReservationId;
use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 2, 1, 0, 0, 0)
        .single()
        .expect("valid date")
}

/// Back-to-back two-night stays with a free night between each.
fn stays(count: i64) -> Vec<Stay> {
    (0..count)
        .map(|i| {
            let arrival = base() + Duration::days(i * 3);
            Stay::new(arrival, arrival + Duration::days(2)).expect("non-empty stay")
        })
        .collect()
}

fn benchmark_calendar(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_calendar");

    for window_days in [30_i64, 90, 365] {
        let occupied = stays(window_days / 3);
        group.throughput(Throughput::Elements(window_days.unsigned_abs()));
        group.bench_with_input(
            BenchmarkId::from_parameter(window_days),
            &occupied,
            |b, occupied| {
                let end = base() + Duration::days(window_days);
                b.iter(|| black_box(build_calendar(black_box(base()), end, occupied)));
            },
        );
    }

    group.finish();
}

fn benchmark_conflicts(c: &mut Criterion) {
    let mut group = c.benchmark_group("conflicts");

    let records: Vec<OccupancyRecord> = stays(100)
        .into_iter()
        .map(|stay| OccupancyRecord::new(ReservationId::new(), stay, base()))
        .collect();
    let free = Stay::new(base() + Duration::days(2), base() + Duration::days(3)).expect("stay");
    let taken = Stay::new(base() + Duration::days(1), base() + Duration::days(4)).expect("stay");

    group.bench_function("free_slot", |b| {
        b.iter(|| black_box(conflicts(black_box(&free), &records, None)));
    });
    group.bench_function("overlapping_slot", |b| {
        b.iter(|| black_box(conflicts(black_box(&taken), &records, None)));
    });

    group.finish();
}

criterion_group!(benches, benchmark_calendar, benchmark_conflicts);
criterion_main!(benches);
