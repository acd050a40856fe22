use criterion::{criterion_group, criterion_main, Criterion};
use recurrence_engine::{
    generate_occurrences, parse_local, DayCode, ExpansionLimits, ExpansionOptions, Frequency,
    RecurrenceRule,
};
use std::hint::black_box;

fn bench_expansion(c: &mut Criterion) {
    let limits = ExpansionLimits::default();
    let options = ExpansionOptions::default();
    let anchor = parse_local("2026-01-05T09:30:00").unwrap();

    let daily = RecurrenceRule::new(Frequency::Daily, 1);
    c.bench_function("daily_open_ended_new_york", |b| {
        b.iter(|| {
            generate_occurrences(
                black_box(&daily),
                chrono_tz::America::New_York,
                anchor,
                &options,
                &limits,
            )
        })
    });

    let weekdays = RecurrenceRule::new(Frequency::Weekly, 1)
        .with_count(500)
        .with_byweekday([DayCode::Mo, DayCode::We, DayCode::Fr]);
    c.bench_function("weekly_byweekday_500_london", |b| {
        b.iter(|| {
            generate_occurrences(
                black_box(&weekdays),
                chrono_tz::Europe::London,
                anchor,
                &options,
                &limits,
            )
        })
    });

    let mondays = RecurrenceRule::new(Frequency::Yearly, 1)
        .with_count(520)
        .with_byweekday([DayCode::Mo]);
    c.bench_function("yearly_every_monday_sydney", |b| {
        b.iter(|| {
            generate_occurrences(
                black_box(&mondays),
                chrono_tz::Australia::Sydney,
                anchor,
                &options,
                &limits,
            )
        })
    });
}

criterion_group!(benches, bench_expansion);
criterion_main!(benches);
