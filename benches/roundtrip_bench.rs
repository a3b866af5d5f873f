use aux_runner::core::facade::Auxiliary;
use aux_runner::core::message::Request;
use aux_runner::core::worker::WorkerSettings;
use aux_runner::infra::connectors::LoopbackChannel;
use aux_runner::reporting::journal::Journal;
use criterion::{Criterion, criterion_group, criterion_main};
use std::time::Duration;
use tokio::runtime::Runtime;

fn bench_query_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let aux = rt.block_on(async {
        let aux = Auxiliary::spawn(
            "bench",
            Box::new(LoopbackChannel::new()),
            WorkerSettings::default(),
            Journal::new(),
        )
        .unwrap();
        aux.create_instance(Duration::from_secs(1)).await.unwrap();
        aux
    });

    c.bench_function("loopback_query_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = aux
                .run_command(Request::query(b"PING".as_slice()), Duration::from_secs(1))
                .await;
        });
    });
}

criterion_group!(benches, bench_query_round_trip);
criterion_main!(benches);
