use criterion::{criterion_group, criterion_main, Criterion};
use lifeboard_collab::broadcast::{BroadcastGroup, PeerInfo};
use lifeboard_collab::protocol::ServerEvent;
use lifeboard_collab::router::MutationRouter;
use lifeboard_collab::store::LobbyStore;
use lifeboard_core::LobbyDocument;
use std::hint::black_box;
use std::sync::Arc;

fn bench_update_encode(c: &mut Criterion) {
    let doc = LobbyDocument::with_players(8);

    c.bench_function("update_encode_8_players", |b| {
        b.iter(|| {
            let event = ServerEvent::update(black_box("squirrel"), black_box(&doc));
            black_box(event.to_frame().unwrap());
        })
    });
}

fn bench_fanout_100_peers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let doc = LobbyDocument::default();

    c.bench_function("fanout_update_100_peers", |b| {
        b.iter(|| {
            rt.block_on(async {
                let group = BroadcastGroup::new(64);
                let mut receivers = Vec::with_capacity(100);
                for _ in 0..100 {
                    receivers.push(group.add_peer(PeerInfo::detached()).await);
                }
                let reached = group.send(&ServerEvent::update("squirrel", &doc)).unwrap();
                black_box(reached);
            });
        })
    });
}

fn bench_mutate_and_broadcast(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(LobbyStore::new(1024));
    let router = MutationRouter::new(store.clone());
    let _receivers = rt.block_on(async {
        let lobby = store.get_or_create("squirrel").await;
        let mut receivers = Vec::with_capacity(100);
        for _ in 0..100 {
            receivers.push(lobby.group().add_peer(PeerInfo::detached()).await);
        }
        receivers
    });

    c.bench_function("change_life_100_members", |b| {
        b.iter(|| {
            rt.block_on(async {
                router
                    .change(black_box("squirrel"), black_box("P1"), black_box(-1))
                    .await
                    .unwrap();
            });
        })
    });
}

fn bench_get_or_create_1000_lobbies(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let keys: Vec<String> = (0..1000).map(|i| format!("lobby-{i}")).collect();

    c.bench_function("get_or_create_1000_lobbies", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = LobbyStore::new(16);
                for key in &keys {
                    black_box(store.get_or_create(key).await);
                }
            });
        })
    });
}

criterion_group!(
    benches,
    bench_update_encode,
    bench_fanout_100_peers,
    bench_mutate_and_broadcast,
    bench_get_or_create_1000_lobbies,
);
criterion_main!(benches);
