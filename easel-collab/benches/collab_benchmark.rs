use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use easel_collab::protocol::{ClientPacket, ServerPacket, UserListEntry};
use easel_collab::registry::RoomRegistry;
use easel_collab::room::RoomConfig;
use easel_collab::storage::{MemoryRoomStore, RocksRoomStore, RoomSnapshot, RoomStore, StoreConfig};
use easel_collab::user::{outbound_channel, User};
use easel_raster::{BrushSettings, Color, Operation, PngDataUrlCodec, Size, Vec2};
use futures_util::FutureExt;
use tokio::runtime::Runtime;

fn stroke() -> Operation {
    Operation::Pencil {
        position: Vec2::new(120, 80),
        previous_position: Some(Vec2::new(100, 60)),
        color: Color::rgb(30, 60, 90),
        settings: BrushSettings::circle(6),
    }
}

fn bench_operation_decode(c: &mut Criterion) {
    let text = ClientPacket::Operation { operation: stroke() }.encode().unwrap();

    c.bench_function("operation_packet_decode", |b| {
        b.iter(|| black_box(ClientPacket::decode(black_box(&text)).unwrap()))
    });
}

fn bench_user_list_encode(c: &mut Criterion) {
    let packet = ServerPacket::UserList {
        users: (0..50)
            .map(|i| UserListEntry { username: format!("user-{i}"), moderator: i % 10 == 0 })
            .collect(),
    };

    c.bench_function("user_list_encode_50", |b| {
        b.iter(|| black_box(packet.encode().unwrap()))
    });
}

fn registry() -> RoomRegistry {
    RoomRegistry::new(
        Arc::new(MemoryRoomStore::new()),
        Arc::new(PngDataUrlCodec::default()),
        RoomConfig::default(),
    )
}

fn bench_broadcast_100_users(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = registry();
    rt.block_on(registry.create_room("bench", Size::new(64, 64), "ann")).unwrap();
    let room = rt.block_on(registry.get_room("bench")).unwrap();

    let mut inboxes = Vec::new();
    for i in 0..100 {
        let (outbox, inbox) = outbound_channel(1024);
        rt.block_on(room.add_user(Arc::new(User::new(format!("user-{i}"), outbox))));
        inboxes.push(inbox);
    }
    for inbox in &mut inboxes {
        while let Some(Some(_)) = inbox.next().now_or_never() {}
    }

    c.bench_function("broadcast_ping_100_users", |b| {
        b.iter(|| {
            black_box(rt.block_on(room.broadcast(&ServerPacket::Ping, None)));
            for inbox in &mut inboxes {
                let _ = inbox.next().now_or_never();
            }
        })
    });
}

fn bench_handle_operation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = registry();
    rt.block_on(registry.create_room("bench", Size::new(320, 240), "ann")).unwrap();
    let room = rt.block_on(registry.get_room("bench")).unwrap();
    let op = stroke();

    c.bench_function("room_handle_operation_320x240", |b| {
        b.iter(|| rt.block_on(room.handle_operation(black_box(op.clone()), "ann")))
    });
}

fn bench_rocks_save(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksRoomStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let snapshot = RoomSnapshot {
        size: Size::new(800, 600),
        encoded_image: format!("data:image/png;base64,{}", "A".repeat(64 * 1024)),
        moderator_secret: "0123456789abcdef0123456789abcdef".into(),
        moderators: vec!["ann".into()],
        palette: vec![Color::BLACK, Color::WHITE],
    };

    c.bench_function("rocks_save_64KiB_snapshot", |b| {
        b.iter(|| store.save(black_box("bench"), black_box(&snapshot)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_operation_decode,
    bench_user_list_encode,
    bench_broadcast_100_users,
    bench_handle_operation,
    bench_rocks_save,
);
criterion_main!(benches);
