//! Benchmarks for the link protocol and the wire codec
//!
//! Run with: cargo bench --bench link_protocol

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use princess_of_fire::attributes::Attribute;
use princess_of_fire::network::codec;
use princess_of_fire::network::protocol::LinkProtocol;
use princess_of_fire::{
    LinkConfig, MemoryAddr, MemoryNetwork, MemorySocket, Message, NonBlockingSocket,
};
use std::hint::black_box;
use web_time::{Duration, Instant};

struct Link {
    host: LinkProtocol<MemoryAddr>,
    guest: LinkProtocol<MemoryAddr>,
    host_socket: MemorySocket,
    guest_socket: MemorySocket,
    now: Instant,
}

impl Link {
    fn connected() -> Self {
        let network = MemoryNetwork::new();
        let now = Instant::now();
        let mut link = Self {
            host: LinkProtocol::host(LinkConfig::deterministic(1), None),
            guest: LinkProtocol::guest(MemoryAddr(1), LinkConfig::deterministic(2), None),
            host_socket: network.socket(1),
            guest_socket: network.socket(2),
            now,
        };
        link.host.start(now).unwrap();
        link.guest.start(now).unwrap();
        while !(link.host.is_connected() && link.guest.is_connected()) {
            link.exchange();
        }
        link
    }

    /// One round of sending, receiving and timers on both ends.
    fn exchange(&mut self) {
        self.now += Duration::from_millis(16);
        self.guest.send_all_messages(&mut self.guest_socket);
        for (from, msg) in self.host_socket.receive_all_messages() {
            self.host.handle_message(&msg, &from, self.now);
        }
        self.host.poll(self.now).for_each(drop);
        self.host.send_all_messages(&mut self.host_socket);
        for (from, msg) in self.guest_socket.receive_all_messages() {
            self.guest.handle_message(&msg, &from, self.now);
        }
        self.guest.poll(self.now).for_each(drop);
    }
}

/// Ordered writes from the guest, delivered and acknowledged.
fn bench_write_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("link/write_burst");
    for writes in [1usize, 4, 16] {
        group.throughput(Throughput::Elements(writes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(writes), &writes, |b, &writes| {
            let mut link = Link::connected();
            let mut x = 0;
            b.iter(|| {
                for _ in 0..writes {
                    x = (x + 1) % 320;
                    link.guest.write(Attribute::GuestX, x, link.now).unwrap();
                }
                link.exchange();
                link.exchange();
            });
        });
    }
    group.finish();
}

/// Captures one datagram of each kind the guest sends while connecting and writing.
fn sample_messages() -> Vec<Message> {
    let network = MemoryNetwork::new();
    let mut sink = network.socket(1);
    let mut guest = LinkProtocol::guest(MemoryAddr(1), LinkConfig::deterministic(3), None);
    let now = Instant::now();
    guest.start(now).unwrap();
    guest.send_all_messages(&mut network.socket(2));
    sink.receive_all_messages()
        .into_iter()
        .map(|(_, msg)| msg)
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let messages = sample_messages();
    let msg = messages.first().expect("guest sends a connect request");
    let bytes = codec::encode(msg).unwrap();
    let mut buffer = [0u8; 128];

    c.bench_function("codec/encode_into", |b| {
        b.iter(|| codec::encode_into(black_box(msg), &mut buffer).unwrap());
    });
    c.bench_function("codec/decode", |b| {
        b.iter(|| codec::decode_value::<Message>(black_box(&bytes)).unwrap());
    });
    c.bench_function("codec/attribute_value", |b| {
        b.iter(|| {
            let raw = codec::encode_attribute_value(black_box(-1234));
            codec::decode_attribute_value(&raw).unwrap()
        });
    });
}

criterion_group!(benches, bench_write_burst, bench_codec);
criterion_main!(benches);
