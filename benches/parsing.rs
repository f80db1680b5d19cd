//! Benchmarks for the handshake hot path: tokenizing lines and feeding the
//! registration state machine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slirc_client::state::HandshakeMachine;
use slirc_client::{Configuration, ParsedLine};

/// Simple PING message
const SIMPLE_MESSAGE: &str = "PING :irc.example.com";

/// Message with prefix
const PREFIX_MESSAGE: &str = ":nick!user@host PRIVMSG #channel :Hello, world!";

/// Message with IRCv3 tags
const TAGGED_MESSAGE: &str = "@time=2023-01-01T00:00:00.000Z;msgid=abc123;+example/tag=value :nick!user@host PRIVMSG #channel :Hello with tags!";

/// Long capability list
const CAP_LS: &str = ":irc.server.net CAP * LS :account-notify away-notify chghost extended-join invite-notify multi-prefix sasl=PLAIN,EXTERNAL server-time userhost-in-names tls";

/// Numeric response
const NUMERIC_RESPONSE: &str = ":irc.server.net 001 nickname :Welcome to the IRC Network nickname!user@host";

fn benchmark_tokenizing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Line Tokenizing");

    let lines = [
        ("simple_ping", SIMPLE_MESSAGE),
        ("with_prefix", PREFIX_MESSAGE),
        ("with_tags", TAGGED_MESSAGE),
        ("cap_ls", CAP_LS),
        ("numeric_response", NUMERIC_RESPONSE),
    ];

    for (name, line) in lines {
        group.bench_with_input(BenchmarkId::new("parse", name), line, |b, s| {
            b.iter(|| {
                let parsed = ParsedLine::parse(black_box(s)).unwrap();
                black_box(parsed.token_count())
            })
        });
    }

    group.finish();
}

fn benchmark_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("Registration");

    let burst = [
        ":irc.server.net NOTICE * :*** Looking up your hostname...",
        ":irc.server.net CAP * LS :multi-prefix sasl server-time",
        ":irc.server.net CAP bot ACK :multi-prefix",
        ":irc.server.net 001 bot :Welcome to the IRC Network bot",
    ];

    group.bench_function("cap_then_welcome", |b| {
        let config = Configuration::new("irc.server.net", "bot");
        b.iter(|| {
            let mut machine = HandshakeMachine::from_config(&config);
            black_box(machine.start());
            for line in burst {
                black_box(machine.feed(black_box(line)).unwrap());
            }
            assert!(machine.is_complete());
        })
    });

    group.bench_function("nick_collisions", |b| {
        let mut config = Configuration::new("irc.server.net", "bot");
        config.auto_nick_change = true;
        config.cap_enabled = false;
        b.iter(|| {
            let mut machine = HandshakeMachine::from_config(&config);
            machine.start();
            for _ in 0..10 {
                black_box(machine.feed(":irc.server.net 433 * bot :Nickname is already in use").unwrap());
            }
            black_box(machine.feed(":irc.server.net 001 bot11 :Welcome").unwrap());
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_tokenizing, benchmark_registration);

criterion_main!(benches);
