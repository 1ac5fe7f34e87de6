//! Headless network test peer for multi-process testing.
//!
//! This binary plays one side of a Princess of Fire session over a real UDP
//! socket. Start a host and a guest in separate processes; they connect, pick
//! characters, and play a scripted round in which the princess runs straight
//! at the dragon.
//!
//! # Usage
//!
//! ```bash
//! # Host playing the dragon
//! cargo run -p network-test-peer -- \
//!     --local-port 9001 \
//!     --role host \
//!     --character dragon
//!
//! # Guest playing the princess
//! cargo run -p network-test-peer -- \
//!     --local-port 9002 \
//!     --role guest \
//!     --peer 127.0.0.1:9001 \
//!     --character princess
//! ```
//!
//! # Chaos Options
//!
//! ```bash
//! --packet-loss 0.1       # 10% packet loss
//! --duplicate-rate 0.05   # 5% duplicated datagrams
//! --reorder-rate 0.1      # 10% reordering within a receive batch
//! --seed 42               # Deterministic chaos
//! ```
//!
//! # Output
//!
//! Prints one JSON line when the round ends or the peer gives up:
//! ```json
//! {"success":true,"role":"guest","frames":211,"outcome":{"cause":"caught","winner":"princess","local_won":true}}
//! ```

use std::io::{self, Write};
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use princess_of_fire::{
    ChaosConfig, ChaosSocket, GameConfig, GameEvent, GamePhase, GameSession,
    InputSample, Outcome, PlayerType, Role, SessionBuilder, UdpNonBlockingSocket,
};
use serde::Serialize;

const FRAME: Duration = Duration::from_millis(16);
const LINGER: Duration = Duration::from_millis(1000);

#[derive(Serialize)]
struct TestResult {
    success: bool,
    role: Role,
    frames: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interruptions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TestResult {
    fn failure(role: Role, frames: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            role,
            frames,
            outcome: None,
            interruptions: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Default)]
struct Args {
    local_port: u16,
    role: Option<Role>,
    peer_addr: Option<SocketAddr>,
    character: Option<PlayerType>,
    round_ms: u64,
    packet_loss: f64,
    duplicate_rate: f64,
    reorder_rate: f64,
    seed: Option<u64>,
    timeout_secs: u64,
    debug: bool,
}

fn parse_role(value: &str) -> Role {
    match value {
        "host" => Role::Host,
        "guest" => Role::Guest,
        other => panic!("Invalid role: {other}"),
    }
}

fn parse_character(value: &str) -> PlayerType {
    match value {
        "princess" => PlayerType::Princess,
        "dragon" => PlayerType::Dragon,
        other => panic!("Invalid character: {other}"),
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args {
        round_ms: 30_000,
        timeout_secs: 60,
        ..Args::default()
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--local-port" => {
                i += 1;
                result.local_port = args[i].parse().expect("Invalid port");
            },
            "--role" => {
                i += 1;
                result.role = Some(parse_role(&args[i]));
            },
            "--peer" => {
                i += 1;
                result.peer_addr = Some(args[i].parse().expect("Invalid peer address"));
            },
            "--character" => {
                i += 1;
                result.character = Some(parse_character(&args[i]));
            },
            "--round-ms" => {
                i += 1;
                result.round_ms = args[i].parse().expect("Invalid round length");
            },
            "--packet-loss" => {
                i += 1;
                result.packet_loss = args[i].parse().expect("Invalid packet loss rate");
            },
            "--duplicate-rate" => {
                i += 1;
                result.duplicate_rate = args[i].parse().expect("Invalid duplicate rate");
            },
            "--reorder-rate" => {
                i += 1;
                result.reorder_rate = args[i].parse().expect("Invalid reorder rate");
            },
            "--seed" => {
                i += 1;
                result.seed = Some(args[i].parse().expect("Invalid seed"));
            },
            "--timeout" => {
                i += 1;
                result.timeout_secs = args[i].parse().expect("Invalid timeout");
            },
            "--debug" => {
                result.debug = true;
            },
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            },
        }
        i += 1;
    }

    result
}

fn main() {
    let args = parse_args();

    let Some(role) = args.role else {
        print_json(&TestResult::failure(Role::Host, 0, "--role is required"));
        std::process::exit(1);
    };
    if args.local_port == 0 {
        print_json(&TestResult::failure(role, 0, "--local-port is required"));
        std::process::exit(1);
    }
    if role == Role::Guest && args.peer_addr.is_none() {
        print_json(&TestResult::failure(role, 0, "--peer is required for a guest"));
        std::process::exit(1);
    }

    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .with_writer(io::stderr)
            .init();
    }

    let result = run_peer(&args, role);
    let success = result.success;
    print_json(&result);
    if !success {
        std::process::exit(1);
    }
}

fn print_json(value: &impl Serialize) {
    let json = serde_json::to_string(value).unwrap();
    println!("{json}");
    io::stdout().flush().unwrap();
}

fn chaos_config(args: &Args) -> ChaosConfig {
    let mut builder = ChaosConfig::builder();
    if args.packet_loss > 0.0 {
        builder = builder.packet_loss_rate(args.packet_loss);
    }
    if args.duplicate_rate > 0.0 {
        builder = builder.duplication_rate(args.duplicate_rate);
    }
    if args.reorder_rate > 0.0 {
        builder = builder.reorder_rate(args.reorder_rate);
    }
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    builder.build()
}

type PeerSocket = ChaosSocket<SocketAddr, UdpNonBlockingSocket>;

fn run_peer(args: &Args, role: Role) -> TestResult {
    let inner = match UdpNonBlockingSocket::bind_to_port(args.local_port) {
        Ok(socket) => socket,
        Err(e) => return TestResult::failure(role, 0, format!("Failed to bind socket: {e}")),
    };
    let socket: PeerSocket = ChaosSocket::new(inner, chaos_config(args));

    let builder = SessionBuilder::new().with_game_config(GameConfig {
        round_duration: Duration::from_millis(args.round_ms),
        ..GameConfig::default()
    });
    let started = match (role, args.peer_addr) {
        (Role::Host, _) => builder.start_host_session(socket),
        (Role::Guest, Some(host)) => builder.start_guest_session(socket, host),
        (Role::Guest, None) => unreachable!("checked in main"),
    };
    match started {
        Ok(mut session) => play(&mut session, args, role),
        Err(e) => TestResult::failure(role, 0, format!("Failed to start session: {e}")),
    }
}

/// Drives the session until the round ends or the timeout passes.
fn play(session: &mut GameSession<SocketAddr>, args: &Args, role: Role) -> TestResult {
    let wanted = args.character.unwrap_or(match role {
        Role::Host => PlayerType::Dragon,
        Role::Guest => PlayerType::Princess,
    });
    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    let mut frames = 0u64;
    let mut interruptions = 0u32;

    while Instant::now() < deadline {
        let input = scripted_input(session, role);
        if let Err(e) = session.advance_frame(&input) {
            return TestResult::failure(role, frames, format!("Frame failed: {e}"));
        }
        frames += 1;

        let events: Vec<GameEvent> = session.events().collect();
        for event in events {
            match event {
                GameEvent::NetworkInterrupted { .. } => interruptions += 1,
                GameEvent::GameOver(outcome) => {
                    linger(session);
                    session.disconnect();
                    return TestResult {
                        success: true,
                        role,
                        frames,
                        outcome: Some(outcome),
                        interruptions: Some(interruptions),
                        error: None,
                    };
                },
                _ => {},
            }
        }

        if session.is_connected() && session.phase() == GamePhase::Select {
            select_and_start(session, wanted, role);
        }
        thread::sleep(FRAME);
    }

    TestResult::failure(
        role,
        frames,
        format!("Timed out in phase {:?}", session.phase()),
    )
}

/// Keeps resending unacknowledged writes for a moment so a lossy link still delivers the end
/// of the round before the goodbye.
fn linger(session: &mut GameSession<SocketAddr>) {
    let until = Instant::now() + LINGER;
    while Instant::now() < until {
        session.poll_remote_clients();
        thread::sleep(FRAME);
    }
}

fn select_and_start(session: &mut GameSession<SocketAddr>, wanted: PlayerType, role: Role) {
    let shared = session.state().shared();
    let local = shared.local_selection();
    let peer = shared.peer_selection();
    if local == PlayerType::Unchosen {
        let pick = if peer == wanted { other(wanted) } else { wanted };
        // a rejected pick is retried next frame
        let _ = session.choose_character(pick);
    } else if role == Role::Host && peer != PlayerType::Unchosen && peer != local {
        let _ = session.request_start();
    }
}

fn other(character: PlayerType) -> PlayerType {
    match character {
        PlayerType::Princess => PlayerType::Dragon,
        _ => PlayerType::Princess,
    }
}

/// The princess runs at the dragon; the dragon stands still.
fn scripted_input(session: &GameSession<SocketAddr>, role: Role) -> InputSample {
    if session.phase() != GamePhase::Play
        || session.state().shared().local_selection() != PlayerType::Princess
    {
        return InputSample::neutral();
    }
    let axis_x = match role {
        Role::Host => 0,
        Role::Guest => 1023,
    };
    InputSample {
        axis_x,
        ..InputSample::neutral()
    }
}
