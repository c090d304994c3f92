//! An echo round trip over the loopback interface.
//!
//! Spawns an engine, runs an echo server on one thread and a client on another that sends a
//! pattern and checks what comes back. Call example:
//!
//! * `tinynet-echo 7 -n 100000 -l 1400 --tcp`
//! * `RUST_LOG=tinynet=trace tinynet-echo 9 -n 4096 --udp`
mod config;

use std::thread;
use std::time::Instant;

use log::info;

use tinynet::config::Config as StackConfig;
use tinynet::socket::{Engine, Fd, Result, SockAddr, SockOpt, Sockets, Stack};
use tinynet::socket::{AF_INET, SOCK_DGRAM, SOCK_STREAM};
use tinynet::wire::Ipv4Address;

use crate::config::{Config, Transport};

fn main() {
    env_logger::init();
    let config = Config::from_args();

    let (engine, sockets) = Engine::spawn(Stack::new(StackConfig::default()))
        .expect("Couldn't start the engine");
    println!("[+] Engine running, echoing on port {}", config.port);

    let start = Instant::now();
    let result = match config.transport {
        Transport::Tcp => stream_round_trip(&sockets, &config),
        Transport::Udp => datagram_round_trip(&sockets, &config),
    };
    let elapsed = start.elapsed();

    drop(sockets);
    engine.shutdown();

    match result {
        Ok(echoed) => {
            println!("[+] Done\n");
            println!("{} bytes echoed in {:?}", echoed, elapsed);
        },
        Err(err) => {
            eprintln!("[-] Echo failed: {}", err);
            std::process::exit(1);
        },
    }
}

fn server_addr(config: &Config) -> SockAddr {
    SockAddr::new(Ipv4Address::LOOPBACK, config.port)
}

fn pattern(total: usize) -> Vec<u8> {
    (0..total).map(|i| (i % 251) as u8).collect()
}

fn stream_round_trip(sockets: &Sockets, config: &Config) -> Result<usize> {
    let listener = sockets.socket(AF_INET, SOCK_STREAM, 0)?;
    sockets.bind(listener, server_addr(config))?;
    sockets.listen(listener, 1)?;

    let remote = sockets.clone();
    let server = thread::spawn(move || -> Result<()> {
        let (conn, peer) = remote.accept(listener)?;
        info!("accepted {}", peer);
        let mut buf = vec![0; 2048];
        loop {
            let len = remote.recv(conn, &mut buf)?;
            if len == 0 {
                break;
            }
            remote.send(conn, &buf[..len])?;
        }
        remote.close(conn)
    });

    let client = sockets.socket(AF_INET, SOCK_STREAM, 0)?;
    sockets.set_option(client, SockOpt::RecvTimeout(config.timeout))?;
    sockets.connect(client, server_addr(config))?;

    let message = pattern(config.total_bytes);
    let chunk = config.buffer_bytes.max(1);
    let mut echoed = Vec::with_capacity(message.len());
    let mut buf = vec![0; chunk];
    // Stay in lockstep, so neither side's buffers fill up while the other is sending.
    for part in message.chunks(chunk) {
        sockets.send(client, part)?;
        let expected = echoed.len() + part.len();
        while echoed.len() < expected {
            let len = sockets.recv(client, &mut buf)?;
            if len == 0 {
                break;
            }
            echoed.extend_from_slice(&buf[..len]);
        }
    }
    sockets.close(client)?;

    let served = server.join().unwrap_or(Err(tinynet::socket::Error::System));
    sockets.close(listener)?;
    served?;
    verify(&message, &echoed)
}

fn datagram_round_trip(sockets: &Sockets, config: &Config) -> Result<usize> {
    let server = sockets.socket(AF_INET, SOCK_DGRAM, 0)?;
    sockets.bind(server, server_addr(config))?;
    let datagrams = (config.total_bytes + config.buffer_bytes.max(1) - 1) / config.buffer_bytes.max(1);

    let remote = sockets.clone();
    let echo = thread::spawn(move || -> Result<()> {
        let mut buf = vec![0; 65536];
        for _ in 0..datagrams {
            let (len, from) = remote.recvfrom(server, &mut buf)?;
            remote.sendto(server, &buf[..len], from)?;
        }
        Ok(())
    });

    let client = sockets.socket(AF_INET, SOCK_DGRAM, 0)?;
    sockets.set_option(client, SockOpt::RecvTimeout(config.timeout))?;
    let message = pattern(config.total_bytes);
    let mut echoed = Vec::with_capacity(message.len());
    let mut buf = vec![0; 65536];
    for part in message.chunks(config.buffer_bytes.max(1)) {
        sockets.sendto(client, part, server_addr(config))?;
        let (len, _) = sockets.recvfrom(client, &mut buf)?;
        echoed.extend_from_slice(&buf[..len]);
    }

    let served = echo.join().unwrap_or(Err(tinynet::socket::Error::System));
    close_all(sockets, &[client, server])?;
    served?;
    verify(&message, &echoed)
}

fn close_all(sockets: &Sockets, fds: &[Fd]) -> Result<()> {
    for &fd in fds {
        sockets.close(fd)?;
    }
    Ok(())
}

fn verify(sent: &[u8], echoed: &[u8]) -> Result<usize> {
    if sent != echoed {
        eprintln!("[-] Echo differs after {} bytes", sent.iter().zip(echoed).take_while(|(a, b)| a == b).count());
        return Err(tinynet::socket::Error::Broken);
    }
    Ok(echoed.len())
}
