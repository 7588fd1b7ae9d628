//! 서버 전체를 루프백으로 띄워 클라이언트 경로와 맞물려 보는 테스트

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use xferbench::message::{HEADER_LEN, REQUEST_UDP};
use xferbench::{
    fetch_stream, shutdown_channel, Config, PayloadSource, Receiver, Result, Server,
};

async fn start_server(
    config: Config,
    source: PayloadSource,
) -> (SocketAddr, watch::Sender<bool>, JoinHandle<Result<()>>) {
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), config, source)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = tokio::spawn(server.serve(shutdown_rx));
    (addr, shutdown_tx, handle)
}

fn random_payload(len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill(&mut data[..]);
    Bytes::from(data)
}

/// 일부 세그먼트와 ACK의 첫 사본을 버리는 중계기
///
/// 요청, 헤더, ACK_HEADER, 시간 보고는 그대로 전달
async fn spawn_lossy_relay(server: SocketAddr) -> SocketAddr {
    let front = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let back = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = front.local_addr().unwrap();

    tokio::spawn(async move {
        let mut client: Option<SocketAddr> = None;
        let mut dropped_segments = HashSet::new();
        let mut dropped_acks = HashSet::new();
        let mut front_buf = vec![0u8; 65536];
        let mut back_buf = vec![0u8; 65536];

        loop {
            tokio::select! {
                Ok((len, from)) = front.recv_from(&mut front_buf) => {
                    client = Some(from);
                    let data = &front_buf[..len];
                    if len == 4 {
                        let seq = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                        if seq % 3 == 1 && dropped_acks.insert(seq) {
                            continue;
                        }
                    }
                    let _ = back.send_to(data, server).await;
                }
                Ok((len, _)) = back.recv_from(&mut back_buf) => {
                    let Some(client) = client else { continue };
                    let data = &back_buf[..len];
                    if len > HEADER_LEN {
                        let seq = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                        if seq % 4 == 2 && dropped_segments.insert(seq) {
                            continue;
                        }
                    }
                    let _ = front.send_to(data, client).await;
                }
            }
        }
    });

    relay_addr
}

#[tokio::test]
async fn test_udp_fetch_through_server() {
    let source = PayloadSource::synthetic(10_000);
    let expected = source.load().await.unwrap();
    let (addr, shutdown, handle) = start_server(Config::lan(), source).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut out = Vec::new();
    let report = Receiver::new(Config::lan())
        .fetch(&socket, addr, &mut out)
        .await
        .unwrap();

    assert_eq!(report.header.total_size, 10_000);
    assert_eq!(report.header.segment_count, 3);
    assert!(report.is_complete());
    assert!(report.reported_elapsed.is_some());
    assert_eq!(out, expected.as_ref());

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_udp_fetch_survives_loss() {
    let config = Config {
        chunk_size: 1024,
        ..Config::lan()
    };
    let payload = random_payload(100_000);
    let (addr, shutdown, handle) =
        start_server(config.clone(), PayloadSource::Memory(payload.clone())).await;
    let relay = spawn_lossy_relay(addr).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("received_udp.bin");
    let mut file = tokio::fs::File::create(&path).await.unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let report = Receiver::new(config)
        .fetch(&socket, relay, &mut file)
        .await
        .unwrap();
    drop(file);

    assert_eq!(report.header.segment_count, 98);
    assert!(report.is_complete());
    assert!(report.missing.is_empty());
    assert!(report.stats.duplicates > 0);
    assert!(report.reported_elapsed.is_some());
    assert_eq!(std::fs::read(&path).unwrap(), payload.as_ref());

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_abandoned_session_does_not_block_next_client() {
    let config = Config {
        ack_timeout_ms: 50,
        max_retries: 3,
        ..Config::lan()
    };
    let (addr, shutdown, handle) =
        start_server(config.clone(), PayloadSource::synthetic(5_000)).await;

    // 요청만 보내고 응답하지 않는 클라이언트
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    silent.send_to(REQUEST_UDP, addr).await.unwrap();

    // 헤더 재전송 한도가 지나 세션이 포기될 때까지 대기
    tokio::time::sleep(Duration::from_millis(500)).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut out = Vec::new();
    let report = Receiver::new(config)
        .fetch(&socket, addr, &mut out)
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(out.len(), 5_000);

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_tcp_fetch_through_server() {
    let payload = random_payload(500_000);
    let (addr, shutdown, handle) =
        start_server(Config::default(), PayloadSource::Memory(payload.clone())).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("received_tcp.bin");
    let mut file = tokio::fs::File::create(&path).await.unwrap();
    let report = fetch_stream(&Config::default(), addr, &mut file).await.unwrap();
    drop(file);

    assert_eq!(report.expected_len, 500_000);
    assert!(report.is_complete());
    assert!(report.reported_elapsed.is_some());
    assert_eq!(std::fs::read(&path).unwrap(), payload.as_ref());

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_both_protocols_on_same_port() {
    let source = PayloadSource::synthetic(20_000);
    let expected = source.load().await.unwrap();
    let (addr, shutdown, handle) = start_server(Config::lan(), source).await;

    let udp = async {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut out = Vec::new();
        Receiver::new(Config::lan())
            .fetch(&socket, addr, &mut out)
            .await
            .unwrap();
        out
    };
    let tcp = async {
        let mut out = Vec::new();
        fetch_stream(&Config::lan(), addr, &mut out).await.unwrap();
        out
    };

    let (udp_out, tcp_out) = tokio::join!(udp, tcp);
    assert_eq!(udp_out, expected.as_ref());
    assert_eq!(tcp_out, expected.as_ref());

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_payload_whose_first_segment_matches_header() {
    let config = Config {
        ack_timeout_ms: 50,
        max_retries: 3,
        transfer_idle_timeout_ms: 1000,
        ..Config::lan()
    };
    let payload = Bytes::from_static(&[0, 0, 0, 8, 0, 0, 0, 1]);
    let (addr, shutdown, handle) =
        start_server(config.clone(), PayloadSource::Memory(payload.clone())).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut out = Vec::new();
    let report = Receiver::new(config)
        .fetch(&socket, addr, &mut out)
        .await
        .unwrap();

    assert_eq!(out, payload.as_ref());
    assert!(report.missing.is_empty());
    assert!(report.reported_elapsed.is_some());

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stalled_tcp_client_does_not_block_next() {
    use tokio::io::AsyncWriteExt;

    let config = Config {
        request_timeout_ms: 200,
        ..Config::default()
    };
    let (addr, shutdown, handle) =
        start_server(config, PayloadSource::synthetic(50_000)).await;

    let mut stalled = tokio::net::TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"REQ").await.unwrap();

    let mut out = Vec::new();
    let report = tokio::time::timeout(
        Duration::from_secs(3),
        fetch_stream(&Config::default(), addr, &mut out),
    )
    .await
    .expect("TCP 워커가 멈춘 연결에 묶여 있음")
    .unwrap();

    assert!(report.is_complete());
    assert_eq!(out.len(), 50_000);

    drop(stalled);
    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}
