//! TCP 경로
//!
//! `REQUEST TCP` → u64 길이 → 원본 바이트 → f64 경과 시간 (모두 big-endian)
//!
//! 신뢰성 있는 스트림이므로 재전송 로직 없음

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::message::{Request, TimingReport, REQUEST_TCP};
use crate::payload::PayloadSource;
use crate::{Config, Error, Result};

/// 서버측 연결 하나의 결과
#[derive(Debug, Clone)]
pub struct StreamSessionReport {
    pub peer: SocketAddr,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// 클라이언트측 수신 결과
#[derive(Debug, Clone)]
pub struct StreamReport {
    /// 서버가 알려준 길이
    pub expected_len: u64,

    /// 실제 받은 바이트
    pub bytes_received: u64,

    /// 서버가 보고한 전송 시간
    pub reported_elapsed: Option<Duration>,
}

impl StreamReport {
    pub fn is_complete(&self) -> bool {
        self.bytes_received == self.expected_len
    }
}

/// TCP 송신 워커
pub struct StreamWorker {
    listener: TcpListener,
    source: PayloadSource,
    config: Config,
}

impl StreamWorker {
    pub async fn bind(addr: SocketAddr, config: Config, source: PayloadSource) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, config, source))
    }

    pub fn from_listener(listener: TcpListener, config: Config, source: PayloadSource) -> Self {
        Self {
            listener,
            source,
            config,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 종료 신호까지 연결을 하나씩 처리
    ///
    /// 연결 단위 에러는 로그만 남기고 다음 연결을 계속 받음
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("TCP 워커 시작: {}", self.local_addr()?);

        while !*shutdown.borrow() {
            let (stream, peer) = tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("TCP accept 에러: {}", e);
                        continue;
                    }
                },
            };

            info!("TCP 연결: {}", peer);

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("종료 신호: 진행 중인 TCP 세션 중단 ({})", peer);
                    break;
                }
                result = self.handle_connection(stream, peer) => match result {
                    Ok(report) => info!(
                        "TCP 전송 완료: {} ({} bytes, {:.6}s)",
                        report.peer,
                        report.bytes_sent,
                        report.elapsed.as_secs_f64()
                    ),
                    Err(e) => warn!("TCP 세션 에러 ({}): {}", peer, e),
                },
            }
        }

        info!("TCP 워커 종료");
        Ok(())
    }

    /// 연결 하나 처리
    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<StreamSessionReport> {
        // 요청을 보내지 않는 연결이 다음 연결을 막지 않도록 대기 제한
        let mut request = [0u8; REQUEST_TCP.len()];
        match tokio::time::timeout(self.config.request_timeout(), stream.read_exact(&mut request)).await {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                warn!("TCP 요청 대기 타임아웃: {}", peer);
                return Err(Error::PeerAbsent { addr: peer });
            }
        }
        if Request::from_bytes(&request) != Some(Request::Tcp) {
            return Err(Error::UnexpectedRequest);
        }

        let (len, reader) = self.source.open().await?;
        stream.write_all(&len.to_be_bytes()).await?;

        let start = Instant::now();
        let mut reader = reader.take(len);
        let mut buf = vec![0u8; self.config.stream_chunk_size];
        let mut bytes_sent = 0u64;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stream.write_all(&buf[..n]).await?;
            bytes_sent += n as u64;
        }

        // 길이 헤더를 이미 보냈으므로 부족하면 프로토콜이 깨짐
        if bytes_sent < len {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("원본이 예상보다 짧음: {}/{} bytes", bytes_sent, len),
            )));
        }

        let elapsed = start.elapsed();
        stream
            .write_all(&TimingReport::from_elapsed(elapsed).to_bytes())
            .await?;
        stream.shutdown().await?;

        Ok(StreamSessionReport {
            peer,
            bytes_sent,
            elapsed,
        })
    }
}

/// 서버에서 TCP로 파일을 받아 sink에 기록
pub async fn fetch_stream<W>(config: &Config, server: SocketAddr, sink: &mut W) -> Result<StreamReport>
where
    W: AsyncWrite + Unpin,
{
    let mut stream = match tokio::time::timeout(config.request_timeout(), TcpStream::connect(server)).await {
        Ok(result) => result?,
        Err(_) => return Err(Error::PeerAbsent { addr: server }),
    };
    stream.write_all(Request::Tcp.token()).await?;

    let expected_len = match stream.read_u64().await {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            warn!("TCP 길이 헤더를 받지 못함: {}", server);
            return Err(Error::PeerAbsent { addr: server });
        }
        Err(e) => return Err(e.into()),
    };
    info!("TCP 수신 시작: {} bytes", expected_len);

    let bytes_received = tokio::io::copy(&mut (&mut stream).take(expected_len), sink).await?;
    sink.flush().await?;

    if bytes_received < expected_len {
        warn!("TCP 수신 부족: {}/{} bytes", bytes_received, expected_len);
    }

    let reported_elapsed = match stream.read_f64().await {
        Ok(elapsed_secs) => TimingReport { elapsed_secs }.elapsed(),
        Err(_) => {
            warn!("TCP 시간 보고 없음");
            None
        }
    };

    Ok(StreamReport {
        expected_len,
        bytes_received,
        reported_elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    async fn start_worker(source: PayloadSource) -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<Result<()>>) {
        start_worker_with(Config::default(), source).await
    }

    async fn start_worker_with(
        config: Config,
        source: PayloadSource,
    ) -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<Result<()>>) {
        let worker = StreamWorker::bind("127.0.0.1:0".parse().unwrap(), config, source)
            .await
            .unwrap();
        let addr = worker.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.serve(shutdown_rx));
        (addr, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn test_stream_transfer_to_file() {
        let source = PayloadSource::synthetic(500_000);
        let expected = source.load().await.unwrap();
        let (addr, shutdown, handle) = start_worker(source).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("received_tcp.bin");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        let report = fetch_stream(&Config::default(), addr, &mut file).await.unwrap();
        drop(file);

        assert_eq!(report.expected_len, 500_000);
        assert!(report.is_complete());
        assert!(report.reported_elapsed.is_some());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 500_000);
        assert_eq!(std::fs::read(&path).unwrap(), expected.as_ref());

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bad_request_does_not_stop_accept_loop() {
        let (addr, shutdown, handle) =
            start_worker(PayloadSource::Memory(Bytes::from_static(b"stream payload"))).await;

        // 잘못된 요청은 연결만 닫힘
        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(b"HELLO WORLD").await.unwrap();
        let mut rest = Vec::new();
        bad.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let mut out = Vec::new();
        let report = fetch_stream(&Config::default(), addr, &mut out).await.unwrap();
        assert_eq!(out, b"stream payload");
        assert!(report.is_complete());

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stalled_request_does_not_block_next_client() {
        let config = Config {
            request_timeout_ms: 200,
            ..Config::default()
        };
        let (addr, shutdown, handle) =
            start_worker_with(config, PayloadSource::Memory(Bytes::from_static(b"after stall"))).await;

        // 요청을 끝까지 보내지 않고 연결만 유지
        let mut stalled = TcpStream::connect(addr).await.unwrap();
        stalled.write_all(b"REQ").await.unwrap();

        let mut out = Vec::new();
        let report = tokio::time::timeout(
            Duration::from_secs(3),
            fetch_stream(&Config::default(), addr, &mut out),
        )
        .await
        .expect("멈춘 연결이 다음 클라이언트를 막음")
        .unwrap();

        assert_eq!(out, b"after stall");
        assert!(report.is_complete());

        // 멈춘 연결은 서버가 닫음
        let mut rest = Vec::new();
        stalled.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let (addr, shutdown, handle) = start_worker(PayloadSource::Memory(Bytes::new())).await;

        let mut out = Vec::new();
        let report = fetch_stream(&Config::default(), addr, &mut out).await.unwrap();

        assert_eq!(report.expected_len, 0);
        assert!(out.is_empty());
        assert!(report.reported_elapsed.is_some());

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
