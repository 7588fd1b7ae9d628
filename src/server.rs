//! 서버: UDP 워커 + TCP 워커
//!
//! 두 워커는 각자 소켓과 원본을 소유하고 공유 쓰기 상태가 없음.
//! 종료는 `watch` 채널로만 전달됨

use std::net::SocketAddr;

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::message::Request;
use crate::payload::PayloadSource;
use crate::sender::{Sender, SessionOutcome};
use crate::stream::StreamWorker;
use crate::{Config, Result};

/// 종료 신호 채널 생성
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// UDP 송신 워커
///
/// 세션을 하나씩 끝까지 처리한 뒤 다음 요청을 받음
pub struct DatagramWorker {
    socket: UdpSocket,
    sender: Sender,
    source: PayloadSource,
}

impl DatagramWorker {
    pub async fn bind(addr: SocketAddr, config: Config, source: PayloadSource) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, config, source))
    }

    pub fn from_socket(socket: UdpSocket, config: Config, source: PayloadSource) -> Self {
        Self {
            socket,
            sender: Sender::new(config),
            source,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 종료 신호까지 요청 처리
    ///
    /// 세션 결과와 무관하게 항상 다음 요청 대기로 돌아감
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("UDP 워커 시작: {}", self.local_addr()?);

        let mut buf = vec![0u8; self.sender.config().recv_buffer_size];

        while !*shutdown.borrow() {
            let peer = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, from)) => {
                        if Request::from_bytes(&buf[..len]) != Some(Request::Udp) {
                            warn!("요청이 아닌 데이터그램 무시: {} ({} bytes)", from, len);
                            continue;
                        }
                        from
                    }
                    Err(e) => {
                        warn!("UDP 수신 에러: {}", e);
                        continue;
                    }
                },
            };

            info!("UDP 요청: {}", peer);

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("종료 신호: 진행 중인 UDP 세션 중단 ({})", peer);
                    break;
                }
                result = self.run_session(peer) => {
                    if let Err(e) = result {
                        warn!("UDP 세션 에러 ({}): {}", peer, e);
                    }
                }
            }
        }

        info!("UDP 워커 종료");
        Ok(())
    }

    async fn run_session(&self, peer: SocketAddr) -> Result<SessionOutcome> {
        let data = self.source.load().await?;
        let report = self.sender.run_session(&self.socket, peer, data).await?;

        match &report.outcome {
            SessionOutcome::Completed { elapsed } => info!(
                "UDP 전송 완료: {} ({:.6}s) | {}",
                peer,
                elapsed.as_secs_f64(),
                report.stats.summary()
            ),
            SessionOutcome::HeaderUnacknowledged { attempts } => {
                warn!("UDP 세션 포기: {} 헤더 미확인 ({}회)", peer, attempts)
            }
            SessionOutcome::Aborted { sequence, attempts } => warn!(
                "UDP 세션 포기: {} 세그먼트 {} 미확인 ({}회)",
                peer, sequence, attempts
            ),
        }

        Ok(report.outcome)
    }
}

/// 두 프로토콜 서버
pub struct Server {
    datagram: DatagramWorker,
    stream: StreamWorker,
}

impl Server {
    /// TCP를 먼저 바인딩한 뒤 같은 포트로 UDP 바인딩
    pub async fn bind(addr: SocketAddr, config: Config, source: PayloadSource) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(addr).await?;
        let udp_addr = SocketAddr::new(addr.ip(), listener.local_addr()?.port());
        let socket = UdpSocket::bind(udp_addr).await?;

        Ok(Self {
            datagram: DatagramWorker::from_socket(socket, config.clone(), source.clone()),
            stream: StreamWorker::from_listener(listener, config, source),
        })
    }

    /// 바인딩된 주소 (TCP와 UDP 포트 동일)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.datagram.local_addr()
    }

    /// 두 워커를 독립 태스크로 실행, 둘 다 끝나면 반환
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let udp_task = tokio::spawn(self.datagram.serve(shutdown.clone()));
        let tcp_task = tokio::spawn(self.stream.serve(shutdown));

        let (udp_result, tcp_result) = tokio::join!(udp_task, tcp_task);
        for (name, result) in [("UDP", udp_result), ("TCP", tcp_result)] {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{} 워커 에러: {}", name, e),
                Err(e) => warn!("{} 워커 태스크 실패: {}", name, e),
            }
        }

        Ok(())
    }
}
