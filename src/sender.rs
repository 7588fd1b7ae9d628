//! 송신자 (서버측)
//!
//! - stop-and-wait: 한 번에 하나의 미확인 데이터그램만 존재
//! - 헤더 → `ACK_HEADER`, 세그먼트 k → `ACK(k)` 확인 후에만 k+1 전송
//! - 타임아웃 시 같은 데이터그램 재전송, `max_retries`회 전송 후 세션 포기

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::chunk::{SequenceNumber, Segmenter};
use crate::message::{Ack, TimingReport, TransferHeader};
use crate::stats::TransferStats;
use crate::{Config, Result};

/// 세션 결과
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// 모든 세그먼트 확인 완료
    Completed { elapsed: Duration },

    /// 헤더 ACK를 받지 못함 (파일 데이터 전송 안 함)
    HeaderUnacknowledged { attempts: u32 },

    /// 세그먼트 재전송 한도 초과
    Aborted {
        sequence: SequenceNumber,
        attempts: u32,
    },
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed { .. })
    }
}

/// 세션 보고서
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub peer: SocketAddr,
    pub header: TransferHeader,
    pub outcome: SessionOutcome,
    pub stats: TransferStats,
}

/// 송신자
pub struct Sender {
    config: Config,
    segmenter: Segmenter,
}

impl Sender {
    /// 새 송신자 생성
    pub fn new(config: Config) -> Self {
        Self {
            segmenter: Segmenter::new(config.chunk_size),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 한 수신자에게 데이터 전체를 전송
    ///
    /// 재전송 한도 초과는 `Ok(SessionOutcome)`으로, 소켓 에러만 `Err`로 반환
    pub async fn run_session(
        &self,
        socket: &UdpSocket,
        peer: SocketAddr,
        data: Bytes,
    ) -> Result<SessionReport> {
        let (header, segments) = self.segmenter.split(&data)?;

        let mut stats = TransferStats::new();
        stats.total_segments = header.segment_count as u64;
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        // 헤더 단계
        let header_bytes = header.to_bytes();
        if !self
            .deliver(socket, peer, &header_bytes, Ack::Header, &mut buf, &mut stats)
            .await?
        {
            warn!(
                "헤더 ACK 없음: {} ({}회 전송), 세션 중단",
                peer, self.config.max_retries
            );
            return Ok(SessionReport {
                peer,
                header,
                outcome: SessionOutcome::HeaderUnacknowledged {
                    attempts: self.config.max_retries,
                },
                stats,
            });
        }

        info!(
            "헤더 확인: {} (total_size={}, segments={}, chunk_size={})",
            peer,
            header.total_size,
            header.segment_count,
            self.segmenter.chunk_size()
        );

        // 데이터 단계
        let start = Instant::now();
        stats.start_time = start.into_std();

        for segment in &segments {
            let acked = self
                .deliver(
                    socket,
                    peer,
                    &segment.to_bytes(),
                    Ack::Segment(segment.sequence),
                    &mut buf,
                    &mut stats,
                )
                .await?;

            if !acked {
                warn!(
                    "세그먼트 {} ACK 없음: {} ({}회 전송), 세션 중단",
                    segment.sequence, peer, self.config.max_retries
                );
                return Ok(SessionReport {
                    peer,
                    header,
                    outcome: SessionOutcome::Aborted {
                        sequence: segment.sequence,
                        attempts: self.config.max_retries,
                    },
                    stats,
                });
            }

            stats.completed_segments += 1;
            stats.total_bytes += segment.payload.len() as u64;
        }

        let elapsed = start.elapsed();
        stats.finish();
        info!(
            "전체 세그먼트 확인: {} ({:.6}s)",
            peer,
            elapsed.as_secs_f64()
        );

        // 시간 보고 (ACK 없음)
        let report = TimingReport::from_elapsed(elapsed);
        match socket.send_to(&report.to_bytes(), peer).await {
            Ok(_) => stats.datagrams_sent += 1,
            Err(e) => warn!("시간 보고 전송 실패: {}", e),
        }

        Ok(SessionReport {
            peer,
            header,
            outcome: SessionOutcome::Completed { elapsed },
            stats,
        })
    }

    /// 데이터그램 전송 후 기대 ACK 대기, 타임아웃 시 재전송
    ///
    /// `max_retries`회 전송 내에 확인되면 true
    async fn deliver(
        &self,
        socket: &UdpSocket,
        peer: SocketAddr,
        datagram: &[u8],
        expected: Ack,
        buf: &mut [u8],
        stats: &mut TransferStats,
    ) -> Result<bool> {
        for attempt in 1..=self.config.max_retries {
            if attempt > 1 {
                stats.retransmissions += 1;
                warn!("재전송: {:?} → {} (시도 {})", expected, peer, attempt);
            }

            socket.send_to(datagram, peer).await?;
            stats.datagrams_sent += 1;

            if self.await_ack(socket, peer, expected, buf, stats).await? {
                return Ok(true);
            }
            stats.timeouts += 1;
        }

        Ok(false)
    }

    /// 기대 ACK 대기
    ///
    /// 다른 ACK나 다른 주소의 데이터그램은 무시하며 대기 기한을 늘리지 않음
    async fn await_ack(
        &self,
        socket: &UdpSocket,
        peer: SocketAddr,
        expected: Ack,
        buf: &mut [u8],
        stats: &mut TransferStats,
    ) -> Result<bool> {
        let deadline = Instant::now() + self.config.ack_timeout();

        loop {
            let (len, from) = match timeout_at(deadline, socket.recv_from(buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(false),
            };
            stats.datagrams_received += 1;

            if from != peer {
                stats.ignored += 1;
                debug!("세션 외 데이터그램 무시: {}", from);
                continue;
            }

            match Ack::from_bytes(&buf[..len]) {
                Some(ack) if ack == expected => return Ok(true),
                other => {
                    stats.ignored += 1;
                    debug!("불일치 응답 무시: {:?} (기대 {:?})", other, expected);
                }
            }
        }
    }
}
