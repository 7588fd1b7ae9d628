//! 수신자 (클라이언트측)
//!
//! - 요청 1회, 헤더 ACK 1회
//! - 세그먼트마다 ACK (중복/범위 밖 포함), 새 시퀀스만 저장
//! - 재전송 한도는 없고 송신자 재전송에 의존, 대신 전체 유휴 타임아웃으로 종료

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::chunk::{InsertOutcome, ReassemblyBuffer, SequenceNumber};
use crate::message::{Ack, Request, Segment, TimingReport, TransferHeader, ACK_HEADER, TIMING_LEN};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 수신 결과
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    /// 서버가 알려준 헤더
    pub header: TransferHeader,

    /// sink에 쓴 바이트 수
    pub bytes_written: u64,

    /// 끝내 받지 못한 시퀀스 (빈 블록으로 대체됨)
    pub missing: Vec<SequenceNumber>,

    /// 서버가 보고한 전송 시간
    pub reported_elapsed: Option<Duration>,

    pub stats: TransferStats,
}

impl ReceiveReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// 수신자
pub struct Receiver {
    config: Config,
}

impl Receiver {
    /// 새 수신자 생성
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 서버에서 파일을 받아 순서대로 sink에 기록
    ///
    /// 헤더를 받지 못하면 `Error::PeerAbsent`, 이 경우 sink에는 아무것도 쓰지 않음
    pub async fn fetch<W>(
        &self,
        socket: &UdpSocket,
        server: SocketAddr,
        sink: &mut W,
    ) -> Result<ReceiveReport>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stats = TransferStats::new();
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        socket.send_to(Request::Udp.token(), server).await?;
        stats.datagrams_sent += 1;

        let header = self.await_header(socket, server, &mut buf, &mut stats).await?;
        let mut buffer = ReassemblyBuffer::for_header(&header, self.config.max_file_size)?;

        // 중복 헤더가 와도 ACK는 한 번만
        socket.send_to(ACK_HEADER, server).await?;
        stats.datagrams_sent += 1;
        stats.total_segments = header.segment_count as u64;

        info!(
            "헤더 수신: total_size={}, segments={}",
            header.total_size, header.segment_count
        );

        self.collect_segments(socket, server, &header, &mut buffer, &mut buf, &mut stats)
            .await?;
        // 처리율은 시간 보고 대기를 제외하고 계산
        stats.finish();

        let mut bytes_written = 0u64;
        for payload in buffer.ordered_payloads() {
            sink.write_all(payload).await?;
            bytes_written += payload.len() as u64;
        }
        sink.flush().await?;

        let missing = buffer.missing();
        if missing.is_empty() {
            info!(
                "파일 재구성 완료: {} bytes ({} 세그먼트)",
                bytes_written,
                buffer.received_count()
            );
        } else {
            warn!(
                "파일 재구성 (누락 {}개): {} bytes, {}/{} 세그먼트",
                missing.len(),
                bytes_written,
                buffer.received_count(),
                buffer.segment_count()
            );
        }

        let reported_elapsed = self
            .await_timing(socket, server, &buffer, &mut buf, &mut stats)
            .await?;

        Ok(ReceiveReport {
            header,
            bytes_written,
            missing,
            reported_elapsed,
            stats,
        })
    }

    /// 헤더 대기 (재요청 없음)
    async fn await_header(
        &self,
        socket: &UdpSocket,
        server: SocketAddr,
        buf: &mut [u8],
        stats: &mut TransferStats,
    ) -> Result<TransferHeader> {
        let deadline = Instant::now() + self.config.request_timeout();

        loop {
            let (len, from) = match timeout_at(deadline, socket.recv_from(buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("헤더 대기 타임아웃: {}", server);
                    return Err(Error::PeerAbsent { addr: server });
                }
            };
            stats.datagrams_received += 1;

            if from != server {
                stats.ignored += 1;
                continue;
            }

            match TransferHeader::from_bytes(&buf[..len]) {
                Some(header) => return Ok(header),
                None => stats.ignored += 1,
            }
        }
    }

    /// 모든 시퀀스가 모이거나 유휴 타임아웃까지 세그먼트 수신
    async fn collect_segments(
        &self,
        socket: &UdpSocket,
        server: SocketAddr,
        header: &TransferHeader,
        buffer: &mut ReassemblyBuffer,
        buf: &mut [u8],
        stats: &mut TransferStats,
    ) -> Result<()> {
        let header_bytes = header.to_bytes();
        // 송신자는 헤더를 최대 max_retries번 보냄 (첫 헤더 포함해서 셈)
        let mut header_copies = 1u32;
        let idle_limit = self.config.transfer_idle_timeout();
        let mut last_activity = Instant::now();

        while !buffer.is_complete() {
            if let Some(limit) = idle_limit {
                if last_activity.elapsed() >= limit {
                    warn!(
                        "송신자 응답 없음 ({:.1}s): {}/{} 세그먼트에서 수신 중단",
                        limit.as_secs_f64(),
                        buffer.received_count(),
                        buffer.segment_count()
                    );
                    break;
                }
            }

            let mut deadline = Instant::now() + self.config.segment_wait();
            if let Some(limit) = idle_limit {
                deadline = deadline.min(last_activity + limit);
            }

            let (len, from) = match timeout_at(deadline, socket.recv_from(buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    stats.timeouts += 1;
                    warn!(
                        "세그먼트 대기 타임아웃: {}/{} 수신",
                        buffer.received_count(),
                        buffer.segment_count()
                    );
                    continue;
                }
            };
            stats.datagrams_received += 1;

            if from != server {
                stats.ignored += 1;
                continue;
            }
            last_activity = Instant::now();

            let datagram = &buf[..len];

            // 첫 세그먼트 전에는 헤더 재전송으로 간주
            // 한도를 넘긴 사본은 헤더와 바이트가 같은 세그먼트 0
            if buffer.received_count() == 0 && datagram == &header_bytes[..] {
                header_copies += 1;
                if header_copies <= self.config.max_retries {
                    stats.ignored += 1;
                    debug!("중복 헤더 무시 ({}번째)", header_copies);
                    continue;
                }
                debug!("헤더와 같은 데이터그램을 세그먼트로 처리");
            }

            let Some(segment) = Segment::from_bytes(datagram) else {
                stats.ignored += 1;
                continue;
            };
            let sequence = segment.sequence;
            let payload_len = segment.payload.len() as u64;

            match buffer.insert(sequence, segment.payload) {
                InsertOutcome::Stored => {
                    stats.completed_segments += 1;
                    stats.total_bytes += payload_len;
                }
                InsertOutcome::Duplicate => {
                    stats.duplicates += 1;
                    debug!("중복 세그먼트: {}", sequence);
                }
                InsertOutcome::OutOfRange => {
                    stats.ignored += 1;
                    warn!(
                        "범위 밖 시퀀스: {} (segment_count={})",
                        sequence,
                        buffer.segment_count()
                    );
                }
            }

            // 송신자가 이전 ACK를 못 받았을 수 있으므로 항상 ACK
            socket.send_to(&Ack::Segment(sequence).to_bytes(), server).await?;
            stats.datagrams_sent += 1;
        }

        Ok(())
    }

    /// 최종 시간 보고 대기 (없어도 실패 아님)
    ///
    /// 마지막 ACK를 잃은 송신자의 재전송은 다시 ACK
    async fn await_timing(
        &self,
        socket: &UdpSocket,
        server: SocketAddr,
        buffer: &ReassemblyBuffer,
        buf: &mut [u8],
        stats: &mut TransferStats,
    ) -> Result<Option<Duration>> {
        let deadline = Instant::now() + self.config.timing_timeout();
        // 저장된 세그먼트와 같은 8바이트 데이터그램은 시간 보고일 수도 있음
        let mut fallback: Option<TimingReport> = None;

        loop {
            let (len, from) = match timeout_at(deadline, socket.recv_from(buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    if let Some(report) = fallback {
                        debug!("재전송으로 처리했던 데이터그램을 시간 보고로 사용");
                        return Ok(report.elapsed());
                    }
                    warn!("시간 보고 없음 (타임아웃)");
                    return Ok(None);
                }
            };
            stats.datagrams_received += 1;

            if from != server {
                stats.ignored += 1;
                continue;
            }

            let datagram = &buf[..len];
            if let Some(segment) = Segment::from_bytes(datagram) {
                if buffer.get(segment.sequence) == Some(&segment.payload) {
                    if len == TIMING_LEN {
                        fallback = TimingReport::from_bytes(datagram);
                    }
                    stats.duplicates += 1;
                    socket
                        .send_to(&Ack::Segment(segment.sequence).to_bytes(), server)
                        .await?;
                    stats.datagrams_sent += 1;
                    continue;
                }
            }

            match TimingReport::from_bytes(datagram) {
                Some(report) => {
                    let elapsed = report.elapsed();
                    if elapsed.is_none() {
                        warn!("유효하지 않은 시간 보고: {}", report.elapsed_secs);
                    }
                    return Ok(elapsed);
                }
                None => stats.ignored += 1,
            }
        }
    }
}
