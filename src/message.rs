//! 와이어 포맷 정의
//!
//! 모든 정수/실수는 네트워크 바이트 순서 (big-endian)
//!
//! | 메시지 | 레이아웃 |
//! |---|---|
//! | 요청 | ASCII `REQUEST UDP` / `REQUEST TCP` |
//! | 헤더 | u64 전체 크기 + u32 세그먼트 수 (12바이트) |
//! | 헤더 ACK | ASCII `ACK_HEADER` |
//! | 세그먼트 | u32 시퀀스 + 최대 4096바이트 페이로드 |
//! | 세그먼트 ACK | u32 시퀀스 |
//! | 시간 보고 | f64 경과 초 |
//!
//! 디코더는 길이만 검사하고, 너무 짧은 데이터그램은 `None` (없는 것으로 취급)

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::chunk::SequenceNumber;

/// UDP 전송 요청 토큰
pub const REQUEST_UDP: &[u8] = b"REQUEST UDP";

/// TCP 전송 요청 토큰
pub const REQUEST_TCP: &[u8] = b"REQUEST TCP";

/// 헤더 ACK 토큰
pub const ACK_HEADER: &[u8] = b"ACK_HEADER";

/// 헤더 길이
pub const HEADER_LEN: usize = 12;

/// 시퀀스 필드 길이
pub const SEQUENCE_LEN: usize = 4;

/// 시간 보고 길이
pub const TIMING_LEN: usize = 8;

/// 세그먼트 최대 페이로드
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// 전송 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHeader {
    /// 전체 파일 크기 (바이트)
    pub total_size: u64,

    /// 세그먼트 수
    pub segment_count: u32,
}

impl TransferHeader {
    pub fn new(total_size: u64, segment_count: u32) -> Self {
        Self {
            total_size,
            segment_count,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        buf.put_u64(self.total_size);
        buf.put_u32(self.segment_count);
        buf.freeze()
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let total_size = bytes.get_u64();
        let segment_count = bytes.get_u32();
        Some(Self::new(total_size, segment_count))
    }
}

/// 세그먼트 (UDP 데이터 단위)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 0부터 시작하는 연속 시퀀스
    pub sequence: SequenceNumber,

    /// 페이로드 (마지막 세그먼트는 더 짧을 수 있음)
    pub payload: Bytes,
}

impl Segment {
    pub fn new(sequence: SequenceNumber, payload: Bytes) -> Self {
        Self { sequence, payload }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SEQUENCE_LEN + self.payload.len());
        buf.put_u32(self.sequence);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SEQUENCE_LEN {
            return None;
        }
        let mut head = &bytes[..SEQUENCE_LEN];
        let sequence = head.get_u32();
        let payload = Bytes::copy_from_slice(&bytes[SEQUENCE_LEN..]);
        Some(Self { sequence, payload })
    }
}

/// 확인 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// 헤더 수신 확인
    Header,

    /// 세그먼트 수신 확인
    Segment(SequenceNumber),
}

impl Ack {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Ack::Header => Bytes::from_static(ACK_HEADER),
            Ack::Segment(sequence) => Bytes::copy_from_slice(&sequence.to_be_bytes()),
        }
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Option<Self> {
        if bytes == ACK_HEADER {
            return Some(Ack::Header);
        }
        if bytes.len() < SEQUENCE_LEN {
            return None;
        }
        Some(Ack::Segment(bytes.get_u32()))
    }
}

/// 최종 시간 보고
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingReport {
    /// 데이터 단계 경과 시간 (초)
    pub elapsed_secs: f64,
}

impl TimingReport {
    pub fn from_elapsed(elapsed: Duration) -> Self {
        Self {
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    pub fn to_bytes(&self) -> [u8; TIMING_LEN] {
        self.elapsed_secs.to_be_bytes()
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TIMING_LEN {
            return None;
        }
        Some(Self {
            elapsed_secs: bytes.get_f64(),
        })
    }

    /// Duration 변환 (음수/NaN/무한대는 None)
    pub fn elapsed(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.elapsed_secs).ok()
    }
}

/// 요청 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Udp,
    Tcp,
}

impl Request {
    pub fn token(&self) -> &'static [u8] {
        match self {
            Request::Udp => REQUEST_UDP,
            Request::Tcp => REQUEST_TCP,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes == REQUEST_UDP {
            Some(Request::Udp)
        } else if bytes == REQUEST_TCP {
            Some(Request::Tcp)
        } else {
            None
        }
    }
}
