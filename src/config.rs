//! 전송 설정

use std::time::Duration;

use crate::message::MAX_PAYLOAD_LEN;
use crate::{Error, Result, DEFAULT_CHUNK_SIZE};

/// 송신자/수신자 공용 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 세그먼트 페이로드 크기 (바이트, 최대 4096)
    pub chunk_size: usize,

    /// 헤더/세그먼트 ACK 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 헤더 또는 세그먼트 하나당 최대 전송 횟수
    pub max_retries: u32,

    /// 요청 후 헤더 대기 타임아웃 (밀리초, 재시도 없음)
    pub request_timeout_ms: u64,

    /// 수신측 데이터그램 하나당 대기 타임아웃 (밀리초)
    pub segment_wait_ms: u64,

    /// 수신측 전체 유휴 타임아웃 (밀리초)
    /// 0이면 송신자가 재전송하는 한 무한히 대기
    pub transfer_idle_timeout_ms: u64,

    /// 최종 시간 보고 대기 타임아웃 (밀리초)
    pub timing_timeout_ms: u64,

    /// 수신측이 허용하는 최대 파일 크기
    pub max_file_size: u64,

    /// TCP 경로 쓰기 단위 (바이트)
    pub stream_chunk_size: usize,

    /// UDP 수신 버퍼 크기
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            ack_timeout_ms: 500,              // 500ms
            max_retries: 8,
            request_timeout_ms: 5000,         // 5초
            segment_wait_ms: 5000,            // 5초
            transfer_idle_timeout_ms: 30_000, // 30초
            timing_timeout_ms: 2000,          // 2초
            max_file_size: 4 * 1024 * 1024 * 1024, // 4GB
            stream_chunk_size: 64 * 1024,     // 64KB
            recv_buffer_size: 64 * 1024,      // 64KB
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidConfig(format!(
                "chunk_size는 1..={} 범위여야 함: {}",
                MAX_PAYLOAD_LEN, self.chunk_size
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries는 1 이상이어야 함".into()));
        }
        if self.stream_chunk_size == 0 {
            return Err(Error::InvalidConfig("stream_chunk_size는 0일 수 없음".into()));
        }
        // 가장 큰 세그먼트 데이터그램을 온전히 받을 수 있어야 함
        if self.recv_buffer_size < MAX_PAYLOAD_LEN + 4 {
            return Err(Error::InvalidConfig(format!(
                "recv_buffer_size가 너무 작음: {}",
                self.recv_buffer_size
            )));
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn segment_wait(&self) -> Duration {
        Duration::from_millis(self.segment_wait_ms)
    }

    /// 유휴 타임아웃 (비활성화 시 None)
    pub fn transfer_idle_timeout(&self) -> Option<Duration> {
        match self.transfer_idle_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn timing_timeout(&self) -> Duration {
        Duration::from_millis(self.timing_timeout_ms)
    }

    /// 로컬 네트워크용 설정 (짧은 타임아웃)
    pub fn lan() -> Self {
        Self {
            ack_timeout_ms: 50,
            max_retries: 10,
            request_timeout_ms: 2000,
            segment_wait_ms: 1000,
            transfer_idle_timeout_ms: 10_000,
            timing_timeout_ms: 1000,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            ack_timeout_ms: 1000,
            max_retries: 20,
            request_timeout_ms: 10_000,
            segment_wait_ms: 5000,
            transfer_idle_timeout_ms: 60_000,
            timing_timeout_ms: 5000,
            ..Self::default()
        }
    }
}
