//! 에러 타입 정의

use std::net::SocketAddr;

use thiserror::Error;

/// xferbench 에러 타입
///
/// 재전송 한도 초과는 에러가 아니라 [`crate::sender::SessionOutcome`]으로 보고됨
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("서버 응답 없음: {addr}")]
    PeerAbsent { addr: SocketAddr },

    #[error("유효하지 않은 헤더: total_size={total_size}, segment_count={segment_count}")]
    InvalidHeader { total_size: u64, segment_count: u32 },

    #[error("페이로드 크기 초과: {size} bytes (최대 {max_size})")]
    PayloadTooLarge { size: u64, max_size: u64 },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("재조립 버퍼 할당 실패: segment_count={segment_count}")]
    BufferAllocation { segment_count: u32 },

    #[error("알 수 없는 요청")]
    UnexpectedRequest,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
