//! # xferbench
//!
//! 단일 서버/단일 클라이언트 간 대용량 파일 전송 시간 측정
//!
//! ## 구성
//! - **UDP 경로**: stop-and-wait ACK, 타임아웃 재전송, 시퀀스 기반 재조립
//! - **TCP 경로**: 길이 헤더 + 원본 바이트 + 경과 시간
//! - **서버**: 두 프로토콜을 같은 포트에서 독립 워커로 동시에 서비스
//!
//! 전송 시간은 서버가 측정해 클라이언트에 보고함

pub mod chunk;
pub mod config;
pub mod error;
pub mod message;
pub mod payload;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod stats;
pub mod stream;

pub use chunk::{InsertOutcome, ReassemblyBuffer, Segmenter, SequenceNumber};
pub use config::Config;
pub use error::{Error, Result};
pub use message::{Ack, Request, Segment, TimingReport, TransferHeader};
pub use payload::PayloadSource;
pub use receiver::{ReceiveReport, Receiver};
pub use sender::{Sender, SessionOutcome, SessionReport};
pub use server::{shutdown_channel, DatagramWorker, Server};
pub use stats::TransferStats;
pub use stream::{fetch_stream, StreamReport, StreamWorker};

/// 기본 세그먼트 페이로드 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 9000;
