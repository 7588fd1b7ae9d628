//! 전송할 데이터 원본
//!
//! 워커마다 세션 시작 시 독립적으로 열어 사용 (공유 쓰기 상태 없음)

use std::io::Cursor;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::Result;

/// 스트림 전송용 리더
pub type PayloadReader = Box<dyn AsyncRead + Send + Unpin>;

/// 데이터 원본
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// 디스크 파일
    File(PathBuf),

    /// 메모리 버퍼
    Memory(Bytes),
}

impl PayloadSource {
    /// 테스트용 텍스트 데이터 생성
    pub fn synthetic(len: usize) -> Self {
        let patterns = [
            "The quick brown fox jumps over the lazy dog. ",
            "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ",
            "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 ",
            "Hello, World! This is xferbench test data. ",
        ];

        let mut data = Vec::with_capacity(len + 128);
        let mut line_num = 0u64;
        while data.len() < len {
            let line = format!(
                "[{:08}] {}\n",
                line_num,
                patterns[line_num as usize % patterns.len()]
            );
            data.extend_from_slice(line.as_bytes());
            line_num += 1;
        }
        data.truncate(len);

        PayloadSource::Memory(Bytes::from(data))
    }

    /// 전체 데이터 로드 (UDP 경로, 세션 동안 메모리에 유지)
    pub async fn load(&self) -> Result<Bytes> {
        match self {
            PayloadSource::File(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
            PayloadSource::Memory(data) => Ok(data.clone()),
        }
    }

    /// 길이와 리더 반환 (TCP 경로)
    pub async fn open(&self) -> Result<(u64, PayloadReader)> {
        match self {
            PayloadSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                let len = file.metadata().await?.len();
                let reader: PayloadReader = Box::new(file);
                Ok((len, reader))
            }
            PayloadSource::Memory(data) => {
                let reader: PayloadReader = Box::new(Cursor::new(data.clone()));
                Ok((data.len() as u64, reader))
            }
        }
    }

    /// 원본 크기
    pub async fn size(&self) -> Result<u64> {
        match self {
            PayloadSource::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
            PayloadSource::Memory(data) => Ok(data.len() as u64),
        }
    }
}
