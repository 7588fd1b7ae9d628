//! 세그먼트 분할과 재조립
//!
//! - Segmenter: 송신측, 페이로드를 고정 크기 세그먼트로 분할 (zero-copy)
//! - ReassemblyBuffer: 수신측, 시퀀스 인덱스 슬롯 배열

use bytes::{Bytes, BytesMut};

use crate::message::{Segment, TransferHeader, MAX_PAYLOAD_LEN};
use crate::{Error, Result};

/// 세그먼트 시퀀스 번호 (32비트, 0부터 시작)
pub type SequenceNumber = u32;

/// 세그먼트 수 계산: ceil(total_size / chunk_size)
///
/// chunk_size가 0이거나 결과가 u32를 넘으면 None
pub fn segment_count(total_size: u64, chunk_size: usize) -> Option<u32> {
    if chunk_size == 0 {
        return None;
    }
    u32::try_from(total_size.div_ceil(chunk_size as u64)).ok()
}

/// 세그먼트 생성기 (송신측)
#[derive(Debug, Clone)]
pub struct Segmenter {
    chunk_size: usize,
}

impl Segmenter {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 데이터를 헤더와 세그먼트 목록으로 분할
    pub fn split(&self, data: &Bytes) -> Result<(TransferHeader, Vec<Segment>)> {
        let total_size = data.len() as u64;
        let count = segment_count(total_size, self.chunk_size).ok_or(Error::PayloadTooLarge {
            size: total_size,
            max_size: u32::MAX as u64 * self.chunk_size as u64,
        })?;

        let segments = (0..count as usize)
            .map(|idx| {
                let start = idx * self.chunk_size;
                let end = (start + self.chunk_size).min(data.len());
                Segment::new(idx as SequenceNumber, data.slice(start..end))
            })
            .collect();

        Ok((TransferHeader::new(total_size, count), segments))
    }
}

/// 세그먼트 삽입 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 새 세그먼트 저장
    Stored,

    /// 이미 받은 세그먼트
    Duplicate,

    /// segment_count 범위 밖 (저장하지 않음)
    OutOfRange,
}

/// 재조립 버퍼 (수신측)
#[derive(Debug)]
pub struct ReassemblyBuffer {
    slots: Vec<Option<Bytes>>,
    received_count: u32,
    received_bytes: u64,
}

impl ReassemblyBuffer {
    /// segment_count 크기의 슬롯 배열 생성
    ///
    /// 원격에서 받은 값이므로 할당 실패는 에러로 반환
    pub fn new(segment_count: u32) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(segment_count as usize)
            .map_err(|_| Error::BufferAllocation { segment_count })?;
        slots.resize(segment_count as usize, None);

        Ok(Self {
            slots,
            received_count: 0,
            received_bytes: 0,
        })
    }

    /// 헤더 검증 후 버퍼 생성
    pub fn for_header(header: &TransferHeader, max_file_size: u64) -> Result<Self> {
        let invalid = Error::InvalidHeader {
            total_size: header.total_size,
            segment_count: header.segment_count,
        };

        if header.total_size > max_file_size {
            return Err(Error::PayloadTooLarge {
                size: header.total_size,
                max_size: max_file_size,
            });
        }
        // 세그먼트는 최소 1바이트, 최대 MAX_PAYLOAD_LEN
        let count = header.segment_count as u64;
        if count > header.total_size || count * (MAX_PAYLOAD_LEN as u64) < header.total_size {
            return Err(invalid);
        }

        Self::new(header.segment_count)
    }

    /// 세그먼트 삽입
    pub fn insert(&mut self, sequence: SequenceNumber, payload: Bytes) -> InsertOutcome {
        match self.slots.get_mut(sequence as usize) {
            None => InsertOutcome::OutOfRange,
            Some(Some(_)) => InsertOutcome::Duplicate,
            Some(slot) => {
                self.received_bytes += payload.len() as u64;
                *slot = Some(payload);
                self.received_count += 1;
                InsertOutcome::Stored
            }
        }
    }

    /// 저장된 페이로드
    pub fn get(&self, sequence: SequenceNumber) -> Option<&Bytes> {
        self.slots.get(sequence as usize).and_then(Option::as_ref)
    }

    /// 모든 시퀀스 수신 여부
    pub fn is_complete(&self) -> bool {
        self.received_count as usize >= self.slots.len()
    }

    pub fn segment_count(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn received_count(&self) -> u32 {
        self.received_count
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// 누락된 시퀀스 목록
    pub fn missing(&self) -> Vec<SequenceNumber> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(seq, _)| seq as SequenceNumber)
            .collect()
    }

    /// 시퀀스 순서대로 페이로드 순회 (누락된 시퀀스는 빈 블록)
    pub fn ordered_payloads(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.slots
            .iter()
            .map(|slot| slot.as_deref().unwrap_or(&[]))
    }

    /// 연속 바이트로 조립
    pub fn assemble(&self) -> Bytes {
        let mut data = BytesMut::with_capacity(self.received_bytes as usize);
        for payload in self.ordered_payloads() {
            data.extend_from_slice(payload);
        }
        data.freeze()
    }
}
