//! 전송 통계

use std::time::{Duration, Instant};

/// 세션 단위 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 종료 시간 (없으면 현재까지)
    pub end_time: Option<Instant>,

    /// 총 세그먼트 수
    pub total_segments: u64,

    /// 완료된 세그먼트 수 (송신측: ACK 확인, 수신측: 저장)
    pub completed_segments: u64,

    /// 완료된 세그먼트의 페이로드 바이트
    pub total_bytes: u64,

    /// 보낸 데이터그램 수
    pub datagrams_sent: u64,

    /// 받은 데이터그램 수
    pub datagrams_received: u64,

    /// 재전송 횟수 (헤더 포함)
    pub retransmissions: u64,

    /// 중복 수신 세그먼트 수
    pub duplicates: u64,

    /// 무시한 데이터그램 수 (불일치 ACK, 짧은 패킷, 다른 주소)
    pub ignored: u64,

    /// 대기 타임아웃 횟수
    pub timeouts: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            total_segments: 0,
            completed_segments: 0,
            total_bytes: 0,
            datagrams_sent: 0,
            datagrams_received: 0,
            retransmissions: 0,
            duplicates: 0,
            ignored: 0,
            timeouts: 0,
        }
    }

    /// 측정 종료, 이후 elapsed/throughput 고정
    pub fn finish(&mut self) {
        self.end_time.get_or_insert_with(Instant::now);
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.saturating_duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율 (보낸 데이터그램 대비)
    pub fn retransmit_ratio(&self) -> f64 {
        if self.datagrams_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.datagrams_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Segments: {}/{} | Bytes: {} | Throughput: {:.2} MB/s | Retransmits: {} ({:.1}%) | Duplicates: {} | Ignored: {} | Timeouts: {}",
            self.elapsed().as_secs_f64(),
            self.completed_segments,
            self.total_segments,
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.retransmissions,
            self.retransmit_ratio() * 100.0,
            self.duplicates,
            self.ignored,
            self.timeouts,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmit_ratio() {
        let mut stats = TransferStats::new();
        assert_eq!(stats.retransmit_ratio(), 0.0);

        stats.datagrams_sent = 10;
        stats.retransmissions = 2;
        assert!((stats.retransmit_ratio() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finish_freezes_elapsed() {
        let mut stats = TransferStats::new();
        stats.total_bytes = 1000;
        std::thread::sleep(Duration::from_millis(10));
        stats.finish();

        let frozen = stats.elapsed();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(stats.elapsed(), frozen);
        assert!(frozen >= Duration::from_millis(10));

        // 두 번째 호출은 종료 시간을 바꾸지 않음
        stats.finish();
        assert_eq!(stats.elapsed(), frozen);
    }

    #[test]
    fn test_summary_mentions_counters() {
        let mut stats = TransferStats::new();
        stats.total_segments = 3;
        stats.completed_segments = 2;
        stats.duplicates = 1;

        let summary = stats.summary();
        assert!(summary.contains("Segments: 2/3"));
        assert!(summary.contains("Duplicates: 1"));
    }
}
