//! xferbench 서버 - TCP/UDP 동시 서비스
//!
//! 같은 포트에서 TCP 워커와 UDP(stop-and-wait) 워커를 동시에 실행
//! Ctrl+C로 종료
//!
//! 사용법:
//!   cargo run --release --bin xferbench-server -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin xferbench-server -- --port 9000 --file video.mp4

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xferbench::{shutdown_channel, Config, PayloadSource, Server, DEFAULT_PORT};

/// 서버 설정
struct ServerArgs {
    host: IpAddr,
    port: u16,
    file_path: Option<PathBuf>,
    synthetic_mb: usize,
    config: Config,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            file_path: None,
            synthetic_mb: 16,
            config: Config::default(),
        }
    }
}

const HELP: &str = r#"xferbench 서버 - TCP/UDP 파일 전송 시간 측정

사용법:
  cargo run --release --bin xferbench-server -- [OPTIONS]

옵션:
  --host <IP>             바인드 주소 (기본: 0.0.0.0)
  -p, --port <PORT>       포트, TCP/UDP 공용 (기본: 9000)
  -f, --file <PATH>       전송할 파일 경로
  --size-mb <N>           파일 미지정 시 테스트 데이터 크기 MB (기본: 16)
  --chunk-size <SIZE>     UDP 세그먼트 페이로드 바이트 (기본: 4096, 최대 4096)
  --timeout-ms <MS>       UDP ACK 대기 타임아웃 (기본: 500)
  --retries <N>           UDP 재전송 한도 (기본: 8)
  -h, --help              이 도움말 출력

환경 변수:
  RUST_LOG                로그 레벨 (기본: info)
"#;

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 옵션에 값이 필요함", flag))
}

fn parse_args() -> Result<ServerArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut server_args = ServerArgs::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--host" => server_args.host = next_value(&args, &mut i, flag)?.parse()?,
            "--port" | "-p" => server_args.port = next_value(&args, &mut i, flag)?.parse()?,
            "--file" | "-f" => {
                server_args.file_path = Some(PathBuf::from(next_value(&args, &mut i, flag)?))
            }
            "--size-mb" => server_args.synthetic_mb = next_value(&args, &mut i, flag)?.parse()?,
            "--chunk-size" => {
                server_args.config.chunk_size = next_value(&args, &mut i, flag)?.parse()?
            }
            "--timeout-ms" => {
                server_args.config.ack_timeout_ms = next_value(&args, &mut i, flag)?.parse()?
            }
            "--retries" => {
                server_args.config.max_retries = next_value(&args, &mut i, flag)?.parse()?
            }
            "--help" | "-h" => {
                println!("{}", HELP);
                std::process::exit(0);
            }
            other => warn!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    Ok(server_args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server_args = parse_args()?;
    server_args.config.validate()?;

    let source = match &server_args.file_path {
        Some(path) => {
            info!("Loading file: {:?}", path);
            PayloadSource::File(path.clone())
        }
        None => {
            info!("Using test data ({} MB)", server_args.synthetic_mb);
            PayloadSource::synthetic(server_args.synthetic_mb * 1024 * 1024)
        }
    };
    info!("Payload size: {} bytes", source.size().await?);
    info!("Chunk size: {} bytes", server_args.config.chunk_size);
    info!(
        "ACK timeout: {}ms, max retries: {}",
        server_args.config.ack_timeout_ms, server_args.config.max_retries
    );

    let bind_addr = SocketAddr::new(server_args.host, server_args.port);
    let server = Server::bind(bind_addr, server_args.config, source).await?;
    info!(
        "Dual server (TCP/UDP) listening on {}. Press Ctrl+C to exit.",
        server.local_addr()?
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down..."),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    server.serve(shutdown_rx).await?;
    info!("Servers stopped.");

    Ok(())
}
