//! xferbench 클라이언트 - 파일 수신 및 전송 시간 출력
//!
//! 사용법:
//!   cargo run --release --bin xferbench-client -- --server <HOST> --proto <tcp|udp> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin xferbench-client -- --server 127.0.0.1 --proto udp

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::BufWriter;
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xferbench::{fetch_stream, Config, Receiver, DEFAULT_PORT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    fn default_output(self) -> &'static str {
        match self {
            Protocol::Tcp => "received_tcp.mp4",
            Protocol::Udp => "received_udp.mp4",
        }
    }
}

/// 클라이언트 설정
struct ClientArgs {
    server: Option<String>,
    port: u16,
    protocol: Option<Protocol>,
    output: Option<PathBuf>,
    config: Config,
}

impl Default for ClientArgs {
    fn default() -> Self {
        Self {
            server: None,
            port: DEFAULT_PORT,
            protocol: None,
            output: None,
            config: Config::default(),
        }
    }
}

const HELP: &str = r#"xferbench 클라이언트 - TCP/UDP 파일 수신

사용법:
  cargo run --release --bin xferbench-client -- --server <HOST> --proto <tcp|udp> [OPTIONS]

옵션:
  -s, --server <HOST>         서버 주소 (필수)
  -p, --port <PORT>           서버 포트 (기본: 9000)
  --proto <tcp|udp>           전송 프로토콜 (필수)
  -o, --output <PATH>         저장 경로 (기본: received_tcp.mp4 / received_udp.mp4)
  --request-timeout-ms <MS>   첫 응답 대기 타임아웃 (기본: 5000)
  --idle-timeout-ms <MS>      UDP 수신 유휴 타임아웃, 0이면 무제한 (기본: 30000)
  --retries <N>               서버의 UDP 재전송 한도, 서버와 같게 설정 (기본: 8)
  -h, --help                  이 도움말 출력

환경 변수:
  RUST_LOG                    로그 레벨 (기본: info)
"#;

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 옵션에 값이 필요함", flag))
}

fn parse_protocol(value: &str) -> Result<Protocol, String> {
    match value.to_ascii_lowercase().as_str() {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        other => Err(format!("알 수 없는 프로토콜: {} (tcp 또는 udp)", other)),
    }
}

fn parse_args() -> Result<ClientArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut client_args = ClientArgs::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--server" | "-s" => {
                client_args.server = Some(next_value(&args, &mut i, flag)?.to_string())
            }
            "--port" | "-p" => client_args.port = next_value(&args, &mut i, flag)?.parse()?,
            "--proto" => client_args.protocol = Some(parse_protocol(next_value(&args, &mut i, flag)?)?),
            "--output" | "-o" => {
                client_args.output = Some(PathBuf::from(next_value(&args, &mut i, flag)?))
            }
            "--request-timeout-ms" => {
                client_args.config.request_timeout_ms = next_value(&args, &mut i, flag)?.parse()?
            }
            "--idle-timeout-ms" => {
                client_args.config.transfer_idle_timeout_ms =
                    next_value(&args, &mut i, flag)?.parse()?
            }
            "--retries" => {
                client_args.config.max_retries = next_value(&args, &mut i, flag)?.parse()?
            }
            "--help" | "-h" => {
                println!("{}", HELP);
                std::process::exit(0);
            }
            other => warn!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    Ok(client_args)
}

/// 호스트 이름 해석 (첫 번째 주소 사용)
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| format!("주소를 찾을 수 없음: {}:{}", host, port).into())
}

async fn receive_udp(
    config: Config,
    server: SocketAddr,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr: SocketAddr = if server.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    info!("UDP socket bound to {}", socket.local_addr()?);

    let receiver = Receiver::new(config);
    match receiver.config().transfer_idle_timeout() {
        Some(limit) => info!("Idle timeout: {:.1}s", limit.as_secs_f64()),
        None => info!("Idle timeout: disabled"),
    }
    let mut file = BufWriter::new(tokio::fs::File::create(output).await?);

    let report = match receiver.fetch(&socket, server, &mut file).await {
        Ok(report) => report,
        Err(e) => {
            // 실패한 수신은 파일을 남기지 않음
            drop(file);
            let _ = tokio::fs::remove_file(output).await;
            return Err(e.into());
        }
    };

    info!(
        "Received {} / {} bytes ({} segments) -> {:?}",
        report.bytes_written, report.header.total_size, report.header.segment_count, output
    );
    // 시간 보고 대기 전까지의 클라이언트 측 수치
    info!("{}", report.stats.summary());

    if !report.is_complete() {
        warn!(
            "Incomplete transfer: {} missing segments {:?}",
            report.missing.len(),
            report.missing
        );
    }

    match report.reported_elapsed {
        Some(elapsed) => info!("UDP transfer time: {:.6}s", elapsed.as_secs_f64()),
        None => warn!("UDP transfer time: not reported"),
    }

    Ok(())
}

async fn receive_tcp(
    config: Config,
    server: SocketAddr,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = BufWriter::new(tokio::fs::File::create(output).await?);
    let report = fetch_stream(&config, server, &mut file).await?;

    info!(
        "Received {} / {} bytes -> {:?}",
        report.bytes_received, report.expected_len, output
    );
    if !report.is_complete() {
        warn!("Connection closed early");
    }

    match report.reported_elapsed {
        Some(elapsed) => info!("TCP transfer time: {:.6}s", elapsed.as_secs_f64()),
        None => warn!("TCP transfer time: not reported"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client_args = parse_args()?;
    let Some(host) = client_args.server.as_deref() else {
        eprintln!("{}", HELP);
        return Err("--server 옵션이 필요함".into());
    };
    let Some(protocol) = client_args.protocol else {
        eprintln!("{}", HELP);
        return Err("--proto 옵션이 필요함 (tcp 또는 udp)".into());
    };
    client_args.config.validate()?;

    let server = resolve(host, client_args.port).await?;
    let output = client_args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(protocol.default_output()));

    info!("Fetching from {} via {:?}", server, protocol);

    match protocol {
        Protocol::Udp => receive_udp(client_args.config, server, &output).await,
        Protocol::Tcp => receive_tcp(client_args.config, server, &output).await,
    }
}
