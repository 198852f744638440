//! A synthetic stand-in for the exchange's multicast lines.
//!
//! Sends KRX-shaped datagrams to every configured channel so the receiver and
//! the log saver can be exercised without an exchange connection. Headers are
//! realistic enough to be classified; bodies are random.

use anyhow::{Context, Result};
use clap::Parser;
use feed_core::args::CommonArgs;
use feed_core::classifier::{load_prefixes, IssuePrefix, DEFAULT_TR_CODES};
use feed_core::config::{ChannelConfig, FeedConfig};
use feed_core::model::FeedKind;
use feed_core::signal::shutdown_signal;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Exchange end-of-message marker.
const ETX: u8 = 0xFF;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct DummyArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Datagrams per second, across all channels
    #[arg(long, default_value_t = 200)]
    rate: u32,

    /// Interface to send from (defaults to receiver.interface in the config)
    #[arg(long)]
    interface: Option<Ipv4Addr>,

    /// Multicast TTL
    #[arg(long, default_value_t = 1)]
    ttl: u32,

    /// Share of datagrams sent with an unknown TR code
    #[arg(long, default_value_t = 0.01)]
    junk_ratio: f64,
}

/// Random packet generator.
struct SyntheticFeed {
    tr_codes: Vec<String>,
    stock_futures: Vec<IssuePrefix>,
    stock_options: Vec<IssuePrefix>,
    junk_ratio: f64,
}

impl SyntheticFeed {
    /// Takes the stock prefixes from the classifier section, files included.
    fn new(config: &FeedConfig, junk_ratio: f64) -> Result<Self> {
        let classifier = &config.classifier;
        let tr_codes = if classifier.tr_codes.is_empty() {
            DEFAULT_TR_CODES.iter().map(|c| c.to_string()).collect()
        } else {
            classifier.tr_codes.clone()
        };
        Ok(Self {
            tr_codes,
            stock_futures: load_prefixes(
                &classifier.stock_futures_prefixes,
                classifier.stock_futures_prefix_file.as_deref(),
            )?,
            stock_options: load_prefixes(
                &classifier.stock_options_prefixes,
                classifier.stock_options_prefix_file.as_deref(),
            )?,
            junk_ratio,
        })
    }

    /// Builds one datagram: TR code, header filler, ISIN, random body, ETX.
    fn next_packet(&self, kind: FeedKind, seq: u64) -> Vec<u8> {
        let mut rng = rand::thread_rng();

        let tr_code = if rng.gen_bool(self.junk_ratio.clamp(0.0, 1.0)) {
            "Z999F"
        } else {
            self.tr_codes
                .choose(&mut rng)
                .map(String::as_str)
                .unwrap_or("A301F")
        };

        let stock_prefixes = match kind {
            FeedKind::Futures => &self.stock_futures,
            FeedKind::Call | FeedKind::Put => &self.stock_options,
        };
        let prefix: &[u8] = match stock_prefixes.choose(&mut rng) {
            Some(stock) if rng.gen_bool(0.5) => stock.as_slice(),
            _ => index_prefix(kind),
        };

        let mut data = Vec::with_capacity(256);
        data.extend_from_slice(tr_code.as_bytes());
        data.extend_from_slice(format!("{:012}", seq % 1_000_000_000_000).as_bytes());
        data.extend_from_slice(prefix);
        for _ in 0..6 {
            data.push(rng.sample(rand::distributions::Alphanumeric).to_ascii_uppercase());
        }
        let body_len = rng.gen_range(40..400);
        for _ in 0..body_len {
            data.push(b'0' + rng.gen_range(0..10));
        }
        data.push(ETX);
        data
    }
}

fn index_prefix(kind: FeedKind) -> &'static [u8] {
    match kind {
        FeedKind::Futures => b"KR4101",
        FeedKind::Call => b"KR4201",
        FeedKind::Put => b"KR4301",
    }
}

fn open_sender(interface: Ipv4Addr, ttl: u32) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_ttl_v4(ttl)?;
    socket.set_multicast_loop_v4(true)?;
    Ok(socket.into())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. Configuration
    let args = DummyArgs::parse();
    let config = FeedConfig::load(&args.common.get_config_path())?;
    let interface = args
        .interface
        .or(config.receiver.interface)
        .unwrap_or(Ipv4Addr::UNSPECIFIED);
    let channels: Vec<ChannelConfig> = config.channels();
    let feed = SyntheticFeed::new(&config, args.junk_ratio).context("Failed to load issue prefixes")?;

    // 2. Sender socket
    let socket = open_sender(interface, args.ttl).context("Failed to open the multicast sender")?;
    info!(
        "Sending {} datagrams/s to {} channels via {}",
        args.rate,
        channels.len(),
        interface
    );

    // 3. Send until asked to stop
    let period = Duration::from_secs_f64(1.0 / f64::from(args.rate.max(1)));
    let mut ticker = tokio::time::interval(period);
    let signal = shutdown_signal();
    tokio::pin!(signal);

    let mut seq: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut signal => break,
            _ = ticker.tick() => {
                let Some(channel) = channels.choose(&mut rand::thread_rng()) else {
                    warn!("No channels configured");
                    break;
                };
                seq += 1;
                let data = feed.next_packet(channel.kind, seq);
                let target = SocketAddrV4::new(channel.group, channel.port);
                if let Err(e) = socket.send_to(&data, target) {
                    warn!("Send to {} failed: {}", channel.name, e);
                }
            }
        }
    }

    info!("Sent {} datagrams", seq);
    Ok(())
}
