use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use osnma_rx::{
    merkle_tree::MerkleTreeFile,
    storage::FullStorage,
    transport::{AsciiReader, RawPage, SbfReader, Source},
    Engine, EngineConfig, Event, PublicKey, Subscriber, Validated,
};
use spki::DecodePublicKey;
use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_KROOT_CACHE: &str = "kroot-cache.hex";
const SERIAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Galileo OSNMA receiver.
///
/// Reads I/NAV pages from the input source, runs the OSNMA
/// authentication engine on them, and prints one event per line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input source: a file path, file:PATH, serial:DEVICE:BAUDRATE or
    /// net:HOST:PORT. Standard input when absent.
    #[arg(short = 'i', long)]
    input: Option<String>,
    /// Input protocol.
    #[arg(short = 'p', long, value_enum, default_value_t = Protocol::Sbf)]
    protocol: Protocol,
    /// Path to the ECDSA public key in PEM format.
    #[arg(short = 'k', long)]
    pubkey: Option<String>,
    /// ID of the public key given with -k.
    #[arg(long, default_value_t = 0)]
    pkid: u8,
    /// Path to the root key hot-start file (hex NMA header plus
    /// DSM-KROOT).
    #[arg(short = 'r', long)]
    root_key: Option<String>,
    /// Path to the Merkle tree file with the pinned root and optionally
    /// a pinned public key.
    #[arg(short = 'm', long)]
    merkle_tree: Option<String>,
    /// Process sub-frames with missing pages instead of dropping them.
    #[arg(short = 'g', long)]
    allow_gaps: bool,
    /// Save a verified DSM-KROOT for later hot starts (to the -r path,
    /// or kroot-cache.hex).
    #[arg(short = 's', long)]
    save_kroot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Protocol {
    /// Septentrio Binary Format (GALRawINAV blocks).
    Sbf,
    /// One hex-encoded page per line.
    Ascii,
}

struct StdoutReporter;

impl Subscriber for StdoutReporter {
    fn handle(&mut self, event: &Event) -> Result<(), Box<dyn std::error::Error>> {
        println!("{event}");
        Ok(())
    }
}

fn load_pubkey(path: &str, pkid: u8) -> Result<PublicKey<Validated>> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read public key file {path}"))?;
    if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(&pem) {
        return Ok(PublicKey::from_p256(key, pkid).force_valid());
    }
    let key = ecdsa::VerifyingKey::<p521::NistP521>::from_public_key_pem(&pem)
        .map(p521::ecdsa::VerifyingKey::from)
        .map_err(|e| anyhow!("cannot parse public key {path}: {e}"))?;
    Ok(PublicKey::from_p521(key, pkid).force_valid())
}

fn open_source(source: &Source) -> Result<Box<dyn Read>> {
    Ok(match source {
        Source::Stdin => Box::new(io::stdin()),
        Source::File(path) => Box::new(
            std::fs::File::open(path).with_context(|| format!("cannot open file {path}"))?,
        ),
        Source::Serial { device, baud } => Box::new(
            serialport::new(device, *baud)
                .timeout(SERIAL_TIMEOUT)
                .open()
                .with_context(|| format!("cannot open serial device {device}"))?,
        ),
        Source::Net { host, port } => Box::new(
            TcpStream::connect((host.as_str(), *port))
                .with_context(|| format!("cannot connect to {host}:{port}"))?,
        ),
    })
}

enum PageReader {
    Sbf(SbfReader<Box<dyn Read>>),
    Ascii(AsciiReader<Box<dyn Read>>),
}

impl PageReader {
    fn read_page(&mut self) -> io::Result<Option<RawPage>> {
        match self {
            PageReader::Sbf(reader) => reader.read_page(),
            PageReader::Ascii(reader) => reader.read_page(),
        }
    }
}

fn hot_start(engine: &mut Engine<FullStorage>, path: &str) {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("cannot read root key file {path}: {e}");
            return;
        }
    };
    match hex::decode(text.trim()) {
        Ok(artifact) => {
            if engine.hot_start(&artifact) {
                log::info!("hot start from cached KROOT succeeded");
            } else {
                log::warn!("cached KROOT rejected; waiting for the live broadcast");
            }
        }
        Err(e) => log::warn!("cannot decode root key file {path}: {e}"),
    }
}

fn save_kroot(engine: &Engine<FullStorage>, path: &str, saved: &mut Option<Vec<u8>>) {
    let Some(cache) = engine.kroot_cache() else {
        return;
    };
    if saved.as_deref() == Some(cache) {
        return;
    }
    let mut text = hex::encode(cache);
    text.push('\n');
    match std::fs::write(path, text) {
        Ok(()) => {
            log::info!("saved verified KROOT to {path}");
            *saved = Some(cache.to_vec());
        }
        Err(e) => log::error!("cannot write KROOT cache to {path}: {e}"),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let merkle = match &args.merkle_tree {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read Merkle tree file {path}"))?;
            Some(
                MerkleTreeFile::parse(&text)
                    .map_err(|e| anyhow!("cannot parse Merkle tree file {path}: {e}"))?,
            )
        }
        None => None,
    };
    let pubkey = match &args.pubkey {
        Some(path) => Some(load_pubkey(path, args.pkid)?),
        None => merkle.as_ref().and_then(|m| m.pinned_key().cloned()),
    };
    if pubkey.is_none() && merkle.is_none() {
        bail!("at least either a public key or a Merkle tree file must be given");
    }

    let mut engine: Engine<FullStorage> = Engine::new(EngineConfig {
        merkle_root: merkle.as_ref().map(|m| m.root()),
        pubkey,
        allow_gaps: args.allow_gaps,
    });
    engine.subscribe(Box::new(StdoutReporter));

    if let Some(path) = &args.root_key {
        hot_start(&mut engine, path);
    }

    let source = Source::parse(args.input.as_deref())
        .map_err(|e| anyhow!("invalid input source: {e}"))?;
    let read = open_source(&source)?;
    let mut reader = match args.protocol {
        Protocol::Sbf => PageReader::Sbf(SbfReader::new(read)),
        Protocol::Ascii => PageReader::Ascii(AsciiReader::new(read)),
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("cannot install signal handler")?;
    }

    let kroot_path = args
        .root_key
        .clone()
        .unwrap_or_else(|| DEFAULT_KROOT_CACHE.to_string());
    let mut saved = None;
    while !stop.load(Ordering::SeqCst) {
        let page = match reader.read_page() {
            Ok(Some(page)) => page,
            Ok(None) => {
                log::info!("end of input stream");
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("error reading input source"),
        };
        engine.feed_page(page.svn, page.gst, &page.page, page.band);
        if args.save_kroot {
            save_kroot(&engine, &kroot_path, &mut saved);
        }
    }
    Ok(())
}
