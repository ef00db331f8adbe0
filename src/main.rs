//! bitfetch - Main entry point

use std::path::Path;

use anyhow::{Context, Result};
use bitfetch::{
    decode_all, AnnounceRequest, CliArgs, Command, Config, DownloadCoordinator, FileOutput, Handshake, HttpTracker,
    MetadataParser, OutputWriter, PeerAddress, PeerConnection, PeerSession, ProgressDisplay, Torrent, TorrentError, TrackerClient,
};
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at an unknown location"),
        }

        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

/// Initialize logging on stderr; stdout carries command output only
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    match args.command {
        Command::Decode { value } => {
            let decoded = decode_all(value.as_bytes()).context("Failed to decode bencoded value")?;
            println!("{}", decoded.to_json());
        }
        Command::Info { torrent, json } => {
            let torrent = load_torrent(&torrent)?;
            if json {
                println!("{}", serde_json::to_string(&torrent)?);
            } else {
                print_info(&torrent);
            }
        }
        Command::Peers { torrent } => {
            let torrent = load_torrent(&torrent)?;
            for peer in discover_peers(&torrent, Handshake::generate_peer_id(), &config).await? {
                println!("{}", peer);
            }
        }
        Command::Handshake { torrent, peer } => {
            let torrent = load_torrent(&torrent)?;
            let remote = handshake(&torrent, peer, &config).await?;
            println!("Peer ID: {}", hex::encode(remote.peer_id));
        }
        Command::DownloadPiece { output, torrent: path, index } => {
            let torrent = load_torrent(&path)?;
            let num_pieces = torrent.metadata.num_pieces();
            if index as usize >= num_pieces {
                return Err(TorrentError::config_error_with_field(
                    format!("piece index {} out of range, torrent has {} pieces", index, num_pieces),
                    "index",
                )
                .into());
            }

            let peer_id = Handshake::generate_peer_id();
            let peers = discover_peers(&torrent, peer_id, &config).await?;
            let coordinator = DownloadCoordinator::new(peers, torrent.info_hash, peer_id, &config);
            let piece = coordinator
                .download_piece(&torrent.metadata, index as usize)
                .await
                .with_context(|| format!("Failed to download piece {}", index))?;

            FileOutput::new(&output).write_all(&piece).await.context("Failed to write piece")?;
            println!("Piece {} downloaded to {}.", index, output.display());
        }
        Command::Download { output, torrent: path } => {
            let torrent = load_torrent(&path)?;
            let peer_id = Handshake::generate_peer_id();
            let peers = discover_peers(&torrent, peer_id, &config).await?;
            let coordinator = DownloadCoordinator::new(peers, torrent.info_hash, peer_id, &config);

            let mut progress = ProgressDisplay::new(torrent.metadata.num_pieces(), config.is_quiet());
            let (data, stats) = coordinator
                .download_all(&torrent.metadata, |piece| progress.piece_verified(piece.index, piece.data.len()))
                .await
                .context("Download failed")?;
            progress.finish();
            debug!("Download stats: {:?}", stats);

            let mut out = FileOutput::new(&output);
            out.write_all(&data).await.context("Failed to write output file")?;
            println!("Downloaded {} to {}.", path.display(), out.describe());
        }
    }

    Ok(())
}

fn load_torrent(path: &Path) -> Result<Torrent> {
    MetadataParser::load(path).with_context(|| format!("Failed to load torrent file {}", path.display()))
}

fn print_info(torrent: &Torrent) {
    let meta = &torrent.metadata;
    println!("Tracker URL: {}", meta.announce);
    println!("Length: {}", meta.length);
    println!("Info Hash: {}", torrent.info_hash_hex());
    println!("Piece Length: {}", meta.piece_length);
    println!("Piece Hashes:");
    for hash in meta.piece_hashes_hex() {
        println!("{}", hash);
    }
}

/// Announce to the torrent's tracker and return its peer list
async fn discover_peers(torrent: &Torrent, peer_id: [u8; 20], config: &Config) -> Result<Vec<PeerAddress>> {
    let tracker = HttpTracker::new()?;
    let request = AnnounceRequest::new(torrent.info_hash, peer_id, torrent.metadata.length).with_port(config.listen_port);
    let response = tracker
        .announce(&torrent.metadata.announce, &request)
        .await
        .context("Tracker announce failed")?;

    info!("Tracker returned {} peers", response.peers.len());
    Ok(response.peers)
}

async fn handshake(torrent: &Torrent, peer: PeerAddress, config: &Config) -> Result<Handshake> {
    let session = PeerSession::new(torrent.info_hash, Handshake::generate_peer_id(), Vec::new())
        .with_handshake_verification(config.verify_handshake);
    let connection = PeerConnection::connect(peer, session, config.peer_timeout)
        .await
        .with_context(|| format!("Failed to connect to {}", peer))?;
    let remote = connection
        .handshake()
        .await
        .with_context(|| format!("Handshake with {} failed", peer))?;
    Ok(remote)
}
