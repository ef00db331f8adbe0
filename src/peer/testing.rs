//! Scripted peers for connection and coordinator tests

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::peer::PeerAddress;
use crate::protocol::{Handshake, Message, HANDSHAKE_LEN};

pub(crate) const REMOTE_PEER_ID: [u8; 20] = *b"-FAKE01-remotepeer01";

/// A seeder that answers requests from an in-memory copy of the pieces
#[derive(Debug, Clone)]
pub(crate) struct FakePeer {
    info_hash: [u8; 20],
    pieces: Arc<Vec<Vec<u8>>>,
    corrupt: Option<u32>,
    silent: bool,
    requests: Arc<Mutex<Vec<u32>>>,
}

impl FakePeer {
    pub fn new(info_hash: [u8; 20], pieces: Vec<Vec<u8>>) -> Self {
        Self {
            info_hash,
            pieces: Arc::new(pieces),
            corrupt: None,
            silent: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve flipped bytes for this piece
    pub fn corrupt_piece(mut self, index: u32) -> Self {
        self.corrupt = Some(index);
        self
    }

    /// Accept the connection and never send anything
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Piece index of every block request received so far
    pub fn requested_pieces(&self) -> Vec<u32> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn serve<S: AsyncRead + AsyncWrite + Unpin>(&self, mut stream: S) {
        if self.silent {
            let mut sink = [0u8; 1024];
            while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
            return;
        }

        let mut handshake = [0u8; HANDSHAKE_LEN];
        if stream.read_exact(&mut handshake).await.is_err() {
            return;
        }

        let mut out = Handshake::new(self.info_hash, REMOTE_PEER_ID).serialize();
        Message::Bitfield { bitfield: Bytes::from(vec![0xff; self.pieces.len().div_ceil(8)]) }.encode(&mut out);
        if stream.write_all(&out).await.is_err() {
            return;
        }

        loop {
            let mut prefix = [0u8; 4];
            if stream.read_exact(&mut prefix).await.is_err() {
                return;
            }
            let mut body = vec![0u8; u32::from_be_bytes(prefix) as usize];
            if stream.read_exact(&mut body).await.is_err() {
                return;
            }

            let reply = match Message::decode(Bytes::from(body)) {
                Ok(Message::Interested) => Message::Unchoke,
                Ok(Message::Request { index, begin, length }) => {
                    self.requests.lock().unwrap().push(index);
                    let Some(piece) = self.pieces.get(index as usize) else {
                        return;
                    };
                    let mut block = piece[begin as usize..(begin + length) as usize].to_vec();
                    if self.corrupt == Some(index) && begin == 0 {
                        block[0] ^= 0xff;
                    }
                    Message::Piece { index, begin, block: Bytes::from(block) }
                }
                Ok(_) => continue,
                Err(_) => return,
            };

            let mut out = BytesMut::new();
            reply.encode(&mut out);
            if stream.write_all(&out).await.is_err() {
                return;
            }
        }
    }

    /// Serve every connection accepted on a fresh loopback port
    pub async fn listen(self) -> PeerAddress {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = loopback_addr(listener.local_addr().unwrap());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let peer = self.clone();
                tokio::spawn(async move { peer.serve(stream).await });
            }
        });
        addr
    }
}

/// An address nothing listens on
pub(crate) async fn closed_port() -> PeerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    loopback_addr(listener.local_addr().unwrap())
}

fn loopback_addr(addr: SocketAddr) -> PeerAddress {
    match addr {
        SocketAddr::V4(v4) => PeerAddress::from(v4),
        SocketAddr::V6(_) => panic!("expected an IPv4 listener"),
    }
}
