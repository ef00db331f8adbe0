//! Peer wire session
//!
//! The session is a sans-I/O state machine for one connection. Bytes read
//! from the socket go in through [`PeerSession::on_data`]; bytes to send come
//! out of [`PeerSession::take_outgoing`] and verified pieces out of
//! [`PeerSession::take_verified`]. The socket itself is driven by
//! [`crate::peer::PeerConnection`].

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::SessionState;
use crate::protocol::{read_exact, read_frame, Handshake, Message, HANDSHAKE_LEN};
use crate::storage::{PieceAssembly, PieceJob};

/// A piece whose SHA-1 matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPiece {
    pub index: u32,
    pub data: Vec<u8>,
}

/// Download state for one peer connection
#[derive(Debug)]
pub struct PeerSession {
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    verify_handshake: bool,
    state: SessionState,
    inbound: BytesMut,
    outbound: BytesMut,
    remote: Option<Handshake>,
    bitfield: Option<Bytes>,
    interested_sent: bool,
    unchoked: bool,
    jobs: VecDeque<PieceJob>,
    current: Option<PieceAssembly>,
    verified: VecDeque<VerifiedPiece>,
}

impl PeerSession {
    /// Create a session that will fetch `jobs` in order
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], jobs: impl IntoIterator<Item = PieceJob>) -> Self {
        Self {
            info_hash,
            peer_id,
            verify_handshake: false,
            state: SessionState::Connecting,
            inbound: BytesMut::with_capacity(32 * 1024),
            outbound: BytesMut::new(),
            remote: None,
            bitfield: None,
            interested_sent: false,
            unchoked: false,
            jobs: jobs.into_iter().collect(),
            current: None,
            verified: VecDeque::new(),
        }
    }

    /// Reject peers whose handshake names another torrent or protocol
    pub fn with_handshake_verification(mut self, verify: bool) -> Self {
        self.verify_handshake = verify;
        self
    }

    /// Queue our handshake; called once the transport is connected
    pub fn start(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        let handshake = Handshake::new(self.info_hash, self.peer_id);
        self.outbound.extend_from_slice(&handshake.serialize());
        self.state = SessionState::Handshaking;
        trace!("Handshake queued");
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The peer's handshake, once received
    pub fn remote_handshake(&self) -> Option<&Handshake> {
        self.remote.as_ref()
    }

    /// The peer's advertised bitfield, if one arrived
    pub fn bitfield(&self) -> Option<&Bytes> {
        self.bitfield.as_ref()
    }

    /// Piece currently being assembled
    pub fn current_piece(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.index())
    }

    /// Block requests sent for the current piece and not yet answered
    pub fn outstanding_requests(&self) -> u32 {
        self.current.as_ref().map_or(0, |p| p.outstanding())
    }

    /// Jobs not yet started
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Feed bytes read from the transport.
    ///
    /// Any error moves the session to [`SessionState::Failed`]. Pieces that
    /// were verified before the error stay available from `take_verified`.
    pub fn on_data(&mut self, data: &[u8]) -> Result<(), TorrentError> {
        if self.state.is_terminal() {
            return Ok(());
        }

        self.inbound.extend_from_slice(data);
        if let Err(e) = self.process() {
            self.state = SessionState::Failed;
            self.current = None;
            return Err(e);
        }
        Ok(())
    }

    /// The transport reached end of stream
    pub fn on_close(&mut self) -> Result<(), TorrentError> {
        if self.state == SessionState::Done {
            return Ok(());
        }
        let state = self.state;
        self.state = SessionState::Failed;
        self.current = None;
        Err(TorrentError::network_error(format!("connection closed by peer while {}", state)))
    }

    /// Bytes waiting to be written to the transport
    pub fn take_outgoing(&mut self) -> Option<Bytes> {
        if self.outbound.is_empty() {
            None
        } else {
            Some(self.outbound.split().freeze())
        }
    }

    /// Next verified piece, in the order they completed
    pub fn take_verified(&mut self) -> Option<VerifiedPiece> {
        self.verified.pop_front()
    }

    fn process(&mut self) -> Result<(), TorrentError> {
        loop {
            match self.state {
                SessionState::Connecting => {
                    return Err(TorrentError::protocol_error("data received before our handshake was sent"));
                }
                SessionState::Handshaking => {
                    let Some(raw) = read_exact(&mut self.inbound, HANDSHAKE_LEN) else {
                        return Ok(());
                    };
                    self.on_handshake(&raw)?;
                }
                SessionState::Done | SessionState::Failed => return Ok(()),
                _ => {
                    let Some(frame) = read_frame(&mut self.inbound)? else {
                        return Ok(());
                    };
                    let message = Message::decode(frame)?;
                    self.on_message(message)?;
                }
            }
        }
    }

    fn on_handshake(&mut self, raw: &[u8]) -> Result<(), TorrentError> {
        let handshake = Handshake::from_bytes(raw)?;
        if let Err(e) = handshake.validate(&self.info_hash) {
            if self.verify_handshake {
                return Err(e);
            }
            warn!("Accepting handshake despite mismatch: {}", e);
        }

        debug!("Handshake received, peer id {}", hex::encode(handshake.peer_id));
        self.remote = Some(handshake);
        self.state = SessionState::AwaitingBitfield;
        Ok(())
    }

    fn on_message(&mut self, message: Message) -> Result<(), TorrentError> {
        match message {
            Message::KeepAlive => trace!("Keep-alive"),
            Message::Bitfield { bitfield } => {
                trace!("Bitfield received ({} bytes)", bitfield.len());
                self.bitfield = Some(bitfield);
                if !self.interested_sent {
                    Message::Interested.encode(&mut self.outbound);
                    self.interested_sent = true;
                    if self.state == SessionState::AwaitingBitfield {
                        self.state = SessionState::Interested;
                    }
                }
            }
            Message::Unchoke => {
                if self.unchoked {
                    trace!("Repeated unchoke ignored");
                    return Ok(());
                }
                debug!("Unchoked, starting requests");
                self.unchoked = true;
                self.state = SessionState::Downloading;
                self.start_next_piece()?;
            }
            Message::Choke => debug!("Peer sent choke; outstanding requests left in place"),
            Message::Piece { index, begin, block } => self.on_block(index, begin, &block)?,
            other => trace!("Ignoring message id {:?}", other.id()),
        }
        Ok(())
    }

    fn on_block(&mut self, index: u32, begin: u32, block: &[u8]) -> Result<(), TorrentError> {
        let Some(piece) = self.current.as_mut() else {
            debug!("Block for piece {} outside of a download, ignoring", index);
            return Ok(());
        };

        piece.write_block(index, begin, block)?;
        if !piece.is_complete() {
            self.fill_pipeline();
            return Ok(());
        }

        if let Some(piece) = self.current.take() {
            self.complete_piece(piece)?;
        }
        self.start_next_piece()
    }

    fn start_next_piece(&mut self) -> Result<(), TorrentError> {
        while let Some(job) = self.jobs.pop_front() {
            let piece = PieceAssembly::new(job);
            if !piece.is_complete() {
                debug!("Requesting piece {} ({} blocks)", job.index, piece.total_blocks());
                self.current = Some(piece);
                self.fill_pipeline();
                return Ok(());
            }
            self.complete_piece(piece)?;
        }

        debug!("All assigned pieces verified");
        self.state = SessionState::Done;
        Ok(())
    }

    fn complete_piece(&mut self, piece: PieceAssembly) -> Result<(), TorrentError> {
        let index = piece.index();
        if !piece.verify() {
            warn!("Piece {} failed hash verification", index);
            return Err(TorrentError::integrity_error(
                format!("piece {} does not match its SHA-1 hash", index),
                index,
            ));
        }

        info!("Piece {} verified", index);
        self.verified.push_back(VerifiedPiece { index, data: piece.into_data() });
        Ok(())
    }

    fn fill_pipeline(&mut self) {
        let Some(piece) = self.current.as_mut() else {
            return;
        };
        while let Some(request) = piece.next_request() {
            trace!("Request piece {} offset {} ({} bytes)", request.piece_index, request.begin, request.length);
            Message::Request {
                index: request.piece_index,
                begin: request.begin,
                length: request.length,
            }
            .encode(&mut self.outbound);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BLOCK_SIZE, MAX_PIPELINE, PROTOCOL_STRING};
    use sha1::{Digest, Sha1};

    const INFO_HASH: [u8; 20] = [7u8; 20];
    const REMOTE_ID: [u8; 20] = [9u8; 20];

    fn job(index: u32, content: &[u8]) -> PieceJob {
        let mut hasher = Sha1::new();
        hasher.update(content);
        PieceJob { index, length: content.len() as u32, hash: hasher.finalize().into() }
    }

    fn content(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn encode(messages: &[Message]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for message in messages {
            message.encode(&mut buf);
        }
        buf.to_vec()
    }

    fn outgoing_messages(session: &mut PeerSession) -> Vec<Message> {
        let mut buf = match session.take_outgoing() {
            Some(bytes) => BytesMut::from(&bytes[..]),
            None => return Vec::new(),
        };
        let mut messages = Vec::new();
        while let Some(frame) = read_frame(&mut buf).unwrap() {
            messages.push(Message::decode(frame).unwrap());
        }
        assert!(buf.is_empty());
        messages
    }

    fn requests(messages: &[Message]) -> Vec<(u32, u32, u32)> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::Request { index, begin, length } => Some((*index, *begin, *length)),
                _ => None,
            })
            .collect()
    }

    fn remote_handshake() -> Vec<u8> {
        Handshake::new(INFO_HASH, REMOTE_ID).serialize().to_vec()
    }

    /// Session past the handshake with its own handshake drained
    fn started(jobs: Vec<PieceJob>) -> PeerSession {
        let mut session = PeerSession::new(INFO_HASH, [1u8; 20], jobs);
        session.start();
        session.take_outgoing();
        session.on_data(&remote_handshake()).unwrap();
        session
    }

    fn answer(session: &mut PeerSession, data: &[u8], requests: &[(u32, u32, u32)]) -> Result<(), TorrentError> {
        let replies: Vec<Message> = requests
            .iter()
            .map(|&(index, begin, length)| Message::Piece {
                index,
                begin,
                block: Bytes::copy_from_slice(&data[begin as usize..(begin + length) as usize]),
            })
            .collect();
        session.on_data(&encode(&replies))
    }

    #[test]
    fn test_start_queues_handshake() {
        let mut session = PeerSession::new(INFO_HASH, [1u8; 20], Vec::new());
        assert_eq!(session.state(), SessionState::Connecting);
        session.start();
        assert_eq!(session.state(), SessionState::Handshaking);
        let out = session.take_outgoing().unwrap();
        assert_eq!(out.len(), HANDSHAKE_LEN);
        assert_eq!(out[0], 19);
        assert_eq!(&out[1..20], PROTOCOL_STRING);
        assert_eq!(&out[28..48], &INFO_HASH);
        assert_eq!(&out[48..68], &[1u8; 20]);
        assert!(session.take_outgoing().is_none());
    }

    #[test]
    fn test_full_piece_download() {
        let data = content(40_000, 3);
        let mut session = started(vec![job(0, &data)]);
        assert_eq!(session.state(), SessionState::AwaitingBitfield);
        assert_eq!(session.remote_handshake().unwrap().peer_id, REMOTE_ID);

        session.on_data(&encode(&[Message::Bitfield { bitfield: Bytes::from_static(&[0x80]) }])).unwrap();
        assert_eq!(session.state(), SessionState::Interested);
        assert_eq!(outgoing_messages(&mut session), vec![Message::Interested]);

        session.on_data(&encode(&[Message::Unchoke])).unwrap();
        assert_eq!(session.state(), SessionState::Downloading);
        let sent = requests(&outgoing_messages(&mut session));
        assert_eq!(sent, vec![(0, 0, BLOCK_SIZE), (0, BLOCK_SIZE, BLOCK_SIZE), (0, 2 * BLOCK_SIZE, 7_232)]);

        answer(&mut session, &data, &sent).unwrap();
        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(session.take_verified(), Some(VerifiedPiece { index: 0, data }));
        assert!(session.take_verified().is_none());
        assert!(session.on_close().is_ok());
    }

    #[test]
    fn test_pipeline_never_exceeds_window() {
        let data = content(10 * BLOCK_SIZE as usize, 1);
        let mut session = started(vec![job(4, &data)]);
        session.on_data(&encode(&[Message::Bitfield { bitfield: Bytes::new() }, Message::Unchoke])).unwrap();

        let mut pending = requests(&outgoing_messages(&mut session));
        assert_eq!(pending.len(), MAX_PIPELINE as usize);

        let mut total = pending.len();
        while !pending.is_empty() {
            let first = pending.remove(0);
            answer(&mut session, &data, &[first]).unwrap();
            assert!(session.outstanding_requests() <= MAX_PIPELINE);
            let more = requests(&outgoing_messages(&mut session));
            assert!(more.len() <= 1);
            total += more.len();
            pending.extend(more);
        }

        assert_eq!(total, 10);
        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(session.take_verified().unwrap().data, data);
    }

    #[test]
    fn test_interested_sent_once() {
        let mut session = started(vec![job(0, b"abc")]);
        let bitfield = Message::Bitfield { bitfield: Bytes::from_static(&[0xff]) };
        session.on_data(&encode(&[bitfield.clone(), bitfield])).unwrap();
        assert_eq!(outgoing_messages(&mut session), vec![Message::Interested]);
    }

    #[test]
    fn test_byte_at_a_time_input() {
        let data = content(100, 9);
        let mut session = PeerSession::new(INFO_HASH, [1u8; 20], vec![job(0, &data)]);
        session.start();
        session.take_outgoing();

        let mut input = remote_handshake();
        input.extend(encode(&[
            Message::KeepAlive,
            Message::Bitfield { bitfield: Bytes::from_static(&[0x80]) },
            Message::Unchoke,
            Message::Piece { index: 0, begin: 0, block: Bytes::from(data.clone()) },
        ]));
        for byte in input {
            session.on_data(&[byte]).unwrap();
        }

        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(session.take_verified().unwrap().data, data);
    }

    #[test]
    fn test_keep_alive_and_unknown_ignored() {
        let mut session = started(vec![job(0, b"abc")]);
        session
            .on_data(&encode(&[
                Message::KeepAlive,
                Message::Unknown { id: 20, payload: Bytes::from_static(b"ext") },
                Message::Have { piece_index: 3 },
            ]))
            .unwrap();
        assert_eq!(session.state(), SessionState::AwaitingBitfield);
        assert!(session.take_outgoing().is_none());
    }

    #[test]
    fn test_hash_mismatch_fails_session() {
        let data = content(64, 2);
        let mut session = started(vec![job(5, &data)]);
        session.on_data(&encode(&[Message::Bitfield { bitfield: Bytes::new() }, Message::Unchoke])).unwrap();
        session.take_outgoing();

        let mut corrupt = data.clone();
        corrupt[10] ^= 0xff;
        let err = answer(&mut session, &corrupt, &[(5, 0, 64)]).unwrap_err();
        assert!(matches!(err, TorrentError::IntegrityError { piece_index: 5, .. }));
        assert!(err.is_recoverable());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.take_verified().is_none());
    }

    #[test]
    fn test_out_of_range_block_rejected() {
        let mut session = started(vec![job(0, &content(100, 0))]);
        session.on_data(&encode(&[Message::Bitfield { bitfield: Bytes::new() }, Message::Unchoke])).unwrap();
        session.take_outgoing();

        let bogus = Message::Piece { index: 0, begin: 50, block: Bytes::from(vec![0u8; 100]) };
        let err = session.on_data(&encode(&[bogus])).unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.take_verified().is_none());
    }

    #[test]
    fn test_verified_pieces_survive_later_failure() {
        let first = content(32, 1);
        let second = content(32, 2);
        let mut session = started(vec![job(0, &first), job(1, &second)]);
        session.on_data(&encode(&[Message::Bitfield { bitfield: Bytes::new() }, Message::Unchoke])).unwrap();
        session.take_outgoing();

        let mut input = encode(&[Message::Piece { index: 0, begin: 0, block: Bytes::from(first.clone()) }]);
        input.extend(encode(&[Message::Piece { index: 1, begin: 0, block: Bytes::from(vec![0u8; 32]) }]));
        assert!(session.on_data(&input).is_err());
        assert_eq!(session.take_verified(), Some(VerifiedPiece { index: 0, data: first }));
        assert!(session.take_verified().is_none());
    }

    #[test]
    fn test_handshake_mismatch_policy() {
        let wrong = Handshake::new([0u8; 20], REMOTE_ID).serialize().to_vec();

        let mut lenient = PeerSession::new(INFO_HASH, [1u8; 20], Vec::new());
        lenient.start();
        lenient.on_data(&wrong).unwrap();
        assert_eq!(lenient.state(), SessionState::AwaitingBitfield);

        let mut strict = PeerSession::new(INFO_HASH, [1u8; 20], Vec::new()).with_handshake_verification(true);
        strict.start();
        let err = strict.on_data(&wrong).unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
        assert_eq!(strict.state(), SessionState::Failed);
    }

    #[test]
    fn test_close_before_done_is_network_error() {
        let mut session = started(vec![job(0, b"abc")]);
        let err = session.on_close().unwrap_err();
        assert!(matches!(err, TorrentError::NetworkError { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_data_before_start_rejected() {
        let mut session = PeerSession::new(INFO_HASH, [1u8; 20], Vec::new());
        assert!(session.on_data(&remote_handshake()).is_err());
    }
}
