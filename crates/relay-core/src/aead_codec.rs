//! AEAD chunk codec: frames a plaintext stream into authenticated,
//! length-prefixed records.
//!
//! The codec owns the salt exchange (generate-and-emit on the encode side,
//! read-and-derive on the decode side) and the record-splitting/buffering
//! logic; the per-record sealing itself is `relay_crypto::Session`.
//!
//! [`AeadStream`] wraps the codec around a raw byte stream so the rest of
//! the pipeline ([`crate::socket::SocketAdapter`], [`crate::pipe`]) can
//! treat a shadowsocks-AEAD tunnel exactly like any other
//! `AsyncRead + AsyncWrite` stream.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use rand::RngCore;
use relay_crypto::{MasterKey, Session};
use relay_proto::CipherKind;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{
    buffer::Buffer,
    error::{RelayError, Result},
    queue::BufferQueue,
};

/// Maximum plaintext payload per record (top two bits of the length cell
/// must be zero).
pub const MAX_CHUNK_LEN: usize = 0x3FFF;

/// Encodes plaintext into AEAD records, emitting the salt on first use.
pub struct Encoder {
    kind: CipherKind,
    master_key: MasterKey,
    session: Option<Session>,
}

impl Encoder {
    /// A fresh encoder bound to `master_key`; the salt is generated and
    /// the session derived on the first call to `encode`.
    #[must_use]
    pub fn new(kind: CipherKind, master_key: MasterKey) -> Self {
        Self { kind, master_key, session: None }
    }

    /// Encode `plaintext`, splitting into `MAX_CHUNK_LEN`-byte slices and
    /// appending one record per slice (plus the salt, on the first call)
    /// to `out`.
    pub fn encode(&mut self, plaintext: &[u8], out: &mut BufferQueue) -> Result<()> {
        if self.session.is_none() {
            let mut salt = vec![0u8; self.kind.key_len()];
            rand::thread_rng().fill_bytes(&mut salt);
            let subkey = self.master_key.derive_subkey(&salt, self.kind.key_len());
            self.session = Some(Session::new(self.kind, &subkey));
            out.push_back(Buffer::copy_from(&salt, 0, 0));
        }
        // The branch above always sets `session` before this line runs.
        #[allow(clippy::expect_used)]
        let session = self.session.as_mut().expect("initialized above");

        for chunk in plaintext.chunks(MAX_CHUNK_LEN) {
            let len_cell = (chunk.len() as u16).to_be_bytes();
            let record = session.seal_record(len_cell, chunk)?;
            out.push_bytes(&record);
        }
        Ok(())
    }
}

enum DecoderState {
    AwaitingSalt,
    Streaming(Session),
}

/// Decodes AEAD records back into plaintext, consuming the salt exactly
/// once from the front of the stream.
pub struct Decoder {
    kind: CipherKind,
    master_key: MasterKey,
    state: DecoderState,
    incoming: Vec<u8>,
}

impl Decoder {
    /// A fresh decoder bound to `master_key`.
    #[must_use]
    pub fn new(kind: CipherKind, master_key: MasterKey) -> Self {
        Self { kind, master_key, state: DecoderState::AwaitingSalt, incoming: Vec::new() }
    }

    /// Feed newly received ciphertext and drain as many complete
    /// plaintext records as are available. Returns `PROTOCOL_ERROR`
    /// (`RelayError::Protocol`) on any authentication failure or framing
    /// violation, which is fatal for the connection.
    pub fn decode(&mut self, ciphertext: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.incoming.extend_from_slice(ciphertext);

        if matches!(self.state, DecoderState::AwaitingSalt) {
            let key_len = self.kind.key_len();
            if self.incoming.len() < key_len {
                return Ok(Vec::new());
            }
            let salt = self.incoming[..key_len].to_vec();
            self.incoming.drain(..key_len);
            let subkey = self.master_key.derive_subkey(&salt, key_len);
            self.state = DecoderState::Streaming(Session::new(self.kind, &subkey));
        }

        let DecoderState::Streaming(session) = &mut self.state else { unreachable!() };

        let tag_len = session.tag_len();
        let len_cell_ct_len = 2 + tag_len;
        let mut out = Vec::new();

        loop {
            if self.incoming.len() < len_cell_ct_len {
                return Ok(out);
            }
            let len_cell = session
                .peek_open_length(&self.incoming[..len_cell_ct_len])
                .map_err(|e| RelayError::Protocol(format!("AEAD length cell: {e}")))?;
            let payload_len = u16::from_be_bytes(len_cell) as usize;
            if payload_len == 0 || payload_len > MAX_CHUNK_LEN {
                return Err(RelayError::Protocol(format!("invalid record length {payload_len}")));
            }

            let record_len = len_cell_ct_len + payload_len + tag_len;
            if self.incoming.len() < record_len {
                // Roll back: nothing was mutated by peek_open_length, so
                // simply wait for more ciphertext.
                return Ok(out);
            }

            let payload_ct = &self.incoming[len_cell_ct_len..record_len];
            let plaintext = session
                .open_payload(payload_ct)
                .map_err(|e| RelayError::Protocol(format!("AEAD payload: {e}")))?;
            self.incoming.drain(..record_len);
            out.push(plaintext);
        }
    }
}

/// A raw byte stream with a shadowsocks-AEAD tunnel wrapped around it:
/// every write is sealed into records before reaching `inner`, every read
/// is drained of records and opened before reaching the caller.
pub struct AeadStream<S> {
    inner: S,
    encoder: Encoder,
    decoder: Decoder,
    write_queue: BufferQueue,
    read_queue: BufferQueue,
}

impl<S> AeadStream<S> {
    /// Wrap `inner` in independent encode/decode sessions derived from the
    /// same `master_key`.
    #[must_use]
    pub fn new(inner: S, kind: CipherKind, master_key: MasterKey) -> Self {
        Self {
            inner,
            encoder: Encoder::new(kind, master_key.clone()),
            decoder: Decoder::new(kind, master_key),
            write_queue: BufferQueue::new(),
            read_queue: BufferQueue::new(),
        }
    }
}

fn protocol_to_io(err: RelayError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

impl<S: AsyncRead + Unpin> AsyncRead for AeadStream<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.read_queue.is_empty() {
                let take = this.read_queue.byte_sum().min(buf.remaining());
                let bytes = this.read_queue.drain_bytes(take);
                buf.put_slice(&bytes);
                return Poll::Ready(Ok(()));
            }

            let mut raw = [0u8; 16 * 1024];
            let mut raw_buf = ReadBuf::new(&mut raw);
            match Pin::new(&mut this.inner).poll_read(cx, &mut raw_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let filled = raw_buf.filled();
                    if filled.is_empty() {
                        return Poll::Ready(Ok(()));
                    }
                    let plaintexts = this.decoder.decode(filled).map_err(protocol_to_io)?;
                    for chunk in plaintexts {
                        this.read_queue.push_bytes(&chunk);
                    }
                },
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AeadStream<S> {
    fn drain_write_queue(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.write_queue.is_empty() {
            let front_len = self.write_queue.front().map(Buffer::len).unwrap_or(0);
            let chunk = self.write_queue.drain_bytes(front_len);
            match Pin::new(&mut self.inner).poll_write(cx, &chunk) {
                Poll::Pending => {
                    self.write_queue.push_back(Buffer::copy_from(&chunk, 0, 0));
                    return Poll::Pending;
                },
                Poll::Ready(Ok(written)) if written < chunk.len() => {
                    self.write_queue.push_back(Buffer::copy_from(&chunk[written..], 0, 0));
                },
                Poll::Ready(Ok(_)) => {},
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for AeadStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if let Poll::Pending = this.drain_write_queue(cx) {
            return Poll::Pending;
        }

        this.encoder.encode(buf, &mut this.write_queue).map_err(protocol_to_io)?;

        match this.drain_write_queue(cx) {
            Poll::Pending | Poll::Ready(Ok(())) => Poll::Ready(Ok(buf.len())),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.drain_write_queue(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_flush(cx),
            other => other,
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.drain_write_queue(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_shutdown(cx),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: CipherKind) -> MasterKey {
        MasterKey::from_passphrase("integration test passphrase", kind)
    }

    #[test]
    fn encode_then_decode_roundtrips_a_stream() {
        let kind = CipherKind::Aes256Gcm;
        let mut encoder = Encoder::new(kind, key(kind));
        let mut decoder = Decoder::new(kind, key(kind));

        let mut wire = BufferQueue::new();
        encoder.encode(b"hello, world", &mut wire).unwrap();
        encoder.encode(b" more data", &mut wire).unwrap();

        let bytes = wire.drain_bytes(wire.byte_sum());
        let plaintexts = decoder.decode(&bytes).unwrap();
        let joined: Vec<u8> = plaintexts.concat();
        assert_eq!(joined, b"hello, world more data");
    }

    #[test]
    fn decode_waits_for_more_bytes_on_truncated_record() {
        let kind = CipherKind::Chacha20Poly1305;
        let mut encoder = Encoder::new(kind, key(kind));
        let mut decoder = Decoder::new(kind, key(kind));

        let mut wire = BufferQueue::new();
        encoder.encode(b"split me", &mut wire).unwrap();
        let bytes = wire.drain_bytes(wire.byte_sum());

        let split = bytes.len() - 3;
        let first = decoder.decode(&bytes[..split]).unwrap();
        assert!(first.is_empty());
        let second = decoder.decode(&bytes[split..]).unwrap();
        assert_eq!(second, vec![b"split me".to_vec()]);
    }

    #[test]
    fn splits_large_input_into_max_chunk_records() {
        let kind = CipherKind::XChacha20Poly1305;
        let mut encoder = Encoder::new(kind, key(kind));
        let mut decoder = Decoder::new(kind, key(kind));

        let big = vec![0x42u8; MAX_CHUNK_LEN * 2 + 10];
        let mut wire = BufferQueue::new();
        encoder.encode(&big, &mut wire).unwrap();
        let bytes = wire.drain_bytes(wire.byte_sum());

        let plaintexts = decoder.decode(&bytes).unwrap();
        assert_eq!(plaintexts.len(), 3);
        assert_eq!(plaintexts.iter().map(Vec::len).sum::<usize>(), big.len());
        assert_eq!(plaintexts.concat(), big);
    }

    #[test]
    fn tampered_record_is_a_protocol_error() {
        let kind = CipherKind::Aes128Gcm;
        let mut encoder = Encoder::new(kind, key(kind));
        let mut decoder = Decoder::new(kind, key(kind));

        let mut wire = BufferQueue::new();
        encoder.encode(b"tamper target", &mut wire).unwrap();
        let mut bytes = wire.drain_bytes(wire.byte_sum());
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let result = decoder.decode(&bytes);
        assert!(matches!(result, Err(RelayError::Protocol(_))));
    }

    #[test]
    fn zero_length_record_is_a_protocol_error() {
        let kind = CipherKind::Aes256Gcm;
        let master = key(kind);
        let salt = vec![3u8; kind.key_len()];
        let subkey = master.derive_subkey(&salt, kind.key_len());
        let mut session = Session::new(kind, &subkey);

        let mut wire = Vec::new();
        wire.extend_from_slice(&salt);
        wire.extend(session.seal_record([0, 0], b"").unwrap());

        let mut decoder = Decoder::new(kind, key(kind));
        let result = decoder.decode(&wire);
        assert!(matches!(result, Err(RelayError::Protocol(_))));
    }

    #[tokio::test]
    async fn aead_stream_roundtrips_over_a_duplex_pair() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

        let kind = CipherKind::Aes256Gcm;
        let (client_raw, server_raw) = duplex(4096);
        let mut client = AeadStream::new(client_raw, kind, key(kind));
        let mut server = AeadStream::new(server_raw, kind, key(kind));

        client.write_all(b"hello from client").await.unwrap();
        client.flush().await.unwrap();
        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello from client");

        server.write_all(b"hello from server").await.unwrap();
        server.flush().await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello from server");
    }
}
