//! Padding obfuscator: wraps the first `N = 8` data units per direction in
//! a fixed envelope to disguise payload size.
//!
//! Envelope: `payload_len(u16 be) || padding_len(u8) || payload || zeros`.
//! After 8 units, data flows verbatim in both directions.

use rand::Rng;

use crate::error::{RelayError, Result};

/// Number of data units wrapped per direction before padding stops.
pub const PADDED_UNIT_COUNT: usize = 8;

/// Envelope header size: 2-byte length + 1-byte padding length.
const HEADER_LEN: usize = 3;

/// Sender-side padding state: wraps up to [`PADDED_UNIT_COUNT`] units.
#[derive(Debug, Default)]
pub struct PaddingSender {
    units_sent: usize,
    enabled: bool,
}

impl PaddingSender {
    /// A sender with padding enabled or disabled per the negotiation
    /// result (both sides must advertise support for it to turn on).
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { units_sent: 0, enabled }
    }

    /// Wrap `payload` in the padding envelope if this unit is still within
    /// the first `PADDED_UNIT_COUNT`; otherwise pass it through unchanged.
    pub fn wrap(&mut self, payload: &[u8]) -> Vec<u8> {
        if !self.enabled || self.units_sent >= PADDED_UNIT_COUNT || payload.len() > u16::MAX as usize
        {
            return payload.to_vec();
        }
        self.units_sent += 1;

        let pad_len = rand::thread_rng().gen_range(0..=255u8);
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + pad_len as usize);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.push(pad_len);
        out.extend_from_slice(payload);
        out.extend(std::iter::repeat(0u8).take(pad_len as usize));
        out
    }

    /// Whether padding is still being applied (fewer than
    /// `PADDED_UNIT_COUNT` units sent so far).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.units_sent < PADDED_UNIT_COUNT
    }
}

/// Receiver-side padding state: a small accumulation buffer since an
/// arriving read may straddle the boundary between a padded unit and
/// unpadded data that follows it — the arriving datagram must be split at
/// that boundary.
#[derive(Debug, Default)]
pub struct PaddingReceiver {
    units_received: usize,
    enabled: bool,
    pending: Vec<u8>,
}

impl PaddingReceiver {
    /// A receiver with padding enabled or disabled per negotiation.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { units_received: 0, enabled, pending: Vec::new() }
    }

    /// Whether padding is still being removed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.units_received < PADDED_UNIT_COUNT
    }

    /// Feed newly arrived bytes and drain as many complete payloads as are
    /// available. Once `PADDED_UNIT_COUNT` units have been unwrapped, any
    /// bytes left over in `input` after the last padded unit are returned
    /// verbatim as the final element of the result, so a coalesced read
    /// that straddles the 8th unit and unpadded data is split correctly.
    pub fn feed(&mut self, input: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.pending.extend_from_slice(input);
        let mut out = Vec::new();

        while self.is_active() {
            if self.pending.len() < HEADER_LEN {
                return Ok(out);
            }
            let payload_len = u16::from_be_bytes([self.pending[0], self.pending[1]]) as usize;
            let pad_len = self.pending[2] as usize;
            let total = HEADER_LEN + payload_len + pad_len;
            if self.pending.len() < total {
                return Ok(out);
            }

            let payload = self.pending[HEADER_LEN..HEADER_LEN + payload_len].to_vec();
            self.pending.drain(..total);
            self.units_received += 1;
            out.push(payload);
        }

        if !self.pending.is_empty() {
            out.push(std::mem::take(&mut self.pending));
        }
        Ok(out)
    }
}

/// One-shot helper used by property tests: wrap then unwrap a single unit
/// and assert the payload round-trips.
pub fn roundtrip_one_unit(payload: &[u8]) -> Result<Vec<u8>> {
    let mut sender = PaddingSender::new(true);
    let mut receiver = PaddingReceiver::new(true);
    let wrapped = sender.wrap(payload);
    let units = receiver.feed(&wrapped)?;
    units.into_iter().next().ok_or_else(|| RelayError::Protocol("no unit produced".into()))
}
