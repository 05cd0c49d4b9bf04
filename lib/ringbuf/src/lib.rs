// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring buffer for tracing driver activity
//!
//! This contains a fixed-size, allocation-free ring buffer of trace events.
//! Unlike a text logger, each entry is a small `Copy` payload (typically an
//! `enum Trace` local to the module doing the tracing) tagged with the source
//! line that recorded it.
//!
//! ## Constraints
//!
//! The payload type must implement both `Copy` and `PartialEq`.
//!
//! ## Ownership
//!
//! A [`Ringbuf`] is a plain value: it lives inside whatever context owns the
//! thing being traced (a device handle, a bus), and is protected by the same
//! lock that protects that context.  There is no global registry.
//!
//! ```
//! use ringbuf::{ringbuf_entry, Ringbuf};
//!
//! #[derive(Copy, Clone, Debug, PartialEq)]
//! enum Trace {
//!     None,
//!     Read(u16, u16),
//! }
//!
//! let mut trace: Ringbuf<Trace, 8> = Ringbuf::new(Trace::None);
//! ringbuf_entry!(trace, Trace::Read(0x0100, 0x8366));
//! assert_eq!(trace.last(), Some(Trace::Read(0x0100, 0x8366)));
//! ```
//!
//! ## Deduplication
//!
//! When an entry is recorded with an identical payload to the most recent
//! entry (in terms of both `line` and `payload`), `count` is incremented
//! rather than consuming a new slot.  A polling loop that records the same
//! event over and over therefore only costs one slot.

#![cfg_attr(not(test), no_std)]

/// Inserts a payload into a ring buffer, tagged with the caller's line.
///
/// `ringbuf_entry!(buf, expr)` records `expr` into `buf`, which must be a
/// place expression of type [`Ringbuf`] that can be borrowed mutably.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate the payload before borrowing the buffer, so that the
        // payload expression is free to read from the same context.
        let p = $payload;
        $crate::Ringbuf::entry(&mut $buf, line!() as u16, p);
    }};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let _ = &$buf;
        let _ = &$payload;
    }};
}

/// The structure of a single [`Ringbuf`] entry, carrying a payload of
/// arbitrary type.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// A ring buffer of parametrized type and size.
#[derive(Debug, Copy, Clone)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    last: Option<usize>,
    buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    /// Creates an empty ring buffer with every slot holding `init`.
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: init,
            }; N],
        }
    }

    pub fn entry(&mut self, line: u16, payload: T) {
        // None means nothing has been recorded yet; treat it as an
        // out-of-range index so that the first entry lands in slot 0.
        let last = self.last.unwrap_or(usize::MAX);

        if let Some(ent) = self.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                // Only reuse this entry if we don't overflow the count.
                if let Some(new_count) = ent.count.checked_add(1) {
                    ent.count = new_count;
                    return;
                }
            }
        }

        // Advance and wrap.  usize::MAX wraps to zero here as well.
        let ndx = {
            let next = last.wrapping_add(1);
            if next >= self.buffer.len() {
                0
            } else {
                next
            }
        };

        let Some(ent) = self.buffer.get_mut(ndx) else {
            // Zero-sized buffer; nothing to record into.
            return;
        };
        *ent = RingbufEntry {
            line,
            payload,
            count: 1,
            generation: ent.generation.wrapping_add(1),
        };

        self.last = Some(ndx);
    }

    /// Returns the payload of the most recent entry, if any.
    pub fn last(&self) -> Option<T> {
        self.last
            .and_then(|i| self.buffer.get(i))
            .map(|ent| ent.payload)
    }

    /// Iterates over recorded entries, oldest first.  Slots that have never
    /// been written are skipped.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> + '_ {
        let start = match self.last {
            Some(last) => last + 1,
            None => self.buffer.len(),
        };
        let (newer, older) = self.buffer.split_at(start.min(N));
        older
            .iter()
            .chain(newer.iter())
            .filter(|ent| ent.count != 0)
    }

    /// Checks whether any recorded entry carries a payload matching `f`.
    pub fn contains(&self, f: impl Fn(&T) -> bool) -> bool {
        self.iter().any(|ent| f(&ent.payload))
    }
}
