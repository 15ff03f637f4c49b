//! Streaming MIME structure parser
//!
//! A single-pass, bounded-memory state machine over RFC 822 / RFC 2045-2046
//! structure: header folding, multipart boundary matching, nested
//! `message/rfc822` recursion, and an optional on-the-fly 8-bit-to-quoted-
//! printable downgrade. See [`Parser`].

#![warn(missing_docs)]

mod boundary;
pub mod config;
mod downgrade;
pub mod header;
pub mod line;
mod token;

use bitflags::bitflags;
#[allow(unused_imports)]
use tracing::{debug, instrument, warn};

use boundary::{BoundaryMatch, BoundaryStack};
use downgrade::Downgrader;

pub use header::{
    ContentSubtype, ContentType, DefaultRecognizer, Domain, Encoding, HeaderDescriptor,
    HeaderKind, HeaderRecognizer,
};
pub use line::{is_header, Record, RecordKind, RecordReader};

bitflags! {
    /// Behavior switches captured at [`Parser`] construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParserOptions: u32 {
        /// Do not interpret Content-* headers; on end of primary headers,
        /// go straight to [`Phase::Body`] regardless of declared type.
        const DISABLE_MIME = 1 << 0;
        /// Raise [`ErrFlags::TRUNC_HEADER`] on header overflow.
        const REPORT_TRUNC_HEADER = 1 << 1;
        /// Raise [`ErrFlags::EIGHT_BIT_IN_HEADER`] for a header byte ≥ 0x80.
        const REPORT_8BIT_IN_HEADER = 1 << 2;
        /// Raise [`ErrFlags::EIGHT_BIT_IN_7BIT_BODY`] for a nominally
        /// 7-bit body byte ≥ 0x80.
        const REPORT_8BIT_IN_7BIT_BODY = 1 << 3;
        /// Raise [`ErrFlags::ENCODING_DOMAIN`] for inconsistent composite
        /// encodings.
        const REPORT_ENCODING_DOMAIN = 1 << 4;
        /// Enter [`Phase::NestedHeaders`] for any `message/*`, not just
        /// `message/rfc822`. Must not be combined with `DOWNGRADE`.
        const RECURSE_ALL_MESSAGE = 1 << 5;
        /// Convert 8-bit leaf bodies to quoted-printable; rewrite the
        /// outer Content-Transfer-Encoding header.
        const DOWNGRADE = 1 << 6;
    }
}

bitflags! {
    /// Accumulated, monotonically-OR-ed anomaly flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrFlags: u32 {
        /// A single header exceeded `header_limit`; further bytes were dropped.
        const TRUNC_HEADER = 1 << 0;
        /// A boundary push would exceed `max_depth`; the push was skipped.
        const NESTING = 1 << 1;
        /// At-most-once per message.
        const EIGHT_BIT_IN_HEADER = 1 << 2;
        /// At-most-once per message.
        const EIGHT_BIT_IN_7BIT_BODY = 1 << 3;
        /// A composite entity declared a transformation or a wrong-domain encoding.
        const ENCODING_DOMAIN = 1 << 4;
    }
}

/// Returns the single highest-severity message for a non-empty `ErrFlags`.
///
/// Severity order: Nesting > TruncHeader > EightBitInHeader >
/// EightBitIn7BitBody > EncodingDomain. Calling this with no flags set is a
/// programming error -- the caller already knows `err_flags` is empty.
pub fn error_text(flags: ErrFlags) -> &'static str {
    if flags.contains(ErrFlags::NESTING) {
        "boundary nesting limit exceeded"
    } else if flags.contains(ErrFlags::TRUNC_HEADER) {
        "a header exceeded the configured size limit and was truncated"
    } else if flags.contains(ErrFlags::EIGHT_BIT_IN_HEADER) {
        "a header contained an 8-bit byte"
    } else if flags.contains(ErrFlags::EIGHT_BIT_IN_7BIT_BODY) {
        "a nominally 7-bit body contained an 8-bit byte"
    } else if flags.contains(ErrFlags::ENCODING_DOMAIN) {
        "an entity declared an inconsistent content-transfer-encoding for its composite type"
    } else {
        panic!("error_text called with no flags set")
    }
}

/// Configuration knobs, immutable per instance (or shared process-wide via
/// [`config`]).
#[derive(Debug, Clone, Copy)]
pub struct ParserLimits {
    /// A single logical header's cap, in bytes.
    pub header_limit: usize,
    /// Maximum multipart nesting depth.
    pub max_depth: usize,
    /// Stored boundary string truncation length.
    pub max_boundary_len: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            header_limit: 65536,
            max_depth: 100,
            max_boundary_len: 70,
        }
    }
}

/// Which header block a completed header belongs to; also the phase label
/// passed to [`Sink::head_out`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The message's own headers.
    PrimaryHeaders,
    /// Headers of a part started by a multipart boundary.
    MultipartHeaders,
    /// Headers of a nested `message/rfc822` (or, with `RECURSE_ALL_MESSAGE`,
    /// any `message/*`) entity.
    NestedHeaders,
    /// Body content.
    Body,
}

/// The capability interface replacing the four callback-pointers-plus-
/// context-cookie design: a completed header or body record is delivered
/// by exclusive borrow for the duration of the call; the callee may
/// mutate it but may not retain it.
pub trait Sink {
    /// A completed logical header, with embedded `\n` between folded
    /// fragments. `descriptor` is `None` for a synthesized replacement
    /// Content-Transfer-Encoding header.
    fn head_out(&mut self, phase: Phase, descriptor: Option<&HeaderDescriptor>, buffer: &mut Vec<u8>);
    /// Body-region output. `kind` is `TextComplete` or `TextContinued`.
    fn body_out(&mut self, kind: RecordKind, bytes: &[u8]);
    /// Invoked exactly once, immediately after the primary-header block closes.
    fn head_end(&mut self) {}
    /// Invoked once when end-of-input arrives in [`Phase::Body`].
    fn body_end(&mut self) {}
}

fn header_value(buf: &[u8]) -> &[u8] {
    match buf.iter().position(|&b| b == b':') {
        Some(colon) => &buf[colon + 1..],
        None => &[],
    }
}

fn is_transformed(encoding: Encoding) -> bool {
    matches!(encoding, Encoding::QuotedPrintable | Encoding::Base64)
}

fn has_high_bit(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| b & 0x80 != 0)
}

/// The streaming parser. One instance per message; fed records in order via
/// [`update`](Self::update), finally a [`RecordKind::NonText`] record.
pub struct Parser<S: Sink, R: HeaderRecognizer = DefaultRecognizer> {
    options: ParserOptions,
    limits: ParserLimits,
    recognizer: R,
    sink: S,

    phase: Phase,
    curr_ctype: ContentType,
    curr_stype: ContentSubtype,
    curr_encoding: Encoding,
    curr_domain: Domain,
    header_buf: Vec<u8>,
    stack: BoundaryStack,
    prev_kind: RecordKind,
    err_flags: ErrFlags,
    downgrader: Downgrader,
    eight_bit_header_raised: bool,
    eight_bit_body_raised: bool,
}

impl<S: Sink> Parser<S, DefaultRecognizer> {
    /// Creates a parser using the built-in header recognizer.
    pub fn new(options: ParserOptions, limits: ParserLimits, sink: S) -> Self {
        Self::with_recognizer(options, limits, DefaultRecognizer, sink)
    }
}

impl<S: Sink, R: HeaderRecognizer> Parser<S, R> {
    /// Creates a parser using a caller-supplied header recognizer.
    pub fn with_recognizer(options: ParserOptions, limits: ParserLimits, recognizer: R, sink: S) -> Self {
        Self {
            options,
            limits,
            recognizer,
            sink,
            phase: Phase::PrimaryHeaders,
            curr_ctype: ContentType::Text,
            curr_stype: ContentSubtype::Plain,
            curr_encoding: Encoding::SevenBit,
            curr_domain: Domain::SevenBit,
            header_buf: Vec::with_capacity(100),
            stack: BoundaryStack::new(),
            prev_kind: RecordKind::TextComplete,
            err_flags: ErrFlags::empty(),
            downgrader: Downgrader::new(),
            eight_bit_header_raised: false,
            eight_bit_body_raised: false,
        }
    }

    /// Returns the anomaly flags accumulated so far.
    pub fn err_flags(&self) -> ErrFlags {
        self.err_flags
    }

    /// Borrows the sink, e.g. to inspect what has been collected so far.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the parser, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Feeds one record. Returns the cumulative `err_flags` after
    /// processing it.
    #[instrument(skip_all)]
    pub fn update(&mut self, record: Record) -> ErrFlags {
        if record.kind == RecordKind::NonText && self.prev_kind == RecordKind::TextContinued {
            // A recursive self-call in the source; expressed here as a
            // plain extra step instead of true recursion.
            self.dispatch(Record::text_complete(Vec::new()));
        }
        self.dispatch(record);
        self.err_flags
    }

    fn dispatch(&mut self, record: Record) {
        match self.phase {
            Phase::PrimaryHeaders | Phase::MultipartHeaders | Phase::NestedHeaders => {
                self.process_header_phase(record)
            }
            Phase::Body => self.process_body_phase(record),
        }
    }

    fn append_limited(&mut self, bytes: &[u8]) {
        let remaining = self.limits.header_limit.saturating_sub(self.header_buf.len());
        if bytes.is_empty() {
            return;
        }
        if remaining == 0 {
            if self.options.contains(ParserOptions::REPORT_TRUNC_HEADER) {
                self.err_flags.insert(ErrFlags::TRUNC_HEADER);
            }
            return;
        }
        if bytes.len() > remaining {
            self.header_buf.extend_from_slice(&bytes[..remaining]);
            if self.options.contains(ParserOptions::REPORT_TRUNC_HEADER) {
                self.err_flags.insert(ErrFlags::TRUNC_HEADER);
            }
        } else {
            self.header_buf.extend_from_slice(bytes);
        }
    }

    fn start_header(&mut self, bytes: &[u8], h: usize) {
        let name_end = bytes
            .iter()
            .position(|&b| !matches!(b, 33..=57 | 59..=126))
            .unwrap_or(bytes.len());
        self.header_buf.clear();
        self.append_limited(&bytes[..name_end]);
        self.append_limited(b":");
        let mut rest = &bytes[h..];
        while rest.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
            rest = &rest[1..];
        }
        self.append_limited(rest);
    }

    fn flush_header(&mut self) {
        let phase_label = self.phase;
        let mime_enabled = !self.options.contains(ParserOptions::DISABLE_MIME);
        let descriptor = if mime_enabled {
            self.recognizer.recognize(&self.header_buf)
        } else {
            None
        };

        if let Some(desc) = &descriptor {
            match desc.kind {
                HeaderKind::ContentType => {
                    let value = header_value(&self.header_buf).to_vec();
                    let (ctype, stype, nesting_hit) = header::interpret_content_type(
                        &value,
                        &mut self.stack,
                        self.limits.max_depth,
                        self.limits.max_boundary_len,
                    );
                    self.curr_ctype = ctype;
                    self.curr_stype = stype;
                    if nesting_hit {
                        debug!("boundary push skipped, nesting limit reached");
                        self.err_flags.insert(ErrFlags::NESTING);
                    }
                }
                HeaderKind::ContentTransferEncoding => {
                    let value = header_value(&self.header_buf).to_vec();
                    if let Some(encoding) = header::interpret_content_transfer_encoding(&value) {
                        self.curr_encoding = encoding;
                        self.curr_domain = encoding.domain();
                    }
                }
                HeaderKind::MimeVersion | HeaderKind::Other => {}
            }
        }

        if self.options.contains(ParserOptions::REPORT_8BIT_IN_HEADER)
            && !self.eight_bit_header_raised
            && has_high_bit(&self.header_buf)
        {
            warn!("8-bit byte in header");
            self.err_flags.insert(ErrFlags::EIGHT_BIT_IN_HEADER);
            self.eight_bit_header_raised = true;
        }

        let suppress_for_downgrade = descriptor
            .as_ref()
            .is_some_and(|d| d.kind == HeaderKind::ContentTransferEncoding)
            && self.options.contains(ParserOptions::DOWNGRADE)
            && self.curr_domain != Domain::SevenBit;

        if !suppress_for_downgrade {
            self.sink.head_out(phase_label, descriptor.as_ref(), &mut self.header_buf);
        }
        self.header_buf.clear();
    }

    fn process_header_phase(&mut self, record: Record) {
        // Step 1: accumulate continuation lines.
        if !self.header_buf.is_empty() && record.kind != RecordKind::NonText {
            if self.prev_kind == RecordKind::TextContinued {
                self.append_limited(&record.bytes);
                self.prev_kind = record.kind;
                return;
            }
            if record.bytes.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
                self.append_limited(b"\n");
                self.append_limited(&record.bytes);
                self.prev_kind = record.kind;
                return;
            }
        }

        // Step 2: flush the previously buffered header, if any.
        if !self.header_buf.is_empty() {
            self.flush_header();
        }

        // Step 3: maybe start a new header from the current record.
        if record.kind != RecordKind::NonText {
            let h = is_header(&record.bytes);
            if h > 0 {
                self.start_header(&record.bytes, h);
                self.prev_kind = record.kind;
                return;
            }
        }

        // Step 4: this record terminates the header block.
        self.end_header_block(record);
    }

    fn end_header_block(&mut self, record: Record) {
        if self.options.contains(ParserOptions::DOWNGRADE) && self.curr_domain != Domain::SevenBit {
            let replacement = if matches!(self.curr_ctype, ContentType::Message | ContentType::Multipart) {
                "Content-Transfer-Encoding: 7bit"
            } else {
                "Content-Transfer-Encoding: quoted-printable"
            };
            let mut buf = replacement.as_bytes().to_vec();
            self.sink.head_out(self.phase, None, &mut buf);
        }

        if self.phase == Phase::PrimaryHeaders {
            self.sink.head_end();
        }

        if self.options.contains(ParserOptions::REPORT_ENCODING_DOMAIN) {
            let transformed = is_transformed(self.curr_encoding);
            let cond_a = self.curr_ctype == ContentType::Message
                && matches!(self.curr_stype, ContentSubtype::Partial | ContentSubtype::ExternalBody)
                && self.curr_domain != Domain::SevenBit;
            let cond_b = self.curr_ctype == ContentType::Message
                && !matches!(self.curr_stype, ContentSubtype::Partial | ContentSubtype::ExternalBody)
                && transformed;
            let cond_c = self.curr_ctype == ContentType::Multipart && transformed;
            if cond_a || cond_b || cond_c {
                self.err_flags.insert(ErrFlags::ENCODING_DOMAIN);
            }
        }

        match record.kind {
            RecordKind::TextComplete if record.bytes.is_empty() => match self.curr_ctype {
                ContentType::Message => {
                    if matches!(self.curr_stype, ContentSubtype::Rfc822)
                        || self.options.contains(ParserOptions::RECURSE_ALL_MESSAGE)
                    {
                        debug!("entering nested headers");
                        self.phase = Phase::NestedHeaders;
                        self.curr_ctype = ContentType::Text;
                        self.curr_stype = ContentSubtype::Plain;
                        self.curr_encoding = Encoding::SevenBit;
                        self.curr_domain = Domain::SevenBit;
                    } else {
                        self.phase = Phase::Body;
                    }
                }
                ContentType::Multipart => {
                    self.phase = Phase::Body;
                    self.curr_ctype = ContentType::Other;
                    self.curr_stype = ContentSubtype::Other;
                    self.curr_encoding = Encoding::SevenBit;
                    self.curr_domain = Domain::SevenBit;
                }
                _ => self.phase = Phase::Body,
            },
            RecordKind::TextComplete => {
                // Stray text inside the header block.
                self.sink.body_out(RecordKind::TextComplete, b"");
                self.phase = Phase::Body;
            }
            RecordKind::TextContinued | RecordKind::NonText => {
                self.phase = Phase::Body;
            }
        }

        self.prev_kind = record.kind;
        debug!(phase = ?self.phase, "entering body phase");

        if record.kind == RecordKind::NonText {
            self.process_body_phase(record);
        }
    }

    fn process_body_phase(&mut self, record: Record) {
        if self.options.contains(ParserOptions::REPORT_8BIT_IN_7BIT_BODY)
            && self.curr_encoding == Encoding::SevenBit
            && !self.eight_bit_body_raised
            && has_high_bit(&record.bytes)
        {
            warn!("8-bit byte in nominally 7-bit body");
            self.err_flags.insert(ErrFlags::EIGHT_BIT_IN_7BIT_BODY);
            self.eight_bit_body_raised = true;
        }

        if record.kind != RecordKind::NonText
            && self.stack.depth() > 0
            && self.prev_kind != RecordKind::TextContinued
        {
            match self.stack.matches(&record.bytes) {
                BoundaryMatch::Open(depth) => {
                    self.stack.truncate(depth + 1);
                    let entry = self.stack.top().expect("boundary entry just kept").clone();
                    debug!(depth, "multipart boundary opens a part");
                    self.phase = Phase::MultipartHeaders;
                    self.curr_ctype = entry.default_ctype;
                    self.curr_stype = entry.default_stype;
                    self.curr_encoding = Encoding::SevenBit;
                    self.curr_domain = Domain::SevenBit;
                    self.prev_kind = record.kind;
                    return;
                }
                BoundaryMatch::Close(depth) => {
                    self.stack.truncate(depth);
                    debug!(depth, "multipart boundary closes a part");
                    self.phase = Phase::Body;
                    self.curr_ctype = ContentType::Other;
                    self.curr_stype = ContentSubtype::Other;
                    self.curr_encoding = Encoding::SevenBit;
                    self.curr_domain = Domain::SevenBit;
                    self.prev_kind = record.kind;
                    return;
                }
                BoundaryMatch::None => {}
            }
        }

        if record.kind != RecordKind::NonText {
            if self.options.contains(ParserOptions::DOWNGRADE) && self.curr_domain != Domain::SevenBit {
                let complete = record.kind == RecordKind::TextComplete;
                let downgrader = &mut self.downgrader;
                let sink = &mut self.sink;
                downgrader.process_line(&record.bytes, complete, |chunk| {
                    sink.body_out(RecordKind::TextComplete, chunk);
                });
            } else {
                self.sink.body_out(record.kind, &record.bytes);
            }
        }

        if record.kind == RecordKind::NonText {
            self.sink.body_end();
        }

        self.prev_kind = record.kind;
    }
}
