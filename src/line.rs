//! Record framer
//!
//! Turns a byte stream into the `Record` sequence the driver consumes:
//! buffered line splitting on CR, LF or CRLF, plus `is_header` for
//! recognizing a syntactically valid header field name.

use std::io::Read;

/// The maximum line length (set to 1000 per RFC 5322)
const MAX_LINE_LEN: usize = 1000;
/// The size of the internal buffer
const BUFSIZ: usize = 4096;

/// The kind of a logical input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A complete logical line.
    TextComplete,
    /// The logical line is not yet terminated; its bytes concatenate with
    /// the following record.
    TextContinued,
    /// End of input, or an out-of-band marker forcing a flush to body state.
    NonText,
}

/// One input unit: a kind plus the bytes it carries (without any
/// end-of-line marker -- framing is the caller's responsibility, see
/// `§6.4`).
#[derive(Debug, Clone)]
pub struct Record {
    pub kind: RecordKind,
    pub bytes: Vec<u8>,
}

impl Record {
    pub fn text_complete(bytes: impl Into<Vec<u8>>) -> Self {
        Record {
            kind: RecordKind::TextComplete,
            bytes: bytes.into(),
        }
    }

    pub fn non_text() -> Self {
        Record {
            kind: RecordKind::NonText,
            bytes: Vec::new(),
        }
    }
}

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const CRLF: &[u8] = &[CR, LF];

#[inline]
fn without_eol(line: &[u8]) -> &[u8] {
    if line.ends_with(CRLF) {
        &line[0..(line.len() - 2)]
    } else if line.last().is_some_and(|b| *b == CR || *b == LF) {
        &line[0..(line.len() - 1)]
    } else {
        line
    }
}

/// Returns a non-negative prefix length if `bytes` begins with a
/// syntactically valid header field name (`33..=57 | 59..=126`, i.e. any
/// printable US-ASCII byte except `:`), optionally followed by whitespace,
/// then `:`. Returns 0 otherwise.
pub fn is_header(bytes: &[u8]) -> usize {
    let name_end = bytes
        .iter()
        .position(|&b| !matches!(b, 33..=57 | 59..=126))
        .unwrap_or(bytes.len());
    if name_end == 0 {
        return 0;
    }
    let mut pos = name_end;
    while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b':' {
        pos + 1
    } else {
        0
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "sse4.2")]
#[inline]
/// Returns the position of the first CR or LF - SSE4.2 version (unsafe)
unsafe fn get_line_len_fast(line: &[u8]) -> Option<usize> {
    let line = &line[0..line.len().min(MAX_LINE_LEN)];
    #[cfg(target_arch = "x86")]
    use std::arch::x86::{
        __m128i, _mm_cmpestri, _mm_lddqu_si128, _mm_load_si128, _mm_set1_epi16, _mm_srli_si128,
    };
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::{
        __m128i, _mm_cmpestri, _mm_lddqu_si128, _mm_load_si128, _mm_set1_epi16, _mm_srli_si128,
    };

    if line.is_empty() {
        return None;
    }
    let needle = unsafe { _mm_set1_epi16(0x0d0a) };
    if line.len() == 16 {
        // Special case, unaligned but faster
        let haystack = unsafe { _mm_lddqu_si128(line.as_ptr() as _) };
        let idx = unsafe { _mm_cmpestri(needle, 2, haystack, 16, 0) };
        if idx < 16 {
            return Some(idx as usize);
        } else {
            return None;
        }
    }

    let (head, aligned, mut tail): (&[u8], &[__m128i], &[u8]) =
        unsafe { line.align_to::<__m128i>() };
    if !head.is_empty() {
        let len = head.len();
        let hay_ptr = head.as_ptr() as usize & !15;
        let mut haystack = unsafe { _mm_load_si128(hay_ptr as _) };
        let garbage_len = head.as_ptr() as usize & 15;
        if garbage_len & 8 != 0 {
            haystack = unsafe { _mm_srli_si128(haystack, 8) };
        }
        if garbage_len & 4 != 0 {
            haystack = unsafe { _mm_srli_si128(haystack, 4) };
        }
        if garbage_len & 2 != 0 {
            haystack = unsafe { _mm_srli_si128(haystack, 2) };
        }
        if garbage_len & 1 != 0 {
            haystack = unsafe { _mm_srli_si128(haystack, 1) };
        }
        let idx = unsafe { _mm_cmpestri(needle, 2, haystack, len as i32, 0) };
        if idx < len as i32 {
            return Some(idx as usize);
        }
    }

    let mut pos = head.len();
    for chunk in aligned {
        let haystack = unsafe { _mm_load_si128(chunk as _) };
        let idx = unsafe { _mm_cmpestri(needle, 2, haystack, 16, 0) };
        if idx < 16 {
            return Some(pos + idx as usize);
        }
        pos += 16;
    }

    while !tail.is_empty() {
        let len = tail.len().min(16);
        let haystack = unsafe { _mm_load_si128(tail.as_ptr() as _) };
        let idx = unsafe { _mm_cmpestri(needle, 2, haystack, len as i32, 0) };
        if idx < len as i32 {
            return Some(pos + idx as usize);
        }
        pos += len;
        tail = &tail[len..];
    }

    None
}

#[inline]
/// Returns the position of the first CR or LF - regular version (safe)
fn get_line_len_slow(line: &[u8]) -> Option<usize> {
    line.iter()
        .take(MAX_LINE_LEN)
        .position(|&v| v == b'\n' || v == b'\r')
}

fn get_line_len_dispatch(line: &[u8]) -> Option<usize> {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("sse4.2") {
            return unsafe { get_line_len_fast(line) };
        }
    }
    get_line_len_slow(line)
}

/// A buffered record reader wrapping any `Read`.
///
/// Splits on CR, LF or CRLF and yields `Record`s with the end-of-line
/// marker stripped. The final record is always `RecordKind::NonText`.
pub struct RecordReader<R: Read> {
    r: R,
    buf: [u8; BUFSIZ],
    start: usize,
    end: usize,
    eof: bool,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(r: R) -> Self {
        Self {
            r,
            buf: [0; BUFSIZ],
            start: 0,
            end: 0,
            eof: false,
            done: false,
        }
    }

    fn fill_buf(&mut self) -> Result<(), std::io::Error> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        loop {
            let read = match self.r.read(&mut self.buf[self.end..]) {
                Ok(v) => v,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if read == 0 {
                self.eof = true;
            }
            self.end += read;
            break;
        }
        Ok(())
    }

    fn get_line_len(&self) -> Option<usize> {
        let line = &self.buf[self.start..self.end];
        if let Some(pos) = get_line_len_dispatch(line) {
            if self.buf[self.start + pos] == b'\n' {
                return Some(pos + 1);
            }
            if self.start + pos + 1 >= self.end {
                // need one more byte to disambiguate CR vs CRLF
            } else if self.buf[self.start + pos + 1] == b'\n' {
                return Some(pos + 2);
            } else {
                return Some(pos + 1);
            }
        }
        None
    }

    fn read_raw_line(&mut self) -> Result<&[u8], std::io::Error> {
        loop {
            if let Some(pos) = self.get_line_len() {
                let start = self.start;
                self.start += pos;
                return Ok(&self.buf[start..(start + pos)]);
            } else if self.end - self.start >= MAX_LINE_LEN {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Line too long",
                ));
            }
            self.fill_buf()?;
            if self.eof {
                let start = self.start;
                self.start = self.end;
                return Ok(&self.buf[start..self.end]);
            }
        }
    }

    /// Reads the next record. Once a `NonText` record has been returned,
    /// every subsequent call returns another `NonText` record.
    pub fn read_record(&mut self) -> Result<Record, std::io::Error> {
        if self.done {
            return Ok(Record::non_text());
        }
        let line = self.read_raw_line()?;
        if line.is_empty() {
            self.done = true;
            return Ok(Record::non_text());
        }
        Ok(Record::text_complete(without_eol(line)))
    }
}
