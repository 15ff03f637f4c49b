//! Header-name recognizer and header interpreter
//!
//! `recognize` turns a completed header buffer into a `HeaderDescriptor`;
//! `interpret_content_type`/`interpret_content_transfer_encoding` read a
//! recognized header's value and update the parser's current content-type
//! and encoding state, pushing boundary entries where appropriate.

use crate::boundary::BoundaryStack;
use crate::token::{self, Token};

const CTYPE_SPECIALS: &[u8] = b"()<>@,;:\"/[]?=";

/// The top-level content type of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Other,
    Text,
    Message,
    Multipart,
}

/// The subtype of an entity, restricted to the values the driver acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSubtype {
    Other,
    Plain,
    Rfc822,
    Partial,
    ExternalBody,
}

/// The declared `Content-Transfer-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
}

/// The 7/8/binary projection of an [`Encoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    SevenBit,
    EightBit,
    Binary,
}

impl Encoding {
    pub fn domain(self) -> Domain {
        match self {
            Encoding::SevenBit => Domain::SevenBit,
            Encoding::EightBit => Domain::EightBit,
            Encoding::Binary => Domain::Binary,
            Encoding::QuotedPrintable => Domain::SevenBit,
            Encoding::Base64 => Domain::SevenBit,
        }
    }
}

/// What a recognized header is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    ContentType,
    ContentTransferEncoding,
    MimeVersion,
    Other,
}

/// A recognized header's name and role.
#[derive(Debug, Clone)]
pub struct HeaderDescriptor {
    pub name: Vec<u8>,
    pub kind: HeaderKind,
}

/// External collaborator mapping a completed header buffer to a descriptor.
pub trait HeaderRecognizer {
    /// `header` is the accumulated `Name: value...` buffer (with `\n`
    /// between folded fragments). Returns `None` if no header name could
    /// be extracted (should not happen for buffers the driver already
    /// validated via `is_header`).
    fn recognize(&self, header: &[u8]) -> Option<HeaderDescriptor>;
}

/// The crate's built-in recognizer: lowercases the name and special-cases
/// the three headers the interpreter and callers care about.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRecognizer;

impl HeaderRecognizer for DefaultRecognizer {
    fn recognize(&self, header: &[u8]) -> Option<HeaderDescriptor> {
        let colon = header.iter().position(|&b| b == b':')?;
        let raw = &header[..colon];
        let name: Vec<u8> = raw.iter().map(|b| b.to_ascii_lowercase()).collect();
        let kind = match name.as_slice() {
            b"content-type" => HeaderKind::ContentType,
            b"content-transfer-encoding" => HeaderKind::ContentTransferEncoding,
            b"mime-version" => HeaderKind::MimeVersion,
            _ => HeaderKind::Other,
        };
        Some(HeaderDescriptor { name, kind })
    }
}

/// Interprets a `Content-Type` header value, updating the container's own
/// type/subtype and pushing boundary stack entries for `multipart/*`.
///
/// Returns `(ctype, stype, nesting_hit)`; `nesting_hit` is `true` if one or
/// more `boundary=` attributes could not be pushed because `max_depth` was
/// already reached.
pub fn interpret_content_type(
    value: &[u8],
    stack: &mut BoundaryStack,
    max_depth: usize,
    max_boundary_len: usize,
) -> (ContentType, ContentSubtype, bool) {
    let mut pos = 0usize;
    let mut toks = Vec::new();
    let n = token::scan(value, &mut pos, 3, CTYPE_SPECIALS, b';', &mut toks);

    if toks.first().is_some_and(|t| t.is_atom_ci(b"text")) {
        let stype = if toks.get(1).is_some_and(|t| t.is_delimiter(b'/'))
            && toks.get(2).is_some_and(|t| t.is_atom_ci(b"plain"))
        {
            ContentSubtype::Plain
        } else {
            ContentSubtype::Other
        };
        return (ContentType::Text, stype, false);
    }

    if toks.first().is_some_and(|t| t.is_atom_ci(b"message")) {
        let mut stype = ContentSubtype::Other;
        if toks.get(1).is_some_and(|t| t.is_delimiter(b'/')) {
            if let Some(Token::Atom(a)) = toks.get(2) {
                if a.eq_ignore_ascii_case(b"rfc822") {
                    stype = ContentSubtype::Rfc822;
                } else if a.eq_ignore_ascii_case(b"partial") {
                    stype = ContentSubtype::Partial;
                } else if a.eq_ignore_ascii_case(b"external-body") {
                    stype = ContentSubtype::ExternalBody;
                }
            }
        }
        return (ContentType::Message, stype, false);
    }

    if toks.first().is_some_and(|t| t.is_atom_ci(b"multipart")) {
        let is_digest = toks.get(1).is_some_and(|t| t.is_delimiter(b'/'))
            && toks.get(2).is_some_and(|t| t.is_atom_ci(b"digest"));
        let (def_ctype, def_stype) = if is_digest {
            (ContentType::Message, ContentSubtype::Rfc822)
        } else {
            (ContentType::Text, ContentSubtype::Plain)
        };

        let mut nesting_hit = false;
        let mut terminator_found = n >= 0;
        while terminator_found {
            let mut attr = Vec::new();
            let r = token::scan(value, &mut pos, 3, CTYPE_SPECIALS, b';', &mut attr);
            if attr.len() >= 3 && attr[0].is_atom_ci(b"boundary") && attr[1].is_delimiter(b'=') {
                if let Token::Atom(boundary) = &attr[2] {
                    let truncated = &boundary[..boundary.len().min(max_boundary_len)];
                    if !stack.push(def_ctype, def_stype, truncated, max_depth) {
                        nesting_hit = true;
                    }
                }
            }
            terminator_found = r >= 0;
        }
        return (ContentType::Multipart, ContentSubtype::Other, nesting_hit);
    }

    (ContentType::Other, ContentSubtype::Other, false)
}

/// Interprets a `Content-Transfer-Encoding` header value. Returns `None`
/// for an unrecognized value, leaving the caller's current encoding/domain
/// untouched.
pub fn interpret_content_transfer_encoding(value: &[u8]) -> Option<Encoding> {
    let mut pos = 0usize;
    let mut toks = Vec::new();
    token::scan(value, &mut pos, 1, &[], 0, &mut toks);
    let atom = toks.first()?;
    if atom.is_atom_ci(b"7bit") {
        Some(Encoding::SevenBit)
    } else if atom.is_atom_ci(b"8bit") {
        Some(Encoding::EightBit)
    } else if atom.is_atom_ci(b"binary") {
        Some(Encoding::Binary)
    } else if atom.is_atom_ci(b"quoted-printable") {
        Some(Encoding::QuotedPrintable)
    } else if atom.is_atom_ci(b"base64") {
        Some(Encoding::Base64)
    } else {
        None
    }
}
