mod common;

use common::TestSink;
use mime_mill::{ErrFlags, Parser, ParserLimits, ParserOptions, Record};

#[test]
fn message_partial_in_nonseven_bit_domain_raises_encoding_domain() {
    // cond_a: message/partial (or external-body) declared in a domain
    // other than SevenBit.
    let sink = TestSink::default();
    let mut parser = Parser::new(
        ParserOptions::REPORT_ENCODING_DOMAIN,
        ParserLimits::default(),
        sink,
    );

    parser.update(Record::text_complete(b"Content-Type: message/partial".to_vec()));
    parser.update(Record::text_complete(
        b"Content-Transfer-Encoding: 8bit".to_vec(),
    ));
    let flags = parser.update(Record::text_complete(b"".to_vec()));
    parser.update(Record::non_text());

    assert!(flags.contains(ErrFlags::ENCODING_DOMAIN));
}

#[test]
fn message_rfc822_with_transformed_encoding_raises_encoding_domain() {
    // cond_b: a message/* other than partial/external-body declaring a
    // transformation (quoted-printable or base64).
    let sink = TestSink::default();
    let mut parser = Parser::new(
        ParserOptions::REPORT_ENCODING_DOMAIN,
        ParserLimits::default(),
        sink,
    );

    parser.update(Record::text_complete(b"Content-Type: message/rfc822".to_vec()));
    parser.update(Record::text_complete(
        b"Content-Transfer-Encoding: base64".to_vec(),
    ));
    let flags = parser.update(Record::text_complete(b"".to_vec()));
    parser.update(Record::non_text());

    assert!(flags.contains(ErrFlags::ENCODING_DOMAIN));
}

#[test]
fn multipart_with_transformed_encoding_raises_encoding_domain() {
    // cond_c: a multipart/* declaring a transformation.
    let sink = TestSink::default();
    let mut parser = Parser::new(
        ParserOptions::REPORT_ENCODING_DOMAIN,
        ParserLimits::default(),
        sink,
    );

    parser.update(Record::text_complete(
        br#"Content-Type: multipart/mixed; boundary="X""#.to_vec(),
    ));
    parser.update(Record::text_complete(
        b"Content-Transfer-Encoding: quoted-printable".to_vec(),
    ));
    let flags = parser.update(Record::text_complete(b"".to_vec()));
    parser.update(Record::non_text());

    assert!(flags.contains(ErrFlags::ENCODING_DOMAIN));
}

#[test]
fn without_the_report_option_encoding_domain_is_never_raised() {
    let sink = TestSink::default();
    let mut parser = Parser::new(ParserOptions::empty(), ParserLimits::default(), sink);

    parser.update(Record::text_complete(b"Content-Type: message/rfc822".to_vec()));
    parser.update(Record::text_complete(
        b"Content-Transfer-Encoding: base64".to_vec(),
    ));
    let flags = parser.update(Record::text_complete(b"".to_vec()));
    parser.update(Record::non_text());

    assert!(!flags.contains(ErrFlags::ENCODING_DOMAIN));
}

#[test]
fn error_text_places_encoding_domain_below_every_other_flag() {
    assert_eq!(
        mime_mill::error_text(ErrFlags::ENCODING_DOMAIN),
        "an entity declared an inconsistent content-transfer-encoding for its composite type"
    );
    // ENCODING_DOMAIN is the lowest-severity flag: it must never win over
    // any other flag raised alongside it.
    assert_eq!(
        mime_mill::error_text(ErrFlags::ENCODING_DOMAIN | ErrFlags::EIGHT_BIT_IN_7BIT_BODY),
        "a nominally 7-bit body contained an 8-bit byte"
    );
    assert_eq!(
        mime_mill::error_text(ErrFlags::ENCODING_DOMAIN | ErrFlags::EIGHT_BIT_IN_HEADER),
        "a header contained an 8-bit byte"
    );
    assert_eq!(
        mime_mill::error_text(ErrFlags::ENCODING_DOMAIN | ErrFlags::TRUNC_HEADER),
        "a header exceeded the configured size limit and was truncated"
    );
    assert_eq!(
        mime_mill::error_text(ErrFlags::ENCODING_DOMAIN | ErrFlags::NESTING),
        "boundary nesting limit exceeded"
    );
}
