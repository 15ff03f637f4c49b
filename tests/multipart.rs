mod common;

use common::TestSink;
use mime_mill::{HeaderKind, Parser, ParserLimits, ParserOptions, Phase, Record, RecordKind};

#[test]
fn two_part_message_opens_and_closes_boundaries() {
    let sink = TestSink::default();
    let mut parser = Parser::new(ParserOptions::empty(), ParserLimits::default(), sink);

    let lines: &[&str] = &[
        "Content-Type: multipart/mixed; boundary=XYZ",
        "",
        "preamble",
        "--XYZ",
        "Content-Type: text/plain",
        "",
        "part one",
        "--XYZ",
        "Content-Type: text/plain",
        "",
        "part two",
        "--XYZ--",
        "epilogue",
    ];
    for line in lines {
        parser.update(Record::text_complete(line.as_bytes().to_vec()));
    }
    parser.update(Record::non_text());

    let sink = parser.into_sink();
    assert_eq!(sink.heads.len(), 3);
    assert_eq!(sink.heads[0].0, Phase::PrimaryHeaders);
    assert_eq!(sink.heads[0].2, b"Content-Type:multipart/mixed; boundary=XYZ");
    assert_eq!(sink.heads[0].1, Some(HeaderKind::ContentType));
    assert_eq!(sink.heads[1].0, Phase::MultipartHeaders);
    assert_eq!(sink.heads[1].2, b"Content-Type:text/plain");
    assert_eq!(sink.heads[2].0, Phase::MultipartHeaders);
    assert_eq!(sink.heads[2].2, b"Content-Type:text/plain");
    assert_eq!(sink.head_ends, 1);

    assert_eq!(
        sink.bodies,
        vec![
            (RecordKind::TextComplete, b"preamble".to_vec()),
            (RecordKind::TextComplete, b"part one".to_vec()),
            (RecordKind::TextComplete, b"part two".to_vec()),
            (RecordKind::TextComplete, b"epilogue".to_vec()),
        ]
    );
    assert_eq!(sink.body_ends, 1);
}
