mod common;

use common::TestSink;
use mime_mill::{HeaderKind, Parser, ParserLimits, ParserOptions, Phase, Record, RecordKind};

#[test]
fn simple_message_delivers_headers_then_body() {
    let sink = TestSink::default();
    let mut parser = Parser::new(ParserOptions::empty(), ParserLimits::default(), sink);

    for line in ["From: a@b", "To: c@d", "Subject: hi", ""] {
        parser.update(Record::text_complete(line.as_bytes().to_vec()));
    }
    for line in ["hello", "world"] {
        parser.update(Record::text_complete(line.as_bytes().to_vec()));
    }
    parser.update(Record::non_text());

    let sink = parser.into_sink();
    assert_eq!(sink.heads.len(), 3);
    assert_eq!(sink.heads[0].2, b"From:a@b");
    assert_eq!(sink.heads[1].2, b"To:c@d");
    assert_eq!(sink.heads[2].2, b"Subject:hi");
    assert!(sink.heads.iter().all(|(phase, kind, _)| {
        *phase == Phase::PrimaryHeaders && *kind == Some(HeaderKind::Other)
    }));
    assert_eq!(sink.head_ends, 1);
    assert_eq!(
        sink.bodies,
        vec![
            (RecordKind::TextComplete, b"hello".to_vec()),
            (RecordKind::TextComplete, b"world".to_vec()),
        ]
    );
    assert_eq!(sink.body_ends, 1);
}
