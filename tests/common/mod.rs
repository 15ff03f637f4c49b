use mime_mill::{HeaderDescriptor, HeaderKind, Phase, RecordKind, Sink};
use tracing_subscriber::prelude::*;

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Default)]
pub struct TestSink {
    pub heads: Vec<(Phase, Option<HeaderKind>, Vec<u8>)>,
    pub head_ends: usize,
    pub bodies: Vec<(RecordKind, Vec<u8>)>,
    pub body_ends: usize,
}

impl Sink for TestSink {
    fn head_out(&mut self, phase: Phase, descriptor: Option<&HeaderDescriptor>, buffer: &mut Vec<u8>) {
        self.heads.push((phase, descriptor.map(|d| d.kind), buffer.clone()));
    }

    fn body_out(&mut self, kind: RecordKind, bytes: &[u8]) {
        self.bodies.push((kind, bytes.to_vec()));
    }

    fn head_end(&mut self) {
        self.head_ends += 1;
    }

    fn body_end(&mut self) {
        self.body_ends += 1;
    }
}

impl TestSink {
    pub fn body_text(&self) -> Vec<u8> {
        self.bodies.iter().flat_map(|(_, b)| b.iter().copied()).collect()
    }
}

#[allow(dead_code)]
pub fn feed_lines(
    parser: &mut mime_mill::Parser<TestSink>,
    lines: &[&[u8]],
) {
    for line in lines {
        parser.update(mime_mill::Record::text_complete(line.to_vec()));
    }
    parser.update(mime_mill::Record::non_text());
}
