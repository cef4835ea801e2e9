//! A pluggable print sink so `print`/`println` output can be captured in
//! tests instead of always going to stdout.

pub trait PrintSink {
    fn print(&mut self, text: &str);
}

#[derive(Debug, Default)]
pub struct StdoutSink;

impl PrintSink for StdoutSink {
    fn print(&mut self, text: &str) {
        print!("{text}");
    }
}

/// Collects everything written to it, for test assertions.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub buffer: String,
}

impl PrintSink for CollectSink {
    fn print(&mut self, text: &str) {
        self.buffer.push_str(text);
    }
}
