/// Receives the human readable progress and failure messages of a provisioning run
///
/// Any `FnMut(&str)` closure is a sink:
/// ```
/// use dcprovision_provision::MessageSink;
///
/// let mut seen = vec![];
/// let mut sink = |text: &str| seen.push(text.to_owned());
/// sink.message("Setting up secrets.ldb");
/// assert_eq!(seen, vec!["Setting up secrets.ldb"]);
/// ```
pub trait MessageSink {
    /// Delivers one message
    fn message(&mut self, text: &str);
}

impl<F> MessageSink for F
where
    F: FnMut(&str),
{
    fn message(&mut self, text: &str) {
        self(text)
    }
}

/// Discards every message (they still reach the log)
#[derive(Debug, Clone, Copy, Default)]
pub struct Quiet;

impl MessageSink for Quiet {
    fn message(&mut self, _text: &str) {}
}
