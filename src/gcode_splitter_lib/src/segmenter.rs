use crate::body::{BodyState, BodyTracker, PostfixMarker};
use crate::detect::detect_z;
use crate::error::{Result, SplitError};
use crate::output::{MemorySegmentSink, SegmentSink};
use crate::thresholds::{SplitPoint, Thresholds};
use ordered_float::OrderedFloat;
use std::io::{self, BufRead, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmenterConfig {
    /// Written at the start of every segment.
    pub prefix: Option<Vec<u8>>,
    /// Written at the end of every segment.
    pub postfix: Option<Vec<u8>>,
    pub postfix_marker: PostfixMarker,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitSummary {
    pub segments: u32,
    pub lines_read: u64,
    pub body_lines: u64,
    /// Vertical moves seen in the body.
    pub layers: u64,
    /// Thresholds the input never got past.
    pub unused: Vec<SplitPoint>,
}

/// One forward pass over the input: classify, detect, maybe roll over, write.
///
/// Holds at most one open segment. A rollover finishes the current segment (postfix, then
/// `close_segment`) before the next one is opened. Lines are raw bytes and go out exactly as they
/// came in.
pub struct Segmenter<S: SegmentSink> {
    sink: S,
    prefix: Option<Vec<u8>>,
    postfix: Option<Vec<u8>>,
    thresholds: Thresholds,
    tracker: BodyTracker,
    current: Option<S::Segment>,
    part: u32,
    layers: u64,
    lines_read: u64,
    body_lines: u64,
    // last body line written had no newline (only possible at end of input)
    unterminated: bool,
}

impl<S: SegmentSink> Segmenter<S> {
    pub fn new(config: SegmenterConfig, thresholds: Thresholds, sink: S) -> Segmenter<S> {
        let tracker = BodyTracker::new(config.prefix.as_deref(), config.postfix_marker);
        Segmenter {
            sink,
            prefix: config.prefix.filter(|p| !p.is_empty()),
            postfix: config.postfix.filter(|p| !p.is_empty()),
            thresholds,
            tracker,
            current: None,
            part: 0,
            layers: 0,
            lines_read: 0,
            body_lines: 0,
            unterminated: false,
        }
    }

    /// Splits everything `reader` yields; `input` only names it in errors.
    ///
    /// On error, segments already closed stay as they are and the open one is left truncated.
    pub fn run<R: BufRead>(mut self, input: &Path, mut reader: R) -> Result<(SplitSummary, S)> {
        self.open()?;

        let mut line = vec![];
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line).map_err(|source| SplitError::InputRead {
                path: input.to_path_buf(),
                line: self.lines_read,
                source,
            })?;
            if read == 0 {
                break;
            }
            self.lines_read += 1;
            self.process_line(&line)?;
        }

        self.close()?;

        let summary = SplitSummary {
            segments: self.part + 1,
            lines_read: self.lines_read,
            body_lines: self.body_lines,
            layers: self.layers,
            unused: self.thresholds.remaining(),
        };
        Ok((summary, self.sink))
    }

    fn process_line(&mut self, line: &[u8]) -> Result<()> {
        if self.tracker.observe(line) == BodyState::InBoilerplate {
            return Ok(());
        }

        if let Some(z) = detect_z(line) {
            self.layers += 1;
            log::debug!("line {}: Z{} (layer {})", self.lines_read, z, self.layers);

            // Both checks can fire on one line; that gives a segment with nothing but boilerplate.
            if let Some(height) = self.thresholds.heights.head() {
                if self.thresholds.heights.is_exceeded_by(OrderedFloat(z)) {
                    log::debug!(
                        "splitting at {}mm, actual height {} ({})",
                        height,
                        z,
                        String::from_utf8_lossy(line).trim_end()
                    );
                    self.rollover()?;
                    self.thresholds.heights.pop();
                }
            }
            if let Some(layer) = self.thresholds.layers.head() {
                if self.thresholds.layers.is_exceeded_by(self.layers) {
                    log::debug!("splitting at layer {} (past {})", self.layers, layer);
                    self.rollover()?;
                    self.thresholds.layers.pop();
                }
            }
        }

        self.write(line)?;
        self.unterminated = !line.ends_with(b"\n");
        self.body_lines += 1;
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        debug_assert!(self.current.is_none());
        self.current = Some(self.sink.open_segment(self.part)?);
        self.unterminated = false;
        if let Some(prefix) = self.prefix.take() {
            let written = self.write(&prefix);
            self.prefix = Some(prefix);
            written?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(postfix) = self.postfix.take() {
            if self.unterminated {
                log::warn!(
                    "the last line of the input has no line ending, so the postfix starts on that same line in {}",
                    self.sink.describe(self.part)
                );
            }
            let written = self.write(&postfix);
            self.postfix = Some(postfix);
            written?;
        }
        if let Some(segment) = self.current.take() {
            self.sink.close_segment(self.part, segment)?;
        }
        Ok(())
    }

    fn rollover(&mut self) -> Result<()> {
        log::debug!("rolling over from part {} to part {}", self.part, self.part + 1);
        self.close()?;
        self.part += 1;
        self.open()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let part = self.part;
        let result = match self.current.as_mut() {
            Some(segment) => segment.write_all(bytes),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no segment is open")),
        };
        result.map_err(|source| SplitError::OutputUnavailable { target: self.sink.describe(part), source })
    }
}

/// Splits an in-memory document, handing back each segment's bytes.
pub fn split_bytes(
    bytes: &[u8],
    config: SegmenterConfig,
    thresholds: Thresholds,
) -> Result<(SplitSummary, Vec<Vec<u8>>)> {
    let segmenter = Segmenter::new(config, thresholds, MemorySegmentSink::new());
    let (summary, sink) = segmenter.run(Path::new("<memory>"), bytes)?;
    Ok((summary, sink.into_segments()))
}

/// [`split_bytes`] for text; segments are converted back lossily.
pub fn split_text(text: &str, config: SegmenterConfig, thresholds: Thresholds) -> Result<(SplitSummary, Vec<String>)> {
    let (summary, segments) = split_bytes(text.as_bytes(), config, thresholds)?;
    let segments = segments.iter().map(|s| String::from_utf8_lossy(s).into_owned()).collect();
    Ok((summary, segments))
}
