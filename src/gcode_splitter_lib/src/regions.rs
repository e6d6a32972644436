//! Finds the annotated prefix/postfix blocks in the input.
//!
//! A block is the text from a `; START_PREFIX` (or `; START_POSTFIX`) line through the next
//! `; END_PREFIX` (or `; END_POSTFIX`) line, both sentinel lines included. If either half of a
//! pair is missing the block is absent; we never hand back a partial block, otherwise a lone
//! start marker would swallow the rest of the file.
//!
//! Scanning is line-at-a-time and only the candidate block bytes are buffered, so reading stops as
//! soon as every block we're looking for has been resolved. Blocks are kept as raw bytes; gcode
//! comments aren't always UTF-8.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::io::{self, BufRead, Seek};
use std::mem;

static START_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^; START_PREFIX$").unwrap());
static END_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^; END_PREFIX$").unwrap());
static START_POSTFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^; START_POSTFIX$").unwrap());
static END_POSTFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^; END_POSTFIX$").unwrap());

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Regions {
    pub prefix: Option<Vec<u8>>,
    pub postfix: Option<Vec<u8>>,
}

/// The line without its `\n` / `\r\n` terminator.
pub(crate) fn line_content(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[derive(Debug)]
enum BlockState {
    Searching,
    Collecting(Vec<u8>),
    Found(Vec<u8>),
}

#[derive(Debug)]
struct BlockScan {
    start: &'static Regex,
    end: &'static Regex,
    state: BlockState,
}

impl BlockScan {
    fn new(start: &'static Regex, end: &'static Regex) -> BlockScan {
        BlockScan { start, end, state: BlockState::Searching }
    }

    fn feed(&mut self, line: &[u8]) {
        let content = line_content(line);
        match &mut self.state {
            BlockState::Searching => {
                if self.start.is_match(content) {
                    self.state = BlockState::Collecting(line.to_vec());
                }
            }
            BlockState::Collecting(text) => {
                text.extend_from_slice(line);
                if self.end.is_match(content) {
                    let text = mem::take(text);
                    self.state = BlockState::Found(text);
                }
            }
            BlockState::Found(_) => {}
        }
    }

    fn is_found(&self) -> bool {
        matches!(self.state, BlockState::Found(_))
    }

    fn finish(self) -> Option<Vec<u8>> {
        match self.state {
            BlockState::Found(text) => Some(text),
            // an unterminated block is no block at all
            BlockState::Searching | BlockState::Collecting(_) => None,
        }
    }
}

/// Feed it lines (terminators included) in order, then `finish()`.
#[derive(Debug)]
pub struct RegionScanner {
    prefix: Option<BlockScan>,
    postfix: Option<BlockScan>,
}

impl Default for RegionScanner {
    fn default() -> Self {
        RegionScanner::new(true, true)
    }
}

impl RegionScanner {
    /// Blocks passed as `false` aren't looked for and always come back `None`.
    pub fn new(scan_prefix: bool, scan_postfix: bool) -> RegionScanner {
        RegionScanner {
            prefix: scan_prefix.then(|| BlockScan::new(&START_PREFIX, &END_PREFIX)),
            postfix: scan_postfix.then(|| BlockScan::new(&START_POSTFIX, &END_POSTFIX)),
        }
    }

    pub fn feed(&mut self, line: &[u8]) {
        for block in [&mut self.prefix, &mut self.postfix].into_iter().flatten() {
            block.feed(line);
        }
    }

    /// True once there's nothing left that more input could change.
    pub fn is_done(&self) -> bool {
        self.prefix.as_ref().map_or(true, BlockScan::is_found)
            && self.postfix.as_ref().map_or(true, BlockScan::is_found)
    }

    pub fn finish(self) -> Regions {
        let regions = Regions {
            prefix: self.prefix.and_then(BlockScan::finish),
            postfix: self.postfix.and_then(BlockScan::finish),
        };
        log::debug!(
            "scanned regions - prefix: {} postfix: {}",
            describe(&regions.prefix),
            describe(&regions.postfix)
        );
        regions
    }

    pub fn scan_bytes(mut self, text: &[u8]) -> Regions {
        for line in text.split_inclusive(|&b| b == b'\n') {
            if self.is_done() {
                break;
            }
            self.feed(line);
        }
        self.finish()
    }

    /// Reads only as far as needed, then rewinds `reader` for the streaming pass.
    pub fn scan_reader<R: BufRead + Seek>(mut self, reader: &mut R) -> io::Result<Regions> {
        let mut line = vec![];
        let mut lines_read = 0u64;
        while !self.is_done() {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            lines_read += 1;
            self.feed(&line);
        }
        log::debug!("region scan read {} lines", lines_read);
        reader.rewind()?;
        Ok(self.finish())
    }
}

fn describe(block: &Option<Vec<u8>>) -> String {
    match block {
        Some(text) => format!("{} lines", text.iter().filter(|&&b| b == b'\n').count()),
        None => "absent".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read, SeekFrom};

    const ANNOTATED: &str = "\
; generated by slicer
; START_PREFIX
G28
G90
; END_PREFIX
G1 Z0.2
G1 X10 Y10
; START_POSTFIX
M104 S0
; END_POSTFIX
";

    fn scan(text: &str) -> Regions {
        RegionScanner::default().scan_bytes(text.as_bytes())
    }

    fn as_text(block: &Option<Vec<u8>>) -> Option<&str> {
        block.as_deref().map(|b| std::str::from_utf8(b).unwrap())
    }

    #[test]
    fn finds_both_blocks_inclusive() {
        let regions = scan(ANNOTATED);
        assert_eq!(as_text(&regions.prefix), Some("; START_PREFIX\nG28\nG90\n; END_PREFIX\n"));
        assert_eq!(as_text(&regions.postfix), Some("; START_POSTFIX\nM104 S0\n; END_POSTFIX\n"));
    }

    #[test]
    fn lone_sentinels_yield_nothing() {
        assert_eq!(scan("; START_PREFIX\nG28\nG1 Z1\n"), Regions::default());
        assert_eq!(scan("G28\n; END_PREFIX\nG1 Z1\n; END_POSTFIX\n"), Regions::default());
    }

    #[test]
    fn end_before_start_is_not_a_block() {
        assert_eq!(scan("; END_POSTFIX\nG1 Z1\n; START_POSTFIX\nM84\n").postfix, None);
    }

    #[test]
    fn stops_at_the_next_end_marker() {
        let regions = scan("; START_PREFIX\nA\n; END_PREFIX\nB\n; END_PREFIX\n");
        assert_eq!(as_text(&regions.prefix), Some("; START_PREFIX\nA\n; END_PREFIX\n"));
    }

    #[test]
    fn case_insensitive_and_crlf_tolerant() {
        let regions = scan("; start_prefix\r\nG28\r\n; End_Prefix\r\nG1 Z1\r\n");
        assert_eq!(as_text(&regions.prefix), Some("; start_prefix\r\nG28\r\n; End_Prefix\r\n"));
    }

    #[test]
    fn sentinel_must_be_the_whole_line() {
        assert_eq!(scan("; START_PREFIX here\nG28\n; END_PREFIX\n").prefix, None);
    }

    #[test]
    fn adjacent_sentinels_make_a_block() {
        let text = "; START_POSTFIX\n; END_POSTFIX\n";
        assert_eq!(as_text(&scan(text).postfix), Some(text));
    }

    #[test]
    fn unwanted_blocks_are_not_scanned() {
        let regions = RegionScanner::new(false, true).scan_bytes(ANNOTATED.as_bytes());
        assert_eq!(regions.prefix, None);
        assert!(regions.postfix.is_some());
    }

    #[test]
    fn blocks_keep_non_utf8_bytes() {
        let text = b"; START_POSTFIX\nM117 caf\xe9\n; END_POSTFIX\n";
        let regions = RegionScanner::default().scan_bytes(text);
        assert_eq!(regions.postfix.as_deref(), Some(&text[..]));
    }

    #[test]
    fn reader_scan_matches_byte_scan_and_rewinds() {
        let mut cursor = Cursor::new(ANNOTATED.as_bytes().to_vec());
        let from_reader = RegionScanner::default().scan_reader(&mut cursor).unwrap();
        assert_eq!(from_reader, scan(ANNOTATED));

        let mut all = String::new();
        cursor.read_to_string(&mut all).unwrap();
        assert_eq!(all, ANNOTATED);
    }

    /// Serves `data` up to `limit` bytes, then fails every read.
    struct ShortFuse {
        data: Cursor<Vec<u8>>,
        limit: u64,
    }

    impl Read for ShortFuse {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let left = self.limit.saturating_sub(self.data.position()) as usize;
            if left == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "read past the block"));
            }
            let n = buf.len().min(left);
            self.data.read(&mut buf[..n])
        }
    }

    impl Seek for ShortFuse {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.data.seek(pos)
        }
    }

    #[test]
    fn reader_scan_stops_once_resolved() {
        let block = "; START_PREFIX\nG28\n; END_PREFIX\n";
        let text = format!("{}{}", block, "G1 X1\n".repeat(1000));
        let fuse = ShortFuse { data: Cursor::new(text.into_bytes()), limit: block.len() as u64 };
        let mut reader = BufReader::new(fuse);

        let regions = RegionScanner::new(true, false).scan_reader(&mut reader).unwrap();
        assert_eq!(as_text(&regions.prefix), Some(block));
        assert_eq!(reader.stream_position().unwrap(), 0);
    }

    #[test]
    fn reader_scan_keeps_reading_while_a_block_is_missing() {
        let block = "; START_PREFIX\nG28\n; END_PREFIX\n";
        let text = format!("{}G1 X1\n", block);
        let fuse = ShortFuse { data: Cursor::new(text.into_bytes()), limit: block.len() as u64 };
        let mut reader = BufReader::new(fuse);

        assert!(RegionScanner::default().scan_reader(&mut reader).is_err());
    }
}
