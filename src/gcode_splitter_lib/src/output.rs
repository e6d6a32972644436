//! Where segments go: the [`SegmentSink`] seam, plus file and in-memory sinks.

use crate::error::{Result, SplitError};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const OUTPUT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Hands out one writable segment per part number. The segmenter only ever holds one segment at a
/// time: it closes the old one before asking for the next.
pub trait SegmentSink {
    type Segment: Write;

    fn open_segment(&mut self, part: u32) -> Result<Self::Segment>;

    /// Must leave everything written to `segment` durable (flushed) before returning.
    fn close_segment(&mut self, part: u32, segment: Self::Segment) -> Result<()>;

    /// Human-readable name of a part, for errors and logging.
    fn describe(&self, part: u32) -> String {
        format!("part {}", part)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    InputFile,
    InputFileFull,
    PartNumber { width: usize, zero_pad: bool },
}

/// A parsed `--output-file-name` template.
///
/// Recognized placeholders: `{input_file}` (input base name minus extension), `{input_file_full}`
/// (input base name) and `{part_number}`, which can take a width like `{part_number:03}`. Use
/// `{{` / `}}` for literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    source: String,
    pieces: Vec<Piece>,
}

impl Default for OutputTemplate {
    fn default() -> Self {
        OutputTemplate {
            source: OutputTemplate::DEFAULT.to_owned(),
            pieces: vec![
                Piece::InputFile,
                Piece::Literal("-part".to_owned()),
                Piece::PartNumber { width: 0, zero_pad: false },
                Piece::Literal(".gcode".to_owned()),
            ],
        }
    }
}

impl OutputTemplate {
    pub const DEFAULT: &'static str = "{input_file}-part{part_number}.gcode";

    pub fn parse(template: &str) -> Result<OutputTemplate> {
        let mut pieces = vec![];
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(SplitError::template(template, "single '}' (use '}}' for a literal brace)")),
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => field.push(c),
                            None => return Err(SplitError::template(template, "unclosed '{'")),
                        }
                    }
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(parse_field(template, &field)?);
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(OutputTemplate { source: template.to_owned(), pieces })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Without a part number every segment renders to the same name.
    pub fn has_part_number(&self) -> bool {
        self.pieces.iter().any(|p| matches!(p, Piece::PartNumber { .. }))
    }

    pub fn render(&self, input: &InputNames, part: u32) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::InputFile => out.push_str(&input.stem),
                Piece::InputFileFull => out.push_str(&input.full),
                Piece::PartNumber { width, zero_pad: true } => {
                    out.push_str(&format!("{:0width$}", part, width = *width))
                }
                Piece::PartNumber { width, zero_pad: false } => {
                    out.push_str(&format!("{:>width$}", part, width = *width))
                }
            }
        }
        out
    }
}

fn parse_field(template: &str, field: &str) -> Result<Piece> {
    let (name, format_spec) = match field.split_once(':') {
        Some((name, spec)) => (name, Some(spec)),
        None => (field, None),
    };
    match (name, format_spec) {
        ("input_file", None) => Ok(Piece::InputFile),
        ("input_file_full", None) => Ok(Piece::InputFileFull),
        ("part_number", None) => Ok(Piece::PartNumber { width: 0, zero_pad: false }),
        ("part_number", Some(spec)) => {
            let digits = spec.strip_suffix('d').unwrap_or(spec);
            let width = if digits.is_empty() {
                0
            } else {
                digits
                    .parse()
                    .map_err(|_| SplitError::template(template, format!("bad width '{}' for part_number", spec)))?
            };
            Ok(Piece::PartNumber { width, zero_pad: digits.starts_with('0') })
        }
        ("input_file" | "input_file_full", Some(_)) => {
            Err(SplitError::template(template, format!("'{}' doesn't take a format", name)))
        }
        _ => Err(SplitError::template(
            template,
            format!("unknown placeholder '{{{}}}' (expected input_file, input_file_full or part_number)", field),
        )),
    }
}

/// The two spellings of the input file name a template can use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputNames {
    pub stem: String,
    pub full: String,
}

impl InputNames {
    pub fn from_path(input: &Path) -> InputNames {
        let full = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let stem = input.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| full.clone());
        InputNames { stem, full }
    }
}

/// Writes each part to `<dir>/<template rendered for part>`.
#[derive(Debug)]
pub struct FileSegmentSink {
    dir: PathBuf,
    template: OutputTemplate,
    names: InputNames,
    // canonical input path, so we never truncate the file we're reading from
    input: Option<PathBuf>,
    written: Vec<PathBuf>,
}

impl FileSegmentSink {
    pub fn new(dir: impl Into<PathBuf>, template: OutputTemplate, input: &Path) -> FileSegmentSink {
        FileSegmentSink {
            dir: dir.into(),
            template,
            names: InputNames::from_path(input),
            input: fs::canonicalize(input).ok(),
            written: vec![],
        }
    }

    pub fn path_for(&self, part: u32) -> PathBuf {
        self.dir.join(self.template.render(&self.names, part))
    }

    /// Every path created, in part order.
    pub fn into_written(self) -> Vec<PathBuf> {
        self.written
    }

    fn output_error(path: &Path, source: io::Error) -> SplitError {
        SplitError::OutputUnavailable { target: path.display().to_string(), source }
    }
}

impl SegmentSink for FileSegmentSink {
    type Segment = BufWriter<fs::File>;

    fn open_segment(&mut self, part: u32) -> Result<Self::Segment> {
        let path = self.path_for(part);
        if self.input.is_some() && fs::canonicalize(&path).ok() == self.input {
            let refused = io::Error::new(io::ErrorKind::AlreadyExists, "refusing to overwrite the input file");
            return Err(FileSegmentSink::output_error(&path, refused));
        }
        log::debug!("opening part {} as {}", part, path.display());
        let file = fs::File::create(&path).map_err(|e| FileSegmentSink::output_error(&path, e))?;
        self.written.push(path);
        Ok(BufWriter::with_capacity(OUTPUT_BUFFER_CAPACITY, file))
    }

    fn close_segment(&mut self, part: u32, mut segment: Self::Segment) -> Result<()> {
        segment.flush().map_err(|e| FileSegmentSink::output_error(&self.path_for(part), e))?;
        log::debug!("closed part {}", part);
        Ok(())
    }

    fn describe(&self, part: u32) -> String {
        self.path_for(part).display().to_string()
    }
}

/// Keeps finished segments in memory, in part order.
#[derive(Debug, Default)]
pub struct MemorySegmentSink {
    segments: Vec<Vec<u8>>,
}

impl MemorySegmentSink {
    pub fn new() -> MemorySegmentSink {
        MemorySegmentSink::default()
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Vec<u8>> {
        self.segments
    }
}

impl SegmentSink for MemorySegmentSink {
    type Segment = Vec<u8>;

    fn open_segment(&mut self, part: u32) -> Result<Self::Segment> {
        debug_assert_eq!(part as usize, self.segments.len());
        Ok(vec![])
    }

    fn close_segment(&mut self, _part: u32, segment: Self::Segment) -> Result<()> {
        self.segments.push(segment);
        Ok(())
    }
}
