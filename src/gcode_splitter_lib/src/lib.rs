use std::fs;
use std::io::{self, BufRead, Seek};
use std::path::PathBuf;
use std::time::Instant;

pub mod body;
pub mod detect;
pub mod error;
pub mod output;
pub mod regions;
pub mod segmenter;
pub mod thresholds;

pub use body::{BodyState, BodyTracker, PostfixMarker};
pub use detect::detect_z;
pub use error::{Result, SplitError};
pub use output::{FileSegmentSink, InputNames, MemorySegmentSink, OutputTemplate, SegmentSink};
pub use regions::{RegionScanner, Regions};
pub use segmenter::{split_bytes, split_text, Segmenter, SegmenterConfig, SplitSummary};
pub use thresholds::{SplitPoint, ThresholdQueue, Thresholds};

// Heights are compared, never accumulated, so f64 is plenty; kept as an alias so it reads as a
// unit at call sites.
pub use f64 as Mm;

const INPUT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Everything a run needs, as built by the command line.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub input: PathBuf,
    pub thresholds: Thresholds,
    /// Used as-is instead of scanning the input. Empty counts as not given.
    pub prefix: Option<String>,
    /// Used as-is instead of scanning the input. Empty counts as not given.
    pub postfix: Option<String>,
    pub template: OutputTemplate,
    pub output_dir: PathBuf,
    pub postfix_marker: PostfixMarker,
}

impl SplitOptions {
    pub fn new(input: impl Into<PathBuf>, thresholds: Thresholds) -> SplitOptions {
        SplitOptions {
            input: input.into(),
            thresholds,
            prefix: None,
            postfix: None,
            template: OutputTemplate::default(),
            output_dir: PathBuf::from("."),
            postfix_marker: PostfixMarker::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitReport {
    pub summary: SplitSummary,
    pub boilerplate: Regions,
    /// Output files in part order.
    pub outputs: Vec<PathBuf>,
}

/// Overrides win outright; only the blocks without one get scanned for. Leaves `reader` rewound.
pub fn resolve_boilerplate<R: BufRead + Seek>(
    reader: &mut R,
    prefix_override: Option<String>,
    postfix_override: Option<String>,
) -> io::Result<Regions> {
    let prefix_override = prefix_override.filter(|p| !p.is_empty());
    let postfix_override = postfix_override.filter(|p| !p.is_empty());

    let scan_prefix = prefix_override.is_none();
    let scan_postfix = postfix_override.is_none();
    let scanned = if scan_prefix || scan_postfix {
        log::debug!("scanning input for annotated prefix: {} postfix: {}", scan_prefix, scan_postfix);
        RegionScanner::new(scan_prefix, scan_postfix).scan_reader(reader)?
    } else {
        log::debug!("prefix and postfix both given, not scanning");
        Regions::default()
    };

    if prefix_override.is_some() {
        log::debug!("using prefix from options");
    }
    if postfix_override.is_some() {
        log::debug!("using postfix from options");
    }

    Ok(Regions {
        prefix: prefix_override.map(String::into_bytes).or(scanned.prefix),
        postfix: postfix_override.map(String::into_bytes).or(scanned.postfix),
    })
}

/// Splits `options.input` into one file per part.
pub fn split_file(options: SplitOptions) -> Result<SplitReport> {
    let SplitOptions { input, thresholds, prefix, postfix, template, output_dir, postfix_marker } = options;

    let file = fs::File::open(&input).map_err(|source| SplitError::InputUnavailable { path: input.clone(), source })?;
    let mut reader = io::BufReader::with_capacity(INPUT_BUFFER_CAPACITY, file);

    // nothing has been split yet, so a scan failure is at line 0
    let boilerplate = resolve_boilerplate(&mut reader, prefix, postfix)
        .map_err(|source| SplitError::InputRead { path: input.clone(), line: 0, source })?;
    log::debug!("prefix: {:?}", boilerplate.prefix.as_deref().map(String::from_utf8_lossy));
    log::debug!("postfix: {:?}", boilerplate.postfix.as_deref().map(String::from_utf8_lossy));

    if !template.has_part_number() {
        log::warn!(
            "output file name '{}' has no {{part_number}}; every part will overwrite the last",
            template.as_str()
        );
    }

    let config = SegmenterConfig {
        prefix: boilerplate.prefix.clone(),
        postfix: boilerplate.postfix.clone(),
        postfix_marker,
    };
    let sink = FileSegmentSink::new(output_dir, template, &input);

    log::info!("splitting {}...", input.display());
    let before_split = Instant::now();
    let (summary, sink) = Segmenter::new(config, thresholds, sink).run(&input, reader)?;
    log::info!(
        "done splitting - lines: {} layers: {} parts: {} elapsed: {:.2?}",
        summary.lines_read,
        summary.layers,
        summary.segments,
        before_split.elapsed()
    );

    if summary.body_lines == 0 && summary.lines_read > 0 {
        log::warn!("no body lines were written; is there a '; END_PREFIX' line after the prefix?");
    }
    for unused in &summary.unused {
        log::warn!("split at {} never happened; the input doesn't get that far", unused);
    }

    Ok(SplitReport { summary, boilerplate, outputs: sink.into_written() })
}
