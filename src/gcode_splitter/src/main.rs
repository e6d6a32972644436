use anyhow::Context;
use clap::Parser;
use gcode_splitter_lib as gs;
use std::path::PathBuf;
use std::process::ExitCode;

const AFTER_HELP: &str = "\
The input file can carry annotations that make it easier to split. Each one goes on a line of its own:
  '; START_PREFIX'  - start of the prefix
  '; END_PREFIX'    - end of the prefix
  '; START_POSTFIX' - start of the postfix
  '; END_POSTFIX'   - end of the postfix

If the prefix and/or postfix are annotated this way and not overridden on the command line, they are
found automatically and put at the start and end of every part. If they are not annotated, remove
them from the input by hand; a prefix or postfix with Z moves in it will otherwise split wrong.";

/// Split one gcode file into parts along height or layer boundaries, so the material can be
/// changed mid-print.
#[derive(Parser, Debug)]
#[command(
    name = "gcode_splitter",
    version,
    long_about = None,
    after_help = AFTER_HELP,
    disable_version_flag = true
)]
struct Args {
    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Output file name format. {input_file} is the input's base name minus extension,
    /// {input_file_full} is the base name with extension, {part_number} is the part number
    #[arg(short, long, value_name = "FORMAT", default_value = gs::OutputTemplate::DEFAULT)]
    output_file_name: String,

    /// Prefix commands for the start of each part (\n, \t, \r and \\ escapes are expanded)
    #[arg(long, value_name = "GCODE")]
    prefix: Option<String>,

    /// Postfix commands for the end of each part (\n, \t, \r and \\ escapes are expanded)
    #[arg(long, value_name = "GCODE")]
    postfix: Option<String>,

    /// Keep treating lines as body after a '; START_POSTFIX' annotation
    #[arg(long)]
    no_postfix_exit: bool,

    /// The gcode file to split
    file: PathBuf,

    /// Where to split: a height in mm (eg. 12.4mm) or a layer count (eg. 30l). The first layer of
    /// each new part is the first layer past the split
    #[arg(required = true, value_name = "SPLIT")]
    split: Vec<String>,
}

/// Expands the backslash escapes a shell won't, so `--prefix "G28\nG90"` is two lines.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn init_logging(debug: bool) {
    let level = if debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(args: Args) -> anyhow::Result<()> {
    let thresholds = gs::Thresholds::parse(&args.split)?;
    let template = gs::OutputTemplate::parse(&args.output_file_name)?;

    let mut options = gs::SplitOptions::new(&args.file, thresholds);
    options.template = template;
    options.prefix = args.prefix.as_deref().map(unescape);
    options.postfix = args.postfix.as_deref().map(unescape);
    if args.no_postfix_exit {
        options.postfix_marker = gs::PostfixMarker::Ignored;
    }

    let report = gs::split_file(options).with_context(|| format!("splitting {} failed", args.file.display()))?;
    for output in &report.outputs {
        log::info!("wrote {}", output.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);
    log::debug!("{:?}", args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
