#![forbid(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use structopt::StructOpt;

use ripflate::{
    compress_to, decompress, DecoderOptions, DeflateReader, Destination, Format, Source, Status,
};

#[derive(StructOpt, Debug)]
#[structopt(name = "ripflate", about = "Compress or decompress deflate, zlib and gzip streams")]
struct Opts {
    /// Decompress instead of compressing
    #[structopt(short = "d", long)]
    decompress: bool,

    /// Write to stdout even when an output path is given
    #[structopt(short = "c", long)]
    stdout: bool,

    /// Stream framing: raw, zlib or gzip
    #[structopt(short = "f", long, default_value = "gzip")]
    format: Format,

    /// Decode one byte per step and resolve back-references by re-reading the output file
    #[structopt(long)]
    seek_back: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: usize,

    #[structopt(parse(from_os_str))]
    input: PathBuf,

    #[structopt(parse(from_os_str))]
    output: Option<PathBuf>,
}

fn open_output(opts: &Opts) -> Result<Box<dyn Write>> {
    Ok(match &opts.output {
        Some(path) if !opts.stdout => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        _ => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

/// Decodes straight into the output file, one byte per step.
fn decompress_seek_back(opts: &Opts, input: File) -> Result<u64> {
    let path = opts
        .output
        .as_ref()
        .context("--seek-back needs an output path")?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut reader = DeflateReader::new(
        Source::reader(BufReader::new(input)),
        Destination::seekable(file),
        DecoderOptions::new(),
    );
    match opts.format {
        Format::Raw => {}
        Format::Zlib => {
            reader.parse_zlib_header()?;
        }
        Format::Gzip => {
            reader.parse_gzip_header()?;
        }
    }
    while let Status::More(_) = reader.decode_step(1)? {}
    Ok(reader.total_out())
}

fn run(opts: &Opts) -> Result<()> {
    let input = File::open(&opts.input)
        .with_context(|| format!("opening {}", opts.input.display()))?;

    if !opts.decompress {
        let mut data = Vec::new();
        BufReader::new(input).read_to_end(&mut data)?;
        let mut output = compress_to(&data, opts.format, open_output(opts)?)?;
        output.flush()?;
        info!("compressed {} bytes", data.len());
        return Ok(());
    }

    let written = if opts.seek_back {
        decompress_seek_back(opts, input)?
    } else {
        decompress(BufReader::new(input), open_output(opts)?, opts.format)?
    };
    info!("decompressed {} bytes", written);
    Ok(())
}

fn main() -> Result<()> {
    let opts = Opts::from_args();
    stderrlog::new()
        .verbosity(opts.verbose)
        .init()
        .context("initializing logger")?;
    run(&opts)
}
