use std::{fs::File, io::{BufReader, BufWriter, Read, Write}, path::Path};
use anyhow::{Context, Result};

/// Open a FASTQ file, possibly compressed. Gzip is detected from the file
/// content, zstd from the `.zst` extension.
pub fn open_file_for_read<P: AsRef<Path>>(file: P) -> Result<Box<dyn Read + Send>> {
    let path = file.as_ref();
    let open = || File::open(path).with_context(|| format!("cannot open file: {}", path.display()));
    let reader: Box<dyn Read + Send> = match detect_compression(path)? {
        Some(Compression::Gzip) => Box::new(flate2::read::MultiGzDecoder::new(open()?)),
        Some(Compression::Zstd) => Box::new(
            zstd::stream::read::Decoder::new(open()?)
                .with_context(|| format!("cannot open zstd stream: {}", path.display()))?
        ),
        None => Box::new(open()?),
    };
    Ok(reader)
}

/// Determine the file compression type. Supports gzip and zstd.
fn detect_compression<P: AsRef<Path>>(file: P) -> Result<Option<Compression>> {
    let path = file.as_ref();
    let handle = File::open(path).with_context(|| format!("cannot open file: {}", path.display()))?;
    if flate2::read::MultiGzDecoder::new(BufReader::new(handle)).header().is_some() {
        Ok(Some(Compression::Gzip))
    } else if path.extension().is_some_and(|ext| ext == "zst") {
        Ok(Some(Compression::Zstd))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

impl Compression {
    /// Output compression implied by the file name. Anything that is neither
    /// `.gz` nor `.zst` is written uncompressed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("gz") => Some(Compression::Gzip),
            Some("zst") => Some(Compression::Zstd),
            _ => None,
        }
    }
}

/// An output stream that must be finished explicitly, so that errors while
/// writing the gzip trailer or the final zstd frame are reported.
pub enum FileWriter {
    Plain(BufWriter<File>),
    Gzip(flate2::write::GzEncoder<BufWriter<File>>),
    Zstd(zstd::stream::Encoder<'static, BufWriter<File>>),
    /// Any other stream, e.g. an in-memory buffer.
    Stream(Box<dyn Write + Send>),
}

impl FileWriter {
    /// Write all pending data, including compression trailers.
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            FileWriter::Plain(mut w) => w.flush(),
            FileWriter::Gzip(w) => w.finish()?.flush(),
            FileWriter::Zstd(w) => w.finish()?.flush(),
            FileWriter::Stream(mut w) => w.flush(),
        }
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            FileWriter::Plain(w) => w.write(buf),
            FileWriter::Gzip(w) => w.write(buf),
            FileWriter::Zstd(w) => w.write(buf),
            FileWriter::Stream(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            FileWriter::Plain(w) => w.flush(),
            FileWriter::Gzip(w) => w.flush(),
            FileWriter::Zstd(w) => w.flush(),
            FileWriter::Stream(w) => w.flush(),
        }
    }
}

pub fn open_file_for_write<P: AsRef<Path>>(
    filename: P,
    compression: Option<Compression>,
    compression_level: Option<u32>,
    num_threads: u32,
) -> Result<FileWriter> {
    let path = filename.as_ref();
    let buffer = BufWriter::new(
        File::create(path).with_context(|| format!("cannot create file: {}", path.display()))?
    );
    let writer = match compression {
        None => FileWriter::Plain(buffer),
        Some(Compression::Gzip) => FileWriter::Gzip(flate2::write::GzEncoder::new(
            buffer,
            flate2::Compression::new(compression_level.unwrap_or(6)),
        )),
        Some(Compression::Zstd) => {
            let mut zstd = zstd::stream::Encoder::new(buffer, compression_level.unwrap_or(9) as i32)?;
            zstd.multithread(num_threads)?;
            FileWriter::Zstd(zstd)
        },
    };
    Ok(writer)
}
