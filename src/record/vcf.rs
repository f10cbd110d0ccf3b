//! Plain-text VCF reader and writer.

use crate::cardinality::Number;
use crate::error::{EngineError, EngineResult};
use crate::record::{
    FieldInfo, FieldType, Header, HeaderLine, Record, RecordSink, RecordSource,
};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Streams records out of a VCF text file.
pub struct VcfReader<R> {
    reader: R,
    header: Header,
    line_number: usize,
    buffer: String,
}

impl VcfReader<BufReader<File>> {
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> VcfReader<R> {
    /// Create a reader and consume the header up to and including `#CHROM`.
    pub fn new(mut reader: R) -> EngineResult<Self> {
        let mut lines = Vec::new();
        let mut samples = Vec::new();
        let mut line_number = 0;
        let mut buffer = String::new();

        loop {
            buffer.clear();
            if reader.read_line(&mut buffer)? == 0 {
                return Err(EngineError::MalformedInput {
                    line: line_number,
                    message: "missing #CHROM header line".to_string(),
                });
            }
            line_number += 1;
            let line = buffer.trim_end_matches(['\n', '\r']);

            if let Some(meta) = line.strip_prefix("##") {
                lines.push(parse_header_line(meta, line_number)?);
            } else if line.starts_with("#CHROM") {
                samples = line.split('\t').skip(9).map(str::to_string).collect();
                break;
            } else if !line.is_empty() {
                return Err(EngineError::MalformedInput {
                    line: line_number,
                    message: "expected a header line".to_string(),
                });
            }
        }

        log::debug!(
            "Read VCF header with {} lines and {} samples",
            lines.len(),
            samples.len()
        );

        Ok(Self {
            reader,
            header: Header::new(lines, samples),
            line_number,
            buffer,
        })
    }

    /// The header, for adjustments made before the first record is read.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }
}

impl<R: BufRead> RecordSource for VcfReader<R> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_record(&mut self) -> EngineResult<Option<Record>> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.buffer.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            return parse_record(line, self.line_number).map(Some);
        }
    }
}

/// Parse the part of a header line after `##`.
fn parse_header_line(meta: &str, line: usize) -> EngineResult<HeaderLine> {
    let malformed = |message: &str| EngineError::MalformedInput {
        line,
        message: message.to_string(),
    };
    let (key, value) = meta
        .split_once('=')
        .ok_or_else(|| malformed("header line without '='"))?;

    let structured = value
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'));
    let (Some(body), "INFO" | "FORMAT" | "FILTER") = (structured, key) else {
        return Ok(HeaderLine::Meta {
            key: key.to_string(),
            value: value.to_string(),
        });
    };

    let entries = parse_structured(body);
    let get = |name: &str| {
        entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };
    let id = get("ID")
        .ok_or_else(|| malformed("structured header line without ID"))?
        .to_string();
    let description = get("Description").unwrap_or_default().to_string();

    if key == "FILTER" {
        return Ok(HeaderLine::Filter { id, description });
    }

    let number = match get("Number") {
        Some(number) => number
            .parse::<Number>()
            .map_err(|e| malformed(&e.to_string()))?,
        None => Number::Unbounded,
    };
    let field_type = FieldType::from_name(get("Type").unwrap_or("String"));
    let info = FieldInfo::new(id, number, field_type, description);
    Ok(if key == "INFO" {
        HeaderLine::Info(info)
    } else {
        HeaderLine::Format(info)
    })
}

/// Split `ID=DP,Number=1,Description="a, b"` into key/value pairs.
fn parse_structured(body: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut chars = body.chars().peekable();

    while chars.peek().is_some() {
        let key: String = chars.by_ref().take_while(|&c| c != '=').collect();
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    c => value.push(c),
                }
            }
            // skip up to and including the separating comma
            for c in chars.by_ref() {
                if c == ',' {
                    break;
                }
            }
        } else {
            value = chars.by_ref().take_while(|&c| c != ',').collect();
        }
        entries.push((key.trim().to_string(), value));
    }

    entries
}

fn parse_record(line: &str, line_number: usize) -> EngineResult<Record> {
    let malformed = |message: String| EngineError::MalformedInput {
        line: line_number,
        message,
    };
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 8 {
        return Err(malformed(format!(
            "expected at least 8 columns, found {}",
            fields.len()
        )));
    }

    let list = |raw: &str, separator: char| -> Vec<String> {
        if raw == "." {
            Vec::new()
        } else {
            raw.split(separator).map(str::to_string).collect()
        }
    };

    let pos = fields[1]
        .parse::<i64>()
        .map_err(|_| malformed(format!("invalid position '{}'", fields[1])))?;
    let qual = match fields[5] {
        "." => None,
        raw => Some(
            raw.parse::<f32>()
                .map_err(|_| malformed(format!("invalid quality '{}'", raw)))?,
        ),
    };
    let info = list(fields[7], ';')
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (entry, None),
        })
        .collect();

    Ok(Record {
        chrom: fields[0].to_string(),
        pos,
        id: Some(fields[2]).filter(|id| *id != ".").map(str::to_string),
        reference: fields[3].to_string(),
        alt: list(fields[4], ','),
        qual,
        filter: list(fields[6], ';'),
        info,
        format: fields.get(8).map(|f| list(f, ':')).unwrap_or_default(),
        samples: fields
            .iter()
            .skip(9)
            .map(|sample| sample.split(':').map(str::to_string).collect())
            .collect(),
    })
}

/// Writes a header and records as VCF text.
pub struct VcfWriter<W: Write> {
    writer: W,
}

impl<W: Write> VcfWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for VcfWriter<W> {
    fn write_header(&mut self, header: &Header) -> EngineResult<()> {
        for line in header.lines() {
            writeln!(self.writer, "{}", line)?;
        }
        write!(self.writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
        if !header.samples().is_empty() {
            write!(self.writer, "\tFORMAT\t{}", header.samples().join("\t"))?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_record(&mut self, record: &Record) -> EngineResult<()> {
        writeln!(self.writer, "{}", record)?;
        Ok(())
    }
}
