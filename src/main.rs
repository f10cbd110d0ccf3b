//! vcfsieve - filter, tag, annotate, tabulate and sort VCF records with expressions

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser as ClapParser, Subcommand, ValueEnum};
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use vcfsieve::config::EngineConfig;
use vcfsieve::driver::{
    add_provenance, AnnotateConfig, AnnotateDriver, Engine, FilterDriver, SortDriver,
    StatisticsCollector, TableDriver, TableFormat, TableHeader, TableWriter, Tag, TagDriver,
    TagMode,
};
use vcfsieve::record::{RecordSink, RecordSource, VcfReader, VcfWriter};

/// vcfsieve - evaluate Python-like expressions against VCF records
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep the records (and annotations) for which the expression is true
    Filter {
        expression: String,
        /// Input VCF; standard input when omitted
        vcf: Option<PathBuf>,
        /// Output VCF; standard output when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep all annotations of a record if any of them passes
        #[arg(long)]
        keep_unmatched: bool,
        /// Emit records in input order, also when breakend mates are far apart
        #[arg(long)]
        preserve_order: bool,
        /// Write counts of the annotation values of the passing records as YAML
        #[arg(short, long)]
        statistics: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Add INFO fields computed from the intervals of an annotation table
    Annotate {
        /// YAML file naming the table, its interval columns and the fields to add
        config: PathBuf,
        vcf: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Add FILTER tags to the records matching each expression
    Tag {
        vcf: Option<PathBuf>,
        /// NAME=EXPRESSION, may be repeated
        #[arg(short, long = "tag", required = true, value_parser = parse_key_value::<String>)]
        tags: Vec<(String, String)>,
        /// Tag records passing (pass) or failing (fail) the expression
        #[arg(short = 'm', long, default_value = "pass")]
        tag_mode: TagMode,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Write the values of an expression as a table
    Table {
        expression: String,
        vcf: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// "auto", "none" or comma-separated column names
        #[arg(long, default_value = "auto")]
        header: TableHeader,
        #[arg(long, default_value = "\t")]
        separator: String,
        #[arg(long, value_enum, default_value = "tsv")]
        output_fmt: OutputFormat,
        /// Do not suppress consecutive duplicate rows
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Sort records by the values of an expression; wrap items in desc() to reverse
    Sort {
        expression: String,
        vcf: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep the annotation entries of each record in input order
        #[arg(long)]
        preserve_annotation_order: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct EngineArgs {
    /// INFO field holding the annotation entries (default ANN)
    #[arg(short = 'k', long)]
    annotation_key: Option<String>,

    /// NAME=PATH of a file with one entry per line, available as AUX['NAME']
    #[arg(long = "aux", value_parser = parse_key_value::<PathBuf>)]
    aux: Vec<(String, PathBuf)>,

    /// OBO file used by SO and the term methods
    #[arg(long)]
    ontology: Option<PathBuf>,

    /// FIELD=NUMBER overriding the declared number of an INFO field
    #[arg(long, value_parser = parse_key_value::<String>)]
    overwrite_number_info: Vec<(String, String)>,

    /// FIELD=NUMBER overriding the declared number of a FORMAT field
    #[arg(long, value_parser = parse_key_value::<String>)]
    overwrite_number_format: Vec<(String, String)>,

    /// JSON configuration file; command-line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Tsv,
    Jsonl,
}

fn parse_key_value<T>(s: &str) -> Result<(String, T), String>
where
    T: FromStr,
    T::Err: Display,
{
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let value = value.parse::<T>().map_err(|e| e.to_string())?;
    Ok((key.to_string(), value))
}

impl EngineArgs {
    fn into_config(self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(key) = self.annotation_key {
            config.annotation_key = key;
        }
        if self.ontology.is_some() {
            config.ontology = self.ontology;
        }
        config.aux.extend(self.aux);
        config.overwrite_number_info.extend(self.overwrite_number_info);
        config.overwrite_number_format.extend(self.overwrite_number_format);
        Ok(config)
    }
}

fn prepare<R: BufRead + 'static>(
    mut reader: VcfReader<R>,
    config: &EngineConfig,
) -> Result<Box<dyn RecordSource>> {
    config
        .apply_number_overrides(reader.header_mut())
        .context("Invalid number override")?;
    Ok(Box::new(reader))
}

fn open_input(path: Option<&Path>, config: &EngineConfig) -> Result<Box<dyn RecordSource>> {
    match path {
        Some(path) => {
            let reader = VcfReader::from_path(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            prepare(reader, config)
        }
        None => prepare(VcfReader::new(io::stdin().lock())?, config),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn write_vcf(source: &mut impl RecordSource, output: Option<&Path>) -> Result<()> {
    let mut header = source.header().clone();
    add_provenance(&mut header, &std::env::args().collect::<Vec<_>>().join(" "));

    let mut writer = VcfWriter::new(open_output(output)?);
    writer.write_header(&header)?;
    let mut written = 0usize;
    while let Some(record) = source.next_record()? {
        writer.write_record(&record)?;
        written += 1;
    }
    writer.into_inner().flush()?;
    log::debug!("Wrote {} records", written);
    Ok(())
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Filter {
            expression,
            vcf,
            output,
            keep_unmatched,
            preserve_order,
            statistics,
            engine,
        } => {
            let config = engine.into_config()?;
            let engine = Engine::from_config(&config)?;
            let expression = engine.compile(&expression)?;
            let source = open_input(vcf.as_deref(), &config)?;
            let mut driver = FilterDriver::new(source, &engine, expression)
                .keep_unmatched(keep_unmatched)
                .preserve_order(preserve_order);
            match statistics {
                Some(path) => {
                    let mut collector = StatisticsCollector::new(driver, engine.annotation_key());
                    write_vcf(&mut collector, output.as_deref())?;
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    collector.write_yaml(BufWriter::new(file))?;
                    Ok(())
                }
                None => write_vcf(&mut driver, output.as_deref()),
            }
        }

        Command::Annotate {
            config: annotate_config,
            vcf,
            output,
            engine,
        } => {
            let config = engine.into_config()?;
            let engine = Engine::from_config(&config)?;
            let annotate_config = AnnotateConfig::from_yaml_file(&annotate_config)
                .with_context(|| format!("Failed to load {}", annotate_config.display()))?;
            let table = annotate_config.load_table()?;
            let source = open_input(vcf.as_deref(), &config)?;
            let mut driver = AnnotateDriver::new(source, &engine, &annotate_config, table)?;
            write_vcf(&mut driver, output.as_deref())
        }

        Command::Tag {
            vcf,
            tags,
            tag_mode,
            output,
            engine,
        } => {
            let config = engine.into_config()?;
            let engine = Engine::from_config(&config)?;
            let tags = tags
                .into_iter()
                .map(|(name, expression)| Ok(Tag::new(name, engine.compile(&expression)?)))
                .collect::<Result<Vec<_>>>()?;
            let source = open_input(vcf.as_deref(), &config)?;
            let mut driver = TagDriver::new(source, &engine, tags, tag_mode)?;
            write_vcf(&mut driver, output.as_deref())
        }

        Command::Table {
            expression,
            vcf,
            output,
            header,
            separator,
            output_fmt,
            all,
            engine,
        } => {
            let config = engine.into_config()?;
            let engine = Engine::from_config(&config)?;
            let expression = engine.compile(&expression)?;
            let names = header.names(&expression)?;
            let format = match output_fmt {
                OutputFormat::Tsv => TableFormat::Separated(separator),
                OutputFormat::Jsonl => TableFormat::JsonLines,
            };

            let source = open_input(vcf.as_deref(), &config)?;
            let mut driver = TableDriver::new(source, &engine, expression).all_rows(all);
            let mut writer = TableWriter::new(open_output(output.as_deref())?, format, names);
            writer.write_header()?;
            while let Some(row) = driver.next_row()? {
                writer.write_row(&row)?;
            }
            writer.into_inner().flush()?;
            Ok(())
        }

        Command::Sort {
            expression,
            vcf,
            output,
            preserve_annotation_order,
            engine,
        } => {
            let config = engine.into_config()?;
            let engine = Engine::from_config(&config)?;
            let expression = engine.compile(&expression)?;
            let source = open_input(vcf.as_deref(), &config)?;
            let mut driver = SortDriver::new(source, &engine, expression)
                .preserve_annotation_order(preserve_annotation_order);
            write_vcf(&mut driver, output.as_deref())
        }
    }
}

fn main() {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(error) = run(args) {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}
