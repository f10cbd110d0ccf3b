use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::tempdir;
use vcfsieve::config::EngineConfig;
use vcfsieve::driver::{
    add_provenance, AnnotateConfig, AnnotateDriver, Engine, FilterDriver, StatisticsCollector,
    TableDriver, Tag, TagDriver, TagMode,
};
use vcfsieve::error::EngineError;
use vcfsieve::record::{RecordSink, RecordSource, VcfReader, VcfWriter};
use vcfsieve::value::Value;

const VCF: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=AF,Number=1,Type=Float,Description=\"Allele frequency\">\n\
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total depth\">\n\
##INFO=<ID=ANN,Number=.,Type=String,Description=\"Functional annotations: 'Allele | Annotation | Annotation_Impact | Gene_Name'\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t100\t.\tA\tG\t40\tPASS\tAF=0.6;DP=20;ANN=G|missense_variant|HIGH|BRCA1\n\
chr1\t200\t.\tC\tT\t10\tPASS\tAF=0.1;DP=3\n";

fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn reader(vcf: &str) -> VcfReader<Cursor<String>> {
    VcfReader::new(Cursor::new(vcf.to_string())).unwrap()
}

fn drain(mut source: impl RecordSource) -> Result<Vec<i64>, EngineError> {
    let mut positions = Vec::new();
    while let Some(record) = source.next_record()? {
        positions.push(record.pos);
    }
    Ok(positions)
}

#[test]
fn test_filter_end_to_end() {
    let dir = tempdir().unwrap();
    let input = write_file(dir.path(), "in.vcf", VCF);

    let engine = Engine::new("ANN");
    let expression = engine
        .compile("QUAL > 20 and ANN['Annotation_Impact'] == \"HIGH\"")
        .unwrap();
    assert!(expression.is_annotation_scoped());

    let mut driver = FilterDriver::new(VcfReader::from_path(&input).unwrap(), &engine, expression);
    let mut header = driver.header().clone();
    add_provenance(&mut header, "vcfsieve filter");

    let mut writer = VcfWriter::new(Vec::new());
    writer.write_header(&header).unwrap();
    while let Some(record) = driver.next_record().unwrap() {
        writer.write_record(&record).unwrap();
    }
    let output = String::from_utf8(writer.into_inner()).unwrap();

    assert!(output.contains("##vcfsieveCmd=vcfsieve filter"));
    let records: Vec<&str> = output.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(records.len(), 1);
    assert!(records[0].starts_with("chr1\t100\t"));

    // The written output reads back as the same single record.
    let mut reread = reader(&output);
    assert_eq!(reread.next_record().unwrap().unwrap().pos, 100);
    assert!(reread.next_record().unwrap().is_none());
}

#[test]
fn test_float_literals_match_stored_precision() {
    // The 64-bit literal differs from the 32-bit value stored in the record.
    assert_ne!(0.6f32 as f64, 0.6f64);

    let engine = Engine::new("ANN");
    let expression = engine.compile("INFO['AF'] == 0.6").unwrap();
    assert_eq!(drain(FilterDriver::new(reader(VCF), &engine, expression)).unwrap(), vec![100]);
}

#[test]
fn test_multi_allelic_records() {
    let vcf = VCF.replace("chr1\t100\t.\tA\tG\t", "chr1\t100\t.\tA\tG,T\t");
    let engine = Engine::new("ANN");

    let alt = engine.compile("ALT == 'G'").unwrap();
    assert!(matches!(
        drain(FilterDriver::new(reader(&vcf), &engine, alt)),
        Err(EngineError::MoreThanOneAltAllele { count: 2, .. })
    ));

    let ref_qual = engine.compile("REF == 'A' and QUAL >= 40").unwrap();
    assert_eq!(
        drain(FilterDriver::new(reader(&vcf), &engine, ref_qual)).unwrap(),
        vec![100]
    );
}

#[test]
fn test_malformed_annotation() {
    let vcf = VCF.replace("ANN=G|missense_variant|HIGH|BRCA1", "ANN=G|missense_variant");
    let engine = Engine::new("ANN");
    let expression = engine.compile("ANN['Gene_Name'] == 'BRCA1'").unwrap();

    match drain(FilterDriver::new(reader(&vcf), &engine, expression)) {
        Err(EngineError::MalformedAnnotation {
            field,
            position,
            available,
            ..
        }) => {
            assert_eq!(field, "Gene_Name");
            assert_eq!(position, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected a malformed annotation error, got {:?}", other),
    }
}

#[test]
fn test_unknown_sample_and_format_field_are_distinct() {
    let vcf = "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ttumor\n\
chr1\t5\t.\tA\tC\t50\tPASS\tDP=1\tGT\t0/1\n";
    let engine = Engine::new("ANN");

    let sample = engine.compile("FORMAT['GT']['normal'] is NA").unwrap();
    assert!(matches!(
        drain(FilterDriver::new(reader(vcf), &engine, sample)),
        Err(EngineError::UnknownSample { .. })
    ));

    let field = engine.compile("FORMAT['AD']['tumor'] is NA").unwrap();
    assert!(matches!(
        drain(FilterDriver::new(reader(vcf), &engine, field)),
        Err(EngineError::UnknownFormatField { .. })
    ));

    let het = engine.compile("is_het('tumor') and count_het() == 1").unwrap();
    assert_eq!(drain(FilterDriver::new(reader(vcf), &engine, het)).unwrap(), vec![5]);
}

#[test]
fn test_ontology_and_auxiliary_from_config() {
    let dir = tempdir().unwrap();
    let obo = write_file(
        dir.path(),
        "so.obo",
        "format-version: 1.2\n\n\
[Term]\nid: SO:3\nname: C\n\n\
[Term]\nid: SO:2\nname: B\nis_a: SO:3 ! C\n\n\
[Term]\nid: SO:1\nname: A\nis_a: SO:2 ! B\n\n\
[Term]\nid: SO:9\nname: old\nis_obsolete: true\n",
    );
    let genes = write_file(dir.path(), "genes.txt", "BRCA1\nTP53\n\n");
    let config = EngineConfig::from_json_str(&format!(
        r#"{{"ontology": {:?}, "aux": {{"genes": {:?}}}}}"#,
        obo.display().to_string(),
        genes.display().to_string()
    ))
    .unwrap();
    let engine = Engine::from_config(&config).unwrap();

    let ontology = engine
        .compile(
            "SO.is_a('A', 'C') and SO.path_length('A', 'C') == 2 \
             and sorted(SO.get_parents('A')) == ['B', 'C']",
        )
        .unwrap();
    assert_eq!(drain(FilterDriver::new(reader(VCF), &engine, ontology)).unwrap(), vec![100, 200]);

    let aux = engine.compile("ANN['Gene_Name'] in AUX['genes']").unwrap();
    assert_eq!(drain(FilterDriver::new(reader(VCF), &engine, aux)).unwrap(), vec![100]);

    let without = Engine::new("ANN");
    let expression = without.compile("SO.is_a('A', 'C')").unwrap();
    assert!(matches!(
        drain(FilterDriver::new(reader(VCF), &without, expression)),
        Err(EngineError::OntologyUnavailable)
    ));
}

#[test]
fn test_number_override() {
    let vcf = VCF.replace("AF=0.6;", "AF=0.6,0.2;");
    let engine = Engine::new("ANN");
    let expression = engine.compile("len(INFO['AF']) == 2").unwrap();

    assert!(matches!(
        drain(FilterDriver::new(reader(&vcf), &engine, expression.clone())),
        Err(EngineError::NotExactlyOneValue { count: 2, .. })
    ));

    let config = EngineConfig::from_json_str(r#"{"overwrite_number_info": {"AF": "."}}"#).unwrap();
    let mut source = reader(&vcf);
    config.apply_number_overrides(source.header_mut()).unwrap();
    assert_eq!(drain(FilterDriver::new(source, &engine, expression)).unwrap(), vec![100]);

    let unknown = EngineConfig::from_json_str(r#"{"overwrite_number_info": {"XX": "1"}}"#).unwrap();
    assert!(matches!(
        unknown.apply_number_overrides(reader(VCF).header_mut()),
        Err(EngineError::UnknownOverrideField { .. })
    ));
}

#[test]
fn test_tag_and_table() {
    let engine = Engine::new("ANN");
    let tags = vec![Tag::new("lowdp", engine.compile("INFO['DP'] < 10").unwrap())];
    let mut driver = TagDriver::new(reader(VCF), &engine, tags, TagMode::Pass).unwrap();
    assert!(driver.header().has_filter("lowdp"));
    let first = driver.next_record().unwrap().unwrap();
    let second = driver.next_record().unwrap().unwrap();
    assert_eq!(first.filter, vec!["PASS".to_string()]);
    assert_eq!(second.filter, vec!["lowdp".to_string()]);

    let expression = engine.compile("CHROM, POS, ANN['Gene_Name']").unwrap();
    let mut table = TableDriver::new(reader(VCF), &engine, expression);
    assert_eq!(
        table.next_row().unwrap().unwrap(),
        vec![Value::str("chr1"), Value::Int(100), Value::str("BRCA1")]
    );
    assert_eq!(
        table.next_row().unwrap().unwrap(),
        vec![Value::str("chr1"), Value::Int(200), Value::Na]
    );
    assert!(table.next_row().unwrap().is_none());
}

#[test]
fn test_invalid_expressions_fail_before_records() {
    let engine = Engine::new("ANN");
    for source in ["QUAL >", "__import__('os')", "CHROM.__class__", "eval('1')"] {
        assert!(matches!(
            engine.compile(source),
            Err(EngineError::InvalidExpression { .. })
        ));
    }
}

#[test]
fn test_keyword_arguments_and_lambdas() {
    let engine = Engine::new("ANN");
    let expression = engine
        .compile(
            "sorted([QUAL, INFO['DP']], key=lambda v: -v) == [40.0, 20] \
             and max(map(len, [REF, 'CCC']), key=lambda n: n % 3) == 1",
        )
        .unwrap();
    assert_eq!(drain(FilterDriver::new(reader(VCF), &engine, expression)).unwrap(), vec![100]);
}

#[test]
fn test_breakend_mates_with_statistics() {
    let vcf = "##fileformat=VCFv4.2\n\
##INFO=<ID=SVTYPE,Number=1,Type=String,Description=\"Type of structural variant\">\n\
##INFO=<ID=MATEID,Number=.,Type=String,Description=\"ID of mate breakends\">\n\
##INFO=<ID=ANN,Number=.,Type=String,Description=\"Functional annotations: 'Allele | Annotation_Impact'\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t100\tbnd_a\tA\tA[chr2:500[\t5\tPASS\tSVTYPE=BND;MATEID=bnd_b;ANN=A[chr2:500[|LOW\n\
chr1\t150\t.\tC\tT\t50\tPASS\tANN=T|HIGH\n\
chr2\t500\tbnd_b\tG\t]chr1:100]G\t60\tPASS\tSVTYPE=BND;MATEID=bnd_a;ANN=]chr1:100]G|HIGH\n";
    let engine = Engine::new("ANN");

    // The low-quality mate is held back until its partner passes.
    let expression = engine.compile("QUAL > 20").unwrap();
    let mut collector =
        StatisticsCollector::new(FilterDriver::new(reader(vcf), &engine, expression.clone()), "ANN");
    let mut positions = Vec::new();
    while let Some(record) = collector.next_record().unwrap() {
        positions.push(record.pos);
    }
    assert_eq!(positions, vec![150, 100, 500]);

    let mut yaml = Vec::new();
    collector.write_yaml(&mut yaml).unwrap();
    let yaml = String::from_utf8(yaml).unwrap();
    assert!(yaml.contains("Annotation_Impact:\n  HIGH: 2\n  LOW: 1\n"), "{}", yaml);

    let ordered = FilterDriver::new(reader(vcf), &engine, expression).preserve_order(true);
    assert_eq!(drain(ordered).unwrap(), vec![100, 150, 500]);
}

#[test]
fn test_annotate_from_files() {
    let dir = tempdir().unwrap();
    let table = write_file(
        dir.path(),
        "regions.tsv",
        "chrom\tstart\tend\tname\n1\t50\t150\tpromoter\n",
    );
    let config = write_file(
        dir.path(),
        "annotate.yaml",
        &format!(
            "annotation:\n  file: {:?}\n  columns:\n    chrom: chrom\n    start: start\n    stop: end\n  \
values:\n    - value:\n        vcf_name: region\n        number: 1\n        type: String\n        \
description: Overlapping region\n        expression: DATA['name'][0]\n",
            table.display().to_string()
        ),
    );

    let config = AnnotateConfig::from_yaml_file(&config).unwrap();
    let table = config.load_table().unwrap();
    let engine = Engine::new("ANN");
    let mut driver = AnnotateDriver::new(reader(VCF), &engine, &config, table).unwrap();

    let mut writer = VcfWriter::new(Vec::new());
    writer.write_header(driver.header()).unwrap();
    while let Some(record) = driver.next_record().unwrap() {
        writer.write_record(&record).unwrap();
    }
    let output = String::from_utf8(writer.into_inner()).unwrap();
    assert!(output.contains(
        "##INFO=<ID=region,Number=1,Type=String,Description=\"Overlapping region\">"
    ), "{}", output);
    assert!(output.contains("ANN=G|missense_variant|HIGH|BRCA1;region=promoter"), "{}", output);
    assert!(output.contains("AF=0.1;DP=3\n"), "{}", output);
}
