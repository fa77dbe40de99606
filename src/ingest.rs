//! Ingestor — header parsing, schema detection, worker fan-out, and the
//! terminal shard merge (spec §4.6).

use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::block_reader::BlockReader;
use crate::error::EngineError;
use crate::event::Event;
use crate::parser::{parse_float64, parse_int32};
use crate::simulation::Simulation;
use crate::types::{EventId, IterId, SeqId};

/// The four CLI-supplied knobs documented in spec §6.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub min_loss_to_include: f64,
    pub mfid: Option<String>,
    pub ignore_ordering: bool,
    pub full_rip_scale: f64,
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn parse_header_num_iter(line: &str) -> Result<i64, EngineError> {
    let rest = line
        .strip_prefix("_numIter")
        .and_then(|s| s.trim_start().strip_prefix('='))
        .ok_or_else(|| EngineError::HeaderMalformed { reason: format!("expected `_numIter = <n>`, got {line:?}") })?;
    let n = parse_int32(rest.trim()).ok_or_else(|| EngineError::HeaderMalformed { reason: format!("non-integer iteration count: {rest:?}") })?;
    if n <= 0 {
        return Err(EngineError::HeaderMalformed { reason: format!("iteration count must be positive, got {n}") });
    }
    Ok(n as i64)
}

/// Schema inferred from the column-header tab count (5, 6, or 7).
#[derive(Debug, Clone, Copy)]
enum Schema {
    Five,
    Six,
    Seven,
}

fn detect_schema(header: &str) -> Result<Schema, EngineError> {
    match header.split('\t').count() {
        5 => Ok(Schema::Five),
        6 => Ok(Schema::Six),
        7 => Ok(Schema::Seven),
        n => Err(EngineError::ColumnCountUnsupported { n }),
    }
}

fn derive_full_rip(loss: f64, full_rip_scale: f64) -> f64 {
    if full_rip_scale == 0.0 {
        0.0
    } else if full_rip_scale == 1.0 {
        loss
    } else {
        loss * full_rip_scale
    }
}

fn apply_row_filters(
    mut iter_id: IterId,
    seq_id: i32,
    mut event: Event,
    opts: &IngestOptions,
) -> Option<(IterId, i32, Event)> {
    if let Some(mfid) = &opts.mfid {
        if event.risk_group == "Noncat" {
            event.risk_group = format!("Noncat-{mfid}");
        }
        if event.reinstatement_prem.abs() < 1.0 {
            event.reinstatement_prem = 0.0;
        }
    }

    if event.risk_group.to_uppercase() == "NONCAT" {
        event.risk_group = "Noncat".to_string();
    }

    if event.loss < opts.min_loss_to_include {
        return None;
    }

    if opts.ignore_ordering {
        iter_id = iter_id.pack_with_seq(SeqId(seq_id));
    }

    Some((iter_id, seq_id, event))
}

/// Parses one data row per the detected schema, applies the post-processing
/// filters, and inserts into `shard`. Non-fatal parse failures are logged
/// and the row is dropped; a collision that overflows its synthetic slot
/// range is fatal and propagated.
fn process_row(line: &str, schema: Schema, opts: &IngestOptions, shard: &mut Simulation, line_no: u64) -> Result<(), EngineError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != match schema {
        Schema::Five => 5,
        Schema::Six => 6,
        Schema::Seven => 7,
    } {
        log::warn!("FieldParse: line {line_no}, row has {} fields, expected schema width", fields.len());
        return Ok(());
    }

    let iter_id = match parse_int32(fields[0].trim()) {
        Some(v) => IterId(v as i64),
        None => {
            log::warn!("FieldParse: line {line_no}, column iterId, content {:?}", fields[0]);
            return Ok(());
        }
    };
    let seq_id = match parse_int32(fields[1].trim()) {
        Some(v) => v,
        None => {
            log::warn!("FieldParse: line {line_no}, column seqId, content {:?}", fields[1]);
            return Ok(());
        }
    };
    let event_id = match parse_int32(fields[2].trim()) {
        Some(v) => v,
        None => {
            log::warn!("FieldParse: line {line_no}, column eventId, content {:?}", fields[2]);
            return Ok(());
        }
    };
    let loss = match parse_float64(fields[3].trim()) {
        Some(v) => v,
        None => {
            log::warn!("FieldParse: line {line_no}, column loss, content {:?}", fields[3]);
            return Ok(());
        }
    };
    let rip = match parse_float64(fields[4].trim()) {
        Some(v) => v,
        None => {
            log::warn!("FieldParse: line {line_no}, column rip, content {:?}", fields[4]);
            return Ok(());
        }
    };

    let (risk_group, full_rip) = match schema {
        Schema::Five => ("NA".to_string(), derive_full_rip(loss, opts.full_rip_scale)),
        Schema::Six => (fields[5].trim().to_string(), derive_full_rip(loss, opts.full_rip_scale)),
        Schema::Seven => {
            let rg = fields[5].trim().to_string();
            let full_rip = match parse_float64(fields[6].trim()) {
                Some(v) => v,
                None => {
                    log::warn!("FieldParse: line {line_no}, column fullRip, content {:?}", fields[6]);
                    return Ok(());
                }
            };
            (rg, full_rip)
        }
    };

    let event = Event {
        event_id: EventId(event_id),
        sequence_id: SeqId(seq_id),
        loss,
        reinstatement_prem: rip,
        full_rip,
        risk_group,
        rip_base: 0.0,
    };

    let Some((iter_id, seq_id, event)) = apply_row_filters(iter_id, seq_id, event, opts) else {
        return Ok(());
    };

    shard.add_risk_group(event.risk_group.clone());
    shard.year_mut(iter_id).add_event(SeqId(seq_id), event, 1.0, true)
}

fn worker_loop(reader: &BlockReader, t: usize, schema: Schema, opts: &IngestOptions, num_iter: i64) -> Result<Simulation, EngineError> {
    let mut shard = Simulation::new(num_iter);
    loop {
        match reader.next_line(t)? {
            None => break,
            Some(line) => {
                if line.is_empty() || is_comment(&line) {
                    continue;
                }
                process_row(&line, schema, opts, &mut shard, reader.file_line(t))?;
            }
        }
    }
    Ok(shard)
}

/// Ingests `path` per spec §4.6: parses the header, detects the schema,
/// fans `workers` threads out over the file via [`BlockReader`], and merges
/// the resulting shards into a single [`Simulation`].
pub fn ingest_file(path: &Path, opts: &IngestOptions, workers: usize) -> Result<Simulation, EngineError> {
    let header_reader = BlockReader::open(path, 1)?;
    let mut num_iter_line = None;
    loop {
        match header_reader.next_line(0)? {
            None => return Err(EngineError::HeaderMalformed { reason: "file is empty".to_string() }),
            Some(line) if line.is_empty() || is_comment(&line) => continue,
            Some(line) => {
                num_iter_line = Some(line);
                break;
            }
        }
    }
    let num_iter = parse_header_num_iter(&num_iter_line.unwrap())?;

    let column_header = loop {
        match header_reader.next_line(0)? {
            None => return Err(EngineError::HeaderMalformed { reason: "missing column header line".to_string() }),
            Some(line) if line.is_empty() || is_comment(&line) => continue,
            Some(line) => break line,
        }
    };
    let schema = detect_schema(&column_header)?;
    drop(header_reader);

    log::info!("ingest start: {} ({} iterations, {} workers)", path.display(), num_iter, workers);

    let reader = Arc::new(BlockReader::open(path, workers)?);
    // Re-skip the two header lines on every worker stripe — they were only
    // consumed above to discover `num_iter`/`schema` on a throwaway reader.
    // Thread 0's stripe still begins at file offset 0, so it must skip them
    // explicitly; the other stripes start mid-file and never see them.
    let mut handles = Vec::with_capacity(workers);
    for t in 0..workers {
        let reader = Arc::clone(&reader);
        let opts = opts.clone();
        handles.push(thread::spawn(move || -> Result<Simulation, EngineError> {
            if t == 0 {
                reader.next_line(0)?;
                reader.next_line(0)?;
            }
            worker_loop(&reader, t, schema, &opts, num_iter)
        }));
    }

    let mut shards = Vec::with_capacity(workers);
    for handle in handles {
        shards.push(handle.join().expect("worker thread panicked")?);
    }

    let mut sim = shards.remove(0);
    for shard in shards {
        sim.merge_shard_forward(shard)?;
    }

    log::info!(
        "ingest done: {} events retained, {} risk groups seen",
        sim.count_events(),
        sim.risk_groups().len()
    );
    Ok(sim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_fixture(contents: &str, suffix: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("lossagg-ingest-test-{}-{}.txt", std::process::id(), suffix));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn s5_min_loss_to_include_filters_row() {
        let contents = "_numIter = 3\niterId\tseqId\teventId\tloss\treinstatementPrem\triskGroup\n1\t1\t100\t50.0\t5.0\tRisk1\n2\t1\t101\t0.5\t0.0\tNoncat\n";
        let path = write_fixture(contents, "min-loss");
        let opts = IngestOptions { min_loss_to_include: 1.0, ..Default::default() };
        let sim = ingest_file(&path, &opts, 1).unwrap();
        assert_eq!(sim.count_events(), 1);
        assert!(sim.get_year(IterId(1)).is_some());
        assert!(sim.get_year(IterId(2)).is_none());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn s5_mfid_renames_noncat_row() {
        let contents = "_numIter = 3\niterId\tseqId\teventId\tloss\treinstatementPrem\triskGroup\n1\t1\t100\t50.0\t5.0\tRisk1\n2\t1\t101\t0.5\t0.0\tNoncat\n";
        let path = write_fixture(contents, "mfid");
        let opts = IngestOptions { min_loss_to_include: 0.0, mfid: Some("X".to_string()), ..Default::default() };
        let sim = ingest_file(&path, &opts, 1).unwrap();
        assert_eq!(sim.count_events(), 2);
        let year2 = sim.get_year(IterId(2)).unwrap();
        let event = year2.events().values().next().unwrap();
        assert_eq!(event.risk_group, "Noncat-X");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn header_malformed_is_fatal() {
        let contents = "not a header\n";
        let path = write_fixture(contents, "bad-header");
        let opts = IngestOptions::default();
        let err = ingest_file(&path, &opts, 1);
        assert!(matches!(err, Err(EngineError::HeaderMalformed { .. })));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn unsupported_column_count_is_fatal() {
        let contents = "_numIter = 1\na\tb\tc\td\n1\t1\t1\t1\n";
        let path = write_fixture(contents, "bad-cols");
        let opts = IngestOptions::default();
        let err = ingest_file(&path, &opts, 1);
        assert!(matches!(err, Err(EngineError::ColumnCountUnsupported { n: 4 })));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn multi_worker_ingestion_matches_single_worker() {
        let mut contents = String::from("_numIter = 100\niterId\tseqId\teventId\tloss\treinstatementPrem\triskGroup\n");
        for i in 0..100i64 {
            contents.push_str(&format!("{i}\t0\t{i}\t{}\t1.0\tRisk1\n", (i + 1) as f64));
        }
        let path = write_fixture(&contents, "multi-worker");
        let opts = IngestOptions::default();
        let single = ingest_file(&path, &opts, 1).unwrap();
        let multi = ingest_file(&path, &opts, 4).unwrap();
        assert_eq!(single.count_events(), multi.count_events());
        assert_eq!(single.count_events(), 100);
        std::fs::remove_file(path).ok();
    }
}
