//! Write a small alignment-style archive in memory and read it back,
//! printing per-field compression figures.

use std::io::Cursor;

use sheaf_format::codec::Codec;
use sheaf_store::options::WriterOptions;
use sheaf_store::reader::TableReader;
use sheaf_store::record::RecordBuilder;
use sheaf_store::writer::TableWriter;
use sheaf_test_util as testgen;

fn main() -> sheaf_core::errors::Result<()> {
    let mut rng = testgen::seeded_rng(42);
    let n_records = 20_000usize;
    let read_len = 150usize;

    let mut buffer = Vec::new();
    let options = WriterOptions::builder().set_batch_size(8192).build();
    let mut writer = TableWriter::try_new(Cursor::new(&mut buffer), options)?;
    writer.set_field_transforms("SEQ", vec![Codec::SequenceRc])?;
    writer.set_field_transforms("QUAL", vec![Codec::QualityRc])?;

    let positions = testgen::positions(&mut rng, n_records);
    let mut record = RecordBuilder::new();
    for (i, &pos) in positions.iter().enumerate() {
        record.add("POS", pos)?;
        record.add("MAPQ", (i % 60) as u8)?;
        record.add_bytes("NAME", &testgen::read_name(&mut rng))?;
        record.add_bytes("SEQ", &testgen::dna(&mut rng, read_len))?;
        record.add_bytes("QUAL", &testgen::binned_quality(&mut rng, read_len))?;
        writer.append(&mut record)?;
    }

    let meta = writer.finalize()?;
    println!(
        "wrote {} records in {} batches, {} bytes total",
        meta.n_rows,
        meta.batches.len(),
        buffer.len()
    );
    for field in &meta.field_meta {
        println!(
            "  {:<6} {:>9} -> {:>9} bytes ({:.2}-fold)",
            field.name,
            field.total_uncompressed(),
            field.total_compressed(),
            field.average_compression_fold()
        );
    }

    let mut reader = TableReader::open(Cursor::new(buffer))?;
    let seq = reader.read_field_by_name("SEQ", 0)?;
    let qual = reader.read_field_by_name("QUAL", 0)?;
    println!(
        "first read: SEQ={} QUAL={}",
        String::from_utf8_lossy(seq.get_slice::<u8>(0)?),
        String::from_utf8_lossy(qual.get_slice::<u8>(0)?),
    );
    Ok(())
}
