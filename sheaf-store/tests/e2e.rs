use std::io::Cursor;

use sheaf_format::codec::Codec;
use sheaf_format::ptype::StoreKind;
use sheaf_store::file::footer::FileMetaData;
use sheaf_store::options::WriterOptions;
use sheaf_store::reader::TableReader;
use sheaf_store::record::RecordBuilder;
use sheaf_store::writer::TableWriter;
use sheaf_test_util as testgen;

/// Run a writer session against an in-memory archive and reopen it.
fn write_archive<F>(options: WriterOptions, fill: F) -> (Vec<u8>, FileMetaData)
where
    F: FnOnce(&mut TableWriter<Cursor<&mut Vec<u8>>>),
{
    let mut buffer = Vec::new();
    let mut writer = TableWriter::try_new(Cursor::new(&mut buffer), options).unwrap();
    fill(&mut writer);
    let meta = writer.finalize().unwrap();
    (buffer, meta)
}

fn reader_over(buffer: Vec<u8>) -> TableReader<Cursor<Vec<u8>>> {
    TableReader::open(Cursor::new(buffer)).unwrap()
}

#[test]
fn test_two_field_fixed_width_batch() {
    let (buffer, meta) = write_archive(WriterOptions::default(), |writer| {
        let mut record = RecordBuilder::new();
        for i in 1..=3 {
            record.add("A", i as f64).unwrap();
            record.add("B", i as i32).unwrap();
            writer.append(&mut record).unwrap();
        }
        assert_eq!(writer.num_rows(), 3);
        assert_eq!(writer.schema_dictionary().len(), 1);
    });

    assert_eq!(meta.n_rows, 3);
    assert_eq!(meta.batches.len(), 1);
    assert_eq!(meta.batches[0].n_rec, 3);
    assert_eq!(meta.field_meta.len(), 2);
    for field in &meta.field_meta {
        assert_eq!(field.cset_meta.len(), 1);
        assert_eq!(field.cset_meta[0].column_meta_data.len(), 1);
        assert_eq!(field.cset_meta[0].column_meta_data[0].n_records, 3);
        assert_eq!(field.cset_meta[0].column_meta_data[0].n_null, 0);
    }

    let mut reader = reader_over(buffer);
    assert_eq!(reader.num_rows(), 3);
    assert_eq!(reader.read_schemas(0).unwrap(), vec![0, 0, 0]);

    let a = reader.read_field_by_name("A", 0).unwrap();
    assert_eq!(a.size(), 1);
    for i in 0..3u32 {
        assert!(a.is_valid(i));
        assert_eq!(a.get::<f64>(i).unwrap(), (i + 1) as f64);
    }
    let b = reader.read_field_by_name("B", 0).unwrap();
    for i in 0..3u32 {
        assert_eq!(b.get::<i32>(i).unwrap(), (i + 1) as i32);
    }
}

#[test]
fn test_triangular_schema_growth() {
    let (buffer, _) = write_archive(WriterOptions::default(), |writer| {
        let mut record = RecordBuilder::new();
        for values in [vec![1i32], vec![2, 3], vec![3]] {
            record.add_values("A", &values).unwrap();
            writer.append(&mut record).unwrap();
        }
        assert_eq!(writer.schema_dictionary().len(), 1);
    });

    let mut reader = reader_over(buffer);
    assert_eq!(reader.read_schemas(0).unwrap(), vec![0, 0, 0]);
    let a = reader.read_field_by_name("A", 0).unwrap();
    assert_eq!(a.size(), 2);
    assert_eq!(a.columns[0].n_records, 3);
    assert_eq!(a.columns[1].n_records, 3);
    for i in 0..3u32 {
        assert!(a.columns[0].is_valid(i));
    }
    assert!(!a.columns[1].is_valid(0));
    assert!(a.columns[1].is_valid(1));
    assert!(!a.columns[1].is_valid(2));
    assert_eq!(a.columns[0].get::<i32>(1).unwrap(), 2);
    assert_eq!(a.columns[1].get::<i32>(1).unwrap(), 3);
}

#[test]
fn test_two_disjoint_schemas() {
    let (buffer, meta) = write_archive(WriterOptions::default(), |writer| {
        let mut record = RecordBuilder::new();
        record.add("A", 1.0f64).unwrap();
        record.add("B", 1i32).unwrap();
        writer.append(&mut record).unwrap();
        record.add("A2", 1.0f64).unwrap();
        record.add("B2", 1i32).unwrap();
        writer.append(&mut record).unwrap();
        assert_eq!(writer.schema_dictionary().len(), 2);
    });
    assert_eq!(meta.field_meta.len(), 4);

    let mut reader = reader_over(buffer);
    assert_eq!(reader.read_schemas(0).unwrap(), vec![0, 1]);

    // diagonal-block validity: row 0 valid in A/B, row 1 valid in A2/B2
    for (name, valid_row) in [("A", 0u32), ("B", 0), ("A2", 1), ("B2", 1)] {
        let cset = reader.read_field_by_name(name, 0).unwrap();
        assert_eq!(cset.logical_rows(), 2);
        assert!(cset.is_valid(valid_row));
        assert!(!cset.is_valid(1 - valid_row));
    }
}

#[test]
fn test_tensor_growth() {
    let (buffer, _) = write_archive(WriterOptions::default(), |writer| {
        let mut record = RecordBuilder::new();
        for values in [vec![1u32], vec![2, 3], vec![3, 4, 5]] {
            record.add_array("T", &values).unwrap();
            writer.append(&mut record).unwrap();
        }
    });

    let mut reader = reader_over(buffer);
    let t = reader.read_field_by_name("T", 0).unwrap();
    assert_eq!(t.kind, StoreKind::Tensor);
    assert_eq!(t.columns[0].typed_data::<u32>(), &[0, 1, 3, 6]);
    assert_eq!(t.columns[1].typed_data::<u32>(), &[1, 2, 3, 3, 4, 5]);
    assert_eq!(t.get_slice::<u32>(2).unwrap(), &[3, 4, 5]);
}

#[test]
fn test_dictionary_eligible_column_roundtrips() {
    let values: Vec<u32> = (0..1000).map(|i| i % 10).collect();
    let (buffer, _) = write_archive(WriterOptions::default(), |writer| {
        let mut record = RecordBuilder::new();
        for &v in &values {
            record.add("V", v).unwrap();
            writer.append(&mut record).unwrap();
        }
    });

    let mut reader = reader_over(buffer);
    let v = reader.read_field_by_name("V", 0).unwrap();
    for (i, &expected) in values.iter().enumerate() {
        assert_eq!(v.get::<u32>(i as u32).unwrap(), expected);
    }
}

#[test]
fn test_segment_stats_on_i8() {
    let (_, meta) = write_archive(WriterOptions::default(), |writer| {
        let mut record = RecordBuilder::new();
        for v in [-100i8, -50, 25, 1] {
            record.add("S", v).unwrap();
            writer.append(&mut record).unwrap();
        }
    });

    let stats = &meta.field_meta[0].cset_meta[0].column_meta_data[0];
    assert!(stats.have_segmental_stats);
    assert_eq!(stats.segment_min::<i8>(), -100);
    assert_eq!(stats.segment_max::<i8>(), 25);
    assert!(stats.overlap(-25i8, 10));
    assert!(!stats.overlap(50i8, 100));
    assert!(!stats.overlap(-120i8, -110));
}

#[test]
fn test_alignment_stream_roundtrip() {
    let mut rng = testgen::seeded_rng(0xA11C);
    let n_records = 3000usize;
    let read_len = 120usize;

    let positions = testgen::positions(&mut rng, n_records);
    let mut seqs = Vec::with_capacity(n_records);
    let mut quals = Vec::with_capacity(n_records);
    let mut names = Vec::with_capacity(n_records);
    for _ in 0..n_records {
        seqs.push(testgen::dna(&mut rng, read_len));
        quals.push(testgen::binned_quality(&mut rng, read_len));
        names.push(testgen::read_name(&mut rng));
    }

    let options = WriterOptions::builder().set_batch_size(1024).build();
    let (buffer, _) = write_archive(options, |writer| {
        writer
            .set_field_transforms("SEQ", vec![Codec::SequenceRc])
            .unwrap();
        writer
            .set_field_transforms("QUAL", vec![Codec::QualityRc])
            .unwrap();

        let mut record = RecordBuilder::new();
        for i in 0..n_records {
            record.add("POS", positions[i]).unwrap();
            record.add("FLAG", (i % 4096) as u16).unwrap();
            record.add_bytes("NAME", &names[i]).unwrap();
            record.add_bytes("SEQ", &seqs[i]).unwrap();
            record.add_bytes("QUAL", &quals[i]).unwrap();
            writer.append(&mut record).unwrap();
        }
    });

    let mut reader = reader_over(buffer);
    assert_eq!(reader.num_rows(), n_records as u64);
    assert_eq!(reader.num_batches(), 3);

    let mut row = 0usize;
    for batch_id in 0..reader.num_batches() as u32 {
        let n_rec = reader.metadata().batches[batch_id as usize].n_rec as usize;
        let pos = reader.read_field_by_name("POS", batch_id).unwrap();
        let seq = reader.read_field_by_name("SEQ", batch_id).unwrap();
        let qual = reader.read_field_by_name("QUAL", batch_id).unwrap();
        let name = reader.read_field_by_name("NAME", batch_id).unwrap();

        for local in 0..n_rec as u32 {
            assert_eq!(pos.get::<u32>(local).unwrap(), positions[row]);
            assert_eq!(seq.get_slice::<u8>(local).unwrap(), &seqs[row][..]);
            assert_eq!(qual.get_slice::<u8>(local).unwrap(), &quals[row][..]);
            assert_eq!(name.get_slice::<u8>(local).unwrap(), &names[row][..]);
            row += 1;
        }
    }
    assert_eq!(row, n_records);
}

#[test]
fn test_predicate_pushdown_over_batches() {
    let options = WriterOptions::builder().set_batch_size(100).build();
    let (buffer, _) = write_archive(options, |writer| {
        let mut record = RecordBuilder::new();
        for i in 0..300u32 {
            record.add("POS", i).unwrap();
            writer.append(&mut record).unwrap();
        }
    });

    let reader = reader_over(buffer);
    let pos = reader.find_field("POS").unwrap();
    assert_eq!(
        reader.batches_overlapping(pos, 150u32, 160).unwrap(),
        vec![1]
    );
    assert_eq!(
        reader.batches_overlapping(pos, 0u32, 1000).unwrap(),
        vec![0, 1, 2]
    );
    assert_eq!(
        reader.batches_overlapping(pos, 90u32, 110).unwrap(),
        vec![0, 1]
    );
    assert!(reader.batches_overlapping(pos, 500u32, 600).unwrap().is_empty());
}

#[test]
fn test_sparse_fields_null_pad() {
    let (buffer, _) = write_archive(WriterOptions::default(), |writer| {
        let mut record = RecordBuilder::new();
        for i in 0..300u32 {
            record.add("ID", i).unwrap();
            if i % 3 != 0 {
                record.add("OPT", (i * 2) as u64).unwrap();
            }
            if i >= 150 {
                // field first appearing mid-batch: earlier rows get padded
                record
                    .add_bytes("TAG", format!("t{}", i % 5).as_bytes())
                    .unwrap();
            }
            writer.append(&mut record).unwrap();
        }
        assert_eq!(writer.schema_dictionary().len(), 4);
    });

    let mut reader = reader_over(buffer);
    let opt = reader.read_field_by_name("OPT", 0).unwrap();
    let tag = reader.read_field_by_name("TAG", 0).unwrap();
    assert_eq!(opt.logical_rows(), 300);
    assert_eq!(tag.logical_rows(), 300);
    for i in 0..300u32 {
        assert_eq!(opt.is_valid(i), i % 3 != 0);
        if i % 3 != 0 {
            assert_eq!(opt.get::<u64>(i).unwrap(), (i * 2) as u64);
        }
        assert_eq!(tag.is_valid(i), i >= 150);
        if i >= 150 {
            assert_eq!(
                tag.get_slice::<u8>(i).unwrap(),
                format!("t{}", i % 5).as_bytes()
            );
        }
    }
}

#[test]
fn test_multi_archive_mode() {
    let dir = tempfile::tempdir().unwrap();
    let options = WriterOptions::builder()
        .set_multi_archive_dir(dir.path().join("fields"))
        .build();
    let (buffer, _) = write_archive(options, |writer| {
        let mut record = RecordBuilder::new();
        for i in 0..100u32 {
            record.add("POS", i).unwrap();
            record
                .add_bytes("SEQ", if i % 2 == 0 { b"ACGT" } else { b"TTAG" })
                .unwrap();
            writer.append(&mut record).unwrap();
        }
    });

    assert!(dir.path().join("fields/POS.sheaf").is_file());
    assert!(dir.path().join("fields/SEQ.sheaf").is_file());

    let mut reader = reader_over(buffer);
    let pos = reader.read_field_by_name("POS", 0).unwrap();
    let seq = reader.read_field_by_name("SEQ", 0).unwrap();
    for i in 0..100u32 {
        assert_eq!(pos.get::<u32>(i).unwrap(), i);
        let expected: &[u8] = if i % 2 == 0 { b"ACGT" } else { b"TTAG" };
        assert_eq!(seq.get_slice::<u8>(i).unwrap(), expected);
    }
}

#[test]
fn test_type_conflict_aborts() {
    let mut buffer = Vec::new();
    let mut writer =
        TableWriter::try_new(Cursor::new(&mut buffer), WriterOptions::default()).unwrap();
    let mut record = RecordBuilder::new();
    record.add("X", 1u32).unwrap();
    writer.append(&mut record).unwrap();
    record.add("X", 1.0f32).unwrap();
    assert!(writer.append(&mut record).is_err());
}

#[test]
fn test_illegal_chain_rejected() {
    let mut buffer = Vec::new();
    let mut writer =
        TableWriter::try_new(Cursor::new(&mut buffer), WriterOptions::default()).unwrap();
    assert!(writer
        .set_field_transforms("X", vec![Codec::Block, Codec::Dict])
        .is_err());
    assert!(writer
        .set_field_transforms("X", vec![Codec::Auto, Codec::Block])
        .is_err());
}

#[test]
fn test_empty_archive() {
    let (buffer, meta) = write_archive(WriterOptions::default(), |_| {});
    assert_eq!(meta.n_rows, 0);
    let reader = reader_over(buffer);
    assert_eq!(reader.num_rows(), 0);
    assert_eq!(reader.num_batches(), 1);
}

#[test]
fn test_corrupted_payload_detected() {
    let (mut buffer, _) = write_archive(WriterOptions::default(), |writer| {
        let mut record = RecordBuilder::new();
        for i in 0..50u32 {
            record.add("POS", i * 17).unwrap();
            writer.append(&mut record).unwrap();
        }
    });

    // The POS column is the last section before the footer; flipping the
    // final payload byte must trip the decode-side verification.
    let footer_offset = reader_over(buffer.clone()).postscript().footer_offset as usize;
    buffer[footer_offset - 1] ^= 0xFF;

    let mut reader = reader_over(buffer);
    assert!(reader.read_field_by_name("POS", 0).is_err());
}
