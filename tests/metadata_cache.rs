//! Metadata companion files and the one-shot in-memory cache.

mod common;

use common::{InMemoryField, IntervalMesh};
use serial_test::serial;
use std::path::{Path, PathBuf};
use tlv_field::comm::{LocalComm, NoComm};
use tlv_field::container::{ContainerOptions, TlvContainer};
use tlv_field::format::{FormatDescriptor, TypeTag};
use tlv_field::partition::local_range;
use tlv_field::range_io;
use tlv_field::tlv_error::TlvError;

fn meta_options(cache: bool) -> ContainerOptions {
    ContainerOptions {
        label: 0,
        save_metadata: true,
        cache_metadata: cache,
    }
}

fn companions(prefix: &Path) -> [PathBuf; 3] {
    ["cells", "x_cell_dofs", "cell_dofs"].map(|role| {
        let mut name = prefix.as_os_str().to_os_string();
        name.push("_");
        name.push(role);
        PathBuf::from(name)
    })
}

fn serial_container(dir: &Path, cache: bool) -> TlvContainer<NoComm> {
    TlvContainer::with_options(
        NoComm,
        dir.join("field.tlv"),
        Some(dir.join("meta")),
        meta_options(cache),
    )
}

#[test]
fn companion_files_carry_the_csr_layout() {
    let dir = tempfile::tempdir().unwrap();
    let n = 6u64;
    let container = serial_container(dir.path(), false);

    let values: Vec<f64> = (0..n).map(|g| g as f64 + 0.5).collect();
    let field = InMemoryField::new(n, (0, n), values);
    let mesh = IntervalMesh {
        n_global: n,
        range: (0, n),
    };
    container.write_with_metadata(&field, &mesh).unwrap();

    let [cells_path, x_path, dofs_path] = companions(&dir.path().join("meta"));

    let (_, cells_count) = range_io::probe(&cells_path).unwrap();
    assert_eq!(cells_count, n);
    let (_, cells) = range_io::read_range::<usize>(&cells_path, 0, n).unwrap();
    assert_eq!(cells, (0..n as usize).collect::<Vec<_>>());

    // offsets 0..n plus the closing sentinel appended by the last rank
    let (_, x_count) = range_io::probe(&x_path).unwrap();
    assert_eq!(x_count, n + 1);
    let (_, x) = range_io::read_range::<usize>(&x_path, 0, n + 1).unwrap();
    assert_eq!(x, (0..=n as usize).collect::<Vec<_>>());

    let (_, dofs) = range_io::read_range::<i32>(&dofs_path, 0, n).unwrap();
    assert_eq!(dofs, (0..n as i32).collect::<Vec<_>>());
}

#[test]
fn read_scatters_values_through_the_connectivity() {
    let dir = tempfile::tempdir().unwrap();
    let n = 8u64;
    let container = serial_container(dir.path(), false);

    let values: Vec<f64> = (0..n).map(|g| (g * g) as f64).collect();
    let field = InMemoryField::new(n, (0, n), values.clone());
    let mesh = IntervalMesh {
        n_global: n,
        range: (0, n),
    };
    container.write_with_metadata(&field, &mesh).unwrap();

    let mut sink = InMemoryField::sink(n, (0, n));
    container.read(&mut sink).unwrap();
    assert_eq!(sink.values, values);
}

#[test]
fn cached_second_read_needs_no_companion_files() {
    let dir = tempfile::tempdir().unwrap();
    let n = 5u64;
    let container = serial_container(dir.path(), true);

    let values: Vec<f64> = (0..n).map(|g| g as f64 * 3.0).collect();
    let field = InMemoryField::new(n, (0, n), values.clone());
    let mesh = IntervalMesh {
        n_global: n,
        range: (0, n),
    };
    container.write_with_metadata(&field, &mesh).unwrap();

    assert!(!container.metadata_cached());
    let mut first = InMemoryField::sink(n, (0, n));
    container.read(&mut first).unwrap();
    assert!(container.metadata_cached());
    assert_eq!(first.values, values);

    // the cache is the only surviving copy of the connectivity
    for path in companions(&dir.path().join("meta")) {
        std::fs::remove_file(path).unwrap();
    }

    let mut second = InMemoryField::sink(n, (0, n));
    container.read(&mut second).unwrap();
    assert_eq!(second.values, first.values);
}

#[test]
fn uncached_container_rereads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let n = 4u64;
    let container = serial_container(dir.path(), false);

    let field = InMemoryField::new(n, (0, n), vec![1.0, 2.0, 3.0, 4.0]);
    let mesh = IntervalMesh {
        n_global: n,
        range: (0, n),
    };
    container.write_with_metadata(&field, &mesh).unwrap();

    let mut sink = InMemoryField::sink(n, (0, n));
    container.read(&mut sink).unwrap();
    assert!(!container.metadata_cached());

    for path in companions(&dir.path().join("meta")) {
        std::fs::remove_file(path).unwrap();
    }
    assert!(matches!(
        container.read(&mut sink),
        Err(TlvError::Io(_))
    ));
}

#[test]
fn decreasing_offsets_companion_fails_the_read() {
    let dir = tempfile::tempdir().unwrap();
    let n = 2u64;
    let container = serial_container(dir.path(), false);

    let field = InMemoryField::new(n, (0, n), vec![1.0, 2.0]);
    let mesh = IntervalMesh {
        n_global: n,
        range: (0, n),
    };
    container.write_with_metadata(&field, &mesh).unwrap();

    // corrupt the offset companion so its entries decrease
    let [_, x_path, _] = companions(&dir.path().join("meta"));
    let desc = FormatDescriptor::new(TypeTag::SizeWord, 0).unwrap();
    range_io::create(&x_path, desc, n + 1).unwrap();
    range_io::write_range(&x_path, desc, 0, &[5usize, 3, 0]).unwrap();

    let mut sink = InMemoryField::sink(n, (0, n));
    assert!(matches!(
        container.read(&mut sink),
        Err(TlvError::InvertedRange { start: 5, end: 0 })
    ));
}

#[test]
fn metadata_write_without_prefix_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let container = TlvContainer::with_options(
        NoComm,
        dir.path().join("field.tlv"),
        None,
        meta_options(false),
    );
    let field = InMemoryField::new(1, (0, 1), vec![7.0]);
    let mesh = IntervalMesh {
        n_global: 1,
        range: (0, 1),
    };
    assert!(matches!(
        container.write_with_metadata(&field, &mesh),
        Err(TlvError::NoMetadataPrefix)
    ));
}

#[test]
#[serial]
fn two_rank_metadata_write_matches_serial_layout() {
    let dir = tempfile::tempdir().unwrap();
    let n = 9u64;
    let path = dir.path().join("field.tlv");
    let prefix = dir.path().join("meta");

    let handles: Vec<_> = (0..2)
        .map(|rank| {
            let path = path.clone();
            let prefix = prefix.clone();
            std::thread::spawn(move || {
                let comm = LocalComm::new(rank, 2);
                let (start, end) = local_range(rank, 2, n);
                let values: Vec<f64> = (start..end).map(|g| g as f64 / 4.0).collect();
                let field = InMemoryField::new(n, (start, end), values);
                let mesh = IntervalMesh {
                    n_global: n,
                    range: (start, end),
                };
                TlvContainer::with_options(comm, path, Some(prefix), meta_options(false))
                    .write_with_metadata(&field, &mesh)
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }

    let [cells_path, x_path, dofs_path] = companions(&prefix);
    let (_, cells) = range_io::read_range::<usize>(&cells_path, 0, n).unwrap();
    assert_eq!(cells, (0..n as usize).collect::<Vec<_>>());
    let (_, x) = range_io::read_range::<usize>(&x_path, 0, n + 1).unwrap();
    assert_eq!(x, (0..=n as usize).collect::<Vec<_>>());
    let (_, dofs) = range_io::read_range::<i32>(&dofs_path, 0, n).unwrap();
    assert_eq!(dofs, (0..n as i32).collect::<Vec<_>>());

    // a fresh single-rank group can reconstruct the whole field
    let reader = TlvContainer::with_options(
        NoComm,
        path,
        Some(prefix),
        meta_options(false),
    );
    let mut sink = InMemoryField::sink(n, (0, n));
    reader.read(&mut sink).unwrap();
    let expected: Vec<f64> = (0..n).map(|g| g as f64 / 4.0).collect();
    assert_eq!(sink.values, expected);
}
