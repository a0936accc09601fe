//! Positional typed I/O against a container body.
//!
//! Every function takes the element type explicitly, either as a
//! [`FormatDescriptor`] (writes) or as the `T: TlvScalar` parameter (reads),
//! and refuses to touch bytes whose on-disk width disagrees with the
//! caller's element type. Byte offsets are always
//! `BODY_OFFSET + start * element_size(tag)`.

use crate::format::{BODY_OFFSET, FormatDescriptor, TlvScalar};
use crate::tlv_error::TlvError;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Create (or truncate) a container, writing header and global count only.
///
/// The body is left unallocated; ranks fill it in place later with
/// [`write_range`]. Exactly one rank per group may call this, before any
/// other rank opens the file.
pub fn create(path: &Path, desc: FormatDescriptor, global_count: u64) -> Result<(), TlvError> {
    let mut file = File::create(path)?;
    file.write_all(&[desc.encode()])?;
    file.write_all(&(global_count as i64).to_ne_bytes())?;
    Ok(())
}

/// Read header byte and global count without touching the body.
///
/// A missing file, short header, reserved type tag, or negative count is an
/// error; this probe never silently reports size 0 for a corrupt file.
pub fn probe(path: &Path) -> Result<(FormatDescriptor, u64), TlvError> {
    let mut file = File::open(path)?;
    probe_open(&mut file, path)
}

fn probe_open(file: &mut File, path: &Path) -> Result<(FormatDescriptor, u64), TlvError> {
    let mut head = [0u8; (BODY_OFFSET) as usize];
    file.read_exact(&mut head).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            TlvError::TruncatedHeader(path.to_path_buf())
        } else {
            TlvError::Io(e)
        }
    })?;
    let desc = FormatDescriptor::decode(head[0])?;
    let count = i64::from_ne_bytes(head[1..9].try_into().expect("header is 9 bytes"));
    if count < 0 {
        return Err(TlvError::NegativeCount {
            path: path.to_path_buf(),
            count,
        });
    }
    Ok((desc, count as u64))
}

/// Write `values` at element index `start` of an existing container.
///
/// The file must already hold a header and count (see [`create`]); the write
/// seeks into the body and touches exactly `values.len()` elements. The
/// descriptor must match the caller's element type.
pub fn write_range<T: TlvScalar>(
    path: &Path,
    desc: FormatDescriptor,
    start: u64,
    values: &[T],
) -> Result<(), TlvError> {
    if desc.tag != T::TAG {
        return Err(TlvError::TypeMismatch {
            expected: T::TAG,
            found: desc.tag,
        });
    }
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(BODY_OFFSET + start * desc.tag.element_size()))?;
    file.write_all(bytemuck::cast_slice(values))?;
    Ok(())
}

/// Read elements `[start, end)` of the container at `path`.
///
/// The header is decoded first, always: the returned descriptor is the only
/// source of truth for the file's stored type. Fails with
/// [`TlvError::InvertedRange`] if `start` exceeds `end`, with
/// [`TlvError::BoundsViolation`] if `end` exceeds the recorded global count,
/// and with [`TlvError::TypeMismatch`] if the stored tag is not `T`'s.
pub fn read_range<T: TlvScalar>(
    path: &Path,
    start: u64,
    end: u64,
) -> Result<(FormatDescriptor, Vec<T>), TlvError> {
    if start > end {
        return Err(TlvError::InvertedRange { start, end });
    }
    let mut file = File::open(path)?;
    let (desc, global_count) = probe_open(&mut file, path)?;
    if end > global_count {
        return Err(TlvError::BoundsViolation { end, global_count });
    }
    if desc.tag != T::TAG {
        return Err(TlvError::TypeMismatch {
            expected: T::TAG,
            found: desc.tag,
        });
    }
    let mut out = vec![T::zeroed(); (end - start) as usize];
    file.seek(SeekFrom::Start(BODY_OFFSET + start * desc.tag.element_size()))?;
    file.read_exact(bytemuck::cast_slice_mut(&mut out))?;
    Ok((desc, out))
}
