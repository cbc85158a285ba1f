//! Hand-rolled wire format for [`super::Tree::dump_snapshot`] /
//! [`super::Tree::load_snapshot`], in the teacher's house style
//! (`byteorder`, length-prefixed big-endian fields, no derive macro —
//! compare `src/serializer/mod.rs` and `src/parser/primitive.rs` in the
//! NFS crate this workspace started from).
//!
//! Format (spec.md §4.2 "Snapshot format"): a directory record is the
//! ordered list of its subdirectory names, then its file names, then the
//! recursive encoding of each subdirectory in order, then the encoding of
//! each file's contents in order.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::codec::{read_bytes, read_string, write_bytes, write_string};

use super::{Directory, File};

pub(super) fn write_directory(dest: &mut dyn Write, dir: &Directory) -> io::Result<()> {
    dest.write_u32::<BigEndian>(dir.directories.len() as u32)?;
    for name in dir.directories.keys() {
        write_string(dest, name)?;
    }
    dest.write_u32::<BigEndian>(dir.files.len() as u32)?;
    for name in dir.files.keys() {
        write_string(dest, name)?;
    }
    for subdir in dir.directories.values() {
        write_directory(dest, subdir)?;
    }
    for file in dir.files.values() {
        write_bytes(dest, &file.contents)?;
    }
    Ok(())
}

pub(super) fn read_directory(src: &mut dyn Read) -> io::Result<Directory> {
    let num_subdirs = src.read_u32::<BigEndian>()?;
    let mut subdir_names = Vec::with_capacity(num_subdirs as usize);
    for _ in 0..num_subdirs {
        subdir_names.push(read_string(src)?);
    }
    let num_files = src.read_u32::<BigEndian>()?;
    let mut file_names = Vec::with_capacity(num_files as usize);
    for _ in 0..num_files {
        file_names.push(read_string(src)?);
    }

    let mut directories = std::collections::BTreeMap::new();
    for name in subdir_names {
        directories.insert(name, read_directory(src)?);
    }
    let mut files = std::collections::BTreeMap::new();
    for name in file_names {
        files.insert(name, File { contents: read_bytes(src)? });
    }
    Ok(Directory { directories, files })
}

#[cfg(test)]
mod tests {
    use super::super::Tree;

    #[test]
    fn empty_tree_round_trips() {
        let t = Tree::new();
        let mut buf = Vec::new();
        t.dump_snapshot(&mut buf).unwrap();
        let mut loaded = Tree::new();
        loaded.load_snapshot(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.list_directory("/").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn to_disk_round_trip() {
        let mut t = Tree::new();
        t.make_directory("/a", None).unwrap();
        t.write("/a/f", b"data".to_vec(), None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            t.dump_snapshot(&mut f).unwrap();
        }
        let mut loaded = Tree::new();
        {
            let mut f = std::fs::File::open(&path).unwrap();
            loaded.load_snapshot(&mut f).unwrap();
        }
        assert_eq!(loaded.read("/a/f").unwrap(), b"data".to_vec());
    }
}
