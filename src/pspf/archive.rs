//! Compressed archive codec
//!
//! Archives are a single zstd stream wrapping a POSIX tar. The directory
//! walk is deterministic: entries are visited in file-name byte order and
//! headers carry a zero mtime, so identical inputs produce identical
//! archives. Entry names always use `/` separators.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tar::EntryType;

use crate::exceptions::{PspfError, Result};

/// Directory entries are archived with mode 0755
const DIR_MODE: u32 = 0o755;

/// Glob semantics for exclusion patterns: `*` stays within one path
/// component, `**` crosses components.
const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Create a zstd-compressed tar archive of `source_dir`.
///
/// `exclude_patterns` are matched against each entry's path relative to the
/// archive root; a matching directory prunes its whole subtree. Regular
/// files keep their stat mode, directories are stored with mode 0755, and
/// symlinks store their target verbatim. Other entry types are ignored.
pub fn create_archive(source_dir: &Path, exclude_patterns: &[String]) -> Result<Vec<u8>> {
    let patterns = compile_patterns(exclude_patterns)?;

    let encoder =
        zstd::stream::write::Encoder::new(Vec::new(), zstd::DEFAULT_COMPRESSION_LEVEL)?;
    let mut builder = tar::Builder::new(encoder);

    append_dir_contents(&mut builder, source_dir, Path::new(""), &patterns)?;

    let encoder = builder
        .into_inner()
        .map_err(|e| PspfError::ArchiveCorrupt(format!("failed to finish tar stream: {e}")))?;
    let bytes = encoder.finish()?;
    Ok(bytes)
}

/// Extract a zstd-compressed tar archive into `dest`.
///
/// Every resolved target path must stay under `dest` after lexical
/// normalization; an entry that escapes fails with `PathEscape` before
/// anything is written for it. Returns the archive-relative names of the
/// regular files extracted.
pub fn extract_archive(data: &[u8], dest: &Path) -> Result<Vec<String>> {
    let decoder = zstd::stream::read::Decoder::new(data)
        .map_err(|e| PspfError::ArchiveCorrupt(format!("bad zstd stream: {e}")))?;
    let mut archive = tar::Archive::new(decoder);

    let dest_clean = clean_path(dest);
    let mut files = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| PspfError::ArchiveCorrupt(format!("bad tar stream: {e}")))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| PspfError::ArchiveCorrupt(format!("bad tar entry: {e}")))?;

        let name: PathBuf = entry
            .path()
            .map_err(|e| PspfError::ArchiveCorrupt(format!("bad entry name: {e}")))?
            .into_owned();
        let name_str = name.to_string_lossy().into_owned();

        let target = clean_path(&dest.join(&name));
        if !target.starts_with(&dest_clean) {
            return Err(PspfError::PathEscape(name_str));
        }

        match entry.header().entry_type() {
            EntryType::Directory => {
                create_dir_with_mode(&target)?;
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    create_dir_with_mode(parent)?;
                }
                let mode = entry.header().mode().unwrap_or(0o644);
                let mut file = fs::File::create(&target)?;
                io::copy(&mut entry, &mut file)
                    .map_err(|e| PspfError::ArchiveCorrupt(format!("truncated entry: {e}")))?;
                set_mode(&target, mode)?;
                files.push(name_str);
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(|e| PspfError::ArchiveCorrupt(format!("bad link target: {e}")))?
                    .ok_or_else(|| {
                        PspfError::ArchiveCorrupt(format!("symlink without target: {name_str}"))
                    })?;
                if let Some(parent) = target.parent() {
                    create_dir_with_mode(parent)?;
                }
                make_symlink(&link, &target)?;
            }
            _ => {}
        }
    }

    Ok(files)
}

fn compile_patterns(exclude_patterns: &[String]) -> Result<Vec<Pattern>> {
    exclude_patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| PspfError::InvalidArgs(format!("bad exclude pattern '{p}': {e}")))
        })
        .collect()
}

fn is_excluded(rel: &str, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|p| p.matches_with(rel, GLOB_OPTIONS))
}

/// Recursively append the contents of `root/rel`, entries in file-name byte
/// order.
fn append_dir_contents<W: io::Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    rel: &Path,
    patterns: &[Pattern],
) -> Result<()> {
    let mut entries: Vec<fs::DirEntry> =
        fs::read_dir(root.join(rel))?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let rel_path = rel.join(entry.file_name());
        let rel_name = slash_name(&rel_path);
        if is_excluded(&rel_name, patterns) {
            continue;
        }

        let meta = fs::symlink_metadata(entry.path())?;
        let file_type = meta.file_type();

        if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            header.set_mtime(0);
            builder.append_link(&mut header, &rel_name, &link_target)?;
        } else if file_type.is_dir() {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(EntryType::Directory);
            header.set_mode(DIR_MODE);
            header.set_size(0);
            header.set_mtime(0);
            builder.append_data(&mut header, format!("{rel_name}/"), io::empty())?;
            append_dir_contents(builder, root, &rel_path, patterns)?;
        } else if file_type.is_file() {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_mode(file_mode(&meta));
            header.set_size(meta.len());
            header.set_mtime(0);
            let file = fs::File::open(entry.path())?;
            builder.append_data(&mut header, &rel_name, file)?;
        }
        // sockets, fifos, devices: ignored
    }

    Ok(())
}

/// Archive-relative entry name with `/` separators regardless of host
fn slash_name(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        if let Component::Normal(part) = comp {
            parts.push(part.to_string_lossy().into_owned());
        }
    }
    parts.join("/")
}

/// Lexical path normalization: resolves `.` and `..` without touching the
/// filesystem.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn create_dir_with_mode(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        set_mode(path, DIR_MODE)?;
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    if link.exists() || fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    // Symlink creation needs privileges on Windows; store the target path
    // in a regular file instead.
    fs::write(link, target.to_string_lossy().as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use tempfile::TempDir;

    fn write_file(dir: &Path, rel: &str, contents: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    /// Build a zstd tar holding a single raw header, bypassing the writer's
    /// own path handling.
    fn raw_entry_archive(name_bytes: &[u8], contents: &[u8]) -> Vec<u8> {
        let encoder =
            zstd::stream::write::Encoder::new(Vec::new(), zstd::DEFAULT_COMPRESSION_LEVEL)
                .unwrap();
        let mut builder = tar::Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        header.as_old_mut().name[..name_bytes.len()].copy_from_slice(name_bytes);
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o600);
        header.set_size(contents.len() as u64);
        header.set_mtime(0);
        header.set_cksum();
        builder.append(&header, contents).unwrap();

        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn roundtrip_preserves_tree_and_modes() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();

        write_file(source.path(), "a.txt", b"alpha");
        write_file(source.path(), "sub/b.txt", b"beta");
        write_file(source.path(), "sub/deeper/c.bin", &[0u8, 1, 2, 3]);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(
                source.path().join("a.txt"),
                fs::Permissions::from_mode(0o755),
            )
            .unwrap();
            std::os::unix::fs::symlink("a.txt", source.path().join("link")).unwrap();
        }

        let bytes = create_archive(source.path(), &[]).unwrap();
        let mut files = extract_archive(&bytes, dest.path()).unwrap();
        files.sort();

        assert_eq!(files, vec!["a.txt", "sub/b.txt", "sub/deeper/c.bin"]);
        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"alpha");
        assert_eq!(
            fs::read(dest.path().join("sub/deeper/c.bin")).unwrap(),
            vec![0u8, 1, 2, 3]
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.path().join("a.txt"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
            let target = fs::read_link(dest.path().join("link")).unwrap();
            assert_eq!(target, PathBuf::from("a.txt"));
        }
    }

    #[test]
    fn builds_are_deterministic() {
        let source = TempDir::new().unwrap();
        write_file(source.path(), "z.txt", b"z");
        write_file(source.path(), "a.txt", b"a");
        write_file(source.path(), "m/inner.txt", b"m");

        let first = create_archive(source.path(), &[]).unwrap();
        let second = create_archive(source.path(), &[]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn exclusion_prunes_matching_subtrees() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();

        write_file(source.path(), "keep.py", b"keep");
        write_file(source.path(), "drop.pyc", b"drop");
        write_file(source.path(), "cache/drop.txt", b"drop");
        write_file(source.path(), "sub/nested.pyc", b"drop");

        let excludes = vec!["**/*.pyc".to_string(), "*.pyc".to_string(), "cache".to_string()];
        let bytes = create_archive(source.path(), &excludes).unwrap();
        let mut files = extract_archive(&bytes, dest.path()).unwrap();
        files.sort();

        assert_eq!(files, vec!["keep.py"]);
        assert!(!dest.path().join("cache").exists());
    }

    #[test]
    fn traversal_entry_fails_without_writing() {
        let dest = TempDir::new().unwrap();
        let archive = raw_entry_archive(b"../evil.txt", b"evil content");

        let err = extract_archive(&archive, dest.path()).unwrap_err();
        assert!(matches!(err, PspfError::PathEscape(_)));
        assert!(!dest.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn nested_traversal_entry_fails_without_writing() {
        let dest = TempDir::new().unwrap();
        let archive = raw_entry_archive(b"nested/../../evil2.txt", b"evil content");

        let err = extract_archive(&archive, dest.path()).unwrap_err();
        assert!(matches!(err, PspfError::PathEscape(_)));
        assert!(!dest.path().parent().unwrap().join("evil2.txt").exists());
    }

    #[test]
    fn long_entry_names_survive() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();

        // Long enough to overflow the 100-byte ustar name field.
        let long_component = "a".repeat(200);
        let rel = format!("long/{long_component}");
        write_file(source.path(), &rel, b"payload");

        let bytes = create_archive(source.path(), &[]).unwrap();
        let files = extract_archive(&bytes, dest.path()).unwrap();

        assert_eq!(files, vec![rel.clone()]);
        assert_eq!(fs::read(dest.path().join(&rel)).unwrap(), b"payload");
    }

    #[test]
    fn garbage_input_reports_archive_corrupt() {
        let dest = TempDir::new().unwrap();
        let err = extract_archive(b"not a zstd stream at all", dest.path()).unwrap_err();
        assert!(matches!(err, PspfError::ArchiveCorrupt(_)));
    }

    #[test]
    fn clean_path_resolves_lexically() {
        assert_eq!(
            clean_path(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(clean_path(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn archive_stream_is_zstd() {
        let source = TempDir::new().unwrap();
        write_file(source.path(), "x", b"x");
        let bytes = create_archive(source.path(), &[]).unwrap();
        // zstd frame magic
        assert_eq!(&bytes[..4], &[0x28, 0xb5, 0x2f, 0xfd]);
        let mut decoder = zstd::stream::read::Decoder::new(&bytes[..]).unwrap();
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).unwrap();
        // POSIX ustar magic at offset 257 of the first header
        assert_eq!(&raw[257..262], b"ustar");
    }
}
