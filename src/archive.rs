use crate::error::SnapError;
use crate::interrupt::InterruptContext;
use crate::Result;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deflate level used for every entry
const COMPRESSION_LEVEL: i64 = 9;

const TEMP_PREFIX: &str = ".savesnap_temp_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub archive_path: PathBuf,
    pub files_archived: usize,
    pub total_size: u64,
}

/// Pack `source` (a file or a directory tree) into the zip file `destination`.
///
/// A directory is stored under its own name, with relative paths below it
/// preserved. A single file becomes one entry named after the file. The
/// archive is written under a temporary name and renamed when complete.
pub fn create_archive(
    source: &Path,
    destination: &Path,
    context: &InterruptContext,
) -> Result<ArchiveSummary> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    ensure_directory(parent)?;

    let temp_path = temp_archive_path(destination)?;
    let guard = context.register(temp_path.clone());

    let file = File::create(&temp_path).map_err(|e| SnapError::archive(destination, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let mut summary = ArchiveSummary {
        archive_path: destination.to_path_buf(),
        files_archived: 0,
        total_size: 0,
    };

    if source.is_dir() {
        add_directory(&mut zip, source, destination, context, &mut summary)?;
    } else {
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SnapError::validation("Invalid save filename"))?;
        add_file(&mut zip, source, name, destination, &mut summary)?;
    }

    let mut writer = zip
        .finish()
        .map_err(|e| SnapError::archive(destination, e))?;
    writer
        .flush()
        .map_err(|e| SnapError::archive(destination, e))?;
    drop(writer);

    if context.is_interrupted() {
        return Err(SnapError::Interrupted);
    }

    fs::rename(&temp_path, destination).map_err(|e| SnapError::archive(destination, e))?;
    guard.complete();

    debug!(
        archive = %destination.display(),
        files = summary.files_archived,
        bytes = summary.total_size,
        "archive written"
    );
    Ok(summary)
}

/// Create `dir` and any missing parents
pub fn ensure_directory(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }

    fs::create_dir_all(dir).map_err(|source| SnapError::DirectoryCreateFailure {
        path: dir.to_path_buf(),
        source,
    })?;
    debug!(path = %dir.display(), "directory created");
    Ok(true)
}

fn add_directory<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    source: &Path,
    destination: &Path,
    context: &InterruptContext,
    summary: &mut ArchiveSummary,
) -> Result<()> {
    let base_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SnapError::validation("Invalid save directory name"))?;

    zip.add_directory(format!("{base_name}/"), entry_options(0))
        .map_err(|e| SnapError::archive(destination, e))?;

    for entry in WalkDir::new(source)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        if context.is_interrupted() {
            return Err(SnapError::Interrupted);
        }

        let entry = entry.map_err(|e| SnapError::archive(destination, e))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| SnapError::archive(destination, e))?;
        let name = entry_name(base_name, relative)?;

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), entry_options(0))
                .map_err(|e| SnapError::archive(destination, e))?;
        } else if entry.file_type().is_file() {
            add_file(zip, entry.path(), &name, destination, summary)?;
        }
    }

    Ok(())
}

fn add_file<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
    destination: &Path,
    summary: &mut ArchiveSummary,
) -> Result<()> {
    let mut file = File::open(path).map_err(|e| SnapError::archive(destination, e))?;
    let size = file
        .metadata()
        .map_err(|e| SnapError::archive(destination, e))?
        .len();

    zip.start_file(name, entry_options(size))
        .map_err(|e| SnapError::archive(destination, e))?;
    let written = io::copy(&mut file, zip).map_err(|e| SnapError::archive(destination, e))?;

    summary.files_archived += 1;
    summary.total_size += written;
    Ok(())
}

fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
        .large_file(size >= u32::MAX as u64)
}

/// Zip entry names always use `/`
fn entry_name(base_name: &str, relative: &Path) -> Result<String> {
    let mut name = base_name.to_string();
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| SnapError::validation(format!("Invalid path in save: {}", relative.display())))?;
        name.push('/');
        name.push_str(part);
    }
    Ok(name)
}

/// Create a temporary archive path next to the final one
fn temp_archive_path(archive_path: &Path) -> Result<PathBuf> {
    let parent = archive_path.parent().unwrap_or(Path::new("."));
    let filename = archive_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SnapError::validation("Invalid archive filename"))?;

    let temp_name = format!("{TEMP_PREFIX}{}_{filename}", std::process::id());
    Ok(parent.join(temp_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn entry_names(archive: &Path) -> Vec<String> {
        let zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    fn read_entry(archive: &Path, name: &str) -> String {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut entry = zip.by_name(name).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_archive_single_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("saves").join("slot1.sav");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "Hello, World!").unwrap();

        let destination = dir.path().join("backups").join("g_slot1.zip");
        let context = InterruptContext::new();
        let summary = create_archive(&source, &destination, &context).unwrap();

        assert_eq!(summary.files_archived, 1);
        assert_eq!(summary.total_size, 13);
        assert!(destination.exists());
        assert_eq!(entry_names(&destination), vec!["slot1.sav"]);
        assert_eq!(read_entry(&destination, "slot1.sav"), "Hello, World!");
        assert!(context.active_archives().is_empty());
    }

    #[test]
    fn test_archive_directory_tree() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("World");
        fs::create_dir_all(source.join("region").join("deep")).unwrap();
        fs::create_dir_all(source.join("empty")).unwrap();
        fs::write(source.join("level.dat"), "level").unwrap();
        fs::write(source.join("region").join("r.0.0.mca"), "chunk").unwrap();
        fs::write(source.join("region").join("deep").join("x"), "deep").unwrap();

        let destination = dir.path().join("out.zip");
        let summary = create_archive(&source, &destination, &InterruptContext::new()).unwrap();

        assert_eq!(summary.files_archived, 3);
        assert_eq!(summary.total_size, 14);
        assert_eq!(
            entry_names(&destination),
            vec![
                "World/",
                "World/empty/",
                "World/level.dat",
                "World/region/",
                "World/region/deep/",
                "World/region/deep/x",
                "World/region/r.0.0.mca",
            ]
        );
        assert_eq!(read_entry(&destination, "World/region/deep/x"), "deep");
    }

    #[test]
    fn test_archive_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("save.dat");
        fs::write(&source, "x").unwrap();
        let out_dir = dir.path().join("out");

        create_archive(&source, &out_dir.join("a.zip"), &InterruptContext::new()).unwrap();

        let names: Vec<_> = fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.zip"]);
    }

    #[test]
    fn test_archive_interrupted_keeps_temp_for_handler() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("World");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a"), "a").unwrap();

        let context = InterruptContext::new();
        context.set_interrupted(true);
        let destination = dir.path().join("out.zip");

        let result = create_archive(&source, &destination, &context);
        assert!(matches!(result, Err(SnapError::Interrupted)));
        assert!(!destination.exists());

        context.cleanup_active_archives();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_directory_create_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "i am a file").unwrap();
        let source = dir.path().join("save.dat");
        fs::write(&source, "x").unwrap();

        let destination = blocker.join("sub").join("a.zip");
        match create_archive(&source, &destination, &InterruptContext::new()) {
            Err(SnapError::DirectoryCreateFailure { path, .. }) => {
                assert_eq!(path, blocker.join("sub"))
            }
            other => panic!("Expected DirectoryCreateFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        assert!(ensure_directory(&nested).unwrap());
        assert!(nested.is_dir());
        assert!(!ensure_directory(&nested).unwrap());
    }

    #[test]
    fn test_temp_archive_path() {
        let temp = temp_archive_path(Path::new("/backups/g_temp.zip")).unwrap();
        let name = temp.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(TEMP_PREFIX));
        assert!(name.ends_with("_g_temp.zip"));
        assert_eq!(temp.parent(), Some(Path::new("/backups")));
    }
}
