//! Reads urpmi media synthesis hdlists into [`RpmArtifact`] records.
//!
//! Grounded on `original_source/mdvpkg/urpmi/media.py`'s `UrpmiMedia`
//! class: a media is a name, an `ignore`/`update` pair of flags, and a
//! `synthesis.hdlist.cz` file under the media data directory. `list()`
//! here corrects the record-boundary bug described in `record`'s module
//! doc comment.

#![allow(clippy::module_name_repetitions)]

mod nvra;
mod record;

pub use nvra::parse_rpm_name;

use flate2::read::GzDecoder;
use mdvpkg_core::{Error, Result, RpmArtifact};
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// A single urpmi media, as declared in the `urpmi.cfg` media block
/// (`mdvpkg_config::MediaEntry`) together with the on-disk data
/// directory it reads from.
#[derive(Debug, Clone)]
pub struct Media {
    /// Media name, as it appears in `urpmi.cfg`.
    pub name: String,
    /// When `true`, this media contributes nothing to the index:
    /// [`Media::list`] returns an empty vector without touching disk.
    pub ignore: bool,
    /// Whether this media participates in update checks. Carried
    /// through for the index layer; `list()` itself reads the same
    /// file regardless.
    pub update: bool,
    /// Root directory holding `<name>/synthesis.hdlist.cz` files.
    pub data_dir: PathBuf,
}

impl Media {
    /// Path to this media's compressed synthesis hdlist.
    #[must_use]
    pub fn hdlist_path(&self) -> PathBuf {
        self.data_dir.join(&self.name).join("synthesis.hdlist.cz")
    }

    /// Read and decompress the synthesis hdlist, returning every
    /// artifact it describes.
    ///
    /// Returns an empty vector immediately, without opening the file,
    /// when `ignore` is set.
    ///
    /// # Errors
    /// [`Error::Io`] if the hdlist cannot be opened; individual records
    /// with an unparseable compound name are skipped with a
    /// `tracing::warn!`, not surfaced as an error.
    pub fn list(&self) -> Result<Vec<RpmArtifact>> {
        if self.ignore {
            return Ok(Vec::new());
        }
        let path = self.hdlist_path();
        let file = File::open(&path).map_err(|err| Error::io(&path, err))?;
        let reader = BufReader::new(GzDecoder::new(file));
        record::parse_lines(reader.lines(), &self.name)
    }
}

/// Read a synthesis hdlist already decompressed on disk (plain text,
/// not gzip), used by tests and by media configured with
/// `compressed:no` blocks.
pub fn list_uncompressed(path: &Path, media_name: &str) -> Result<Vec<RpmArtifact>> {
    let file = File::open(path).map_err(|err| Error::io(path, err))?;
    let reader = BufReader::new(file);
    record::parse_lines(reader.lines(), media_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_synthesis(dir: &Path, media: &str, contents: &str) {
        let media_dir = dir.join(media);
        std::fs::create_dir_all(&media_dir).unwrap();
        let file = File::create(media_dir.join("synthesis.hdlist.cz")).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn ignored_media_yields_nothing_without_reading_disk() {
        let media = Media {
            name: "core".to_string(),
            ignore: true,
            update: false,
            data_dir: PathBuf::from("/nonexistent"),
        };
        assert_eq!(media.list().unwrap(), Vec::new());
    }

    #[test]
    fn reads_gzip_synthesis_hdlist() {
        let dir = tempfile::tempdir().unwrap();
        write_synthesis(
            dir.path(),
            "core",
            "@info@bash-5.2-1.x86_64@0@4210000@System/Shells\n@summary@The GNU shell\n",
        );
        let media = Media {
            name: "core".to_string(),
            ignore: false,
            update: true,
            data_dir: dir.path().to_path_buf(),
        };
        let artifacts = media.list().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "bash");
        assert_eq!(artifacts[0].summary, "The GNU shell");
        assert_eq!(artifacts[0].media.as_deref(), Some("core"));
    }

    #[test]
    fn missing_hdlist_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let media = Media {
            name: "core".to_string(),
            ignore: false,
            update: true,
            data_dir: dir.path().to_path_buf(),
        };
        let err = media.list().unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
