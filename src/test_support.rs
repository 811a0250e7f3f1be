use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::job::JobSpec;
use crate::quality::{Preset, Quality, QualityRange};

/// Writes an executable `/bin/sh` script standing in for the encoder.
/// `$out` holds the last argument (the output path) and `-version` exits 0.
#[cfg(unix)]
pub fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffmpeg");
    let script = format!(
        "#!/bin/sh\n[ \"$1\" = \"-version\" ] && exit 0\nfor arg; do out=\"$arg\"; done\n{}\n",
        body);
    fs::write(&path, script).unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
    path
}

/// Creates a file reporting `len` bytes without writing them.
pub fn sparse_file(path: &Path, len: u64) -> PathBuf {
    File::create(path).unwrap().set_len(len).unwrap();
    path.to_path_buf()
}

pub fn job(source: &Path, output: &Path) -> JobSpec {
    JobSpec::new(
        source.to_path_buf(),
        output.to_path_buf(),
        Quality::new(23, &QualityRange::default()).unwrap(),
        Preset::Balanced)
}
