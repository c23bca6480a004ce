use std::path::Path;

use porcupin_backup::{DiskUsageProbe, DiskUsageSample};

/// Default `DiskUsageProbe`: sums file sizes under the repo path.
///
/// The specification scopes the actual platform-specific sampler (statvfs,
/// `du`, …) out of the core; this is the minimal stand-in the node needs to
/// have *something* to construct. `total_bytes` is left at `0` (unknown) —
/// good enough to track growth over time, not to answer "how much free
/// space is left on the volume".
pub struct WalkingDiskUsageProbe;

impl DiskUsageProbe for WalkingDiskUsageProbe {
    fn sample(&self, repo_path: &Path) -> std::io::Result<DiskUsageSample> {
        let used_bytes = dir_size(repo_path)?;
        Ok(DiskUsageSample {
            used_bytes,
            total_bytes: 0,
        })
    }
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let metadata = std::fs::metadata(path)?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let mut total = 0u64;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sums_nested_file_sizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mut f1 = std::fs::File::create(dir.path().join("a.bin")).unwrap();
        f1.write_all(&[0u8; 100]).unwrap();
        let mut f2 = std::fs::File::create(dir.path().join("sub/b.bin")).unwrap();
        f2.write_all(&[0u8; 50]).unwrap();

        let probe = WalkingDiskUsageProbe;
        let sample = probe.sample(dir.path()).unwrap();
        assert_eq!(sample.used_bytes, 150);
    }

    #[test]
    fn missing_path_reports_zero() {
        let probe = WalkingDiskUsageProbe;
        let sample = probe.sample(Path::new("/nonexistent/porcupin/repo")).unwrap();
        assert_eq!(sample.used_bytes, 0);
    }
}
