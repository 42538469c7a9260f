use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::types::BatchEntryOut;

const MAX_SUFFIX: usize = 10_000;

/// Save batch outcomes as a JSON array next to `out_path`.
///
/// An existing report is never replaced: the first free name among
/// `report.json`, `report (1).json`, `report (2).json`, ... is used and
/// returned.
pub fn write_batch_report<P: AsRef<Path>>(
    out_path: P,
    entries: &[BatchEntryOut],
    pretty: bool,
) -> Result<PathBuf> {
    let target = out_path.as_ref();
    let body = match pretty {
        true => serde_json::to_vec_pretty(entries),
        false => serde_json::to_vec(entries),
    }
    .context("serializing batch report")?;

    let dir = match target.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating report directory {}", dir.display()))?;

    let (mut file, written) =
        open_fresh(target).with_context(|| format!("creating report {}", target.display()))?;
    file.write_all(&body)
        .and_then(|_| file.sync_all())
        .with_context(|| format!("writing report {}", written.display()))?;
    Ok(written)
}

fn candidate(target: &Path, n: usize) -> PathBuf {
    if n == 0 {
        return target.to_path_buf();
    }
    let stem = target.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({n})"),
    };
    target.with_file_name(name)
}

/// Atomically claim the first unused candidate name.
fn open_fresh(target: &Path) -> io::Result<(File, PathBuf)> {
    for n in 0..MAX_SUFFIX {
        let path = candidate(target, n);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free report name after {MAX_SUFFIX} attempts"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryOutcome;

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(candidate(Path::new("out/r.json"), 0), PathBuf::from("out/r.json"));
        assert_eq!(candidate(Path::new("out/r.json"), 2), PathBuf::from("out/r (2).json"));
        assert_eq!(candidate(Path::new("r"), 1), PathBuf::from("r (1)"));
    }

    #[test]
    fn never_overwrites_existing_report() {
        let dir = std::env::temp_dir().join(format!("ethclient-report-{}", uuid::Uuid::new_v4()));
        let target = dir.join("report.json");
        let entries = vec![BatchEntryOut {
            record: 0,
            from: "0xa".into(),
            outcome: EntryOutcome::Submitted { hash: "0x01".into() },
        }];

        let first = write_batch_report(&target, &entries, true).unwrap();
        let second = write_batch_report(&target, &entries, false).unwrap();
        assert_eq!(first, target);
        assert_eq!(second, dir.join("report (1).json"));

        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&second).unwrap()).unwrap();
        assert_eq!(parsed[0]["status"], "submitted");
        assert_eq!(parsed[0]["hash"], "0x01");
        fs::remove_dir_all(dir).unwrap();
    }
}
