//! Train/validation split of downloaded images
//!
//! Randomly samples a fraction of each class directory for validation, copies
//! both subsets under `{dest}/valid/{class}` and `{dest}/train/{class}`, and
//! keeps `valid.csv` / `train.csv` indexes of `Filename,Classname` rows.

use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use rand::{Rng, seq::SliceRandom};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

pub const INDEX_HEADER: &str = "Filename,Classname";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Train,
    Valid,
}

impl Usage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Usage::Train => "train",
            Usage::Valid => "valid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub dest: PathBuf,
    /// Share of each class sent to validation, rounded up
    pub frac: f64,
    /// Only write the indexes, pointing at the source files
    pub csv_only: bool,
}

impl SplitOptions {
    pub fn index_path(&self, usage: Usage) -> PathBuf {
        self.dest.join(format!("{}.csv", usage.as_str()))
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.frac) {
            return Err(Error::InvalidFraction(self.frac));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub train: Vec<PathBuf>,
    pub valid: Vec<PathBuf>,
}

/// Number of files sent to validation out of `len`.
pub fn validation_count(len: usize, frac: f64) -> usize {
    ((len as f64 * frac).ceil() as usize).min(len)
}

/// Regular files directly inside `dir`, sorted by path.
fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = jwalk::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path())
        .collect();
    files.sort();
    files
}

fn list_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = jwalk::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs
}

/// Appends rows to an index, skipping rows it already holds.
pub fn append_index(csv_path: &Path, files: &[PathBuf], classname: &str) -> Result<()> {
    let existing = match fs::read_to_string(csv_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let mut known: HashSet<String> = existing.lines().map(str::to_string).collect();

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    if existing.is_empty() {
        writeln!(file, "{INDEX_HEADER}")?;
    }

    let mut written = 0;
    for path in files {
        let line = format!("{},{}", path.display(), classname);
        if !known.insert(line.clone()) {
            continue;
        }
        writeln!(file, "{line}")?;
        written += 1;
    }

    debug!(index = ?csv_path, rows = written, "Index written");
    Ok(())
}

fn copy_into(files: &[PathBuf], target_dir: &Path, usage: Usage) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::with_capacity(files.len());
    for from in files {
        let Some(file_name) = from.file_name() else {
            continue;
        };
        let to = target_dir.join(file_name);
        debug!(from = ?from, to = ?to, usage = usage.as_str(), "Copying");
        fs::copy(from, &to)?;
        copied.push(to);
    }
    Ok(copied)
}

/// Splits the files of one class directory.
#[instrument(level = "debug", skip(options, rng))]
pub fn split_class<R: Rng + ?Sized>(
    src_dir: &Path,
    classname: &str,
    options: &SplitOptions,
    rng: &mut R,
) -> Result<SplitReport> {
    options.validate()?;

    let train_dir = options.dest.join(Usage::Train.as_str()).join(classname);
    let valid_dir = options.dest.join(Usage::Valid.as_str()).join(classname);
    fs::create_dir_all(&train_dir)?;
    fs::create_dir_all(&valid_dir)?;

    let mut files = list_files(src_dir);
    let valid_len = validation_count(files.len(), options.frac);
    files.shuffle(rng);
    let mut train = files.split_off(valid_len);
    let mut valid = files;
    train.sort();
    valid.sort();

    let report = if options.csv_only {
        SplitReport { train, valid }
    } else {
        SplitReport {
            valid: copy_into(&valid, &valid_dir, Usage::Valid)?,
            train: copy_into(&train, &train_dir, Usage::Train)?,
        }
    };

    append_index(&options.index_path(Usage::Valid), &report.valid, classname)?;
    append_index(&options.index_path(Usage::Train), &report.train, classname)?;

    info!(
        class = classname,
        valid = report.valid.len(),
        train = report.train.len(),
        "Class split"
    );
    Ok(report)
}

/// Splits every class directory under `src_root`, starting fresh indexes.
pub fn split_all<R: Rng + ?Sized>(
    src_root: &Path,
    options: &SplitOptions,
    rng: &mut R,
) -> Result<Vec<(String, SplitReport)>> {
    options.validate()?;

    for usage in [Usage::Valid, Usage::Train] {
        match fs::remove_file(options.index_path(usage)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mut reports = Vec::new();
    for dir in list_dirs(src_root) {
        let Some(classname) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        info!(class = %classname, "Splitting class");
        let report = split_class(&dir, &classname, options, rng)?;
        reports.push((classname, report));
    }
    Ok(reports)
}
