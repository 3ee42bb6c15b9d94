//! Find job directories whose LAMMPS run never got as far as printing an energy
//!
//! Used after a chain has run to decide which elements need resubmitting. The energies are only
//! reported, nothing is computed from them.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::info;
use regex_lite::Regex;

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// No run log in the directory
    Missing,
    Empty,
    /// The log exists but holds no energy output
    NoEnergy { size: u64 },
    Complete { total_energy: Option<f64>, cohesive_energy: Option<f64> },
}

impl RunStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, RunStatus::Complete { .. })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunStatus::Missing => write!(f, "no run log"),
            RunStatus::Empty => write!(f, "empty file"),
            RunStatus::NoEnergy { size } if *size < 1024 => write!(f, "no energies, {size} bytes"),
            RunStatus::NoEnergy { size } => write!(f, "no energies, {:.1} KB", *size as f64 / 1024.0),
            RunStatus::Complete { total_energy, .. } => match total_energy {
                Some(energy) => write!(f, "total energy {energy} eV"),
                None => write!(f, "energies present"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunCheck {
    pub folder: PathBuf,
    pub status: RunStatus,
}

struct Patterns {
    total: Regex,
    cohesive: Regex,
    thermo: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        total: Regex::new(r"Total energy \(eV\)\s*=\s*(-?[0-9.]+(?:[eE][-+]?[0-9]+)?)").expect("total energy pattern"),
        cohesive: Regex::new(r"Cohesive energy \(eV\)\s*=\s*(-?[0-9.]+(?:[eE][-+]?[0-9]+)?)").expect("cohesive energy pattern"),
        thermo: Regex::new(r"PotEng\s+-?[0-9.]+").expect("thermo pattern"),
    })
}

/// Classify the contents of one run log
pub fn classify(content: &str) -> RunStatus {
    if content.is_empty() {
        return RunStatus::Empty;
    }
    let patterns = patterns();
    let energy = |re: &Regex| re.captures(content).and_then(|caps| caps[1].parse::<f64>().ok());
    let total_energy = energy(&patterns.total);
    let cohesive_energy = energy(&patterns.cohesive);

    if total_energy.is_some() || cohesive_energy.is_some() || patterns.thermo.is_match(content) {
        RunStatus::Complete { total_energy, cohesive_energy }
    } else {
        RunStatus::NoEnergy { size: content.len() as u64 }
    }
}

/// Inspect `<folder>/<log_name>`
pub fn inspect(folder: &Path, log_name: &str) -> io::Result<RunStatus> {
    let path = folder.join(log_name);
    match fs::read(&path) {
        Ok(bytes) => Ok(classify(&String::from_utf8_lossy(&bytes))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(RunStatus::Missing),
        Err(err) => Err(err),
    }
}

/// Check every sub-directory of `dir` whose name starts with `prefix`
///
/// Folders are ordered by the number after the prefix (`vac_2` before `vac_10`), folders without
/// one come last in name order.
pub fn check_runs(dir: &Path, prefix: &str, log_name: &str) -> io::Result<Vec<RunCheck>> {
    let mut folders: Vec<(Option<u64>, String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) || !entry.file_type()?.is_dir() {
            continue;
        }
        let number = name[prefix.len()..].parse::<u64>().ok();
        folders.push((number, name, entry.path()));
    }
    folders.sort_by(|a, b| (a.0.is_none(), a.0, &a.1).cmp(&(b.0.is_none(), b.0, &b.1)));
    info!("Checking {} {}* folders in {}", folders.len(), prefix, dir.display());

    folders
        .into_iter()
        .map(|(_, _, folder)| {
            let status = inspect(&folder, log_name)?;
            Ok(RunCheck { folder, status })
        })
        .collect()
}
