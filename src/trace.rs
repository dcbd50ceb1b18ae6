use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::commons::Addr;
use crate::error::{ConfigError, SimResult, TraceError};

/// Directory probed when only a benchmark base name is given.
pub const DEFAULT_TRACES_DIR: &str = "tests/benchmark_traces";

// instructions

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instr {
    Read(Addr),
    Write(Addr),
    Other(u64),
}

pub type Instructions = VecDeque<Instr>;

/// Accepts decimal ("1234") and 0x-prefixed hex ("0x4d2") values.
fn parse_auto_base(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// Parse one core's trace: a line per record, `<label> <value>`,
/// label 0 = load, 1 = store, 2 = compute.
pub fn parse_trace<R: BufRead>(reader: R, path: &str) -> SimResult<Instructions> {
    let mut instrs = Instructions::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(label), Some(value)) = (parts.next(), parts.next()) else {
            return Err(TraceError::Malformed {
                path: path.to_string(),
                line: n + 1,
            }
            .into());
        };
        let value = value.to_string();
        let parsed = parse_auto_base(&value).ok_or_else(|| TraceError::BadValue {
            path: path.to_string(),
            line: n + 1,
            value: value.clone(),
        });
        instrs.push_back(match label {
            "0" => Instr::Read(Addr(parsed? as u32)),
            "1" => Instr::Write(Addr(parsed? as u32)),
            "2" => Instr::Other(parsed?),
            _ => {
                return Err(TraceError::UnknownLabel {
                    path: path.to_string(),
                    line: n + 1,
                    label: label.to_string(),
                }
                .into())
            }
        });
    }
    Ok(instrs)
}

pub fn read_trace_file(path: &Path) -> SimResult<Instructions> {
    let file = File::open(path)
        .map_err(|_| ConfigError::MissingTrace(path.to_path_buf()))?;
    parse_trace(BufReader::new(file), &path.to_string_lossy())
}

/// Read one trace per core, enforcing the configured core count.
pub fn load_traces(paths: &[PathBuf], cores: usize) -> SimResult<Vec<Instructions>> {
    if paths.len() != cores {
        return Err(ConfigError::WrongTraceCount {
            expected: cores,
            got: paths.len(),
        }
        .into());
    }
    paths.iter().map(|p| read_trace_file(p)).collect()
}

/// Resolve the per-core trace files for a run.
///
/// `input` is either an explicit `<base>_0.data` path, whose `_1`..`_{n-1}`
/// siblings are taken from the same directory, or a bare benchmark name
/// looked up under [`DEFAULT_TRACES_DIR`] and then the working directory.
pub fn resolve_trace_set(input: &str, cores: usize) -> Result<Vec<PathBuf>, ConfigError> {
    let candidates = |base: &str| -> Vec<PathBuf> {
        (0..cores)
            .map(|i| PathBuf::from(format!("{base}_{i}.data")))
            .collect()
    };

    let set = if let Some(base) = input.strip_suffix("_0.data") {
        candidates(base)
    } else {
        let in_default = candidates(&format!("{DEFAULT_TRACES_DIR}/{input}"));
        if in_default.iter().all(|p| p.is_file()) {
            in_default
        } else {
            candidates(input)
        }
    };

    for path in &set {
        if !path.is_file() {
            return Err(ConfigError::MissingTrace(path.clone()));
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulatorError;
    use std::io::Cursor;

    fn parse(text: &str) -> SimResult<Instructions> {
        parse_trace(Cursor::new(text), "test.data")
    }

    #[test]
    fn parses_loads_stores_and_computes() {
        let instrs = parse("0 0x10\n1 32\n2 200\n").unwrap();
        assert_eq!(
            Vec::from(instrs),
            vec![
                Instr::Read(Addr(0x10)),
                Instr::Write(Addr(32)),
                Instr::Other(200),
            ]
        );
    }

    #[test]
    fn accepts_hex_and_decimal_values() {
        let instrs = parse("0 0x4d2\n0 1234\n").unwrap();
        assert_eq!(instrs[0], instrs[1]);
    }

    #[test]
    fn rejects_unknown_label() {
        let err = parse("3 0x0\n").unwrap_err();
        assert!(matches!(
            err,
            SimulatorError::Trace(TraceError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn rejects_garbage_value() {
        let err = parse("0 0xzz\n").unwrap_err();
        assert!(matches!(
            err,
            SimulatorError::Trace(TraceError::BadValue { .. })
        ));
    }

    #[test]
    fn rejects_missing_value() {
        let err = parse("0\n").unwrap_err();
        assert!(matches!(
            err,
            SimulatorError::Trace(TraceError::Malformed { .. })
        ));
    }

    #[test]
    fn trailing_computes_are_kept() {
        let instrs = parse("0 0x0\n2 50\n2 70\n").unwrap();
        assert_eq!(instrs.len(), 3);
        assert_eq!(instrs[2], Instr::Other(70));
    }

    #[test]
    fn resolves_bundled_benchmark_traces_by_base_name() {
        let set = resolve_trace_set("sample", 4).unwrap();
        assert_eq!(set.len(), 4);
        assert!(set[3].ends_with("sample_3.data"));
    }

    #[test]
    fn resolves_siblings_of_an_explicit_first_trace() {
        let set = resolve_trace_set("tests/benchmark_traces/sample_0.data", 4).unwrap();
        assert_eq!(set.len(), 4);
        assert!(set[1].ends_with("tests/benchmark_traces/sample_1.data"));
    }

    #[test]
    fn missing_traces_are_a_config_error() {
        assert!(matches!(
            resolve_trace_set("no_such_benchmark", 4),
            Err(ConfigError::MissingTrace(_))
        ));
    }

    #[test]
    fn trace_count_mismatch_is_a_config_error() {
        let err = load_traces(&[], 4).unwrap_err();
        assert!(matches!(
            err,
            SimulatorError::Config(ConfigError::WrongTraceCount { expected: 4, got: 0 })
        ));
    }
}
