use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stackvm_core::vm::{CodeUnit, MAGIC, assemble_json, decode_unit, encode_unit};

/// Load a code unit from `path`.
///
/// Files starting with the container magic are decoded as `.svmb`; anything
/// else must be JSON assembly.
pub fn load_unit(path: &Path) -> Result<CodeUnit> {
    let bytes = fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    if bytes.starts_with(&MAGIC) {
        return decode_unit(&bytes).with_context(|| format!("failed to decode container '{}'", path.display()));
    }
    let text = std::str::from_utf8(&bytes)
        .with_context(|| format!("'{}' is neither an SVMB container nor UTF-8 assembly", path.display()))?;
    assemble_json(text).with_context(|| format!("failed to assemble '{}'", path.display()))
}

/// `foo.json` becomes `foo.svmb` next to it.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("svmb")
}

/// Fail when `out` names the same file as `input`.
pub fn ensure_distinct_output(input: &Path, out: &Path) -> Result<()> {
    let same = input == out
        || matches!(
            (fs::canonicalize(input), fs::canonicalize(out)),
            (Ok(a), Ok(b)) if a == b
        );
    if same {
        anyhow::bail!(
            "refusing to overwrite input '{}'; pass -o OUT to pick another path",
            input.display()
        );
    }
    Ok(())
}

/// Encode `unit` and write it to `out`, returning the byte count.
pub fn write_container(unit: &CodeUnit, out: &Path) -> Result<usize> {
    let bytes = encode_unit(unit).with_context(|| format!("failed to encode '{}'", unit.name))?;
    fs::write(out, &bytes).with_context(|| format!("failed to write '{}'", out.display()))?;
    Ok(bytes.len())
}
