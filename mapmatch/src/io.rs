use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::Error;

/// Suffix added to the input's file stem to name the result.
pub const OUTPUT_SUFFIX: &str = "_response";
pub const OUTPUT_EXTENSION: &str = "geojson";

/// Reads and parses any JSON file. A missing file and an unparsable one are reported
/// differently.
pub fn read_json(path: &Path) -> Result<Value, Error> {
    let contents = match fs_err::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }
        Err(err) if err.kind() == ErrorKind::InvalidData => {
            return Err(Error::InputParse {
                path: path.to_path_buf(),
                reason: "not valid UTF-8".to_string(),
            });
        }
        Err(err) => return Err(Error::Io(err)),
    };
    serde_json::from_str(&contents).map_err(|err| Error::InputParse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Like `read_json`, but insists on an object at the top level.
pub fn read_geojson(path: &Path) -> Result<Value, Error> {
    let geojson = read_json(path)?;
    if !geojson.is_object() {
        return Err(Error::InputParse {
            path: path.to_path_buf(),
            reason: "expected a JSON object at the top level".to_string(),
        });
    }
    Ok(geojson)
}

/// Pretty-printed with 2 spaces. Non-ASCII characters are written as-is.
pub fn to_json<T: Serialize>(obj: &T) -> Result<String, Error> {
    serde_json::to_string_pretty(obj).map_err(|err| Error::Unclassified(err.into()))
}

/// Creates parent directories as needed and overwrites any existing file.
pub fn write_json<T: Serialize>(path: &Path, obj: &T) -> Result<(), Error> {
    let contents = to_json(obj)?;
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, contents)?;
    Ok(())
}

/// Where the result for `input` goes: `<stem>_response.geojson`, in `output_dir` if set, otherwise
/// next to the input.
pub fn output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let dir = match output_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(format!("{}{}.{}", stem, OUTPUT_SUFFIX, OUTPUT_EXTENSION))
}
