use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::Error;

pub const CONFIG_NAME: &str = "config.ini";

/// Written by `mapmatch init-config`.
pub const TEMPLATE: &str = "\
# Geoapify Map Matching. Get a key at https://myprojects.geoapify.com/
[api]
api_url = https://api.geoapify.com/v1/mapmatching
api_key =

# Where to write <input>_response.geojson. Leave empty to write next to the input file.
[output]
output_dir =
";

/// Everything the tool reads from `config.ini`.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// No trailing slash
    pub api_url: String,
    pub api_key: String,
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// `config.ini` next to the executable, falling back to the current directory.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_NAME)))
            .unwrap_or_else(|| PathBuf::from(CONFIG_NAME))
    }

    pub fn load(path: &Path) -> Result<Config, Error> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "{} not found. Please create it.",
                path.display()
            )));
        }
        let contents = fs_err::read_to_string(path).map_err(|err| Error::Config(err.to_string()))?;
        let config = Config::parse(&contents)?;
        debug!("Loaded {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Config, Error> {
        let ini = Ini::parse(contents)?;
        let api = ini.section("api").ok_or_else(|| {
            Error::Config(
                "Config must have an [api] section with api_url and api_key.".to_string(),
            )
        })?;
        let api_url = api
            .get("api_url")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_default();
        let api_key = api
            .get("api_key")
            .map(|key| key.trim().to_string())
            .unwrap_or_default();
        if api_url.is_empty() || api_key.is_empty() {
            return Err(Error::Config(format!(
                "api_url and api_key must be set in {}.",
                CONFIG_NAME
            )));
        }

        let output_dir = ini
            .section("output")
            .and_then(|output| output.get("output_dir"))
            .map(|dir| dir.trim())
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Ok(Config {
            api_url,
            api_key,
            output_dir,
        })
    }

    /// Refuses to clobber an existing config.
    pub fn write_template(path: &Path) -> Result<(), Error> {
        if path.exists() {
            return Err(Error::Config(format!(
                "{} already exists; not overwriting it",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        fs_err::write(path, TEMPLATE)?;
        Ok(())
    }
}

/// Just enough INI: `[section]` headers, `key = value` or `key: value` lines, and full-line
/// comments starting with `#` or `;`. Keys are case-insensitive; section names aren't.
struct Ini {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Ini {
    fn parse(contents: &str) -> Result<Ini, Error> {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current: Option<String> = None;

        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|x| x.strip_suffix(']')) {
                let name = name.trim().to_string();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let split_at = line.find(|c: char| c == '=' || c == ':').ok_or_else(|| {
                Error::Config(format!(
                    "{} line {}: expected `key = value`, got {:?}",
                    CONFIG_NAME,
                    idx + 1,
                    raw
                ))
            })?;
            let section = current.as_ref().ok_or_else(|| {
                Error::Config(format!(
                    "{} line {}: {:?} comes before any [section]",
                    CONFIG_NAME,
                    idx + 1,
                    raw
                ))
            })?;
            let key = line[..split_at].trim().to_lowercase();
            let value = line[split_at + 1..].trim().to_string();
            sections
                .entry(section.clone())
                .or_default()
                .insert(key, value);
        }

        Ok(Ini { sections })
    }

    fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(name)
    }
}
