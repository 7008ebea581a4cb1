use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// What to do with an `[i]` occurrence that never meets its `[i+1]`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Unterminated {
    /// Keep the array, drop its range: it still iterates, without boundaries
    #[default]
    Permissive,
    /// Reject the template with `UnterminatedRepetition`
    Strict,
}

/// Output encoding applied to substituted values.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Escape {
    /// Insert values verbatim
    #[default]
    None,
    /// Escape `&`, `<`, `>` and strip control characters
    Xml,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub unterminated: Unterminated,
    pub escape: Escape,
}

#[derive(Default, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn unterminated(mut self, policy: Unterminated) -> Self {
        self.config.unterminated = policy;
        self
    }

    pub fn escape(mut self, escape: Escape) -> Self {
        self.config.escape = escape;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

const CANDIDATE_NAMES: &[&str] = &[".tessera.toml", "tessera.toml"];

fn parse_config_str(s: &str, path: &Path) -> io::Result<Config> {
    toml::from_str::<Config>(s).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid config {}: {e}", path.display()),
        )
    })
}

fn read_config(path: &Path) -> io::Result<Config> {
    log::debug!("Reading config from: {}", path.display());
    let s = fs::read_to_string(path)?;
    let config = parse_config_str(&s, path)?;
    log::info!("Loaded config from: {}", path.display());
    Ok(config)
}

fn find_in_tree(start_dir: &Path) -> Option<PathBuf> {
    for dir in start_dir.ancestors() {
        for name in CANDIDATE_NAMES {
            let p = dir.join(name);
            if p.is_file() {
                return Some(p);
            }
        }
    }
    None
}

fn xdg_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let p = Path::new(&xdg).join("tessera").join("config.toml");
        if p.is_file() {
            return Some(p);
        }
    }
    let p = dirs::config_dir()?.join("tessera").join("config.toml");
    p.is_file().then_some(p)
}

/// Load configuration with precedence:
/// 1) explicit path (error if unreadable/invalid)
/// 2) walk up from start_dir: .tessera.toml, tessera.toml
/// 3) XDG: $XDG_CONFIG_HOME/tessera/config.toml or the platform config dir
/// 4) default config
pub fn load(explicit: Option<&Path>, start_dir: &Path) -> io::Result<(Config, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let cfg = read_config(path)?;
        return Ok((cfg, Some(path.to_path_buf())));
    }

    for found in [find_in_tree(start_dir), xdg_config_path()].into_iter().flatten() {
        match read_config(&found) {
            Ok(cfg) => return Ok((cfg, Some(found))),
            Err(e) => log::warn!("Ignoring config {}: {}", found.display(), e),
        }
    }

    log::debug!("No config file found, using defaults");
    Ok((Config::default(), None))
}
