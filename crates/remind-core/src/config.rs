use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV_VAR: &str = "REMINDRC";
const RC_FILE_NAME: &str = ".remindrc";
const DEFAULT_DATA_DIR: &str = ".remind";

const DEFAULTS: [(&str, &str); 4] = [
  ("data.location", "~/.remind"),
  ("default.command", "list"),
  ("color", "on"),
  ("migrate.on_load", "on")
];

/// Flat `key=value` settings from the
/// rc file, defaults and overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map: BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map: DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

/// One meaningful line of an rc file.
#[derive(Debug, PartialEq, Eq)]
enum RcLine {
  Include(String),
  Setting(String, String)
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override) {
      | Some(path) => {
        info!(rcfile = %path.display(), "loading rc file");
        let mut chain = Vec::new();
        cfg.load_file(&path, &mut chain)?;
      }
      | None => {
        debug!(
          "no rc file; using defaults"
        );
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = match k
        .strip_prefix("rc.")
      {
        | Some(rest) => rest.to_string(),
        | None => k
      };
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `None` when the key is unset or
  /// does not read as a boolean.
  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .and_then(|v| parse_bool(v))
  }

  /// Reads a boolean setting, falling
  /// back to `default` when unset. A
  /// value that is not a boolean is an
  /// error.
  pub fn bool_or(
    &self,
    key: &str,
    default: bool
  ) -> anyhow::Result<bool> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(default);
    };
    parse_bool(raw).ok_or_else(|| {
      anyhow!(
        "invalid {key} setting: {raw}"
      )
    })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// Whether read commands write the
  /// migrated form back to disk.
  pub fn persist_on_load(
    &self
  ) -> anyhow::Result<bool> {
    self.bool_or("migrate.on_load", true)
  }

  /// Loads `path` and its includes.
  /// `chain` holds the files currently
  /// being read, so an include that
  /// points back into it is rejected.
  #[tracing::instrument(skip(
    self, chain
  ))]
  fn load_file(
    &mut self,
    path: &Path,
    chain: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let identity = fs::canonicalize(
      &path
    )
    .unwrap_or_else(|_| path.clone());

    if chain.contains(&identity) {
      return Err(anyhow!(
        "include cycle: {} is already \
         being loaded",
        path.display()
      ));
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map_or_else(
        || PathBuf::from("."),
        Path::to_path_buf
      );

    chain.push(identity);
    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line_num = idx + 1;
      let parsed = parse_rc_line(raw_line)
        .with_context(|| {
          format!(
            "invalid config line \
             {}:{line_num}: {raw_line}",
            path.display()
          )
        })?;

      match parsed {
        | None => {}
        | Some(RcLine::Setting(key, value)) => {
          trace!(key = %key, value = %value, "loaded config key");
          self.map.insert(key, value);
        }
        | Some(RcLine::Include(target)) => {
          let include_path =
            resolve_include_path(
              &base_dir, &target
            )?;
          debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num,
            "processing include"
          );
          if include_path.exists() {
            self.load_file(
              &include_path,
              chain
            )?;
          } else {
            warn!(include = %include_path.display(), "include file does not exist; skipping");
          }
        }
      }
    }
    chain.pop();

    Ok(())
  }
}

fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine>> {
  let line = strip_comment(raw);
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(rest) =
    line.strip_prefix("include ")
  {
    return Ok(Some(RcLine::Include(
      rest.trim().to_string()
    )));
  }

  let (k, v) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!("expected key = value")
    })?;
  let key = k.trim();
  if key.is_empty() {
    return Err(anyhow!("empty key"));
  }

  Ok(Some(RcLine::Setting(
    key.to_string(),
    v.trim().to_string()
  )))
}

/// The data directory: `--data` first,
/// then `data.location`, then
/// `~/.remind`. Created if missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir
    .map(Path::to_path_buf)
    .or_else(|| {
      cfg
        .get("data.location")
        .map(|v| expand_tilde(Path::new(&v)))
    }) {
    | Some(dir) => dir,
    | None => {
      dirs::home_dir()
        .ok_or_else(|| {
          anyhow!(
            "cannot determine home \
             directory"
          )
        })?
        .join(DEFAULT_DATA_DIR)
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// `--rcfile`, then `$REMINDRC`
/// (`/dev/null` disables), then
/// `~/.remindrc` if it exists.
fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return None;
  };
  Some(home.join(RC_FILE_NAME))
    .filter(|candidate| {
      candidate.exists()
    })
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn strip_comment(raw: &str) -> &str {
  let line = raw.trim();
  match line.split_once('#') {
    | Some((before, _)) => before.trim(),
    | None => line
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
