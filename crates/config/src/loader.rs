use std::{env, path::Path, sync::LazyLock};

use anyhow::bail;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::fmt::Write;
use toml::Value;

use crate::{BackendKind, Config};

static ENV_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex"));

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_env_vars(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;

    for warning in validate_with_warnings(&config)? {
        log::warn!("{warning}");
    }

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    validate_with_warnings(config).map(|_| ())
}

fn validate_with_warnings(config: &Config) -> anyhow::Result<Vec<String>> {
    let mut warnings = Vec::new();
    let chain = &config.identity.chain;

    if chain.is_empty() {
        bail!("identity.chain must name at least one backend (token, session or ip)");
    }

    if chain.contains(&BackendKind::Token) && config.token.is_none() {
        bail!("identity.chain contains the token backend but no [token] section is configured");
    }

    for (i, kind) in chain.iter().enumerate() {
        if chain[..i].contains(kind) {
            warnings.push(format!("Backend '{kind}' appears more than once in identity.chain"));
        }
    }

    if config.identity.session.issue && !chain.contains(&BackendKind::Session) {
        warnings.push("identity.session.issue is enabled but the session backend is not in identity.chain".into());
    }

    for route in &config.routes {
        if !route.path.starts_with('/') {
            bail!("Route path '{}' must start with '/'", route.path);
        }

        if route.path == config.server.health.path && config.server.health.enabled {
            warnings.push(format!(
                "Route '{}' shadows the health endpoint and its limits will never apply",
                route.path
            ));
        }

        for limit in &route.limits {
            if limit.capacity == 0 {
                bail!("Limit on route '{}' has a capacity of zero", route.path);
            }

            if limit.window.as_secs() == 0 || limit.window.subsec_nanos() != 0 {
                bail!(
                    "Limit on route '{}' has window {:?}; windows must be a positive whole number of seconds",
                    route.path,
                    limit.window
                );
            }
        }
    }

    Ok(warnings)
}

fn expand_env_vars<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => {
            let mut missing = None;

            let expanded = ENV_PATTERN.replace_all(s, |caps: &Captures<'_>| match env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            });

            if let Some(name) = missing {
                let mut p = String::new();

                for segment in path.iter() {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]")?,
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand environment variable '{name}' at path '{p}'");
            }

            *s = expanded.into_owned();
        }
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_env_vars(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_env_vars(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}
