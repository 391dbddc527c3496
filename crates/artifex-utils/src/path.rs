use std::{
    env,
    iter::Peekable,
    path::{Path, PathBuf},
    str::Chars,
};

use crate::error::{PathError, PathResult};

/// Resolves a path string that may contain environment variables.
///
/// Expands `$VAR` and `${VAR}`, resolves a leading `~` to the user's home directory and
/// turns relative paths into absolute ones based on the current working directory.
///
/// # Errors
///
/// * [`PathError::Empty`] if the path is empty
/// * [`PathError::CurrentDir`] if the current directory cannot be determined
/// * [`PathError::MissingEnvVar`] if a referenced variable is undefined
/// * [`PathError::UnclosedVariable`] for `${VAR` without the closing brace
///
/// # Example
///
/// ```
/// use artifex_utils::error::PathResult;
/// use artifex_utils::path::resolve_path;
///
/// fn main() -> PathResult<()> {
///     let resolved = resolve_path("/srv/models")?;
///     assert!(resolved.is_absolute());
///     Ok(())
/// }
/// ```
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();

    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let path_buf = PathBuf::from(expand_variables(path)?);

    if path_buf.is_absolute() {
        Ok(path_buf)
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path_buf))
            .map_err(|err| PathError::CurrentDir { source: err })
    }
}

/// Returns the user's home directory from `$HOME`, falling back to `/home/$USER`.
pub fn home_dir() -> PathBuf {
    env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| {
        let user = env::var("USER").unwrap_or_else(|_| "root".to_string());
        PathBuf::from(format!("/home/{user}"))
    })
}

/// Returns `$XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns `$XDG_CACHE_HOME`, defaulting to `$HOME/.cache`.
pub fn xdg_cache_home() -> PathBuf {
    env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".cache"))
}

/// Resolves `path` and `root` through symbolic links and requires the result to be
/// contained in `root`.
///
/// Containment is checked component-wise on the canonical paths, so `/srv/models2` is not
/// considered inside `/srv/models`, and a symlink inside the root that points elsewhere is
/// rejected. Returns the canonical target path on success.
///
/// # Errors
///
/// * [`PathError::Canonicalize`] if either path cannot be resolved (e.g. it does not exist)
/// * [`PathError::EscapesRoot`] if the resolved target lies outside the resolved root
///
/// # Example
///
/// ```no_run
/// use artifex_utils::path::ensure_within_root;
///
/// let file = ensure_within_root("/srv/models/gallery.yaml", "/srv/models").unwrap();
/// assert!(file.starts_with("/srv/models"));
/// ```
pub fn ensure_within_root<P: AsRef<Path>, R: AsRef<Path>>(
    path: P,
    root: R,
) -> PathResult<PathBuf> {
    let resolved = canonicalize(path.as_ref())?;
    let resolved_root = canonicalize(root.as_ref())?;

    if resolved.starts_with(&resolved_root) {
        Ok(resolved)
    } else {
        Err(PathError::EscapesRoot {
            path: resolved,
            root: resolved_root,
        })
    }
}

fn canonicalize(path: &Path) -> PathResult<PathBuf> {
    path.canonicalize().map_err(|err| {
        PathError::Canonicalize {
            path: path.to_path_buf(),
            source: err,
        }
    })
}

fn expand_variables(path: &str) -> PathResult<String> {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    let var_name = consume_until(&mut chars, '}')?;
                    expand_env_var(&var_name, &mut result, path)?;
                } else {
                    let var_name = consume_var_name(&mut chars);
                    if var_name.is_empty() {
                        result.push('$');
                    } else {
                        expand_env_var(&var_name, &mut result, path)?;
                    }
                }
            }
            '~' if result.is_empty() => result.push_str(&home_dir().to_string_lossy()),
            _ => result.push(c),
        }
    }

    Ok(result)
}

fn consume_until(chars: &mut Peekable<Chars>, delimiter: char) -> PathResult<String> {
    let mut var_name = String::new();

    for c in chars.by_ref() {
        if c == delimiter {
            return Ok(var_name);
        }
        var_name.push(c);
    }

    Err(PathError::UnclosedVariable {
        input: format!("${{{var_name}"),
    })
}

fn consume_var_name(chars: &mut Peekable<Chars>) -> String {
    let mut var_name = String::new();

    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            var_name.push(c);
            chars.next();
        } else {
            break;
        }
    }

    var_name
}

fn expand_env_var(var_name: &str, result: &mut String, original: &str) -> PathResult<()> {
    match var_name {
        "HOME" => result.push_str(&home_dir().to_string_lossy()),
        "XDG_CONFIG_HOME" => result.push_str(&xdg_config_home().to_string_lossy()),
        "XDG_CACHE_HOME" => result.push_str(&xdg_cache_home().to_string_lossy()),
        _ => {
            let value = env::var(var_name).map_err(|_| {
                PathError::MissingEnvVar {
                    input: original.into(),
                    var: var_name.into(),
                }
            })?;
            result.push_str(&value);
        }
    }
    Ok(())
}
