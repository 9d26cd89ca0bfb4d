// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! Fixture manifests with `${KEY}` / `$KEY` placeholders.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Values substituted into a [`Template`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// A named manifest template.
///
/// `${KEY}` must be supplied by the [`Params`]; a bare `$KEY` is replaced when
/// the key is known and left untouched otherwise, so shell snippets embedded
/// in manifests survive. `$$` renders a single `$`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    name: String,
    source: String,
}

impl Template {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        Ok(Self::new(path.display().to_string(), source))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, params: &Params) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                out.push('$');
                rest = tail;
            } else if let Some(braced) = after.strip_prefix('{') {
                let end = braced.find('}').ok_or_else(|| Error::Template {
                    template: self.name.clone(),
                    reason: "unterminated ${ placeholder".to_string(),
                })?;
                let key = &braced[..end];
                let value = params.get(key).ok_or_else(|| Error::Template {
                    template: self.name.clone(),
                    reason: format!("no value for ${{{key}}}"),
                })?;
                out.push_str(value);
                rest = &braced[end + 1..];
            } else {
                let len = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                let key = &after[..len];
                match params.get(key) {
                    Some(value) if !key.is_empty() => out.push_str(value),
                    _ => {
                        out.push('$');
                        out.push_str(key);
                    }
                }
                rest = &after[len..];
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Render into a fresh file under `dir` and return its path.
    pub fn render_to(&self, dir: &Path, params: &Params) -> Result<PathBuf> {
        let rendered = self.render(params)?;
        let stem = Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("manifest");
        let path = write_manifest(dir, stem, &rendered)?;
        debug!("rendered {} to {}", self.name, path.display());
        Ok(path)
    }
}

/// Write `contents` to `{stem}-{id}.yaml` under `dir`, creating `dir` first.
pub(crate) fn write_manifest(dir: &Path, stem: &str, contents: &str) -> Result<PathBuf> {
    let id = Uuid::new_v4().simple().to_string();
    let path = dir.join(format!("{stem}-{}.yaml", &id[..8]));
    fs::create_dir_all(dir)?;
    fs::write(&path, contents)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braced_and_bare_placeholders_are_substituted() {
        let template = Template::new("t", "name: ${NAME}\nnamespace: $NAMESPACE\n");
        let params = Params::from([("NAME", "etcd"), ("NAMESPACE", "test-1")]);
        assert_eq!(
            template.render(&params).unwrap(),
            "name: etcd\nnamespace: test-1\n"
        );
    }

    #[test]
    fn missing_braced_key_is_an_error() {
        let template = Template::new("sub.yaml", "channel: ${CHANNEL}");
        let err = template.render(&Params::new()).unwrap_err();
        assert_eq!(err.to_string(), "template sub.yaml: no value for ${CHANNEL}");
    }

    #[test]
    fn unknown_bare_names_and_escapes_are_kept() {
        let template = Template::new("t", "echo $HOME costs $$5 and $ alone, ${A}$A_B");
        let params = Params::from([("A", "x")]);
        assert_eq!(
            template.render(&params).unwrap(),
            "echo $HOME costs $5 and $ alone, x$A_B"
        );
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        let err = Template::new("t", "x: ${OOPS").render(&Params::new()).unwrap_err();
        assert!(matches!(err, Error::Template { .. }));
    }

    #[test]
    fn render_to_writes_a_unique_file() {
        let dir = std::env::temp_dir().join(format!("olm-e2e-template-{}", Uuid::new_v4()));
        let template = Template::new("operatorgroup.yaml", "name: ${NAME}");
        let params = Params::from([("NAME", "og-1")]);

        let first = template.render_to(&dir, &params).unwrap();
        let second = template.render_to(&dir, &params).unwrap();
        assert_ne!(first, second);
        assert!(
            first
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("operatorgroup-"))
        );
        assert_eq!(fs::read_to_string(&first).unwrap(), "name: og-1");
        fs::remove_dir_all(&dir).unwrap();
    }
}
