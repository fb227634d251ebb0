//! Alias (logic helper) registry.
//!
//! An alias maps a name like `can_use(item)` to replacement rule text. The
//! compiler expands aliases textually, substituting arguments on word
//! boundaries, then re-parses the result. Bodies may reference other
//! aliases; the compiler caps expansion depth to catch cycles.

use std::collections::HashMap;

use log::debug;
use regex::{Captures, Regex};

use crate::error::CompileError;

#[derive(Debug, Clone)]
pub struct Alias {
    params: Vec<String>,
    /// One alternation over every parameter, so substitution happens in a
    /// single pass and an argument mentioning another parameter's name is
    /// never re-substituted.
    pattern: Option<Regex>,
    body: String,
}

impl Alias {
    /// Number of arguments the alias takes.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Substitute `args` for the parameters in the body text. Each parameter
    /// is replaced wherever it appears as a whole word.
    pub fn expand(&self, args: &[String]) -> String {
        let Some(pattern) = &self.pattern else {
            return self.body.clone();
        };
        pattern
            .replace_all(&self.body, |caps: &Captures<'_>| {
                match self.params.iter().position(|p| p.as_str() == &caps[0]) {
                    Some(index) => args.get(index).cloned().unwrap_or_default(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    aliases: HashMap<String, Alias>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one alias. `header` is either a bare name (`is_adult`) or a
    /// parameterized form (`can_use(item)`).
    pub fn insert(&mut self, header: &str, body: impl Into<String>) -> Result<(), CompileError> {
        let header = header.trim();
        let (name, params) = match header.split_once('(') {
            Some((name, rest)) => {
                let inner = rest.strip_suffix(')').ok_or_else(|| CompileError::Invalid {
                    spot: header.to_string(),
                    message: "alias header missing closing parenthesis".into(),
                })?;
                let params = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                (name.trim(), params)
            }
            None => (header, Vec::new()),
        };
        let pattern = build_pattern(name, &params)?;
        debug!("alias `{name}` registered ({} params)", params.len());
        self.aliases.insert(
            name.to_string(),
            Alias {
                params,
                pattern,
                body: body.into(),
            },
        );
        Ok(())
    }

    /// Load aliases from a JSON object of `"header": "body"` pairs.
    pub fn load_json(&mut self, json: &str) -> Result<(), CompileError> {
        let map: HashMap<String, String> =
            serde_json::from_str(json).map_err(|e| CompileError::Invalid {
                spot: "alias file".into(),
                message: e.to_string(),
            })?;
        for (header, body) in &map {
            self.insert(header, body.clone())?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(name)
    }
}

fn build_pattern(name: &str, params: &[String]) -> Result<Option<Regex>, CompileError> {
    if params.is_empty() {
        return Ok(None);
    }
    let alternation = params
        .iter()
        .map(|param| regex::escape(param))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b"))
        .map(Some)
        .map_err(|e| CompileError::Invalid {
            spot: name.to_string(),
            message: format!("bad alias parameters: {e}"),
        })
}
