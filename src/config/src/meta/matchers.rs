// Copyright 2025 Alertmesh Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::meta::alerts::LabelSet;

/// A single label predicate. Regex matchers are anchored to the whole value;
/// a label missing from the set compares as the empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub is_negative: bool,
}

impl Matcher {
    pub fn equal(name: &str, value: &str) -> Matcher {
        Matcher {
            name: name.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    pub fn regex(name: &str, value: &str) -> Matcher {
        Matcher {
            name: name.to_string(),
            value: value.to_string(),
            is_regex: true,
            is_negative: false,
        }
    }

    pub fn op(&self) -> &'static str {
        match (self.is_regex, self.is_negative) {
            (false, false) => "=",
            (false, true) => "!=",
            (true, false) => "=~",
            (true, true) => "!~",
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("matcher name must not be empty"));
        }
        if self.is_regex {
            Regex::new(&self.value)
                .map_err(|e| anyhow::anyhow!("invalid matcher regex {:?}: {e}", self.value))?;
        }
        Ok(())
    }

    pub fn compile(&self) -> Result<CompiledMatcher, anyhow::Error> {
        self.validate()?;
        let re = if self.is_regex {
            Some(
                Regex::new(&format!("^(?:{})$", self.value))
                    .map_err(|e| anyhow::anyhow!("invalid matcher regex {:?}: {e}", self.value))?,
            )
        } else {
            None
        };
        Ok(CompiledMatcher {
            matcher: self.clone(),
            re,
        })
    }

    /// Parse a single `name=value`, `name!=value`, `name=~regex` or
    /// `name!~regex` expression. Values may be double quoted.
    pub fn parse(expr: &str) -> Result<Matcher, anyhow::Error> {
        let expr = expr.trim();
        let ops = ["=~", "!~", "!=", "="];
        for op in ops {
            if let Some(idx) = expr.find(op) {
                let name = expr[..idx].trim();
                let mut value = expr[idx + op.len()..].trim();
                if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                    value = &value[1..value.len() - 1];
                }
                if name.is_empty() {
                    return Err(anyhow::anyhow!("bad matcher expression {expr:?}"));
                }
                let m = Matcher {
                    name: name.to_string(),
                    value: value.to_string(),
                    is_regex: op == "=~" || op == "!~",
                    is_negative: op == "!=" || op == "!~",
                };
                m.validate()?;
                return Ok(m);
            }
        }
        Err(anyhow::anyhow!("bad matcher expression {expr:?}"))
    }
}

impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.op(), self.value)
    }
}

/// Parse a comma separated matcher list, optionally wrapped in `{}`.
pub fn parse_matchers(expr: &str) -> Result<Vec<Matcher>, anyhow::Error> {
    let expr = expr.trim();
    let expr = expr
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(expr);
    let mut out = Vec::new();
    for part in expr.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        out.push(Matcher::parse(part)?);
    }
    if out.is_empty() {
        return Err(anyhow::anyhow!("empty matcher expression {expr:?}"));
    }
    Ok(out)
}

#[derive(Clone, Debug)]
pub struct CompiledMatcher {
    pub matcher: Matcher,
    re: Option<Regex>,
}

impl CompiledMatcher {
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let value = labels
            .get(&self.matcher.name)
            .map(|s| s.as_str())
            .unwrap_or("");
        let ok = match &self.re {
            Some(re) => re.is_match(value),
            None => value == self.matcher.value,
        };
        ok != self.matcher.is_negative
    }
}

#[derive(Clone, Debug, Default)]
pub struct CompiledMatchers(pub Vec<CompiledMatcher>);

impl CompiledMatchers {
    pub fn compile(matchers: &[Matcher]) -> Result<CompiledMatchers, anyhow::Error> {
        Ok(CompiledMatchers(
            matchers
                .iter()
                .map(|m| m.compile())
                .collect::<Result<Vec<_>, _>>()?,
        ))
    }

    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.0.iter().all(|m| m.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equal_matcher() {
        let m = Matcher::equal("job", "api").compile().unwrap();
        assert!(m.matches(&labels(&[("job", "api")])));
        assert!(!m.matches(&labels(&[("job", "web")])));
        assert!(!m.matches(&labels(&[("other", "api")])));
    }

    #[test]
    fn test_negative_matcher_missing_label() {
        let m = Matcher {
            name: "env".to_string(),
            value: "prod".to_string(),
            is_regex: false,
            is_negative: true,
        }
        .compile()
        .unwrap();
        // a missing label is the empty string, which is != "prod"
        assert!(m.matches(&labels(&[("job", "api")])));
        assert!(!m.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_regex_matcher_is_anchored() {
        let m = Matcher::regex("job", "api.*").compile().unwrap();
        assert!(m.matches(&labels(&[("job", "api-1")])));
        assert!(!m.matches(&labels(&[("job", "my-api")])));
    }

    #[test]
    fn test_parse() {
        let m = Matcher::parse("job=api").unwrap();
        assert_eq!((m.name.as_str(), m.value.as_str()), ("job", "api"));
        assert!(!m.is_regex && !m.is_negative);

        let m = Matcher::parse(r#"job!="api server""#).unwrap();
        assert_eq!(m.value, "api server");
        assert!(m.is_negative);

        let m = Matcher::parse("job=~a.+").unwrap();
        assert!(m.is_regex && !m.is_negative);

        let m = Matcher::parse("job!~a.+").unwrap();
        assert!(m.is_regex && m.is_negative);

        assert!(Matcher::parse("job").is_err());
        assert!(Matcher::parse("=api").is_err());
        assert!(Matcher::parse("job=~[").is_err());
    }

    #[test]
    fn test_parse_matchers_list() {
        let ms = parse_matchers("{alertname=test1, job!=api}").unwrap();
        assert_eq!(ms.len(), 2);
        assert_eq!(ms[0].name, "alertname");
        assert!(ms[1].is_negative);
        assert!(parse_matchers("{}").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for expr in ["job=\"api\"", "job!=\"api\"", "job=~\"a.+\"", "job!~\"a.+\""] {
            let m = Matcher::parse(expr).unwrap();
            let again = Matcher::parse(&m.to_string()).unwrap();
            assert_eq!(m, again);
        }
    }
}
