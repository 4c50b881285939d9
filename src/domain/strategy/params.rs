//! Strategy specifications that cross into batch workers.
//!
//! A `StrategySpec` carries only a kind tag and plain parameter values, so it
//! can be cloned into every batch. Parameter names and value shapes are
//! checked when the spec is created; workers only ever see valid specs.

use crate::domain::error::ScreenerError;
use crate::domain::strategy::momentum::{MomentumParams, MomentumStrategy};
use crate::domain::strategy::oversold::{OversoldReversionParams, OversoldReversionStrategy};
use crate::domain::strategy::{ResultShape, Strategy};
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A strategy parameter: a scalar, a list of scalars, or a map whose values
/// are scalars or lists of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Interpret a raw config string: booleans, integers, floats, and
    /// comma-separated lists of those. Anything else stays a string.
    pub fn parse(raw: &str) -> ParamValue {
        let trimmed = raw.trim();
        if trimmed.contains(',') {
            return ParamValue::List(trimmed.split(',').map(Self::parse_scalar).collect());
        }
        Self::parse_scalar(trimmed)
    }

    fn parse_scalar(raw: &str) -> ParamValue {
        let s = raw.trim();
        match s.to_lowercase().as_str() {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = s.parse::<i64>() {
            ParamValue::Int(i)
        } else if let Ok(f) = s.parse::<f64>() {
            ParamValue::Float(f)
        } else {
            ParamValue::Str(s.to_string())
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, ParamValue::List(_) | ParamValue::Map(_))
    }

    fn check_shape(&self) -> Result<(), String> {
        match self {
            ParamValue::List(items) if !items.iter().all(ParamValue::is_scalar) => {
                Err("lists may only contain scalars".into())
            }
            ParamValue::Map(entries) => entries.values().try_for_each(|v| match v {
                ParamValue::Map(_) => Err("maps may not nest maps".into()),
                other => other.check_shape(),
            }),
            _ => Ok(()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(i) => usize::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_usize_list(&self) -> Option<Vec<usize>> {
        match self {
            ParamValue::List(items) => items.iter().map(ParamValue::as_usize).collect(),
            single => single.as_usize().map(|v| vec![v]),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => write!(f, "{s}"),
            ParamValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
            ParamValue::Map(entries) => {
                let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams(BTreeMap<String, ParamValue>);

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: ParamValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn insert(&mut self, key: &str, value: ParamValue) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn usize_or(&self, section: &str, key: &str, default: usize) -> Result<usize, ScreenerError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.as_usize().ok_or_else(|| invalid(section, key, "expected a non-negative integer")),
        }
    }

    pub fn f64_or(&self, section: &str, key: &str, default: f64) -> Result<f64, ScreenerError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_f64()
                .filter(|x| x.is_finite())
                .ok_or_else(|| invalid(section, key, "expected a number")),
        }
    }

    pub fn usize_list_or(
        &self,
        section: &str,
        key: &str,
        default: &[usize],
    ) -> Result<Vec<usize>, ScreenerError> {
        match self.get(key) {
            None => Ok(default.to_vec()),
            Some(v) => v
                .as_usize_list()
                .ok_or_else(|| invalid(section, key, "expected a list of non-negative integers")),
        }
    }
}

pub(crate) fn invalid(section: &str, key: &str, reason: &str) -> ScreenerError {
    ScreenerError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    OversoldReversion,
    Momentum,
}

impl StrategyKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "oversold_reversion" | "oversold" | "kdj" => Some(StrategyKind::OversoldReversion),
            "momentum" | "consecutive_up" => Some(StrategyKind::Momentum),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::OversoldReversion => "oversold_reversion",
            StrategyKind::Momentum => "momentum",
        }
    }

    pub fn result_shape(self) -> ResultShape {
        match self {
            StrategyKind::OversoldReversion => ResultShape::Table,
            StrategyKind::Momentum => ResultShape::Symbols,
        }
    }

    /// Parameter names this kind accepts.
    pub fn allowed_params(self) -> &'static [&'static str] {
        match self {
            StrategyKind::OversoldReversion => OversoldReversionParams::KEYS,
            StrategyKind::Momentum => MomentumParams::KEYS,
        }
    }
}

/// Plain-data description of a strategy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    name: String,
    kind: StrategyKind,
    params: StrategyParams,
}

impl StrategySpec {
    /// Validate names, value shapes, and typed parameter ranges.
    pub fn new(name: &str, kind: StrategyKind, params: StrategyParams) -> Result<Self, ScreenerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("strategy", "name", "strategy name must not be empty"));
        }
        let allowed = kind.allowed_params();
        for (key, value) in params.iter() {
            if !allowed.contains(&key.as_str()) {
                return Err(invalid(
                    name,
                    key,
                    &format!("unknown parameter for {}", kind.as_str()),
                ));
            }
            value.check_shape().map_err(|reason| invalid(name, key, &reason))?;
        }

        let spec = Self {
            name: name.to_string(),
            kind,
            params,
        };
        spec.build()?;
        Ok(spec)
    }

    /// Read a spec from a config section: `kind` plus any allowed parameters.
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Result<Self, ScreenerError> {
        let kind_str = config
            .get_string(section, "kind")
            .ok_or_else(|| ScreenerError::ConfigMissing {
                section: section.to_string(),
                key: "kind".to_string(),
            })?;
        let kind = StrategyKind::parse(&kind_str)
            .ok_or_else(|| invalid(section, "kind", &format!("unknown strategy kind '{kind_str}'")))?;

        let mut params = StrategyParams::new();
        for key in kind.allowed_params() {
            if let Some(raw) = config.get_string(section, key) {
                params.insert(key, ParamValue::parse(&raw));
            }
        }
        Self::new(section, kind, params)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn result_shape(&self) -> ResultShape {
        self.kind.result_shape()
    }

    /// Construct a fresh strategy instance.
    pub fn build(&self) -> Result<Box<dyn Strategy>, ScreenerError> {
        Ok(match self.kind {
            StrategyKind::OversoldReversion => Box::new(OversoldReversionStrategy::new(
                &self.name,
                OversoldReversionParams::from_params(&self.name, &self.params)?,
            )),
            StrategyKind::Momentum => Box::new(MomentumStrategy::new(
                &self.name,
                MomentumParams::from_params(&self.name, &self.params)?,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_values() {
        assert_eq!(ParamValue::parse("9"), ParamValue::Int(9));
        assert_eq!(ParamValue::parse("0.03"), ParamValue::Float(0.03));
        assert_eq!(ParamValue::parse("TRUE"), ParamValue::Bool(true));
        assert_eq!(
            ParamValue::parse("20, 30,60"),
            ParamValue::List(vec![
                ParamValue::Int(20),
                ParamValue::Int(30),
                ParamValue::Int(60)
            ])
        );
        assert_eq!(ParamValue::parse("abc"), ParamValue::Str("abc".into()));
    }

    #[test]
    fn shape_rules() {
        let nested_list = ParamValue::List(vec![ParamValue::List(vec![])]);
        assert!(nested_list.check_shape().is_err());

        let nested_map = ParamValue::Map(BTreeMap::from([(
            "a".to_string(),
            ParamValue::Map(BTreeMap::new()),
        )]));
        assert!(nested_map.check_shape().is_err());

        let ok_map = ParamValue::Map(BTreeMap::from([(
            "a".to_string(),
            ParamValue::List(vec![ParamValue::Int(1)]),
        )]));
        assert!(ok_map.check_shape().is_ok());
    }

    #[test]
    fn spec_rejects_unknown_parameter() {
        let params = StrategyParams::new().with("lookback", ParamValue::Int(3));
        let err = StrategySpec::new("oversold", StrategyKind::OversoldReversion, params).unwrap_err();
        assert!(matches!(err, ScreenerError::ConfigInvalid { key, .. } if key == "lookback"));
    }

    #[test]
    fn spec_rejects_ill_typed_parameter() {
        let params = StrategyParams::new().with("kdj_period", ParamValue::Str("nine".into()));
        let err = StrategySpec::new("oversold", StrategyKind::OversoldReversion, params).unwrap_err();
        assert!(matches!(err, ScreenerError::ConfigInvalid { key, .. } if key == "kdj_period"));
    }

    #[test]
    fn spec_builds_strategy_with_defaults() {
        let spec = StrategySpec::new("mom", StrategyKind::Momentum, StrategyParams::new()).unwrap();
        let strategy = spec.build().unwrap();
        assert_eq!(strategy.name(), "mom");
        assert_eq!(strategy.result_shape(), ResultShape::Symbols);
    }

    #[test]
    fn spec_is_plain_data() {
        let params = StrategyParams::new().with("j_threshold", ParamValue::Float(0.0));
        let spec = StrategySpec::new("oversold", StrategyKind::OversoldReversion, params).unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let back: StrategySpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn kind_aliases() {
        assert_eq!(StrategyKind::parse("KDJ"), Some(StrategyKind::OversoldReversion));
        assert_eq!(StrategyKind::parse("momentum"), Some(StrategyKind::Momentum));
        assert_eq!(StrategyKind::parse("dag"), None);
    }
}
