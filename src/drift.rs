use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::plan::BuildPlan;

/// One path at which two plans disagree. `None` means the path is absent on
/// that side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drift {
    pub path: String,
    pub left: Option<Value>,
    pub right: Option<Value>,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: &Option<Value>| match value {
            Some(value) => value.to_string(),
            None => "<absent>".to_string(),
        };
        write!(f, "{}: {} -> {}", self.path, show(&self.left), show(&self.right))
    }
}

/// Walks both plans' JSON trees. Object keys are visited in sorted order and
/// arrays by index, so the result is deterministic.
pub fn diff_plans(left: &BuildPlan, right: &BuildPlan) -> serde_json::Result<Vec<Drift>> {
    let left = serde_json::to_value(left)?;
    let right = serde_json::to_value(right)?;

    let mut drifts = Vec::new();
    diff_values("", Some(&left), Some(&right), &mut drifts);

    Ok(drifts)
}

fn diff_values(path: &str, left: Option<&Value>, right: Option<&Value>, out: &mut Vec<Drift>) {
    match (left, right) {
        (Some(Value::Object(l)), Some(Value::Object(r))) => {
            let mut keys: Vec<&String> = l.keys().chain(r.keys()).collect();
            keys.sort();
            keys.dedup();

            for key in keys {
                diff_values(&join(path, key), l.get(key), r.get(key), out);
            }
        }
        (Some(Value::Array(l)), Some(Value::Array(r))) => {
            for index in 0..l.len().max(r.len()) {
                diff_values(&format!("{}[{}]", path, index), l.get(index), r.get(index), out);
            }
        }
        (l, r) if l != r => out.push(Drift {
            path: if path.is_empty() { "$".to_string() } else { path.to_string() },
            left: l.cloned(),
            right: r.cloned(),
        }),
        _ => {}
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
