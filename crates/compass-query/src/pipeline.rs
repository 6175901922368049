use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::parse_filter::parse_filter;

/// Bucket used for documents that lack the grouping field.
pub const UNKNOWN_GROUP: &str = "Unknown";

/// How a single output field of a group is summed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulator {
    /// Add one per document.
    Count,
    /// Add `then` when `field` equals `equals`, otherwise add `otherwise`.
    Conditional {
        field: String,
        equals: Bson,
        then: i64,
        otherwise: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStage {
    /// Field whose value keys each group.
    pub key: String,
    /// Output field name and its accumulator, in output order.
    pub accumulators: Vec<(String, Accumulator)>,
}

/// The single aggregation shape the store supports: an optional match
/// followed by one group stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub filter: Filter,
    pub group: GroupStage,
}

impl Pipeline {
    pub fn group_by(key: impl Into<String>) -> Self {
        Self {
            filter: Filter::all(),
            group: GroupStage {
                key: key.into(),
                accumulators: Vec::new(),
            },
        }
    }

    pub fn matching(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn count(mut self, output: impl Into<String>) -> Self {
        self.group.accumulators.push((output.into(), Accumulator::Count));
        self
    }

    pub fn count_if(
        mut self,
        output: impl Into<String>,
        field: impl Into<String>,
        equals: impl Into<Bson>,
    ) -> Self {
        self.group.accumulators.push((
            output.into(),
            Accumulator::Conditional {
                field: field.into(),
                equals: equals.into(),
                then: 1,
                otherwise: 0,
            },
        ));
        self
    }

    /// Render the native pipeline stages.
    pub fn to_documents(&self) -> Vec<Document> {
        let mut group = doc! {
            "_id": { "$ifNull": [format!("${}", self.group.key), UNKNOWN_GROUP] },
        };
        for (name, acc) in &self.group.accumulators {
            let sum = match acc {
                Accumulator::Count => doc! { "$sum": 1 },
                Accumulator::Conditional {
                    field,
                    equals,
                    then,
                    otherwise,
                } => doc! {
                    "$sum": {
                        "$cond": [
                            { "$eq": [format!("${field}"), equals.clone()] },
                            *then,
                            *otherwise,
                        ]
                    }
                },
            };
            group.insert(name.clone(), sum);
        }

        let mut stages = Vec::with_capacity(2);
        if !self.filter.is_all() {
            stages.push(doc! { "$match": self.filter.to_document() });
        }
        stages.push(doc! { "$group": group });
        stages
    }
}

/// Parse error for aggregation pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParseError(pub String);

impl std::fmt::Display for PipelineParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline parse error: {}", self.0)
    }
}

impl std::error::Error for PipelineParseError {}

/// Parse pipeline stages into a [`Pipeline`].
///
/// Accepts an optional `$match` followed by exactly one `$group` whose `_id`
/// is a `"$field"` reference and whose accumulators are `{ "$sum": 1 }` or
/// `{ "$sum": { "$cond": [{ "$eq": ["$field", value] }, then, otherwise] } }`.
/// Every other stage or expression is rejected.
pub fn parse_pipeline(stages: &[Document]) -> Result<Pipeline, PipelineParseError> {
    let mut filter = Filter::all();
    let mut group = None;

    for stage in stages {
        if stage.len() != 1 {
            return Err(PipelineParseError("each stage must have exactly one key".into()));
        }
        let (name, body) = match stage.iter().next() {
            Some(entry) => entry,
            None => return Err(PipelineParseError("empty stage".into())),
        };
        let body = match body {
            Bson::Document(d) => d,
            _ => return Err(PipelineParseError(format!("{name} body must be a document"))),
        };
        match name.as_str() {
            "$match" if group.is_none() => {
                let parsed = parse_filter(body).map_err(|e| PipelineParseError(e.0))?;
                filter = if filter.is_all() { parsed } else { filter.and(parsed) };
            }
            "$match" => {
                return Err(PipelineParseError("$match after $group is not supported".into()));
            }
            "$group" if group.is_none() => group = Some(parse_group(body)?),
            "$group" => return Err(PipelineParseError("only one $group stage is supported".into())),
            other => return Err(PipelineParseError(format!("unsupported stage: {other}"))),
        }
    }

    let group = group.ok_or_else(|| PipelineParseError("missing $group stage".into()))?;
    Ok(Pipeline { filter, group })
}

fn field_ref(value: &Bson) -> Option<&str> {
    match value {
        Bson::String(s) => s.strip_prefix('$').filter(|f| !f.is_empty()),
        _ => None,
    }
}

fn parse_group(body: &Document) -> Result<GroupStage, PipelineParseError> {
    let key = body
        .get("_id")
        .and_then(field_ref)
        .ok_or_else(|| PipelineParseError("$group _id must be a \"$field\" reference".into()))?
        .to_string();

    let mut accumulators = Vec::new();
    for (name, spec) in body {
        if name == "_id" {
            continue;
        }
        let sum = match spec {
            Bson::Document(d) if d.len() == 1 => d.get("$sum"),
            _ => None,
        }
        .ok_or_else(|| {
            PipelineParseError(format!("{name}: only $sum accumulators are supported"))
        })?;
        accumulators.push((name.clone(), parse_sum(name, sum)?));
    }

    Ok(GroupStage { key, accumulators })
}

fn as_quantity(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

fn parse_sum(name: &str, sum: &Bson) -> Result<Accumulator, PipelineParseError> {
    if as_quantity(sum) == Some(1) {
        return Ok(Accumulator::Count);
    }

    let cond = match sum {
        Bson::Document(d) if d.len() == 1 => d.get_array("$cond").ok(),
        _ => None,
    }
    .ok_or_else(|| {
        PipelineParseError(format!("{name}: $sum must be 1 or a $cond expression"))
    })?;

    let [test, then, otherwise] = cond.as_slice() else {
        return Err(PipelineParseError(format!("{name}: $cond takes three arguments")));
    };

    let operands = match test {
        Bson::Document(d) if d.len() == 1 => d.get_array("$eq").ok(),
        _ => None,
    }
    .ok_or_else(|| PipelineParseError(format!("{name}: $cond test must be an $eq expression")))?;

    let [lhs, equals] = operands.as_slice() else {
        return Err(PipelineParseError(format!("{name}: $eq takes two arguments")));
    };
    let field = field_ref(lhs)
        .ok_or_else(|| PipelineParseError(format!("{name}: $eq must compare a \"$field\"")))?;

    let then = as_quantity(then)
        .ok_or_else(|| PipelineParseError(format!("{name}: $cond branches must be integers")))?;
    let otherwise = as_quantity(otherwise)
        .ok_or_else(|| PipelineParseError(format!("{name}: $cond branches must be integers")))?;

    Ok(Accumulator::Conditional {
        field: field.to_string(),
        equals: equals.clone(),
        then,
        otherwise,
    })
}
