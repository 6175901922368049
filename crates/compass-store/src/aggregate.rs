use bson::{Bson, Document};
use compass_query::{Accumulator, GroupStage, ID_FIELD, UNKNOWN_GROUP};

use crate::eval::{get_path, value_eq};

/// Group already-matched documents in memory.
///
/// Groups appear in order of first appearance. A document without the key
/// field (or with a null key) lands in the [`UNKNOWN_GROUP`] bucket. Every
/// output record carries `_id` plus one `Int64` per accumulator.
pub(crate) fn group(docs: &[Document], stage: &GroupStage) -> Vec<Document> {
    let mut groups: Vec<(Bson, Vec<i64>)> = Vec::new();

    for doc in docs {
        let key = match get_path(doc, &stage.key) {
            None | Some(Bson::Null) => Bson::String(UNKNOWN_GROUP.to_string()),
            Some(value) => value.clone(),
        };
        let idx = match groups.iter().position(|(k, _)| value_eq(k, &key)) {
            Some(idx) => idx,
            None => {
                groups.push((key, vec![0; stage.accumulators.len()]));
                groups.len() - 1
            }
        };
        let sums = &mut groups[idx].1;
        for (sum, (_, acc)) in sums.iter_mut().zip(&stage.accumulators) {
            *sum += contribution(doc, acc);
        }
    }

    groups
        .into_iter()
        .map(|(key, sums)| {
            let mut out = Document::new();
            out.insert(ID_FIELD, key);
            for ((name, _), sum) in stage.accumulators.iter().zip(sums) {
                out.insert(name.clone(), Bson::Int64(sum));
            }
            out
        })
        .collect()
}

fn contribution(doc: &Document, acc: &Accumulator) -> i64 {
    match acc {
        Accumulator::Count => 1,
        Accumulator::Conditional {
            field,
            equals,
            then,
            otherwise,
        } => {
            let hit = match (get_path(doc, field), equals) {
                (None | Some(Bson::Null), Bson::Null) => true,
                (Some(value), _) => value_eq(value, equals),
                (None, _) => false,
            };
            if hit { *then } else { *otherwise }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use compass_query::Pipeline;

    #[test]
    fn counts_per_subject() {
        let mut docs = Vec::new();
        for _ in 0..3 {
            docs.push(doc! { "subject": "Math", "status": "completed" });
        }
        for _ in 0..2 {
            docs.push(doc! { "subject": "Math", "status": "pending" });
        }
        docs.push(doc! { "subject": "Physics", "status": "completed" });

        let stage = Pipeline::group_by("subject")
            .count_if("completed", "status", "completed")
            .count("total")
            .group;
        assert_eq!(
            group(&docs, &stage),
            vec![
                doc! { "_id": "Math", "completed": 3_i64, "total": 5_i64 },
                doc! { "_id": "Physics", "completed": 1_i64, "total": 1_i64 },
            ]
        );
    }

    #[test]
    fn missing_key_groups_as_unknown() {
        let docs = vec![doc! { "status": "pending" }, doc! { "subject": Bson::Null }];
        let stage = Pipeline::group_by("subject").count("total").group;
        assert_eq!(group(&docs, &stage), vec![doc! { "_id": "Unknown", "total": 2_i64 }]);
    }

    #[test]
    fn conditional_uses_custom_quantities() {
        let docs = vec![doc! { "k": "a", "pts": "hi" }, doc! { "k": "a", "pts": "lo" }];
        let mut stage = Pipeline::group_by("k").group;
        stage.accumulators.push((
            "score".into(),
            Accumulator::Conditional {
                field: "pts".into(),
                equals: "hi".into(),
                then: 10,
                otherwise: -1,
            },
        ));
        assert_eq!(group(&docs, &stage), vec![doc! { "_id": "a", "score": 9_i64 }]);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        let stage = Pipeline::group_by("k").count("n").group;
        assert!(group(&[], &stage).is_empty());
    }
}
