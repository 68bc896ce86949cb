use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;
use tracing::instrument;

use crate::model::apperror::{ApplicationError, ErrorType};
use crate::pipeline::Document;
use crate::pipeline::document::{find_path, get_path, set_path};
use crate::pipeline::expression::{Accumulator, Expression, compare_values, is_truthy, value_key, values_equal};

/**
 * Field holding the partition key in grouped rows.
 */
pub const GROUP_KEY: &str = "_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/**
 * Join specification. `from` holds the already materialized foreign rows.
 */
#[derive(Debug, Clone)]
pub struct LookupSpec {
    pub from: Vec<Document>,
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub key: Expression,
    pub accumulators: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone)]
pub enum Stage {
    Lookup(LookupSpec),
    Unwind(String),
    Filter(Expression),
    Group(GroupSpec),
    AddFields(Vec<(String, Expression)>),
    Project(Vec<(String, Expression)>),
    Sort(Vec<(String, SortDirection)>),
    Limit(usize),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Lookup(_) => "lookup",
            Stage::Unwind(_) => "unwind",
            Stage::Filter(_) => "filter",
            Stage::Group(_) => "group",
            Stage::AddFields(_) => "add_fields",
            Stage::Project(_) => "project",
            Stage::Sort(_) => "sort",
            Stage::Limit(_) => "limit",
        }
    }

    fn execute(&self, documents: Vec<Document>) -> Result<Vec<Document>, ApplicationError> {
        match self {
            Stage::Lookup(spec) => lookup(documents, spec),
            Stage::Unwind(path) => Ok(unwind(documents, path)),
            Stage::Filter(predicate) => filter(documents, predicate),
            Stage::Group(spec) => group(documents, &spec.key, &spec.accumulators),
            Stage::AddFields(fields) => add_fields(documents, fields),
            Stage::Project(fields) => project(documents, fields),
            Stage::Sort(keys) => sort(documents, keys),
            Stage::Limit(count) => Ok(limit(documents, *count)),
        }
    }
}

/**
 * An ordered sequence of stages applied to a collection.
 */
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline { stages: vec![] }
    }

    pub fn lookup(mut self, from: Vec<Document>, local_field: &str, foreign_field: &str, as_field: &str) -> Self {
        self.stages.push(Stage::Lookup(LookupSpec { from, local_field: local_field.to_string(), foreign_field: foreign_field.to_string(), as_field: as_field.to_string() }));
        self
    }

    pub fn unwind(mut self, path: &str) -> Self {
        self.stages.push(Stage::Unwind(path.to_string()));
        self
    }

    pub fn filter(mut self, predicate: Expression) -> Self {
        self.stages.push(Stage::Filter(predicate));
        self
    }

    pub fn group<'a>(mut self, key: Expression, accumulators: impl IntoIterator<Item = (&'a str, Accumulator)>) -> Self {
        let accumulators = accumulators.into_iter().map(|(name, accumulator)| (name.to_string(), accumulator)).collect();
        self.stages.push(Stage::Group(GroupSpec { key, accumulators }));
        self
    }

    pub fn add_fields<'a>(mut self, fields: impl IntoIterator<Item = (&'a str, Expression)>) -> Self {
        self.stages.push(Stage::AddFields(named(fields)));
        self
    }

    pub fn project<'a>(mut self, fields: impl IntoIterator<Item = (&'a str, Expression)>) -> Self {
        self.stages.push(Stage::Project(named(fields)));
        self
    }

    pub fn sort(mut self, key: &str, direction: SortDirection) -> Self {
        self.stages.push(Stage::Sort(vec![(key.to_string(), direction)]));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.stages.push(Stage::Limit(count));
        self
    }

    /**
     * Runs every stage in order over the given rows.
     *
     * # Arguments
     * `documents`: The base collection rows.
     *
     * # Returns
     * The resulting rows, or the error of the first failing stage.
     */
    #[instrument(level = "debug", skip_all, fields(stages = self.stages.len(), input = documents.len()))]
    pub fn execute(&self, documents: Vec<Document>) -> Result<Vec<Document>, ApplicationError> {
        let mut documents = documents;
        for (index, stage) in self.stages.iter().enumerate() {
            documents = stage.execute(documents)?;
            tracing::trace!("Stage {} ({}) produced {} rows", index, stage.name(), documents.len());
        }
        Ok(documents)
    }
}

fn named<'a, T>(fields: impl IntoIterator<Item = (&'a str, T)>) -> Vec<(String, T)> {
    fields.into_iter().map(|(name, value)| (name.to_string(), value)).collect()
}

/**
 * Left outer join of `spec.from` into the field `spec.as_field`.
 * An array local value matches every foreign row whose key it contains.
 */
pub fn lookup(documents: Vec<Document>, spec: &LookupSpec) -> Result<Vec<Document>, ApplicationError> {
    documents
        .into_iter()
        .map(|mut document| -> Result<Document, ApplicationError> {
            let local = get_path(&document, &spec.local_field)?.clone();
            let matches: Vec<Value> = spec
                .from
                .iter()
                .filter(|foreign| match find_path(foreign, &spec.foreign_field) {
                    Some(foreign_value) if !foreign_value.is_null() => match &local {
                        Value::Array(keys) => keys.iter().any(|key| values_equal(key, foreign_value)),
                        key => values_equal(key, foreign_value),
                    },
                    _ => false,
                })
                .map(|foreign| Value::Object(foreign.clone()))
                .collect();
            set_path(&mut document, &spec.as_field, Value::Array(matches));
            Ok(document)
        })
        .collect()
}

/**
 * One row per element of the array at `path`. Rows with an empty, `null` or missing array are dropped.
 */
pub fn unwind(documents: Vec<Document>, path: &str) -> Vec<Document> {
    let mut result = Vec::with_capacity(documents.len());
    for document in documents {
        let items = match find_path(&document, path) {
            Some(Value::Array(items)) => Some(items.clone()),
            Some(Value::Null) | None => continue,
            Some(_) => None,
        };
        match items {
            Some(items) => {
                for item in items {
                    let mut row = document.clone();
                    set_path(&mut row, path, item);
                    result.push(row);
                }
            }
            // A scalar unwinds to itself.
            None => result.push(document),
        }
    }
    result
}

pub fn filter(documents: Vec<Document>, predicate: &Expression) -> Result<Vec<Document>, ApplicationError> {
    let mut result = Vec::with_capacity(documents.len());
    for document in documents {
        if is_truthy(&predicate.evaluate(&document)?) {
            result.push(document);
        }
    }
    Ok(result)
}

/**
 * Partitions rows by `key` and reduces each partition. Partitions keep first-seen order.
 *
 * # Arguments
 * `documents`: Rows to partition.
 * `key`: Expression computing the partition key, stored in `_id`.
 * `accumulators`: Named reducers, one output field each.
 *
 * # Returns
 * One row per partition.
 */
pub fn group(documents: Vec<Document>, key: &Expression, accumulators: &[(String, Accumulator)]) -> Result<Vec<Document>, ApplicationError> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut partitions: Vec<(Value, Vec<Document>)> = Vec::new();
    for document in documents {
        let key_value = key.evaluate(&document)?;
        let key_string = value_key(&key_value);
        if let Some(&position) = positions.get(&key_string) {
            partitions[position].1.push(document);
        } else {
            positions.insert(key_string, partitions.len());
            partitions.push((key_value, vec![document]));
        }
    }
    partitions
        .into_iter()
        .map(|(key_value, members)| -> Result<Document, ApplicationError> {
            let mut grouped = Document::new();
            grouped.insert(GROUP_KEY.to_string(), key_value);
            for (name, accumulator) in accumulators {
                grouped.insert(name.clone(), accumulator.accumulate(&members)?);
            }
            Ok(grouped)
        })
        .collect()
}

/**
 * Adds or replaces fields, keeping the rest of the row. All expressions see the original row.
 */
pub fn add_fields(documents: Vec<Document>, fields: &[(String, Expression)]) -> Result<Vec<Document>, ApplicationError> {
    documents
        .into_iter()
        .map(|mut document| -> Result<Document, ApplicationError> {
            let values = fields.iter().map(|(_, expression)| expression.evaluate(&document)).collect::<Result<Vec<_>, _>>()?;
            for ((name, _), value) in fields.iter().zip(values) {
                set_path(&mut document, name, value);
            }
            Ok(document)
        })
        .collect()
}

/**
 * Builds a new row shape containing only the given fields.
 */
pub fn project(documents: Vec<Document>, fields: &[(String, Expression)]) -> Result<Vec<Document>, ApplicationError> {
    documents
        .iter()
        .map(|document| -> Result<Document, ApplicationError> {
            let mut projected = Document::new();
            for (name, expression) in fields {
                projected.insert(name.clone(), expression.evaluate(document)?);
            }
            Ok(projected)
        })
        .collect()
}

/**
 * Stable sort by one or more keys. Every key must be present in every row.
 */
pub fn sort(documents: Vec<Document>, keys: &[(String, SortDirection)]) -> Result<Vec<Document>, ApplicationError> {
    if keys.is_empty() {
        return Err(ApplicationError::new(ErrorType::InvalidExpression, "sort requires at least one key".to_string()));
    }
    let mut keyed = documents
        .into_iter()
        .map(|document| -> Result<(Vec<Value>, Document), ApplicationError> {
            let values = keys.iter().map(|(path, _)| get_path(&document, path).cloned()).collect::<Result<Vec<_>, _>>()?;
            Ok((values, document))
        })
        .collect::<Result<Vec<_>, ApplicationError>>()?;
    keyed.sort_by(|(left, _), (right, _)| {
        for ((left, right), (_, direction)) in left.iter().zip(right).zip(keys) {
            let ordering = compare_values(left, right);
            if ordering != Ordering::Equal {
                return match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
            }
        }
        Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, document)| document).collect())
}

pub fn limit(mut documents: Vec<Document>, count: usize) -> Vec<Document> {
    documents.truncate(count);
    documents
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn documents(values: Vec<Value>) -> Vec<Document> {
        values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(document) => Some(document),
                _ => None,
            })
            .collect()
    }

    fn to_values(documents: Vec<Document>) -> Vec<Value> {
        documents.into_iter().map(Value::Object).collect()
    }

    #[test]
    fn test_unwind_flattens_and_drops_empty() {
        let input = documents(vec![
            json!({"name": "Brazil", "years": [{"year": 2018}, {"year": 2019}]}),
            json!({"name": "Chile", "years": []}),
            json!({"name": "Peru", "years": null}),
            json!({"name": "Fiji"}),
        ]);
        let output = to_values(unwind(input, "years"));
        assert_eq!(output, vec![json!({"name": "Brazil", "years": {"year": 2018}}), json!({"name": "Brazil", "years": {"year": 2019}})]);
    }

    #[test]
    fn test_unwind_nested_path() {
        let input = documents(vec![json!({"years": {"year": 2019, "months": [{"m": 1}, {"m": 2}]}})]);
        let output = to_values(unwind(input, "years.months"));
        assert_eq!(output[1], json!({"years": {"year": 2019, "months": {"m": 2}}}));
    }

    #[test]
    fn test_filter() {
        let input = documents(vec![json!({"year": 2018}), json!({"year": 2019}), json!({"year": 2019.0})]);
        let output = filter(input, &Expression::eq(Expression::field("year"), Expression::literal(2019))).unwrap();
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_filter_missing_field_fails() {
        let input = documents(vec![json!({"name": "Brazil"})]);
        let err = filter(input, &Expression::eq(Expression::field("year"), Expression::literal(2019))).unwrap_err();
        assert_eq!(err.error_type, ErrorType::FieldNotFound);
    }

    #[test]
    fn test_group_keeps_first_seen_order() {
        let input = documents(vec![json!({"g": "b", "v": 1}), json!({"g": "a", "v": 2}), json!({"g": "b", "v": 3})]);
        let output = group(input, &Expression::field("g"), &[("total".to_string(), Accumulator::Sum(Expression::field("v")))]).unwrap();
        assert_eq!(to_values(output), vec![json!({"_id": "b", "total": 4.0}), json!({"_id": "a", "total": 2.0})]);
    }

    #[test]
    fn test_group_composite_key() {
        let input = documents(vec![json!({"g": "EU", "c": "FR", "v": 1}), json!({"g": "EU", "c": "DE", "v": 2}), json!({"g": "EU", "c": "FR", "v": 3})]);
        let key = Expression::object([("group", Expression::field("g")), ("country", Expression::field("c"))]);
        let output = group(input, &key, &[("count".to_string(), Accumulator::Count)]).unwrap();
        assert_eq!(to_values(output), vec![json!({"_id": {"group": "EU", "country": "FR"}, "count": 2}), json!({"_id": {"group": "EU", "country": "DE"}, "count": 1})]);
    }

    #[test]
    fn test_group_key_ignores_number_representation() {
        let input = documents(vec![json!({"y": 2019, "v": 1}), json!({"y": 2019.0, "v": 2}), json!({"y": 2020, "v": 3})]);
        let output = group(input, &Expression::field("y"), &[("count".to_string(), Accumulator::Count)]).unwrap();
        assert_eq!(to_values(output), vec![json!({"_id": 2019, "count": 2}), json!({"_id": 2020, "count": 1})]);
    }

    #[test]
    fn test_sort_is_stable() {
        let input = documents(vec![json!({"k": 1, "id": "a"}), json!({"k": 2, "id": "b"}), json!({"k": 1, "id": "c"}), json!({"k": 2, "id": "d"})]);
        let output = sort(input, &[("k".to_string(), SortDirection::Descending)]).unwrap();
        let ids: Vec<Value> = output.iter().map(|document| document["id"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("d"), json!("a"), json!("c")]);
    }

    #[test]
    fn test_sort_missing_key_fails() {
        let input = documents(vec![json!({"k": 1}), json!({"other": 2})]);
        let err = sort(input, &[("k".to_string(), SortDirection::Ascending)]).unwrap_err();
        assert_eq!(err.error_type, ErrorType::FieldNotFound);
    }

    #[test]
    fn test_lookup_array_reference_and_unresolved() {
        let countries = documents(vec![json!({"code": "FRA", "name": "France"}), json!({"code": "DEU", "name": "Germany"})]);
        let input = documents(vec![json!({"name": "EU", "countries": ["DEU", "FRA", "XXX"]})]);
        let spec = LookupSpec { from: countries, local_field: "countries".to_string(), foreign_field: "code".to_string(), as_field: "members".to_string() };
        let output = lookup(input, &spec).unwrap();
        assert_eq!(output[0]["members"], json!([{"code": "FRA", "name": "France"}, {"code": "DEU", "name": "Germany"}]));
    }

    #[test]
    fn test_project_and_add_fields() {
        let input = documents(vec![json!({"_id": {"pais": "Brazil"}, "total": 100.0})]);
        let added = add_fields(input, &[("half".to_string(), Expression::divide(Expression::field("total"), Expression::literal(2)))]).unwrap();
        assert_eq!(added[0]["half"], json!(50.0));
        assert_eq!(added[0]["total"], json!(100.0));
        let projected = project(added, &[("pais".to_string(), Expression::field("_id.pais")), ("half".to_string(), Expression::field("half"))]).unwrap();
        assert_eq!(to_values(projected), vec![json!({"pais": "Brazil", "half": 50.0})]);
    }

    #[test]
    fn test_pipeline_sort_and_limit() {
        let input = documents((0..20).map(|value| json!({"v": value})).collect());
        let output = Pipeline::new().sort("v", SortDirection::Descending).limit(3).execute(input).unwrap();
        assert_eq!(to_values(output), vec![json!({"v": 19}), json!({"v": 18}), json!({"v": 17})]);
    }

    #[test]
    fn test_pipeline_aborts_on_first_error() {
        let input = documents(vec![json!({"v": 1})]);
        let result = Pipeline::new().project([("w", Expression::field("missing"))]).limit(1).execute(input);
        assert!(result.is_err());
    }
}
