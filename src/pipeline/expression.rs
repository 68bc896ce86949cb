use std::cmp::Ordering;
use std::collections::HashSet;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Number, Value, json};

use crate::model::apperror::{ApplicationError, ErrorType};
use crate::pipeline::Document;
use crate::pipeline::document::{find_path, get_path};

/**
 * Expression evaluated against a single row.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /**
     * Dotted field reference, e.g. `years.energy_types.generation_value`.
     */
    Field(String),
    /**
     * Builds an object, keeping the field order.
     */
    Object(Vec<(String, Expression)>),
    Add(Vec<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Vec<Expression>),
    /**
     * Fails with `DivisionByZero` on a zero divisor. Guard with `Cond`.
     */
    Divide(Box<Expression>, Box<Expression>),
    Round(Box<Expression>, u32),
    /**
     * Only the selected branch is evaluated.
     */
    Cond { condition: Box<Expression>, then: Box<Expression>, otherwise: Box<Expression> },
    Eq(Box<Expression>, Box<Expression>),
    Ne(Box<Expression>, Box<Expression>),
    Gt(Box<Expression>, Box<Expression>),
    Gte(Box<Expression>, Box<Expression>),
    Lt(Box<Expression>, Box<Expression>),
    Lte(Box<Expression>, Box<Expression>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    /**
     * True when the path resolves to a non-null value. Never fails.
     */
    Exists(String),
    Size(Box<Expression>),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn field(path: &str) -> Self {
        Expression::Field(path.to_string())
    }

    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, Expression)>) -> Self {
        Expression::Object(fields.into_iter().map(|(name, expression)| (name.to_string(), expression)).collect())
    }

    pub fn multiply(operands: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Multiply(operands.into_iter().collect())
    }

    pub fn divide(dividend: Expression, divisor: Expression) -> Self {
        Expression::Divide(Box::new(dividend), Box::new(divisor))
    }

    pub fn rounded(value: Expression, precision: u32) -> Self {
        Expression::Round(Box::new(value), precision)
    }

    pub fn cond(condition: Expression, then: Expression, otherwise: Expression) -> Self {
        Expression::Cond { condition: Box::new(condition), then: Box::new(then), otherwise: Box::new(otherwise) }
    }

    pub fn add(operands: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Add(operands.into_iter().collect())
    }

    pub fn subtract(left: Expression, right: Expression) -> Self {
        Expression::Subtract(Box::new(left), Box::new(right))
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Expression::Eq(Box::new(left), Box::new(right))
    }

    pub fn ne(left: Expression, right: Expression) -> Self {
        Expression::Ne(Box::new(left), Box::new(right))
    }

    pub fn gt(left: Expression, right: Expression) -> Self {
        Expression::Gt(Box::new(left), Box::new(right))
    }

    pub fn gte(left: Expression, right: Expression) -> Self {
        Expression::Gte(Box::new(left), Box::new(right))
    }

    pub fn lt(left: Expression, right: Expression) -> Self {
        Expression::Lt(Box::new(left), Box::new(right))
    }

    pub fn lte(left: Expression, right: Expression) -> Self {
        Expression::Lte(Box::new(left), Box::new(right))
    }

    pub fn and(operands: impl IntoIterator<Item = Expression>) -> Self {
        Expression::And(operands.into_iter().collect())
    }

    pub fn or(operands: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Or(operands.into_iter().collect())
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Not(Box::new(operand))
    }

    pub fn exists(path: &str) -> Self {
        Expression::Exists(path.to_string())
    }

    pub fn size(value: Expression) -> Self {
        Expression::Size(Box::new(value))
    }

    /**
     * Evaluates the expression against a row.
     *
     * # Arguments
     * `document`: The row to evaluate against.
     *
     * # Returns
     * The computed value, or `FieldNotFound`, `DivisionByZero` or `InvalidExpression`.
     */
    pub fn evaluate(&self, document: &Document) -> Result<Value, ApplicationError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Field(path) => get_path(document, path).cloned(),
            Expression::Object(fields) => {
                let mut object = Document::new();
                for (name, expression) in fields {
                    object.insert(name.clone(), expression.evaluate(document)?);
                }
                Ok(Value::Object(object))
            }
            Expression::Add(operands) => fold_numbers(operands, document, "add", 0.0, |total, value| total + value),
            Expression::Multiply(operands) => fold_numbers(operands, document, "multiply", 1.0, |total, value| total * value),
            Expression::Subtract(left, right) => {
                let (Some(left), Some(right)) = (as_number(&left.evaluate(document)?, "subtract")?, as_number(&right.evaluate(document)?, "subtract")?) else {
                    return Ok(Value::Null);
                };
                Ok(json!(left - right))
            }
            Expression::Divide(dividend, divisor) => {
                let (Some(dividend), Some(divisor)) = (as_number(&dividend.evaluate(document)?, "divide")?, as_number(&divisor.evaluate(document)?, "divide")?) else {
                    return Ok(Value::Null);
                };
                if divisor == 0.0 {
                    return Err(ApplicationError::new(ErrorType::DivisionByZero, format!("Division of {dividend} by zero")));
                }
                Ok(json!(dividend / divisor))
            }
            Expression::Round(value, precision) => match as_number(&value.evaluate(document)?, "round")? {
                Some(number) => Ok(json!(round(number, *precision))),
                None => Ok(Value::Null),
            },
            Expression::Cond { condition, then, otherwise } => {
                if is_truthy(&condition.evaluate(document)?) {
                    then.evaluate(document)
                } else {
                    otherwise.evaluate(document)
                }
            }
            Expression::Eq(left, right) => Ok(Value::Bool(values_equal(&left.evaluate(document)?, &right.evaluate(document)?))),
            Expression::Ne(left, right) => Ok(Value::Bool(!values_equal(&left.evaluate(document)?, &right.evaluate(document)?))),
            Expression::Gt(left, right) => compare(left, right, document, |ordering| ordering == Ordering::Greater),
            Expression::Gte(left, right) => compare(left, right, document, |ordering| ordering != Ordering::Less),
            Expression::Lt(left, right) => compare(left, right, document, |ordering| ordering == Ordering::Less),
            Expression::Lte(left, right) => compare(left, right, document, |ordering| ordering != Ordering::Greater),
            Expression::And(operands) => {
                for operand in operands {
                    if !is_truthy(&operand.evaluate(document)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expression::Or(operands) => {
                for operand in operands {
                    if is_truthy(&operand.evaluate(document)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expression::Not(operand) => Ok(Value::Bool(!is_truthy(&operand.evaluate(document)?))),
            Expression::Exists(path) => Ok(Value::Bool(find_path(document, path).is_some_and(|value| !value.is_null()))),
            Expression::Size(value) => match value.evaluate(document)? {
                Value::Array(items) => Ok(json!(items.len())),
                other => Err(ApplicationError::new(ErrorType::InvalidExpression, format!("size expects an array, got {other}"))),
            },
        }
    }
}

/**
 * Group reducers.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /**
     * Sum of the numeric values. Non-numeric values are ignored.
     */
    Sum(Expression),
    /**
     * Average of the numeric values, `null` when there are none.
     */
    Avg(Expression),
    First(Expression),
    Push(Expression),
    /**
     * Distinct values in first-seen order.
     */
    AddToSet(Expression),
    Count,
}

impl Accumulator {
    /**
     * Reduces the rows of one partition to a single value.
     *
     * # Arguments
     * `documents`: Rows of the partition, in input order.
     *
     * # Returns
     * The reduced value or the first evaluation error.
     */
    pub fn accumulate(&self, documents: &[Document]) -> Result<Value, ApplicationError> {
        match self {
            Accumulator::Sum(expression) => {
                let mut sum = 0.0;
                for document in documents {
                    if let Some(number) = expression.evaluate(document)?.as_f64() {
                        sum += number;
                    }
                }
                Ok(json!(sum))
            }
            Accumulator::Avg(expression) => {
                let mut sum = 0.0;
                let mut count = 0_u32;
                for document in documents {
                    if let Some(number) = expression.evaluate(document)?.as_f64() {
                        sum += number;
                        count += 1;
                    }
                }
                if count == 0 { Ok(Value::Null) } else { Ok(json!(sum / f64::from(count))) }
            }
            Accumulator::First(expression) => match documents.first() {
                Some(document) => expression.evaluate(document),
                None => Ok(Value::Null),
            },
            Accumulator::Push(expression) => Ok(Value::Array(documents.iter().map(|document| expression.evaluate(document)).collect::<Result<Vec<_>, _>>()?)),
            Accumulator::AddToSet(expression) => {
                let mut seen = HashSet::new();
                let mut values = Vec::new();
                for document in documents {
                    let value = expression.evaluate(document)?;
                    if seen.insert(value_key(&value)) {
                        values.push(value);
                    }
                }
                Ok(Value::Array(values))
            }
            Accumulator::Count => Ok(json!(documents.len())),
        }
    }
}

/**
 * Rounds half away from zero to `precision` decimal digits.
 */
pub fn round(value: f64, precision: u32) -> f64 {
    match Decimal::from_f64(value) {
        Some(decimal) => decimal.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero).to_f64().unwrap_or(value),
        None => value,
    }
}

/**
 * Hashable key for a value. Values that are `values_equal` share a key: numbers are
 * compared as floats and object keys are sorted.
 */
pub fn value_key(value: &Value) -> String {
    fn canonical(value: &Value) -> Value {
        match value {
            Value::Number(number) => number.as_f64().and_then(Number::from_f64).map_or_else(|| value.clone(), Value::Number),
            Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
            Value::Object(object) => {
                let mut entries: Vec<(&String, &Value)> = object.iter().collect();
                entries.sort_by(|(left, _), (right, _)| left.cmp(right));
                Value::Object(entries.into_iter().map(|(key, value)| (key.clone(), canonical(value))).collect())
            }
            _ => value.clone(),
        }
    }
    canonical(value).to_string()
}

/**
 * Orders values by kind (null, numbers, strings, objects, arrays, booleans), then by value.
 */
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Object(_) => 3,
            Value::Array(_) => 4,
            Value::Bool(_) => 5,
        }
    }
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64().unwrap_or(0.0).partial_cmp(&right.as_f64().unwrap_or(0.0)).unwrap_or(Ordering::Equal),
        (Value::String(left), Value::String(right)) => left.cmp(right),
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        (Value::Array(left), Value::Array(right)) => left
            .iter()
            .zip(right)
            .map(|(left, right)| compare_values(left, right))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| left.len().cmp(&right.len())),
        (Value::Object(_), Value::Object(_)) => left.to_string().cmp(&right.to_string()),
        _ => rank(left).cmp(&rank(right)),
    }
}

/**
 * Equality where numbers compare by value regardless of integer/float representation.
 */
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare_values(left, right) == Ordering::Equal,
        _ => left == right,
    }
}

/**
 * `false`, `null` and zero are falsy, everything else is truthy.
 */
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        _ => true,
    }
}

fn as_number(value: &Value, operation: &str) -> Result<Option<f64>, ApplicationError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        other => Err(ApplicationError::new(ErrorType::InvalidExpression, format!("{operation} expects numbers, got {other}"))),
    }
}

fn fold_numbers(operands: &[Expression], document: &Document, operation: &str, initial: f64, fold: impl Fn(f64, f64) -> f64) -> Result<Value, ApplicationError> {
    let mut total = initial;
    for operand in operands {
        match as_number(&operand.evaluate(document)?, operation)? {
            Some(number) => total = fold(total, number),
            None => return Ok(Value::Null),
        }
    }
    Ok(json!(total))
}

fn compare(left: &Expression, right: &Expression, document: &Document, predicate: impl Fn(Ordering) -> bool) -> Result<Value, ApplicationError> {
    Ok(Value::Bool(predicate(compare_values(&left.evaluate(document)?, &right.evaluate(document)?))))
}

#[cfg(test)]
mod test {
    use super::*;

    fn row() -> Document {
        match json!({"name": "Brazil", "total": 100.0, "renewable": 80, "zero": 0, "missing_value": null, "types": ["Hydro", "Coal"]}) {
            Value::Object(document) => document,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round(80.125, 2), 80.13);
        assert_eq!(round(-2.5, 0), -3.0);
        assert_eq!(round(2.5, 0), 3.0);
        assert_eq!(round(33.333_333, 2), 33.33);
    }

    #[test]
    fn test_round_decimal_ties() {
        assert_eq!(round(1.005, 2), 1.01);
        assert_eq!(round(0.145, 2), 0.15);
        assert_eq!(round(-0.145, 2), -0.15);
        let percentage = Expression::rounded(
            Expression::multiply([Expression::divide(Expression::literal(1.005), Expression::literal(100)), Expression::literal(100)]),
            2,
        );
        assert_eq!(percentage.evaluate(&row()).unwrap(), json!(1.01));
    }

    fn evaluate(expression: &Expression) -> Value {
        expression.evaluate(&row()).unwrap()
    }

    #[test]
    fn test_add_and_subtract() {
        assert_eq!(evaluate(&Expression::add([Expression::field("total"), Expression::field("renewable")])), json!(180.0));
        assert_eq!(evaluate(&Expression::subtract(Expression::field("total"), Expression::field("renewable"))), json!(20.0));
        assert_eq!(evaluate(&Expression::subtract(Expression::field("total"), Expression::field("missing_value"))), Value::Null);
    }

    #[test]
    fn test_comparisons() {
        let total = || Expression::field("total");
        let renewable = || Expression::field("renewable");
        assert_eq!(evaluate(&Expression::ne(total(), Expression::literal(100))), json!(false));
        assert_eq!(evaluate(&Expression::ne(Expression::field("name"), Expression::literal("Chile"))), json!(true));
        assert_eq!(evaluate(&Expression::gte(total(), Expression::literal(100))), json!(true));
        assert_eq!(evaluate(&Expression::gte(renewable(), total())), json!(false));
        assert_eq!(evaluate(&Expression::lt(renewable(), total())), json!(true));
        assert_eq!(evaluate(&Expression::lt(total(), total())), json!(false));
        assert_eq!(evaluate(&Expression::lte(total(), total())), json!(true));
        assert_eq!(evaluate(&Expression::lte(total(), renewable())), json!(false));
    }

    #[test]
    fn test_comparisons_with_null_use_kind_order() {
        let missing = || Expression::field("missing_value");
        assert_eq!(evaluate(&Expression::lt(missing(), Expression::literal(0))), json!(true));
        assert_eq!(evaluate(&Expression::gte(missing(), Expression::literal(0))), json!(false));
        assert_eq!(evaluate(&Expression::lte(missing(), Expression::literal(Value::Null))), json!(true));
        assert_eq!(evaluate(&Expression::ne(missing(), Expression::literal(0))), json!(true));
    }

    #[test]
    fn test_boolean_operators() {
        let yes = || Expression::literal(true);
        let no = || Expression::literal(false);
        assert_eq!(evaluate(&Expression::and([yes(), yes()])), json!(true));
        assert_eq!(evaluate(&Expression::and([yes(), no()])), json!(false));
        assert_eq!(evaluate(&Expression::and([yes(), Expression::field("zero")])), json!(false));
        assert_eq!(evaluate(&Expression::or([no(), no()])), json!(false));
        assert_eq!(evaluate(&Expression::or([no(), yes()])), json!(true));
        assert_eq!(evaluate(&Expression::or([Expression::field("missing_value"), Expression::field("total")])), json!(true));
        assert_eq!(evaluate(&Expression::or(Vec::new())), json!(false));
        assert_eq!(evaluate(&Expression::not(Expression::field("missing_value"))), json!(true));
        assert_eq!(evaluate(&Expression::not(Expression::field("total"))), json!(false));
    }

    #[test]
    fn test_value_key_matches_values_equal() {
        assert_eq!(value_key(&json!(2019)), value_key(&json!(2019.0)));
        assert_eq!(value_key(&json!({"a": 1, "b": [2]})), value_key(&json!({"b": [2.0], "a": 1.0})));
        assert_ne!(value_key(&json!(2019)), value_key(&json!("2019")));
    }

    #[test]
    fn test_missing_field_fails() {
        let err = Expression::field("code").evaluate(&row()).unwrap_err();
        assert_eq!(err.error_type, ErrorType::FieldNotFound);
    }

    #[test]
    fn test_divide_by_zero_fails() {
        let err = Expression::divide(Expression::field("renewable"), Expression::field("zero")).evaluate(&row()).unwrap_err();
        assert_eq!(err.error_type, ErrorType::DivisionByZero);
    }

    #[test]
    fn test_guarded_division_skips_untaken_branch() {
        let guarded = Expression::cond(
            Expression::gt(Expression::field("zero"), Expression::literal(0)),
            Expression::divide(Expression::field("renewable"), Expression::field("zero")),
            Expression::literal(0.0),
        );
        assert_eq!(guarded.evaluate(&row()).unwrap(), json!(0.0));
    }

    #[test]
    fn test_percentage() {
        let percentage = Expression::multiply([Expression::divide(Expression::field("renewable"), Expression::field("total")), Expression::literal(100)]);
        assert_eq!(percentage.evaluate(&row()).unwrap().as_f64(), Some(80.0));
    }

    #[test]
    fn test_arithmetic_with_null_is_null() {
        let sum = Expression::add([Expression::field("total"), Expression::field("missing_value")]);
        assert_eq!(sum.evaluate(&row()).unwrap(), Value::Null);
    }

    #[test]
    fn test_arithmetic_on_string_is_invalid() {
        let err = Expression::add([Expression::field("name"), Expression::literal(1)]).evaluate(&row()).unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidExpression);
    }

    #[test]
    fn test_exists() {
        assert_eq!(Expression::exists("total").evaluate(&row()).unwrap(), json!(true));
        assert_eq!(Expression::exists("missing_value").evaluate(&row()).unwrap(), json!(false));
        assert_eq!(Expression::exists("not_there").evaluate(&row()).unwrap(), json!(false));
    }

    #[test]
    fn test_integer_equals_float() {
        assert_eq!(Expression::eq(Expression::field("total"), Expression::literal(100)).evaluate(&row()).unwrap(), json!(true));
    }

    #[test]
    fn test_object_and_size() {
        let object = Expression::object([("country", Expression::field("name")), ("count", Expression::size(Expression::field("types")))]);
        assert_eq!(object.evaluate(&row()).unwrap(), json!({"country": "Brazil", "count": 2}));
    }

    #[test]
    fn test_compare_values_by_kind() {
        assert_eq!(compare_values(&Value::Null, &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare_values(&json!("EU"), &json!("G20")), Ordering::Less);
    }

    #[test]
    fn test_accumulators() {
        let documents: Vec<Document> = [json!({"v": 1, "t": "Hydro"}), json!({"v": null, "t": "Coal"}), json!({"v": 3, "t": "Hydro"})]
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(document) => Some(document),
                _ => None,
            })
            .collect();
        assert_eq!(Accumulator::Sum(Expression::field("v")).accumulate(&documents).unwrap(), json!(4.0));
        assert_eq!(Accumulator::Avg(Expression::field("v")).accumulate(&documents).unwrap(), json!(2.0));
        assert_eq!(Accumulator::First(Expression::field("t")).accumulate(&documents).unwrap(), json!("Hydro"));
        assert_eq!(Accumulator::AddToSet(Expression::field("t")).accumulate(&documents).unwrap(), json!(["Hydro", "Coal"]));
        assert_eq!(Accumulator::Push(Expression::field("t")).accumulate(&documents).unwrap(), json!(["Hydro", "Coal", "Hydro"]));
        assert_eq!(Accumulator::Count.accumulate(&documents).unwrap(), json!(3));
        assert_eq!(Accumulator::Avg(Expression::field("v")).accumulate(&[]).unwrap(), Value::Null);
        let years: Vec<Document> = [json!({"y": 2019}), json!({"y": 2019.0}), json!({"y": 2020})]
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(document) => Some(document),
                _ => None,
            })
            .collect();
        assert_eq!(Accumulator::AddToSet(Expression::field("y")).accumulate(&years).unwrap(), json!([2019, 2020]));
    }
}
