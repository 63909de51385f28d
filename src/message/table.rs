use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use serde_json::Value;

use super::request::Table;

/// Converts a header or argument map into an AMQP field table.
pub fn to_field_table(table: &Table) -> FieldTable {
    let mut fields = FieldTable::default();
    for (key, value) in table {
        fields.insert(ShortString::from(key.clone()), to_amqp_value(value));
    }
    fields
}

pub fn to_amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AMQPValue::LongLongInt(i)
            } else {
                // u64 beyond i64::MAX, or a float
                AMQPValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => AMQPValue::LongString(LongString::from(s.clone())),
        Value::Array(items) => {
            let mut array = FieldArray::default();
            for item in items {
                array.push(to_amqp_value(item));
            }
            AMQPValue::FieldArray(array)
        }
        Value::Object(map) => {
            let mut nested = FieldTable::default();
            for (key, item) in map {
                nested.insert(ShortString::from(key.clone()), to_amqp_value(item));
            }
            AMQPValue::FieldTable(nested)
        }
    }
}
