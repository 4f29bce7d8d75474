use pingops_jobs::{Operation, Record};
use serde_json::{Map, Value, json};

use crate::client::ClientError;

const GIVEN_NAME: &[&str] = &["firstName", "givenName"];
const FAMILY_NAME: &[&str] = &["lastName", "familyName"];
const PASSTHROUGH: &[&str] = &["email", "title", "primaryPhone", "mobilePhone", "locale", "nickname"];

pub fn user_id(record: &Record) -> Option<&str> {
    record.first_of(&["id", "userId"])
}

pub fn user_payload(
    record: &Record,
    operation: Operation,
    default_population: Option<&str>,
) -> Result<Value, ClientError> {
    let mut body = Map::new();

    match (operation, record.get("username")) {
        (_, Some(username)) => {
            body.insert("username".to_string(), json!(username));
        }
        (Operation::Import, None) => {
            return Err(ClientError::InvalidRecord(
                "username is required to import a user".to_string(),
            ));
        }
        _ => {}
    }

    for key in PASSTHROUGH {
        if let Some(value) = record.get(key) {
            body.insert((*key).to_string(), json!(value));
        }
    }

    let mut name = Map::new();
    if let Some(given) = record.first_of(GIVEN_NAME) {
        name.insert("given".to_string(), json!(given));
    }
    if let Some(middle) = record.get("middleName") {
        name.insert("middle".to_string(), json!(middle));
    }
    if let Some(family) = record.first_of(FAMILY_NAME) {
        name.insert("family".to_string(), json!(family));
    }
    if !name.is_empty() {
        body.insert("name".to_string(), Value::Object(name));
    }

    if let Some(enabled) = record.get("enabled") {
        body.insert("enabled".to_string(), json!(parse_flag(enabled)?));
    }

    if operation == Operation::Import
        && let Some(population) = record.get("populationId").or(default_population)
    {
        body.insert("population".to_string(), json!({ "id": population }));
    }

    if operation == Operation::Modify && body.is_empty() {
        return Err(ClientError::InvalidRecord(
            "record has no columns that can be updated".to_string(),
        ));
    }

    Ok(Value::Object(body))
}

fn parse_flag(value: &str) -> Result<bool, ClientError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        other => Err(ClientError::InvalidRecord(format!(
            "enabled must be true or false, got {other}"
        ))),
    }
}
