use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::registry::ToolRegistry;
use super::types::{RegistryError, ToolError, ToolHandler, ToolSchema};
use crate::store::{DocumentStore, FindOptions};

pub const SEARCH_DATABASE: &str = "search_database";
pub const COUNT_DOCUMENTS: &str = "count_documents";
pub const AGGREGATE_DATA: &str = "aggregate_data";
pub const GET_SCHEMA_INFO: &str = "get_schema_info";

/// Documents handed back to the model per search, whatever `limit` fetched.
pub const MAX_RETURNED_RESULTS: usize = 10;
const MAX_SAMPLE_DEPARTMENTS: usize = 20;

const DATA_DICTIONARY: &[(&str, &str)] = &[
    ("Creation Date", "Date of purchase order entered by the user. Can be back-dated; creation date is used."),
    ("Fiscal Year", "Derived from creation date. CA fiscal year: July 1 – June 30."),
    ("LPA Number", "Leveraged Procurement Agreement (contract) number."),
    ("Purchase Order Number", "Not unique across departments."),
    ("Requisition Number", "Not unique across departments."),
    ("Acquisition Type", "Non-IT Goods, Non-IT Services, IT Goods, IT Services."),
    ("Sub-Acquisition Type", "Depends on acquisition type."),
    ("Acquisition Method", "Type of acquisition used. See supplemental dictionary."),
    ("Sub-Acquisition Method", "Depends on acquisition method."),
    ("Department Name", "Name of purchasing department (normalized)."),
    ("Supplier Code", "Normalized supplier code."),
    ("Supplier Name", "Supplier name at time of registration."),
    ("Supplier Qualifications", "SB, SBE, DVBE, NP, MB (can be combined)."),
    ("Supplier Zip Code", "Zip code of supplier."),
    ("CalCard", "Whether CalCard used (Yes/No)."),
    ("Item Name", "Name of purchased item."),
    ("Item Description", "Description of purchased item."),
    ("Quantity", "Quantity purchased."),
    ("Unit Price", "Price per unit."),
    ("Total Price", "Total price excluding tax/shipping."),
    ("Classification Codes", "UNSPSC v14. May have multiple codes."),
    ("Normalized UNSPSC", "First 8 digits of UNSPSC for the full PO."),
    ("Commodity Title", "Based on normalized UNSPSC."),
    ("Class", "Class number based on normalized UNSPSC."),
    ("Class Title", "Class title based on normalized UNSPSC."),
    ("Family", "Family number based on normalized UNSPSC."),
    ("Family Title", "Family title based on normalized UNSPSC."),
    ("Segment", "Segment number based on normalized UNSPSC."),
];

const IMPORTANT_FIELDS: &[(&str, &str)] = &[
    ("department_name", "Name of the purchasing department"),
    ("supplier_name", "Vendor/supplier name"),
    ("total_price", "Purchase amount (numeric)"),
    ("fiscal_year", "Fiscal year (e.g., '2014-2015')"),
    ("acquisition_type", "Type of acquisition (e.g., 'IT', 'LPA')"),
    ("purchase_date", "Date of purchase"),
    ("creation_date", "Record creation date"),
];

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: Value,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    sort_field: Option<String>,
    #[serde(default = "default_sort_order")]
    sort_order: i64,
}

#[derive(Debug, Deserialize)]
struct CountArgs {
    #[serde(default)]
    query: Value,
}

#[derive(Debug, Deserialize)]
struct AggregateArgs {
    pipeline: Value,
}

fn default_limit() -> i64 {
    100
}

fn default_sort_order() -> i64 {
    -1
}

type ToolFn = fn(&dyn DocumentStore, Value) -> Result<Map<String, Value>, ToolError>;

pub fn register_procurement_tools(
    registry: &ToolRegistry,
    store: Arc<dyn DocumentStore>,
) -> Result<(), RegistryError> {
    let tools: [(ToolSchema, ToolFn); 4] = [
        (get_schema_info_schema(), get_schema_info),
        (search_database_schema(), search_database),
        (count_documents_schema(), count_documents),
        (aggregate_data_schema(), aggregate_data),
    ];
    for (schema, run) in tools {
        let store = store.clone();
        let handler: ToolHandler = Arc::new(move |args| run(store.as_ref(), args));
        registry.register(&schema.name.clone(), handler, schema)?;
    }
    Ok(())
}

pub fn search_database(store: &dyn DocumentStore, args: Value) -> Result<Map<String, Value>, ToolError> {
    let args: SearchArgs = parse_args(args)?;
    let filter = decode_json_arg("query", args.query)?;
    if !matches!(args.sort_order, 1 | -1) {
        return Err(ToolError::InvalidArgs("sort_order must be 1 or -1".to_string()));
    }
    // 0 means no limit; negative limits count by magnitude
    let limit = match args.limit.unsigned_abs() {
        0 => None,
        n => Some(n as usize),
    };
    let options = FindOptions {
        sort: args.sort_field.map(|field| (field, args.sort_order)),
        limit,
    };

    let results = store.find(&filter, &options)?;
    let total = results.len();
    tracing::info!(total, "search found results");

    let shown: Vec<Value> = results
        .into_iter()
        .take(MAX_RETURNED_RESULTS)
        .map(|doc| stringify_ids(Value::Object(doc)))
        .collect();

    let mut out = Map::new();
    out.insert("count".to_string(), json!(total));
    out.insert("results".to_string(), Value::Array(shown));
    out.insert("total_found".to_string(), json!(total));
    Ok(out)
}

pub fn count_documents(store: &dyn DocumentStore, args: Value) -> Result<Map<String, Value>, ToolError> {
    let args: CountArgs = parse_args(args)?;
    let filter = decode_json_arg("query", args.query)?;
    tracing::info!(filter = %filter, "count query");
    let count = store.count(&filter)?;
    tracing::info!(count, "count query returned");

    let mut out = Map::new();
    out.insert("count".to_string(), json!(count));
    Ok(out)
}

pub fn aggregate_data(store: &dyn DocumentStore, args: Value) -> Result<Map<String, Value>, ToolError> {
    let args: AggregateArgs = parse_args(args)?;
    let pipeline = match decode_json_arg("pipeline", args.pipeline)? {
        Value::Array(stages) => stages,
        other => {
            return Err(ToolError::InvalidArgs(format!(
                "pipeline must be a list of stages, got {}",
                other
            )))
        }
    };
    let results = store.aggregate(&pipeline)?;
    tracing::info!(results = results.len(), "aggregation returned");

    let mut out = Map::new();
    out.insert(
        "results".to_string(),
        Value::Array(
            results
                .into_iter()
                .map(|doc| stringify_ids(Value::Object(doc)))
                .collect(),
        ),
    );
    Ok(out)
}

pub fn get_schema_info(store: &dyn DocumentStore, _args: Value) -> Result<Map<String, Value>, ToolError> {
    let fields: Vec<Value> = store
        .find_one(&json!({}))?
        .map(|doc| doc.keys().cloned().map(Value::String).collect())
        .unwrap_or_default();
    let departments: Vec<Value> = store
        .distinct("department_name")?
        .into_iter()
        .take(MAX_SAMPLE_DEPARTMENTS)
        .collect();
    let fiscal_years = store.distinct("fiscal_year")?;
    let acquisition_types = store.distinct("acquisition_type")?;

    let mut out = Map::new();
    out.insert("collection".to_string(), json!(store.collection_name()));
    out.insert("available_fields".to_string(), Value::Array(fields));
    out.insert("sample_departments".to_string(), Value::Array(departments));
    out.insert("fiscal_years".to_string(), Value::Array(fiscal_years));
    out.insert("acquisition_types".to_string(), Value::Array(acquisition_types));
    out.insert("important_fields".to_string(), pairs_to_object(IMPORTANT_FIELDS));
    out.insert("data_dictionary".to_string(), pairs_to_object(DATA_DICTIONARY));
    Ok(out)
}

fn pairs_to_object(pairs: &[(&str, &str)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect(),
    )
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => json!({}),
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|err| ToolError::InvalidArgs(format!("arguments are not valid JSON: {}", err)))?,
        other => other,
    };
    serde_json::from_value(args).map_err(|err| ToolError::InvalidArgs(err.to_string()))
}

// Models sometimes send the filter or pipeline as a JSON-encoded string.
fn decode_json_arg(name: &str, value: Value) -> Result<Value, ToolError> {
    match value {
        Value::Null => Ok(json!({})),
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|err| ToolError::InvalidArgs(format!("{} is not valid JSON: {}", name, err))),
        other => Ok(other),
    }
}

/// Coerces ObjectId-like identifiers to plain strings.
pub fn stringify_ids(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(oid)) = map.get("$oid").filter(|_| map.len() == 1) {
                return Value::String(oid.clone());
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, value)| {
                        let value = stringify_ids(value);
                        let value = match (key.as_str(), value) {
                            ("_id", Value::Number(n)) => Value::String(n.to_string()),
                            ("_id", Value::Bool(b)) => Value::String(b.to_string()),
                            (_, other) => other,
                        };
                        (key, value)
                    })
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(stringify_ids).collect()),
        other => other,
    }
}

fn get_schema_info_schema() -> ToolSchema {
    ToolSchema {
        name: GET_SCHEMA_INFO.to_string(),
        description: "Get information about the database schema and available fields. Use this tool FIRST to understand what fields are available before querying. Returns field names, sample departments, fiscal years, acquisition types and a data dictionary.".to_string(),
        parameters: Some(json!({
            "type": "object",
            "properties": {}
        })),
    }
}

fn search_database_schema() -> ToolSchema {
    ToolSchema {
        name: SEARCH_DATABASE.to_string(),
        description: "Search the procurement database with a MongoDB query. Use this tool to find procurement records matching specific criteria. Examples: {\"fiscal_year\": \"2014-2015\"}, {\"department_name\": \"Technology Services\"}, {\"total_price\": {\"$gt\": 10000}}, {\"department_name\": {\"$regex\": \"Technology\", \"$options\": \"i\"}}. Returns at most 10 records plus the total number found.".to_string(),
        parameters: Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "object",
                    "description": "MongoDB query filter as a dictionary"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default 100)"
                },
                "sort_field": {
                    "type": "string",
                    "description": "Field to sort by"
                },
                "sort_order": {
                    "type": "integer",
                    "description": "Sort order: 1 for ascending, -1 for descending (default -1)"
                }
            },
            "required": ["query"]
        })),
    }
}

fn count_documents_schema() -> ToolSchema {
    ToolSchema {
        name: COUNT_DOCUMENTS.to_string(),
        description: "Count documents matching a query without retrieving them. Use this when you need to know HOW MANY records match criteria. Examples: {\"fiscal_year\": \"2014-2015\"}, {\"total_price\": {\"$gt\": 100000}}.".to_string(),
        parameters: Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "object",
                    "description": "MongoDB query filter as a dictionary"
                }
            },
            "required": ["query"]
        })),
    }
}

fn aggregate_data_schema() -> ToolSchema {
    ToolSchema {
        name: AGGREGATE_DATA.to_string(),
        description: "Perform MongoDB aggregation for complex queries like grouping, summing, and calculations. Use this for Top N queries, sum/average calculations and grouping. Example top departments: [{\"$group\": {\"_id\": \"$department_name\", \"total\": {\"$sum\": \"$total_price\"}}}, {\"$sort\": {\"total\": -1}}, {\"$limit\": 5}].".to_string(),
        parameters: Some(json!({
            "type": "object",
            "properties": {
                "pipeline": {
                    "type": "array",
                    "description": "MongoDB aggregation pipeline",
                    "items": {"type": "object"}
                }
            },
            "required": ["pipeline"]
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, MemoryStore};

    fn purchases(n: usize) -> MemoryStore {
        let docs: Vec<Document> = (0..n)
            .map(|i| {
                let department = if i % 2 == 0 { "Corrections" } else { "Water Resources" };
                let fiscal_year = if i < 15 { "2014-2015" } else { "2013-2014" };
                json!({
                    "_id": {"$oid": format!("{:024x}", i + 1)},
                    "department_name": department,
                    "fiscal_year": fiscal_year,
                    "acquisition_type": "IT Goods",
                    "total_price": (i as f64) * 100.0,
                })
                .as_object()
                .cloned()
                .unwrap()
            })
            .collect();
        MemoryStore::new("purchases", docs)
    }

    #[test]
    fn search_caps_results_but_reports_true_total() {
        let store = purchases(25);
        let out = search_database(&store, json!({"query": {}})).unwrap();
        assert_eq!(out["results"].as_array().unwrap().len(), MAX_RETURNED_RESULTS);
        assert_eq!(out["total_found"], json!(25));
        assert_eq!(out["count"], json!(25));

        let limited = search_database(&store, json!({"query": {}, "limit": 12})).unwrap();
        assert_eq!(limited["total_found"], json!(12));
        assert_eq!(limited["results"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn search_stringifies_ids_and_sorts() {
        let store = purchases(3);
        let out = search_database(
            &store,
            json!({"query": {"fiscal_year": "2014-2015"}, "sort_field": "total_price", "sort_order": -1}),
        )
        .unwrap();
        let first = &out["results"][0];
        assert_eq!(first["_id"], json!(format!("{:024x}", 3)));
        assert_eq!(first["total_price"], json!(200.0));
    }

    #[test]
    fn search_accepts_string_encoded_query() {
        let store = purchases(4);
        let out = search_database(&store, json!({"query": "{\"department_name\": \"Corrections\"}"})).unwrap();
        assert_eq!(out["total_found"], json!(2));
        assert!(search_database(&store, json!({"query": "{not json"})).is_err());
        assert!(search_database(&store, json!({"query": {}, "sort_order": 3})).is_err());
    }

    #[test]
    fn count_returns_number_without_results() {
        let store = purchases(20);
        let out = count_documents(&store, json!({"query": {"fiscal_year": "2014-2015"}})).unwrap();
        assert_eq!(out["count"], json!(15));
        assert!(!out.contains_key("results"));
    }

    #[test]
    fn aggregate_groups_and_stringifies() {
        let store = purchases(4);
        let out = aggregate_data(
            &store,
            json!({"pipeline": [
                {"$group": {"_id": "$department_name", "total": {"$sum": "$total_price"}}},
                {"$sort": {"total": -1}}
            ]}),
        )
        .unwrap();
        let rows = out["results"].as_array().unwrap();
        assert_eq!(rows[0], json!({"_id": "Water Resources", "total": 400}));
        assert_eq!(rows[1], json!({"_id": "Corrections", "total": 200}));

        assert!(aggregate_data(&store, json!({"pipeline": {"$match": {}}})).is_err());
        assert!(aggregate_data(&store, json!({"pipeline": [{"$bogus": 1}]})).is_err());
    }

    #[test]
    fn schema_info_on_empty_collection_has_all_keys() {
        let store = MemoryStore::new("purchases", Vec::new());
        let out = get_schema_info(&store, Value::Null).unwrap();
        for key in ["available_fields", "sample_departments", "fiscal_years", "acquisition_types"] {
            assert_eq!(out[key], json!([]), "{}", key);
        }
        assert!(out["data_dictionary"]["Purchase Order Number"]
            .as_str()
            .unwrap()
            .contains("Not unique"));
    }

    #[test]
    fn schema_info_lists_sorted_fiscal_years() {
        let store = purchases(20);
        let out = get_schema_info(&store, json!({})).unwrap();
        assert_eq!(out["fiscal_years"], json!(["2013-2014", "2014-2015"]));
        assert_eq!(out["sample_departments"], json!(["Corrections", "Water Resources"]));
        assert!(out["available_fields"].as_array().unwrap().contains(&json!("total_price")));
    }

    #[test]
    fn registered_tools_report_failures_as_observations() {
        let registry = ToolRegistry::new();
        register_procurement_tools(&registry, Arc::new(purchases(2))).unwrap();
        assert_eq!(registry.count(), 4);
        let observation = registry.execute(COUNT_DOCUMENTS, json!({"query": {"total_price": {"$near": 1}}}));
        let rendered = observation.to_json();
        assert_eq!(rendered["success"], json!(false));
        assert!(rendered["error"].as_str().unwrap().contains("$near"));
    }
}
