//! The behavioral contract handed to the reasoning engine.

use crate::tools::{ToolRegistry, ToolSchema};

/// Renders one catalog line per tool: name, description and argument schema.
pub fn render_tool_catalog(tools: &[ToolSchema]) -> String {
    tools
        .iter()
        .map(|tool| {
            let args = tool
                .parameters
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "{}".to_string());
            format!("- {}: {}\n  Arguments (JSON schema): {}", tool.name, tool.description, args)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the system prompt with the procurement rules and the tool catalog.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let schemas = tools.get_schemas();
    let tool_catalog = render_tool_catalog(&schemas);
    let tool_names = schemas
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are an assistant for querying California procurement data (state purchase orders).
You answer by calling tools that search, count and aggregate a collection of purchase records and describe its schema.

## Rules

1. Always start with `get_schema_info` unless the question is purely definitional.
2. Counting and existence questions use `count_documents`.
3. Top-N, group-by and numeric aggregates (sum, average) use `aggregate_data`.
4. Specific record lookups use `search_database`.
5. Fiscal years are strings in the "2014-2015" format.
6. When the user asks for a number, the final answer must contain that number.
7. Action Input must be valid JSON with double quotes, e.g. {{"fiscal_year": "2014-2015"}}.

## Fiscal years and quarters

- The fiscal year runs from July 1 to June 30.
- Q1: July 1 to September 30
- Q2: October 1 to December 31
- Q3: January 1 to March 31
- Q4: April 1 to June 30

## Data availability

- The data may stop partway through a fiscal year. If a quarter partially exists, report what exists and note the missing dates.
- Never answer "$0" unless a tool returned a zero total.
- Never claim "no data" unless a tool returned a zero count or an empty result.

## Placeholder values

If a top-N result has "Unknown" (or another placeholder) as its leading value, report the count for that placeholder and also the next-ranked real value with its count.

## Quarterly spending reports

When asked for the highest spending in each quarter:
1. Aggregate spending over all available fiscal years.
2. Filter quarters by `purchase_date` date ranges.
3. For each quarter, find the fiscal year with the highest total spending.
4. Give a short summary paragraph and a table: Fiscal Year | Quarter | Total Spending (USD).
5. Include the intermediate totals for every fiscal year involved.

## Date fields

- Always use `purchase_date` for spending, aggregation and quarter calculations.
- Never use `creation_date` for spending totals or top-N analysis.
- Filter dates in ISO format (YYYY-MM-DD).

## Strategy

- Definitions: call `get_schema_info` and answer from the data dictionary.
- Statistics: call `get_schema_info`, then `count_documents` for counts or `aggregate_data` for groupings and totals.
- Complex questions: break them into sub-questions and include the intermediate numbers.
- Top-N pipelines use `$group`, `$sort` and `$limit`. The LPA flag is boolean: {{"has_lpa_number": true}}.

## Response format

Each step must look like this:

Thought: reasoning about what to do next
Action: one of [{tool_names}]
Action Input: JSON arguments for the tool

The system replies with an Observation containing the tool result as JSON ("success": false means the call failed and you may retry with corrected arguments).
When you have the answer, reply with:

Thought: I now know the final answer
Final Answer: the answer, clear and concise, with numbers labelled

## Available tools

{tool_catalog}

Tool names: {tool_names}"#,
        tool_catalog = tool_catalog,
        tool_names = tool_names,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStore;
    use crate::tools::register_procurement_tools;

    #[test]
    fn prompt_lists_every_registered_tool() {
        let registry = ToolRegistry::new();
        register_procurement_tools(&registry, Arc::new(MemoryStore::new("purchases", Vec::new())))
            .unwrap();
        let prompt = build_system_prompt(&registry);
        for name in registry.names() {
            assert!(prompt.contains(&format!("- {}:", name)), "missing {}", name);
        }
        assert!(prompt.contains("Final Answer:"));
        assert!(prompt.contains("Q1: July 1 to September 30"));
        assert!(prompt.contains("Never use `creation_date`"));
        assert!(prompt.contains(r#"{"fiscal_year": "2014-2015"}"#));
    }

    #[test]
    fn catalog_includes_argument_schemas() {
        let catalog = render_tool_catalog(&[ToolSchema {
            name: "count_documents".into(),
            description: "Count matching purchases".into(),
            parameters: Some(serde_json::json!({"type": "object"})),
        }]);
        assert_eq!(
            catalog,
            "- count_documents: Count matching purchases\n  Arguments (JSON schema): {\"type\":\"object\"}"
        );
    }
}
