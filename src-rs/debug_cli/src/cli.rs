use std::env;

use crate::models::CLIConfig;

const DEFAULT_URL: &str = "http://localhost:8000";

pub fn parse_config(args: impl Iterator<Item = String>) -> CLIConfig {
    let mut cfg = CLIConfig {
        base_url: env::var("PROCUREMENT_AGENT_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_URL.to_string()),
        debug: env::var("PROCUREMENT_AGENT_DEBUG")
            .ok()
            .and_then(|v| parse_on_off(&v))
            .unwrap_or(false),
    };

    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--base" => {
                if let Some(value) = args.next() {
                    cfg.base_url = value;
                }
            }
            "--debug" => {
                cfg.debug = match args.peek().and_then(|v| parse_on_off(v)) {
                    Some(flag) => {
                        args.next();
                        flag
                    }
                    None => true,
                };
            }
            _ => {}
        }
    }
    cfg
}

pub fn parse_on_off(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
