use std::io::{self, Write};

use crate::models::{CLIConfig, Exchange, QueryResponse, StatsResponse};

pub fn banner(cfg: &CLIConfig) {
    println!("Procurement Agent Debug CLI");
    println!("API: {}", cfg.base_url);
    println!("Type a question, or /help for commands.");
}

pub fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

pub fn help() {
    println!("Commands:");
    println!("  /help                 Show commands");
    println!("  /exit | /quit         Exit");
    println!("  /stats                Collection statistics");
    println!("  /departments          List departments");
    println!("  /types                List acquisition types");
    println!("  /debug [on|off]       Toggle agent step output");
    println!("  /history              Show asked questions");
    println!("  /reset                Clear history");
    println!("  /config               Show current config");
    println!("  /base <url>           Update base URL");
}

pub fn answer(resp: &QueryResponse, debug: bool) {
    if resp.answer.starts_with("Error: ") {
        eprintln!("{}", resp.answer);
    } else {
        println!("assistant> {}", resp.answer);
    }
    if debug {
        match &resp.agent_steps {
            Some(steps) if !steps.is_empty() => println!("steps: {}", steps.join(" -> ")),
            _ => println!("steps: (none reported)"),
        }
        if resp.record_count > 0 || !resp.data.is_empty() {
            println!("records: {} ({} rows)", resp.record_count, resp.data.len());
        }
    }
}

pub fn stats(stats: &StatsResponse) {
    println!("records:      {}", stats.total_records);
    println!("departments:  {}", stats.departments);
    println!("suppliers:    {}", stats.suppliers);
    println!("fiscal years: {}", stats.fiscal_years.join(", "));
    println!("spending:     ${:.2}", stats.total_spending);
    println!("dates:        {} .. {}", stats.date_range.start, stats.date_range.end);
}

pub fn list(items: &[String]) {
    if items.is_empty() {
        println!("(empty)");
        return;
    }
    for item in items {
        println!("  {}", item);
    }
}

pub fn config(cfg: &CLIConfig) {
    println!("config:");
    println!("  base: {}", cfg.base_url);
    println!("  debug: {}", cfg.debug);
}

pub fn history(items: &[Exchange]) {
    if items.is_empty() {
        println!("no history");
        return;
    }
    for (idx, item) in items.iter().enumerate() {
        println!("{}. {}", idx + 1, item.question);
        println!("   {}", item.answer);
    }
}

pub fn info(msg: &str) {
    println!("{}", msg);
}

pub fn error(msg: &str) {
    eprintln!("error: {}", msg);
}
