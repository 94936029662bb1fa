use std::io;

use crate::cli::parse_on_off;
use crate::client::HTTPClient;
use crate::models::{CLIConfig, Exchange};
use crate::render;

pub struct REPL {
    pub config: CLIConfig,
    pub client: HTTPClient,
    pub history: Vec<Exchange>,
}

impl REPL {
    pub fn new(config: CLIConfig, client: HTTPClient) -> Self {
        Self {
            config,
            client,
            history: Vec::new(),
        }
    }

    pub fn run(&mut self) {
        render::banner(&self.config);
        loop {
            render::prompt();
            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('/') {
                if self.handle_command(line) {
                    break;
                }
                continue;
            }
            self.ask(line);
        }
    }

    fn handle_command(&mut self, line: &str) -> bool {
        let mut parts = line.splitn(2, ' ');
        let cmd = parts.next().unwrap_or("").trim_start_matches('/');
        let rest = parts.next().unwrap_or("").trim();
        match cmd {
            "exit" | "quit" => return true,
            "help" => render::help(),
            "stats" => match self.client.stats() {
                Ok(stats) => render::stats(&stats),
                Err(err) => render::error(&err),
            },
            "departments" => self.show_list("/api/departments", "departments"),
            "types" => self.show_list("/api/acquisition-types", "acquisition_types"),
            "debug" => {
                if rest.is_empty() {
                    self.config.debug = !self.config.debug;
                    render::info(&format!("debug: {}", self.config.debug));
                } else if let Some(flag) = parse_on_off(rest) {
                    self.config.debug = flag;
                    render::info(&format!("debug: {}", self.config.debug));
                } else {
                    render::error("invalid debug flag");
                }
            }
            "history" => render::history(&self.history),
            "reset" => {
                self.history.clear();
                render::info("history cleared");
            }
            "config" => render::config(&self.config),
            "base" => {
                if rest.is_empty() {
                    render::info(&format!("base: {}", self.config.base_url));
                } else {
                    match HTTPClient::new(rest) {
                        Ok(client) => {
                            self.config.base_url = client.base_url.clone();
                            self.client = client;
                            render::info("base url updated");
                        }
                        Err(err) => render::error(&err),
                    }
                }
            }
            _ => render::info("unknown command, type /help"),
        }
        false
    }

    fn ask(&mut self, question: &str) {
        match self.client.query(question) {
            Ok(resp) => {
                render::answer(&resp, self.config.debug);
                self.history.push(Exchange {
                    question: question.to_string(),
                    answer: resp.answer,
                });
            }
            Err(err) => render::error(&err),
        }
    }

    fn show_list(&self, path: &str, key: &str) {
        match self.client.list(path, key) {
            Ok(items) => render::list(&items),
            Err(err) => render::error(&err),
        }
    }
}
