use std::io::{self, BufRead, Write};
use aerodex::parser::{self, Command};
use clap::Parser;
use reqwest::{Client, Method};
use serde_json::Value;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Interactive client for the aerodex airport catalog")]
struct Args {
    /// Base URL of a running aerodex server
    #[clap(long, env = "AERODEX_SERVER", default_value = "http://127.0.0.1:5000")]
    server: String,
}

struct Session {
    client: Client,
    base: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let session = Session {
        client: Client::new(),
        base: args.server.trim_end_matches('/').to_string(),
    };
    print_banner();

    match session.client.get(session.url("/airports/popular")).send().await {
        Ok(_) => println!("[\u{2713}] Connected to aerodex at {}", session.base),
        Err(e) => {
            println!("[\u{2717}] Could not reach {}: {}", session.base, e);
            println!("    Start the server with 'aerodex --addr 127.0.0.1:5000' first.");
            return;
        }
    }
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("aerodex> ");
        if io::stdout().flush().is_err() {
            break;
        }
        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        match parser::parse_command(&line) {
            Ok(Command::Exit) => break,
            Ok(cmd) => {
                if let Err(e) = session.execute(cmd).await {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if line.to_uppercase().starts_with("NEAR") {
                    println!("    \u{2139}\u{fe0f}  Hint: Try 'NEAR 40.64 -73.78 RADIUS 50'");
                } else if line.to_uppercase().starts_with("UPDATE") {
                    println!("    \u{2139}\u{fe0f}  Hint: Try 'UPDATE JFK SET {{\"name\": \"Idlewild\"}}'");
                }
            }
        }
    }
}

fn print_banner() {
    println!("\n==================================================");
    println!("   aerodex CLI - airport catalog client");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. LIST:     LIST");
    println!("2. GET:      GET JFK");
    println!("3. NEAR:     NEAR 40.64 -73.78 [RADIUS 50]");
    println!("4. POPULAR:  POPULAR [LIMIT 5]");
    println!("5. INSERT:   INSERT {{\"iata_code\":\"JFK\",\"name\":\"...\",\"city\":\"New York, United States\",\"location\":{{\"coordinates\":[-73.78,40.64]}}}}");
    println!("6. UPDATE:   UPDATE JFK SET {{\"name\":\"Idlewild\"}}");
    println!("7. DELETE:   DELETE JFK");
    println!("8. EXIT:     Quit\n");
}

impl Session {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn execute(&self, cmd: Command) -> Result<(), String> {
        match cmd {
            Command::Help => {
                print_help();
                Ok(())
            }
            Command::List => {
                let body = self.call(Method::GET, "/airports".into(), None).await?;
                let items = body.as_array().cloned().unwrap_or_default();
                println!("{} airports:", items.len());
                for a in &items {
                    println!("  \u{2022} {:<5} {} ({})", text(&a["identifier"]), text(&a["name"]), text(&a["city"]));
                }
                Ok(())
            }
            Command::Get { code } => {
                let body = self.call(Method::GET, format!("/airports/{}", code), None).await?;
                println!("{}", pretty(&body));
                Ok(())
            }
            Command::Near { lat, lng, radius_km } => {
                let mut path = format!("/airports/nearby?lat={}&lng={}", lat, lng);
                if let Some(r) = radius_km {
                    path.push_str(&format!("&radius={}", r));
                }
                let body = self.call(Method::GET, path, None).await?;
                let hits = body.as_array().cloned().unwrap_or_default();
                println!("\nFound {} airports:", hits.len());
                for h in &hits {
                    let dist = h["distance_km"].as_f64().unwrap_or_default();
                    println!("  \u{2022} {:<5} {:>9.3} km  {}", text(&h["identifier"]), dist, text(&h["airport"]["name"]));
                }
                println!();
                Ok(())
            }
            Command::Popular { limit } => {
                let path = match limit {
                    Some(k) => format!("/airports/popular?limit={}", k),
                    None => "/airports/popular".to_string(),
                };
                let body = self.call(Method::GET, path, None).await?;
                for (rank, p) in body.as_array().cloned().unwrap_or_default().iter().enumerate() {
                    println!("  {}. {:<5} {} visits", rank + 1, text(&p["identifier"]), p["visits"]);
                }
                Ok(())
            }
            Command::Insert { body } => {
                let resp = self.call(Method::POST, "/airports".into(), Some(body)).await?;
                println!("[\u{2713} OK] Created {} ({})", text(&resp["identifier"]), text(&resp["id"]));
                Ok(())
            }
            Command::Update { code, body } => {
                self.call(Method::PUT, format!("/airports/{}", code), Some(body)).await?;
                println!("[\u{2713} OK] Updated {}", code);
                Ok(())
            }
            Command::Delete { code } => {
                self.call(Method::DELETE, format!("/airports/{}", code), None).await?;
                println!("[\u{2713} OK] Deleted {}", code);
                Ok(())
            }
            Command::Exit => Ok(()),
        }
    }

    async fn call(&self, method: Method, path: String, body: Option<Value>) -> Result<Value, String> {
        let mut req = self.client.request(method, self.url(&path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        let value: Value = resp.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }
        let message = value["error"].as_str().map(str::to_string).unwrap_or_else(|| status.to_string());
        Err(format!("[{}] {}", status.as_u16(), message))
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn pretty(v: &Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
}
