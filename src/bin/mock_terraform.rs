//! Mock terraform binary for integration testing
//!
//! Accepts the subset of the terraform CLI the harness drives and answers
//! from environment variables instead of touching any cloud:
//!
//! - `MOCK_TF_LOG`: file to append one line per invocation
//!   (`<working dir name> <args...>`)
//! - `MOCK_TF_OUTPUTS`: JSON object of output name to value
//! - `MOCK_TF_FAIL_INIT`, `MOCK_TF_FAIL_APPLY`, `MOCK_TF_FAIL_DESTROY`:
//!   fail that subcommand with the given message
//! - `MOCK_TF_APPLY_DELAY_MS`: sleep this long before apply completes
//! - `MOCK_TF_VERSION`: version reported by `version -json` (default 1.6.0)

use serde_json::{json, Map, Value};
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::process::exit;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    log_invocation(&args);

    let command = args.first().map(String::as_str).unwrap_or("");
    match command {
        "init" => {
            fail_if_set("MOCK_TF_FAIL_INIT");
            println!("Terraform has been successfully initialized!");
        }
        "apply" => {
            if let Some(ms) = env::var("MOCK_TF_APPLY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
            {
                std::thread::sleep(std::time::Duration::from_millis(ms));
            }
            fail_if_set("MOCK_TF_FAIL_APPLY");
            println!("Apply complete! Resources: 1 added, 0 changed, 0 destroyed.");
        }
        "destroy" => {
            fail_if_set("MOCK_TF_FAIL_DESTROY");
            println!("Destroy complete! Resources: 1 destroyed.");
        }
        "output" => output(&args[1..]),
        "version" => {
            let version = env::var("MOCK_TF_VERSION").unwrap_or_else(|_| "1.6.0".to_string());
            if args.iter().any(|a| a == "-json") {
                println!(
                    "{}",
                    json!({ "terraform_version": version, "platform": "linux_amd64" })
                );
            } else {
                println!("Terraform v{}", version);
            }
        }
        other => {
            eprintln!("Error: mock terraform does not support '{}'", other);
            exit(1);
        }
    }
}

fn output(args: &[String]) {
    let outputs = configured_outputs();
    let name = args.iter().find(|a| !a.starts_with('-'));

    match name {
        Some(name) => match outputs.get(name) {
            Some(value) => println!("{}", value),
            None => {
                eprintln!(
                    "Error: Output \"{}\" not found\n\nThe output variable requested could not be found in the state file.",
                    name
                );
                exit(1);
            }
        },
        None => {
            let all: Map<String, Value> = outputs
                .into_iter()
                .map(|(k, v)| (k, json!({ "sensitive": false, "type": "string", "value": v })))
                .collect();
            println!("{}", Value::Object(all));
        }
    }
}

fn configured_outputs() -> Map<String, Value> {
    env::var("MOCK_TF_OUTPUTS")
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

fn fail_if_set(var: &str) {
    if let Ok(message) = env::var(var) {
        eprintln!("Error: {}", message);
        exit(1);
    }
}

fn log_invocation(args: &[String]) {
    let Ok(path) = env::var("MOCK_TF_LOG") else {
        return;
    };
    let dir = env::current_dir()
        .ok()
        .and_then(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();

    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{} {}", dir, args.join(" "));
    }
}
